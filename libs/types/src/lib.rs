//! Types library for the compliance risk register
//!
//! This library provides the core type definitions shared by the register
//! services: identifiers, the risk record and its ordinal scales, severity
//! thresholds, catalog records, caller roles and the error taxonomy.
//!
//! # Modules
//! - `ids`: Unique identifiers (RiskId, ControlId, ComponentId, ScopeId, UserId)
//! - `risk`: Risk records, impact/chance scales, treatment, impact areas
//! - `severity`: Severity labels and threshold ranges
//! - `catalog`: Component, scope, control and user records
//! - `role`: Caller roles and permission checks
//! - `errors`: Error taxonomy

pub mod ids;
pub mod risk;
pub mod severity;
pub mod catalog;
pub mod role;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::risk::*;
    pub use crate::severity::*;
    pub use crate::catalog::*;
    pub use crate::role::*;
    pub use crate::errors::*;
}
