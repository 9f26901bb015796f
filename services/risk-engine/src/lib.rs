//! Risk Engine Service
//!
//! The compliance risk register: risks scored on impact × chance, severity
//! resolved from administrator-managed thresholds, treatment rules enforced
//! on every save, and every change journaled through the `persistence`
//! crate when durability is enabled.
//!
//! # Modules
//! - `resolver`: score → severity lookup, overlap and gap checks
//! - `thresholds`: threshold edit validation
//! - `validator`: risk draft validation
//! - `payload`: JSON body coercion into drafts
//! - `catalog`: lookups for controls, components, scopes and users
//! - `store`: locked register state with journaled commits
//! - `views`: risk views, dashboard metrics, heat matrix
//! - `events`: audit events
//! - `config`: engine and store configuration
//! - `engine`: the orchestrator

pub mod catalog;
pub mod config;
pub mod engine;
pub mod events;
pub mod payload;
pub mod resolver;
pub mod store;
pub mod thresholds;
pub mod validator;
pub mod views;

pub use catalog::{Catalog, InMemoryCatalog};
pub use config::{ConfigError, RiskEngineConfig, StoreConfig};
pub use engine::RiskEngine;
pub use events::{RegisterEvent, RegisterEventKind};
pub use validator::RiskDraft;
pub use views::{Dashboard, RiskView};
