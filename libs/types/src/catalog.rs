//! Records owned by the BIA, CSA and identity catalogs
//!
//! The risk register only links to these records; it never edits them.

use crate::ids::{ComponentId, ControlId, ScopeId, UserId};
use serde::{Deserialize, Serialize};

/// BIA context scope with its risk-assessment participation flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextScope {
    pub scope_id: ScopeId,
    pub name: String,
    pub risk_assessment_human: bool,
    pub risk_assessment_process: bool,
    pub risk_assessment_technological: bool,
}

impl ContextScope {
    /// A scope participates in risk assessment when any flag is set
    pub fn is_risk_eligible(&self) -> bool {
        self.risk_assessment_human
            || self.risk_assessment_process
            || self.risk_assessment_technological
    }
}

/// Tracked asset inside a context scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub component_id: ComponentId,
    pub name: String,
    pub scope_id: ScopeId,
}

/// CSA control that can mitigate a risk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub control_id: ControlId,
    pub domain: String,
    pub section: Option<String>,
    pub description: Option<String>,
}

/// Platform user, referenced as treatment owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
}
