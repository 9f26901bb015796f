//! Caller roles as supplied by the authorization layer
//!
//! The register trusts the roles it is given; it only decides whether
//! they are sufficient for an operation.

use crate::ids::UserId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Platform role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    AssessmentManager,
    ControlOwner,
    Viewer,
}

/// Authenticated caller of a register operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub roles: BTreeSet<Role>,
}

impl Actor {
    pub fn new(user_id: UserId, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            user_id,
            roles: roles.into_iter().collect(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Severity thresholds are administrator-only
    pub fn can_manage_thresholds(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// Create, edit, close, reopen, delete and read risks
    pub fn can_manage_risks(&self) -> bool {
        self.has_role(Role::Admin) || self.has_role(Role::AssessmentManager)
    }
}
