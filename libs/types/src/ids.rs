//! Unique identifier types for risk register entities
//!
//! All IDs use UUID v7 so records sort by creation time and the register
//! can be replayed in chronological order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new id with the current timestamp
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Create from existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get inner UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a risk record
    ///
    /// Time-sortable, so dashboards can order risks by creation without
    /// consulting the timestamp columns.
    RiskId
);

uuid_id!(
    /// Identifier of a CSA control in the control catalog
    ControlId
);

uuid_id!(
    /// Identifier of a BIA component in the component catalog
    ComponentId
);

uuid_id!(
    /// Identifier of a BIA context scope
    ScopeId
);

uuid_id!(
    /// Identifier of a platform user (treatment owners, actors)
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_id_creation() {
        let id1 = RiskId::new();
        let id2 = RiskId::new();
        assert_ne!(id1, id2, "RiskIds should be unique");
    }

    #[test]
    fn test_risk_ids_sort_by_creation() {
        let first = RiskId::new();
        let second = RiskId::new();
        assert!(first < second);
    }

    #[test]
    fn test_control_id_serialization() {
        let id = ControlId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let deserialized: ControlId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn test_component_id_from_str() {
        let id = ComponentId::new();
        let parsed: ComponentId = format!("  {}  ", id).parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<ComponentId>().is_err());
    }

    #[test]
    fn test_scope_and_user_ids_are_distinct_types() {
        let uuid = Uuid::now_v7();
        let scope = ScopeId::from_uuid(uuid);
        let user = UserId::from_uuid(uuid);
        assert_eq!(scope.as_uuid(), user.as_uuid());
    }
}
