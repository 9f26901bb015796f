//! Register audit events
//!
//! Every committed change produces one event. Callers forward events to
//! whatever audit sink they run; the engine also logs each one.

use risk_types::ids::{RiskId, UserId};
use risk_types::risk::{Chance, Impact, Risk, Treatment};
use risk_types::severity::{Severity, SeverityThreshold};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event emitted after a committed register change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterEvent {
    pub event_id: Uuid,
    /// User who performed the change
    pub actor: UserId,
    pub kind: RegisterEventKind,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegisterEventKind {
    RiskCreated {
        risk_id: RiskId,
        title: String,
        impact: Impact,
        chance: Chance,
        treatment: Treatment,
    },
    RiskUpdated {
        risk_id: RiskId,
        title: String,
        impact: Impact,
        chance: Chance,
        treatment: Treatment,
    },
    RiskClosed {
        risk_id: RiskId,
        title: String,
    },
    RiskReopened {
        risk_id: RiskId,
        title: String,
    },
    RiskDeleted {
        risk_id: RiskId,
        title: String,
    },
    ThresholdUpdated {
        severity: Severity,
        previous: SeverityThreshold,
        current: SeverityThreshold,
    },
}

impl RegisterEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            RegisterEventKind::RiskCreated { .. } => "risk_created",
            RegisterEventKind::RiskUpdated { .. } => "risk_updated",
            RegisterEventKind::RiskClosed { .. } => "risk_closed",
            RegisterEventKind::RiskReopened { .. } => "risk_reopened",
            RegisterEventKind::RiskDeleted { .. } => "risk_deleted",
            RegisterEventKind::ThresholdUpdated { .. } => "threshold_updated",
        }
    }

    /// Risk the event concerns, if any.
    pub fn risk_id(&self) -> Option<RiskId> {
        match self {
            RegisterEventKind::RiskCreated { risk_id, .. }
            | RegisterEventKind::RiskUpdated { risk_id, .. }
            | RegisterEventKind::RiskClosed { risk_id, .. }
            | RegisterEventKind::RiskReopened { risk_id, .. }
            | RegisterEventKind::RiskDeleted { risk_id, .. } => Some(*risk_id),
            RegisterEventKind::ThresholdUpdated { .. } => None,
        }
    }
}

impl RegisterEvent {
    pub fn new(actor: UserId, kind: RegisterEventKind, timestamp: i64) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            actor,
            kind,
            timestamp,
        }
    }
}

pub fn risk_created(actor: UserId, risk: &Risk, timestamp: i64) -> RegisterEvent {
    RegisterEvent::new(
        actor,
        RegisterEventKind::RiskCreated {
            risk_id: risk.risk_id,
            title: risk.title.clone(),
            impact: risk.impact,
            chance: risk.chance,
            treatment: risk.treatment,
        },
        timestamp,
    )
}

pub fn risk_updated(actor: UserId, risk: &Risk, timestamp: i64) -> RegisterEvent {
    RegisterEvent::new(
        actor,
        RegisterEventKind::RiskUpdated {
            risk_id: risk.risk_id,
            title: risk.title.clone(),
            impact: risk.impact,
            chance: risk.chance,
            treatment: risk.treatment,
        },
        timestamp,
    )
}

/// Close, reopen or delete event, chosen by the new lifecycle state.
pub fn risk_lifecycle(
    actor: UserId,
    risk: &Risk,
    transition: Lifecycle,
    timestamp: i64,
) -> RegisterEvent {
    let risk_id = risk.risk_id;
    let title = risk.title.clone();
    let kind = match transition {
        Lifecycle::Closed => RegisterEventKind::RiskClosed { risk_id, title },
        Lifecycle::Reopened => RegisterEventKind::RiskReopened { risk_id, title },
        Lifecycle::Deleted => RegisterEventKind::RiskDeleted { risk_id, title },
    };
    RegisterEvent::new(actor, kind, timestamp)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Closed,
    Reopened,
    Deleted,
}

pub fn threshold_updated(
    actor: UserId,
    previous: SeverityThreshold,
    current: SeverityThreshold,
    timestamp: i64,
) -> RegisterEvent {
    RegisterEvent::new(
        actor,
        RegisterEventKind::ThresholdUpdated {
            severity: current.severity,
            previous,
            current,
        },
        timestamp,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const TS: i64 = 1_708_123_456_789_000_000;

    fn risk() -> Risk {
        Risk {
            risk_id: RiskId::new(),
            title: "Supplier insolvency".to_string(),
            description: "Key supplier may fail".to_string(),
            discovered_on: NaiveDate::from_ymd_opt(2024, 2, 16).unwrap(),
            impact: Impact::Major,
            chance: Chance::Unlikely,
            treatment: Treatment::Transfer,
            treatment_plan: None,
            treatment_due_date: None,
            treatment_owner: None,
            ticket_url: None,
            closed_at: None,
            created_at: TS,
            updated_at: TS,
        }
    }

    #[test]
    fn test_created_event_carries_scales() {
        let risk = risk();
        let actor = UserId::new();
        let event = risk_created(actor, &risk, TS);
        assert_eq!(event.actor, actor);
        assert_eq!(event.timestamp, TS);
        assert_eq!(event.kind.name(), "risk_created");
        assert_eq!(event.kind.risk_id(), Some(risk.risk_id));
        match event.kind {
            RegisterEventKind::RiskCreated {
                impact,
                chance,
                treatment,
                ..
            } => {
                assert_eq!(impact, Impact::Major);
                assert_eq!(chance, Chance::Unlikely);
                assert_eq!(treatment, Treatment::Transfer);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_lifecycle_kinds() {
        let risk = risk();
        let actor = UserId::new();
        let names: Vec<&str> = [Lifecycle::Closed, Lifecycle::Reopened, Lifecycle::Deleted]
            .into_iter()
            .map(|t| risk_lifecycle(actor, &risk, t, TS).kind.name())
            .collect();
        assert_eq!(names, ["risk_closed", "risk_reopened", "risk_deleted"]);
    }

    #[test]
    fn test_threshold_event_serializes_tagged() {
        let event = threshold_updated(
            UserId::new(),
            SeverityThreshold::new(Severity::Low, 1, 5),
            SeverityThreshold::new(Severity::Low, 1, 4),
            TS,
        );
        assert_eq!(event.kind.risk_id(), None);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["type"], "threshold_updated");
        assert_eq!(json["kind"]["severity"], "low");
        assert_eq!(json["kind"]["previous"]["max_score"], 5);
        assert_eq!(json["kind"]["current"]["max_score"], 4);
    }

    #[test]
    fn test_event_ids_unique() {
        let risk = risk();
        let a = risk_updated(UserId::new(), &risk, TS);
        let b = risk_updated(UserId::new(), &risk, TS);
        assert_ne!(a.event_id, b.event_id);
    }
}
