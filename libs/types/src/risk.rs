//! Risk record types
//!
//! Impact and chance are five-point ordinal scales; the risk score is the
//! product of their weights and is never stored.

use crate::ids::{ComponentId, ControlId, RiskId, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Maximum weight on either ordinal scale
pub const MAX_WEIGHT: u8 = 5;

/// Business impact when a risk materialises
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Insignificant,
    Minor,
    Moderate,
    Major,
    Catastrophic,
}

impl Impact {
    /// Ascending by weight
    pub const ALL: [Impact; 5] = [
        Impact::Insignificant,
        Impact::Minor,
        Impact::Moderate,
        Impact::Major,
        Impact::Catastrophic,
    ];

    /// Ordinal weight, 1 (insignificant) to 5 (catastrophic)
    pub fn weight(&self) -> u8 {
        match self {
            Impact::Insignificant => 1,
            Impact::Minor => 2,
            Impact::Moderate => 3,
            Impact::Major => 4,
            Impact::Catastrophic => 5,
        }
    }

    pub fn from_weight(weight: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|impact| impact.weight() == weight)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Insignificant => "insignificant",
            Impact::Minor => "minor",
            Impact::Moderate => "moderate",
            Impact::Major => "major",
            Impact::Catastrophic => "catastrophic",
        }
    }
}

impl FromStr for Impact {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|impact| impact.as_str() == normalized)
            .ok_or_else(|| format!("Unknown impact '{}'.", s))
    }
}

/// Likelihood that a risk occurs within the assessed timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chance {
    Rare,
    Unlikely,
    Possible,
    Likely,
    AlmostCertain,
}

impl Chance {
    /// Ascending by weight
    pub const ALL: [Chance; 5] = [
        Chance::Rare,
        Chance::Unlikely,
        Chance::Possible,
        Chance::Likely,
        Chance::AlmostCertain,
    ];

    /// Ordinal weight, 1 (rare) to 5 (almost certain)
    pub fn weight(&self) -> u8 {
        match self {
            Chance::Rare => 1,
            Chance::Unlikely => 2,
            Chance::Possible => 3,
            Chance::Likely => 4,
            Chance::AlmostCertain => 5,
        }
    }

    pub fn from_weight(weight: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|chance| chance.weight() == weight)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Chance::Rare => "rare",
            Chance::Unlikely => "unlikely",
            Chance::Possible => "possible",
            Chance::Likely => "likely",
            Chance::AlmostCertain => "almost_certain",
        }
    }
}

impl FromStr for Chance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|chance| chance.as_str() == normalized)
            .ok_or_else(|| format!("Unknown chance '{}'.", s))
    }
}

/// Score for an impact/chance pair: product of the two weights (1..=25)
pub fn risk_score(impact: Impact, chance: Chance) -> u32 {
    u32::from(impact.weight()) * u32::from(chance.weight())
}

/// Business dimension affected by a risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactArea {
    Financial,
    HumanSafety,
    Operational,
    Privacy,
    Regulatory,
}

impl ImpactArea {
    pub const ALL: [ImpactArea; 5] = [
        ImpactArea::Financial,
        ImpactArea::HumanSafety,
        ImpactArea::Operational,
        ImpactArea::Privacy,
        ImpactArea::Regulatory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactArea::Financial => "financial",
            ImpactArea::HumanSafety => "human_safety",
            ImpactArea::Operational => "operational",
            ImpactArea::Privacy => "privacy",
            ImpactArea::Regulatory => "regulatory",
        }
    }
}

impl FromStr for ImpactArea {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|area| area.as_str() == normalized)
            .ok_or_else(|| format!("Unknown impact area '{}'.", s))
    }
}

/// Risk response classification
///
/// Not a workflow state: it may change freely between saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Treatment {
    Accept,
    Avoid,
    Mitigate,
    Transfer,
}

impl Treatment {
    pub const ALL: [Treatment; 4] = [
        Treatment::Accept,
        Treatment::Avoid,
        Treatment::Mitigate,
        Treatment::Transfer,
    ];

    /// Mitigation must name at least one control
    pub fn requires_controls(&self) -> bool {
        matches!(self, Treatment::Mitigate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Treatment::Accept => "accept",
            Treatment::Avoid => "avoid",
            Treatment::Mitigate => "mitigate",
            Treatment::Transfer => "transfer",
        }
    }
}

impl FromStr for Treatment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|treatment| treatment.as_str() == normalized)
            .ok_or_else(|| format!("Unknown treatment '{}'.", s))
    }
}

/// Derived schedule status of a risk's treatment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskStatus {
    /// Closed; kept on record
    Archived,
    /// Due date is in the past
    Overdue,
    /// Due date is today or later
    Scheduled,
    /// No due date set
    Unscheduled,
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            RiskStatus::Archived => "archived",
            RiskStatus::Overdue => "overdue",
            RiskStatus::Scheduled => "scheduled",
            RiskStatus::Unscheduled => "unscheduled",
        };
        f.write_str(value)
    }
}

/// Core risk row (relationships are stored separately)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Risk {
    pub risk_id: RiskId,
    pub title: String,
    pub description: String,
    pub discovered_on: NaiveDate,
    pub impact: Impact,
    pub chance: Chance,
    pub treatment: Treatment,
    pub treatment_plan: Option<String>,
    pub treatment_due_date: Option<NaiveDate>,
    pub treatment_owner: Option<UserId>,
    pub ticket_url: Option<String>,
    /// Unix nanoseconds; `Some` once archived
    pub closed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Risk {
    /// Score derived from impact × chance; recomputed on every read
    pub fn score(&self) -> u32 {
        risk_score(self.impact, self.chance)
    }

    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    /// Schedule status relative to `today`
    pub fn status(&self, today: NaiveDate) -> RiskStatus {
        if self.is_closed() {
            return RiskStatus::Archived;
        }
        match self.treatment_due_date {
            None => RiskStatus::Unscheduled,
            Some(due) if due < today => RiskStatus::Overdue,
            Some(_) => RiskStatus::Scheduled,
        }
    }
}

/// A risk together with its relationship rows
///
/// Controls and components are listed in id order, as read back from the
/// link tables. Impact areas are a set, so duplicates cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskRecord {
    pub risk: Risk,
    pub controls: Vec<ControlId>,
    pub components: Vec<ComponentId>,
    pub impact_areas: BTreeSet<ImpactArea>,
}

impl RiskRecord {
    pub fn score(&self) -> u32 {
        self.risk.score()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_risk() -> Risk {
        Risk {
            risk_id: RiskId::new(),
            title: "Payroll data exposure".to_string(),
            description: "Payroll export shared without encryption".to_string(),
            discovered_on: date(2024, 2, 1),
            impact: Impact::Major,
            chance: Chance::Unlikely,
            treatment: Treatment::Accept,
            treatment_plan: None,
            treatment_due_date: None,
            treatment_owner: None,
            ticket_url: None,
            closed_at: None,
            created_at: 1708123456789000000,
            updated_at: 1708123456789000000,
        }
    }

    #[test]
    fn test_score_is_product_of_weights() {
        let risk = sample_risk();
        assert_eq!(risk.score(), 8);
        assert_eq!(risk_score(Impact::Catastrophic, Chance::AlmostCertain), 25);
        assert_eq!(risk_score(Impact::Insignificant, Chance::Rare), 1);
    }

    #[test]
    fn test_weights_round_trip_through_from_weight() {
        for impact in Impact::ALL {
            assert_eq!(Impact::from_weight(impact.weight()), Some(impact));
        }
        for chance in Chance::ALL {
            assert_eq!(Chance::from_weight(chance.weight()), Some(chance));
        }
        assert_eq!(Impact::from_weight(0), None);
        assert_eq!(Chance::from_weight(MAX_WEIGHT + 1), None);
    }

    #[test]
    fn test_enum_values_match_storage_format() {
        assert_eq!(
            serde_json::to_string(&Chance::AlmostCertain).unwrap(),
            "\"almost_certain\""
        );
        assert_eq!(
            serde_json::to_string(&ImpactArea::HumanSafety).unwrap(),
            "\"human_safety\""
        );
        assert_eq!("Almost_Certain".parse::<Chance>().unwrap(), Chance::AlmostCertain);
        assert_eq!("privacy".parse::<ImpactArea>().unwrap(), ImpactArea::Privacy);
    }

    #[test]
    fn test_unknown_values_are_rejected() {
        assert_eq!(
            "huge".parse::<Impact>().unwrap_err(),
            "Unknown impact 'huge'."
        );
        assert!("ignore".parse::<Treatment>().is_err());
    }

    #[test]
    fn test_only_mitigate_requires_controls() {
        assert!(Treatment::Mitigate.requires_controls());
        assert!(!Treatment::Accept.requires_controls());
        assert!(!Treatment::Avoid.requires_controls());
        assert!(!Treatment::Transfer.requires_controls());
    }

    #[test]
    fn test_status_derivation() {
        let today = date(2024, 3, 1);
        let mut risk = sample_risk();
        assert_eq!(risk.status(today), RiskStatus::Unscheduled);

        risk.treatment_due_date = Some(date(2024, 2, 28));
        assert_eq!(risk.status(today), RiskStatus::Overdue);

        risk.treatment_due_date = Some(today);
        assert_eq!(risk.status(today), RiskStatus::Scheduled);

        risk.closed_at = Some(1709251200000000000);
        assert_eq!(risk.status(today), RiskStatus::Archived);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn impact() -> impl Strategy<Value = Impact> {
            prop::sample::select(Impact::ALL.to_vec())
        }

        fn chance() -> impl Strategy<Value = Chance> {
            prop::sample::select(Chance::ALL.to_vec())
        }

        proptest! {
            #[test]
            fn score_stays_on_the_grid(impact in impact(), chance in chance()) {
                let score = risk_score(impact, chance);
                prop_assert!((1..=MAX_WEIGHT as u32 * MAX_WEIGHT as u32).contains(&score));
                prop_assert_eq!(score % impact.weight() as u32, 0);
            }

            #[test]
            fn score_grows_with_impact(a in impact(), b in impact(), chance in chance()) {
                if a.weight() <= b.weight() {
                    prop_assert!(risk_score(a, chance) <= risk_score(b, chance));
                }
            }
        }
    }
}
