//! Severity labels and administrator-managed score thresholds
//!
//! A threshold maps an inclusive `[min_score, max_score]` range of risk
//! scores to a severity label. The table of thresholds is owned by the
//! risk engine; this module only defines the row type and its interval
//! arithmetic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Severity derived from a risk score
///
/// Ordered from least to most severe so `Severity::High > Severity::Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl Severity {
    /// Every severity in ascending order
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Moderate,
        Severity::High,
        Severity::Critical,
    ];

    /// Stored value, e.g. `"moderate"`
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Moderate => "moderate",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Human-readable label, e.g. `"Moderate"`
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Moderate => "Moderate",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }

    /// High and critical risks count as "high" on dashboards
    pub fn is_elevated(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Severity::ALL
            .into_iter()
            .find(|severity| severity.as_str() == normalized)
            .ok_or_else(|| format!("Unknown severity '{}'.", s))
    }
}

/// Default ranges seeded when the register is initialised
pub const DEFAULT_THRESHOLDS: [(Severity, u32, u32); 4] = [
    (Severity::Low, 1, 5),
    (Severity::Moderate, 6, 10),
    (Severity::High, 11, 17),
    (Severity::Critical, 18, 25),
];

/// One administrator-configured score range
///
/// Invariant (enforced by the engine, not the constructor):
/// `min_score <= max_score`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeverityThreshold {
    pub severity: Severity,
    pub min_score: u32,
    pub max_score: u32,
}

impl SeverityThreshold {
    pub fn new(severity: Severity, min_score: u32, max_score: u32) -> Self {
        Self {
            severity,
            min_score,
            max_score,
        }
    }

    /// The seeded default thresholds, lowest range first
    pub fn defaults() -> Vec<SeverityThreshold> {
        DEFAULT_THRESHOLDS
            .iter()
            .map(|&(severity, min, max)| Self::new(severity, min, max))
            .collect()
    }

    /// Inclusive on both ends
    pub fn contains(&self, score: u32) -> bool {
        self.min_score <= score && score <= self.max_score
    }

    /// Two ranges overlap unless one ends strictly before the other starts
    pub fn overlaps(&self, other: &SeverityThreshold) -> bool {
        !(self.max_score < other.min_score || other.max_score < self.min_score)
    }

    /// Check row invariant: `min_score <= max_score`
    pub fn is_well_formed(&self) -> bool {
        self.min_score <= self.max_score
    }
}

impl fmt::Display for SeverityThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}, {}]", self.severity, self.min_score, self.max_score)
    }
}

/// Versioned set of thresholds, one row per severity
///
/// Values are immutable snapshots: an edit produces a new table with the
/// version bumped, so a reader holding a table never sees a partial edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdTable {
    version: u64,
    rows: BTreeMap<Severity, SeverityThreshold>,
}

impl ThresholdTable {
    /// Table seeded with `DEFAULT_THRESHOLDS`, version 1
    pub fn with_defaults() -> Self {
        Self::from_rows(SeverityThreshold::defaults())
    }

    /// Build version 1 from rows; a later row for the same severity wins
    pub fn from_rows(rows: impl IntoIterator<Item = SeverityThreshold>) -> Self {
        Self {
            version: 1,
            rows: rows.into_iter().map(|row| (row.severity, row)).collect(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, severity: Severity) -> Option<&SeverityThreshold> {
        self.rows.get(&severity)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in severity order
    pub fn iter(&self) -> impl Iterator<Item = &SeverityThreshold> {
        self.rows.values()
    }

    /// Rows ordered by `min_score`
    pub fn by_min_score(&self) -> Vec<SeverityThreshold> {
        let mut rows: Vec<SeverityThreshold> = self.rows.values().copied().collect();
        rows.sort_by_key(|row| (row.min_score, row.max_score));
        rows
    }

    /// New table with one row replaced and the version bumped
    pub fn with_row(&self, row: SeverityThreshold) -> Self {
        let mut rows = self.rows.clone();
        rows.insert(row.severity, row);
        Self {
            version: self.version + 1,
            rows,
        }
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_defaults() {
        let table = ThresholdTable::with_defaults();
        assert_eq!(table.version(), 1);
        assert_eq!(table.len(), 4);
        assert_eq!(
            table.get(Severity::High),
            Some(&SeverityThreshold::new(Severity::High, 11, 17))
        );
    }

    #[test]
    fn test_with_row_leaves_original_untouched() {
        let table = ThresholdTable::with_defaults();
        let edited = table.with_row(SeverityThreshold::new(Severity::Low, 1, 4));
        assert_eq!(edited.version(), 2);
        assert_eq!(edited.get(Severity::Low).unwrap().max_score, 4);
        assert_eq!(table.get(Severity::Low).unwrap().max_score, 5);
        assert_eq!(edited.get(Severity::Critical), table.get(Severity::Critical));
    }

    #[test]
    fn test_by_min_score_orders_rows() {
        let table = ThresholdTable::from_rows([
            SeverityThreshold::new(Severity::Critical, 16, 25),
            SeverityThreshold::new(Severity::Low, 1, 5),
        ]);
        let ordered: Vec<Severity> = table.by_min_score().iter().map(|r| r.severity).collect();
        assert_eq!(ordered, vec![Severity::Low, Severity::Critical]);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Moderate);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_serialization() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let parsed: Severity = serde_json::from_str("\"moderate\"").unwrap();
        assert_eq!(parsed, Severity::Moderate);
    }

    #[test]
    fn test_severity_from_str_is_case_insensitive() {
        assert_eq!(" HIGH ".parse::<Severity>().unwrap(), Severity::High);
        assert!("severe".parse::<Severity>().is_err());
    }

    #[test]
    fn test_default_thresholds_do_not_overlap() {
        let defaults = SeverityThreshold::defaults();
        for (i, a) in defaults.iter().enumerate() {
            for b in defaults.iter().skip(i + 1) {
                assert!(!a.overlaps(b), "{} overlaps {}", a, b);
            }
        }
    }

    #[test]
    fn test_contains_is_inclusive() {
        let moderate = SeverityThreshold::new(Severity::Moderate, 6, 10);
        assert!(moderate.contains(6));
        assert!(moderate.contains(10));
        assert!(!moderate.contains(5));
        assert!(!moderate.contains(11));
    }

    #[test]
    fn test_overlap_on_shared_bound() {
        let low = SeverityThreshold::new(Severity::Low, 1, 5);
        let moderate = SeverityThreshold::new(Severity::Moderate, 5, 10);
        assert!(low.overlaps(&moderate));
        assert!(moderate.overlaps(&low));
    }

    #[test]
    fn test_adjacent_ranges_do_not_overlap() {
        let low = SeverityThreshold::new(Severity::Low, 1, 5);
        let moderate = SeverityThreshold::new(Severity::Moderate, 6, 10);
        assert!(!low.overlaps(&moderate));
    }

    #[test]
    fn test_display() {
        let high = SeverityThreshold::new(Severity::High, 11, 17);
        assert_eq!(high.to_string(), "High [11, 17]");
    }
}
