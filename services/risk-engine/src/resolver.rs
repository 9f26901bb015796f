//! Score → severity resolution
//!
//! Resolution is a pure function of a score and a threshold snapshot.
//! Administrators may leave gaps between ranges; a score that falls in a
//! gap is unclassified (`None`) rather than an error.

use risk_types::risk::{risk_score, Chance, Impact};
use risk_types::severity::{Severity, SeverityThreshold, ThresholdTable};
use serde::{Deserialize, Serialize};

/// Label used when no threshold contains a score.
pub const UNCLASSIFIED: &str = "unclassified";

/// Severity whose inclusive range contains `score`, if any.
///
/// Rows are scanned by ascending `min_score`, so even an (invalid)
/// overlapping table resolves deterministically to the lowest range.
pub fn resolve(score: u32, table: &ThresholdTable) -> Option<Severity> {
    table
        .by_min_score()
        .into_iter()
        .find(|row| row.contains(score))
        .map(|row| row.severity)
}

/// Resolve an impact/chance pair directly.
pub fn resolve_pair(impact: Impact, chance: Chance, table: &ThresholdTable) -> Option<Severity> {
    resolve(risk_score(impact, chance), table)
}

/// Stored value of a resolution, `"unclassified"` for `None`.
pub fn severity_value(severity: Option<Severity>) -> &'static str {
    severity.map_or(UNCLASSIFIED, |s| s.as_str())
}

/// Whole-table overlap check: sort by minimum and compare each row with
/// the previous maximum.
pub fn thresholds_overlap<'a>(rows: impl IntoIterator<Item = &'a SeverityThreshold>) -> bool {
    first_overlap(rows).is_some()
}

/// First pair of overlapping rows in `min_score` order.
pub fn first_overlap<'a>(
    rows: impl IntoIterator<Item = &'a SeverityThreshold>,
) -> Option<(SeverityThreshold, SeverityThreshold)> {
    let mut ordered: Vec<SeverityThreshold> = rows.into_iter().copied().collect();
    ordered.sort_by_key(|row| (row.min_score, row.max_score));
    ordered
        .windows(2)
        .find(|pair| pair[1].min_score <= pair[0].max_score)
        .map(|pair| (pair[0], pair[1]))
}

/// An inclusive run of scores no threshold covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreGap {
    pub start: u32,
    pub end: u32,
}

/// Uncovered sub-ranges of `[low, high]`.
pub fn gaps(table: &ThresholdTable, low: u32, high: u32) -> Vec<ScoreGap> {
    let mut found = Vec::new();
    if low > high {
        return found;
    }
    let mut next = low;
    for row in table.by_min_score() {
        if row.max_score < next {
            continue;
        }
        if row.min_score > high {
            break;
        }
        if row.min_score > next {
            found.push(ScoreGap {
                start: next,
                end: row.min_score - 1,
            });
        }
        match row.max_score.checked_add(1) {
            Some(after) => next = next.max(after),
            None => return found,
        }
        if next > high {
            return found;
        }
    }
    found.push(ScoreGap {
        start: next,
        end: high,
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_table() -> ThresholdTable {
        ThresholdTable::from_rows([
            SeverityThreshold::new(Severity::Low, 1, 5),
            SeverityThreshold::new(Severity::Moderate, 6, 10),
            SeverityThreshold::new(Severity::High, 11, 15),
            SeverityThreshold::new(Severity::Critical, 16, 25),
        ])
    }

    #[test]
    fn test_score_eight_is_moderate() {
        assert_eq!(
            resolve_pair(Impact::Major, Chance::Unlikely, &scenario_table()),
            Some(Severity::Moderate)
        );
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let table = scenario_table();
        assert_eq!(resolve(5, &table), Some(Severity::Low));
        assert_eq!(resolve(6, &table), Some(Severity::Moderate));
        assert_eq!(resolve(15, &table), Some(Severity::High));
        assert_eq!(resolve(25, &table), Some(Severity::Critical));
    }

    #[test]
    fn test_gap_is_unclassified() {
        let table = ThresholdTable::from_rows([
            SeverityThreshold::new(Severity::Low, 1, 4),
            SeverityThreshold::new(Severity::Moderate, 7, 10),
        ]);
        assert_eq!(resolve(5, &table), None);
        assert_eq!(resolve(0, &table), None);
        assert_eq!(severity_value(resolve(5, &table)), "unclassified");
        assert_eq!(severity_value(resolve(8, &table)), "moderate");
    }

    #[test]
    fn test_default_table_covers_score_space() {
        let table = ThresholdTable::with_defaults();
        assert!(gaps(&table, 1, 25).is_empty());
        assert!(!thresholds_overlap(table.iter()));
    }

    #[test]
    fn test_gaps_reported() {
        let table = ThresholdTable::from_rows([
            SeverityThreshold::new(Severity::Low, 3, 5),
            SeverityThreshold::new(Severity::High, 11, 17),
        ]);
        assert_eq!(
            gaps(&table, 1, 25),
            vec![
                ScoreGap { start: 1, end: 2 },
                ScoreGap { start: 6, end: 10 },
                ScoreGap { start: 18, end: 25 },
            ]
        );
    }

    #[test]
    fn test_gaps_of_empty_table() {
        let table = ThresholdTable::from_rows([]);
        assert_eq!(gaps(&table, 1, 25), vec![ScoreGap { start: 1, end: 25 }]);
    }

    #[test]
    fn test_first_overlap() {
        let rows = [
            SeverityThreshold::new(Severity::Moderate, 5, 10),
            SeverityThreshold::new(Severity::Low, 1, 5),
        ];
        let (a, b) = first_overlap(rows.iter()).unwrap();
        assert_eq!(a.severity, Severity::Low);
        assert_eq!(b.severity, Severity::Moderate);
    }
}
