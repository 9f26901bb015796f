//! Threshold administration rules
//!
//! One severity is edited at a time. The candidate range is checked
//! against every other severity's current range; the table itself is
//! never touched here, so a rejected edit cannot leave a partial update.

use crate::resolver;
use risk_types::errors::ThresholdError;
use risk_types::severity::{Severity, SeverityThreshold, ThresholdTable};

/// Validate a proposed `[min_score, max_score]` for `severity`.
///
/// Bounds arrive as signed integers straight from the admin form so that
/// negative input can be reported instead of wrapped.
pub fn validate_update(
    table: &ThresholdTable,
    severity: Severity,
    min_score: i64,
    max_score: i64,
) -> Result<SeverityThreshold, ThresholdError> {
    if min_score < 0 {
        return Err(ThresholdError::NegativeMinimum {
            severity,
            min_score,
        });
    }
    if max_score < min_score {
        return Err(ThresholdError::InvalidRange {
            severity,
            min_score,
            max_score,
        });
    }
    let min = u32::try_from(min_score).map_err(|_| ThresholdError::OutOfRange {
        severity,
        value: min_score,
    })?;
    let max = u32::try_from(max_score).map_err(|_| ThresholdError::OutOfRange {
        severity,
        value: max_score,
    })?;
    let candidate = SeverityThreshold::new(severity, min, max);

    let conflict = table
        .by_min_score()
        .into_iter()
        .filter(|row| row.severity != severity)
        .find(|row| row.overlaps(&candidate));
    if let Some(conflicting) = conflict {
        return Err(ThresholdError::Overlap {
            severity,
            min_score: min,
            max_score: max,
            conflicting,
        });
    }
    Ok(candidate)
}

/// Validate a complete set of rows, e.g. configured defaults.
pub fn validate_table(rows: &[SeverityThreshold]) -> Result<(), ThresholdError> {
    if let Some(row) = rows.iter().find(|row| !row.is_well_formed()) {
        return Err(ThresholdError::InvalidRange {
            severity: row.severity,
            min_score: i64::from(row.min_score),
            max_score: i64::from(row.max_score),
        });
    }
    if let Some((earlier, later)) = resolver::first_overlap(rows.iter()) {
        return Err(ThresholdError::Overlap {
            severity: later.severity,
            min_score: later.min_score,
            max_score: later.max_score,
            conflicting: earlier,
        });
    }
    Ok(())
}
