//! Property tests for severity thresholds
//!
//! Random sequences of admin edits are applied to an engine; whatever was
//! accepted, the committed table must stay overlap-free and every score
//! must resolve to at most one severity.

use proptest::prelude::*;
use risk_engine::resolver;
use risk_engine::{InMemoryCatalog, RiskEngine};
use risk_types::errors::RiskError;
use risk_types::ids::UserId;
use risk_types::role::{Actor, Role};
use risk_types::severity::{Severity, ThresholdTable};
use std::sync::Arc;

const TS: i64 = 1_708_123_456_789_000_000;

fn severity() -> impl Strategy<Value = Severity> {
    prop::sample::select(Severity::ALL.to_vec())
}

fn edit() -> impl Strategy<Value = (Severity, i64, i64)> {
    (severity(), -3i64..30, -3i64..30)
}

fn matching(score: u32, table: &ThresholdTable) -> usize {
    table.iter().filter(|row| row.contains(score)).count()
}

proptest! {
    #[test]
    fn edits_never_leave_overlaps(edits in prop::collection::vec(edit(), 1..40)) {
        let engine = RiskEngine::new(Arc::new(InMemoryCatalog::new()));
        let admin = Actor::new(UserId::new(), [Role::Admin]);

        for (i, (severity, min, max)) in edits.into_iter().enumerate() {
            let before = engine.thresholds();
            match engine.update_threshold(&admin, severity, min, max, TS + i as i64) {
                Ok((table, _)) => {
                    prop_assert_eq!(table.version(), before.version() + 1);
                    let row = table.get(severity).copied();
                    prop_assert_eq!(row.map(|r| (i64::from(r.min_score), i64::from(r.max_score))), Some((min, max)));
                    for other in Severity::ALL.iter().filter(|s| **s != severity) {
                        prop_assert_eq!(table.get(*other), before.get(*other));
                    }
                }
                Err(RiskError::Threshold(_)) => {
                    prop_assert_eq!(&*engine.thresholds(), &*before);
                }
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
            let table = engine.thresholds();
            prop_assert!(!resolver::thresholds_overlap(table.iter()));
        }
    }

    #[test]
    fn every_score_has_at_most_one_severity(
        edits in prop::collection::vec(edit(), 0..20),
        score in 0u32..40,
    ) {
        let engine = RiskEngine::new(Arc::new(InMemoryCatalog::new()));
        let admin = Actor::new(UserId::new(), [Role::Admin]);
        for (severity, min, max) in edits {
            let _ = engine.update_threshold(&admin, severity, min, max, TS);
        }

        let table = engine.thresholds();
        let count = matching(score, &table);
        prop_assert!(count <= 1);
        match engine.resolve(score) {
            Some(found) => {
                prop_assert_eq!(count, 1);
                prop_assert!(table.get(found).is_some_and(|row| row.contains(score)));
            }
            None => {
                prop_assert_eq!(count, 0);
                prop_assert!(resolver::gaps(&table, score, score).len() == 1);
            }
        }
    }
}
