//! Register store
//!
//! Holds the register tables behind one `RwLock` and publishes the
//! threshold table as an `Arc` so readers resolve severities against a
//! complete, committed table.
//!
//! Commit order for a mutation:
//! 1. check preconditions against the current state
//! 2. append to the journal (durable stores only)
//! 3. apply in memory under the write lock
//! 4. publish the threshold table if it changed
//! 5. take a snapshot when the interval policy says so
//!
//! A failure in step 1 or 2 leaves the register untouched.

use crate::config::StoreConfig;
use parking_lot::{Mutex, RwLock};
use persistence::journal::JournalWriter;
use persistence::snapshot::{cleanup_snapshots, Snapshot, SnapshotIntervalPolicy, SnapshotWriter};
use persistence::{Mutation, RecoveryEngine, RecoveryReport, RegisterState, StateError};
use risk_types::errors::{EntityKind, RiskError};
use risk_types::ids::RiskId;
use risk_types::risk::RiskRecord;
use risk_types::severity::ThresholdTable;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Journal and snapshot machinery of a durable store
struct Durability {
    journal: JournalWriter,
    snapshots: SnapshotWriter,
    snapshot_dir: PathBuf,
    policy: SnapshotIntervalPolicy,
    keep: usize,
}

pub struct RiskStore {
    state: RwLock<RegisterState>,
    thresholds: RwLock<Arc<ThresholdTable>>,
    durability: Option<Mutex<Durability>>,
}

impl RiskStore {
    /// Memory-only store starting from `thresholds`.
    pub fn in_memory(thresholds: ThresholdTable) -> Self {
        Self {
            thresholds: RwLock::new(Arc::new(thresholds.clone())),
            state: RwLock::new(RegisterState::new(thresholds)),
            durability: None,
        }
    }

    /// Open a store per `config`. A durable store is recovered from its
    /// snapshot and journal; a brand-new one is seeded with `seed`.
    pub fn open(config: &StoreConfig, seed: ThresholdTable) -> Result<(Self, RecoveryReport), RiskError> {
        if !config.durable {
            return Ok((Self::in_memory(seed), RecoveryReport::default()));
        }

        let (state, report) = RecoveryEngine::new(&config.snapshots.dir, &config.journal.dir)
            .recover(None)
            .map_err(|e| {
                error!(error = %e, "Register recovery failed");
                RiskError::Storage(e.to_string())
            })?;

        let mut journal = JournalWriter::open(config.journal.clone()).map_err(storage)?;
        journal.set_next_sequence(report.final_sequence + 1);

        let store = Self {
            thresholds: RwLock::new(Arc::new(state.thresholds.clone())),
            state: RwLock::new(state),
            durability: Some(Mutex::new(Durability {
                journal,
                snapshots: SnapshotWriter::from_config(&config.snapshots),
                snapshot_dir: config.snapshots.dir.clone(),
                policy: SnapshotIntervalPolicy::new(
                    config.snapshots.interval,
                    report.snapshot_sequence,
                ),
                keep: config.snapshots.keep,
            })),
        };

        if report.final_sequence == 0 && *store.thresholds() != seed {
            info!(rows = seed.len(), "Seeding thresholds into empty register");
            store.commit(Mutation::SeedThresholds(seed), 0)?;
        }

        Ok((store, report))
    }

    pub fn is_durable(&self) -> bool {
        self.durability.is_some()
    }

    /// Commit one mutation. Nothing is applied unless every step before
    /// the in-memory apply succeeded.
    pub fn commit(&self, mutation: Mutation, timestamp: i64) -> Result<(), RiskError> {
        self.commit_with(timestamp, |_| Ok((mutation, ())))
    }

    /// Build the mutation from the locked state, then commit it.
    ///
    /// `prepare` runs under the write lock, so anything it checks (link
    /// diffs, threshold overlap) still holds when the mutation applies.
    pub fn commit_with<T>(
        &self,
        timestamp: i64,
        prepare: impl FnOnce(&RegisterState) -> Result<(Mutation, T), RiskError>,
    ) -> Result<T, RiskError> {
        let mut durability = self.durability.as_ref().map(|d| d.lock());
        let mut state = self.state.write();
        let (mutation, output) = prepare(&state)?;
        state.check(&mutation).map_err(state_error)?;

        let sequence = match durability.as_deref_mut() {
            Some(d) => {
                let entry = d.journal.append_mutation(timestamp, &mutation).map_err(|e| {
                    warn!(kind = mutation.kind(), error = %e, "Journal append failed");
                    storage(e)
                })?;
                Some(entry.sequence)
            }
            None => None,
        };

        state.apply(&mutation).map_err(state_error)?;
        if matches!(
            mutation,
            Mutation::SeedThresholds(_) | Mutation::SetThreshold(_)
        ) {
            *self.thresholds.write() = Arc::new(state.thresholds.clone());
        }
        debug!(kind = mutation.kind(), ?sequence, "Mutation committed");

        if let (Some(d), Some(sequence)) = (durability.as_deref_mut(), sequence) {
            if d.policy.should_snapshot(sequence) {
                // Journal already holds the mutation.
                if let Err(e) = write_snapshot(d, &state, sequence, timestamp) {
                    warn!(sequence, error = %e, "Snapshot failed");
                }
            }
        }
        Ok(output)
    }

    /// Current threshold table. Cheap to clone; never changes under the
    /// caller.
    pub fn thresholds(&self) -> Arc<ThresholdTable> {
        Arc::clone(&self.thresholds.read())
    }

    pub fn record(&self, risk_id: RiskId) -> Option<RiskRecord> {
        self.state.read().record(risk_id)
    }

    /// Risk with its links, or `NotFound`.
    pub fn require(&self, risk_id: RiskId) -> Result<RiskRecord, RiskError> {
        self.record(risk_id)
            .ok_or_else(|| RiskError::not_found(EntityKind::Risk, risk_id))
    }

    pub fn records(&self) -> Vec<RiskRecord> {
        self.state.read().records()
    }

    pub fn len(&self) -> usize {
        self.state.read().risks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn orphaned_link_count(&self) -> usize {
        self.state.read().orphaned_link_count()
    }

    pub fn state_hash(&self) -> Result<String, RiskError> {
        self.state.read().state_hash().map_err(state_error)
    }

    /// Snapshot at the last committed sequence, regardless of the interval.
    /// Returns `None` for a memory-only store or an empty journal.
    pub fn snapshot_now(&self, timestamp: i64) -> Result<Option<PathBuf>, RiskError> {
        let Some(durability) = &self.durability else {
            return Ok(None);
        };
        let mut d = durability.lock();
        let sequence = d.journal.next_sequence().saturating_sub(1);
        if sequence == 0 {
            return Ok(None);
        }
        let state = self.state.read();
        write_snapshot(&mut d, &state, sequence, timestamp).map(Some)
    }

    /// Flush and fsync the journal.
    pub fn sync(&self) -> Result<(), RiskError> {
        match &self.durability {
            Some(d) => d.lock().journal.sync().map_err(storage),
            None => Ok(()),
        }
    }
}

fn write_snapshot(
    d: &mut Durability,
    state: &RegisterState,
    sequence: u64,
    timestamp: i64,
) -> Result<PathBuf, RiskError> {
    d.journal.sync().map_err(storage)?;
    let snapshot = Snapshot::new(sequence, timestamp, state.clone()).map_err(storage)?;
    let path = d.snapshots.write(&snapshot).map_err(storage)?;
    d.policy.record_snapshot(sequence);
    cleanup_snapshots(&d.snapshot_dir, d.keep).map_err(storage)?;
    Ok(path)
}

fn storage(e: impl std::fmt::Display) -> RiskError {
    RiskError::Storage(e.to_string())
}

fn state_error(e: StateError) -> RiskError {
    match e {
        StateError::RiskNotFound(risk_id) => RiskError::not_found(EntityKind::Risk, risk_id),
        other => RiskError::Storage(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::LinkDiff;
    use risk_types::ids::ControlId;
    use risk_types::risk::{Chance, Impact, ImpactArea, Risk, Treatment};
    use risk_types::severity::{Severity, SeverityThreshold};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    const TS: i64 = 1_708_123_456_789_000_000;

    fn risk(title: &str) -> Risk {
        Risk {
            risk_id: RiskId::new(),
            title: title.to_string(),
            description: "desc".to_string(),
            discovered_on: chrono::NaiveDate::from_ymd_opt(2024, 2, 16).unwrap(),
            impact: Impact::Moderate,
            chance: Chance::Likely,
            treatment: Treatment::Mitigate,
            treatment_plan: None,
            treatment_due_date: None,
            treatment_owner: None,
            ticket_url: None,
            closed_at: None,
            created_at: TS,
            updated_at: TS,
        }
    }

    fn insert(risk: &Risk) -> Mutation {
        Mutation::InsertRisk {
            risk: risk.clone(),
            controls: LinkDiff::all_added(&BTreeSet::from([ControlId::new()])),
            components: LinkDiff::all_added(&BTreeSet::new()),
            impact_areas: LinkDiff::all_added(&BTreeSet::from([ImpactArea::Financial])),
        }
    }

    #[test]
    fn test_in_memory_commit() {
        let store = RiskStore::in_memory(ThresholdTable::with_defaults());
        let r = risk("Flood");
        store.commit(insert(&r), TS).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.require(r.risk_id).unwrap().controls.len(), 1);
        assert!(!store.is_durable());
        assert_eq!(store.snapshot_now(TS).unwrap(), None);
    }

    #[test]
    fn test_failed_check_maps_to_not_found() {
        let store = RiskStore::in_memory(ThresholdTable::with_defaults());
        let err = store.commit(Mutation::DeleteRisk(RiskId::new()), TS).unwrap_err();
        assert!(matches!(err, RiskError::NotFound { entity: EntityKind::Risk, .. }));
    }

    #[test]
    fn test_commit_with_rejection_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::durable_at(dir.path());
        let (store, _) = RiskStore::open(&config, ThresholdTable::with_defaults()).unwrap();
        let hash = store.state_hash().unwrap();

        let result: Result<(), RiskError> = store.commit_with(TS, |state| {
            assert!(state.risks.is_empty());
            Err(RiskError::Storage("rejected".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.state_hash().unwrap(), hash);

        let r = risk("Phishing");
        let title = store
            .commit_with(TS, |_| Ok((insert(&r), r.title.clone())))
            .unwrap();
        assert_eq!(title, "Phishing");
        store.sync().unwrap();
        drop(store);
        let (_, report) = RiskStore::open(&config, ThresholdTable::with_defaults()).unwrap();
        assert_eq!(report.final_sequence, 1);
    }

    #[test]
    fn test_threshold_publish_replaces_arc() {
        let store = RiskStore::in_memory(ThresholdTable::with_defaults());
        let before = store.thresholds();
        store
            .commit(
                Mutation::SetThreshold(SeverityThreshold::new(Severity::Low, 1, 3)),
                TS,
            )
            .unwrap();
        let after = store.thresholds();
        assert_eq!(before.version() + 1, after.version());
        assert_eq!(before.get(Severity::Low).unwrap().max_score, 5);
        assert_eq!(after.get(Severity::Low).unwrap().max_score, 3);
    }

    #[test]
    fn test_durable_reopen_restores_state() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::durable_at(dir.path());
        let r = risk("Ransomware");
        let hash = {
            let (store, report) = RiskStore::open(&config, ThresholdTable::with_defaults()).unwrap();
            assert_eq!(report.final_sequence, 0);
            store.commit(insert(&r), TS).unwrap();
            store
                .commit(
                    Mutation::SetThreshold(SeverityThreshold::new(Severity::Critical, 18, 30)),
                    TS + 1,
                )
                .unwrap();
            store.sync().unwrap();
            store.state_hash().unwrap()
        };

        let (store, report) = RiskStore::open(&config, ThresholdTable::with_defaults()).unwrap();
        assert_eq!(report.final_sequence, 2);
        assert_eq!(store.state_hash().unwrap(), hash);
        assert!(store.record(r.risk_id).is_some());
        assert_eq!(
            store.thresholds().get(Severity::Critical),
            Some(&SeverityThreshold::new(Severity::Critical, 18, 30))
        );

        store.commit(Mutation::DeleteRisk(r.risk_id), TS + 2).unwrap();
        store.sync().unwrap();
        drop(store);
        let (store, report) = RiskStore::open(&config, ThresholdTable::with_defaults()).unwrap();
        assert_eq!(report.final_sequence, 3);
        assert!(store.is_empty());
    }

    #[test]
    fn test_custom_seed_is_journaled_once() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::durable_at(dir.path());
        let seed = ThresholdTable::from_rows([SeverityThreshold::new(Severity::Low, 1, 25)]);

        let (store, _) = RiskStore::open(&config, seed.clone()).unwrap();
        assert_eq!(*store.thresholds(), seed);
        store.sync().unwrap();
        drop(store);

        let (store, report) = RiskStore::open(&config, seed.clone()).unwrap();
        assert_eq!(report.final_sequence, 1);
        assert_eq!(*store.thresholds(), seed);
    }

    #[test]
    fn test_interval_snapshot_and_cleanup() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::durable_at(dir.path());
        config.snapshots.interval = 2;
        config.snapshots.keep = 1;

        let (store, _) = RiskStore::open(&config, ThresholdTable::with_defaults()).unwrap();
        for i in 0..5 {
            store.commit(insert(&risk(&format!("risk {}", i))), TS + i).unwrap();
        }
        store.sync().unwrap();
        let snapshots: Vec<_> = std::fs::read_dir(&config.snapshots.dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert_eq!(snapshots.len(), 1);
        drop(store);

        let (store, report) = RiskStore::open(&config, ThresholdTable::with_defaults()).unwrap();
        assert_eq!(report.snapshot_sequence, 4);
        assert_eq!(report.replayed, 1);
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_snapshot_now() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::durable_at(dir.path());
        let (store, _) = RiskStore::open(&config, ThresholdTable::with_defaults()).unwrap();
        assert_eq!(store.snapshot_now(TS).unwrap(), None);
        store.commit(insert(&risk("Fire")), TS).unwrap();
        let path = store.snapshot_now(TS).unwrap().unwrap();
        assert!(path.exists());
    }
}
