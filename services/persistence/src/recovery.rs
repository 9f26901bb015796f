//! Recovery: rebuild the register from snapshot plus journal replay
//!
//! 1. Load the newest snapshot, or start from an empty register.
//! 2. Seek the journal past the snapshot's sequence.
//! 3. Replay each mutation through `RegisterState::apply`.
//! 4. Optionally compare the final state hash with an expected value.
//!
//! A torn journal tail is cut back to the last valid frame so the writer
//! can keep appending after it.

use crate::journal::JournalError;
use crate::reader::{CorruptionRecord, JournalReader, ReaderError};
use crate::snapshot::{SnapshotError, SnapshotLoader};
use crate::state::{RegisterState, StateError};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Reader error: {0}")]
    Reader(#[from] ReaderError),

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Replay of sequence {sequence} failed: {source}")]
    Replay { sequence: u64, source: StateError },

    #[error("Journal does not continue snapshot: expected sequence {expected}, found {found}")]
    MissingEntries { expected: u64, found: u64 },

    #[error("State hash divergence: expected {expected}, got {actual} at sequence {sequence}")]
    HashDivergence {
        expected: String,
        actual: String,
        sequence: u64,
    },

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What recovery did.
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    /// Sequence of the snapshot used (0 when starting empty)
    pub snapshot_sequence: u64,
    pub replayed: u64,
    /// Last sequence folded into the recovered state
    pub final_sequence: u64,
    pub final_state_hash: String,
    /// First damaged frame, if the journal tail had to be cut
    pub corruption: Option<CorruptionRecord>,
    pub elapsed_ms: u64,
}

// ── Recovery Engine ─────────────────────────────────────────────────

pub struct RecoveryEngine {
    snapshot_dir: PathBuf,
    journal_dir: PathBuf,
    repair_tail: bool,
}

impl RecoveryEngine {
    pub fn new(snapshot_dir: impl Into<PathBuf>, journal_dir: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_dir: snapshot_dir.into(),
            journal_dir: journal_dir.into(),
            repair_tail: true,
        }
    }

    /// Leave a damaged journal tail on disk instead of truncating it.
    pub fn without_tail_repair(mut self) -> Self {
        self.repair_tail = false;
        self
    }

    pub fn recover(
        &self,
        expected_hash: Option<&str>,
    ) -> Result<(RegisterState, RecoveryReport), RecoveryError> {
        let started = Instant::now();
        let mut report = RecoveryReport::default();

        let mut state = match SnapshotLoader::new(&self.snapshot_dir).load_latest()? {
            Some(snapshot) => {
                report.snapshot_sequence = snapshot.sequence;
                info!(sequence = snapshot.sequence, "Recovering from snapshot");
                snapshot.state
            }
            None => RegisterState::default(),
        };

        let mut reader = JournalReader::open(&self.journal_dir)?;
        if report.snapshot_sequence > 0 {
            reader.seek_to_sequence(report.snapshot_sequence + 1)?;
        }

        let mut last_sequence = report.snapshot_sequence;
        let (entries, corruption) = reader.recover_entries();
        for entry in entries {
            if entry.sequence != last_sequence + 1 {
                return Err(RecoveryError::MissingEntries {
                    expected: last_sequence + 1,
                    found: entry.sequence,
                });
            }
            let mutation = entry.mutation()?;
            state
                .apply(&mutation)
                .map_err(|source| RecoveryError::Replay {
                    sequence: entry.sequence,
                    source,
                })?;
            last_sequence = entry.sequence;
            report.replayed += 1;
        }

        if let Some(record) = &corruption {
            if self.repair_tail {
                self.truncate_tail(record)?;
            }
        }

        let hash = state.state_hash()?;
        if let Some(expected) = expected_hash {
            if hash != expected {
                return Err(RecoveryError::HashDivergence {
                    expected: expected.to_string(),
                    actual: hash,
                    sequence: last_sequence,
                });
            }
        }

        report.final_sequence = last_sequence;
        report.final_state_hash = hash;
        report.corruption = corruption;
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            snapshot_sequence = report.snapshot_sequence,
            replayed = report.replayed,
            final_sequence = report.final_sequence,
            risks = state.risks.len(),
            elapsed_ms = report.elapsed_ms,
            "Recovery complete"
        );
        Ok((state, report))
    }

    /// Cut the damaged file at the bad frame and drop any later files.
    fn truncate_tail(&self, record: &CorruptionRecord) -> Result<(), RecoveryError> {
        warn!(
            file = %record.file.display(),
            offset = record.byte_offset,
            "Truncating damaged journal tail"
        );
        let file = OpenOptions::new().write(true).open(&record.file)?;
        file.set_len(record.byte_offset as u64)?;
        file.sync_all()?;

        for path in crate::journal::journal_files(&self.journal_dir)? {
            if path > record.file {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
