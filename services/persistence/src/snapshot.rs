//! Snapshots: point-in-time copies of the register with integrity hash
//!
//! A snapshot stores the full `RegisterState` together with the journal
//! sequence it reflects. Files are `snapshot-{sequence:012}.snap`, or
//! `.snap.zst` when zstd compression is on, and are written to a temp
//! file then renamed so a crash never leaves a half-written snapshot.

use crate::state::{RegisterState, StateError};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Current on-disk format.
pub const SNAPSHOT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Integrity check failed: expected {expected}, got {actual}")]
    IntegrityFailure { expected: String, actual: String },

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error(transparent)]
    State(#[from] StateError),
}

// ── Snapshot ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    /// Last journal sequence folded into `state`
    pub sequence: u64,
    /// Unix nanoseconds, caller supplied
    pub timestamp: i64,
    pub state: RegisterState,
    /// Hex SHA-256 of the bincode-encoded state
    pub checksum: String,
}

impl Snapshot {
    pub fn new(sequence: u64, timestamp: i64, state: RegisterState) -> Result<Self, SnapshotError> {
        let checksum = state.state_hash()?;
        Ok(Self {
            version: SNAPSHOT_VERSION,
            sequence,
            timestamp,
            state,
            checksum,
        })
    }

    pub fn verify_integrity(&self) -> Result<(), SnapshotError> {
        let actual = self.state.state_hash()?;
        if actual != self.checksum {
            return Err(SnapshotError::IntegrityFailure {
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }
}

// ── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub dir: PathBuf,
    pub compress: bool,
    /// Take a snapshot every this many journal entries (0 = never automatically)
    pub interval: u64,
    /// Snapshots kept on disk after cleanup
    pub keep: usize,
}

impl SnapshotConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/snapshots"),
            compress: true,
            interval: 1_000,
            keep: 3,
        }
    }
}

// ── Writer ──────────────────────────────────────────────────────────

pub struct SnapshotWriter {
    dir: PathBuf,
    compress: bool,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>, compress: bool) -> Self {
        Self {
            dir: dir.into(),
            compress,
        }
    }

    pub fn from_config(config: &SnapshotConfig) -> Self {
        Self::new(config.dir.clone(), config.compress)
    }

    /// Serialize, optionally compress, and atomically write a snapshot.
    pub fn write(&self, snapshot: &Snapshot) -> Result<PathBuf, SnapshotError> {
        fs::create_dir_all(&self.dir)?;
        let encoded = bincode::serialize(snapshot)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;
        let (bytes, ext) = if self.compress {
            let compressed = zstd::encode_all(encoded.as_slice(), ZSTD_LEVEL)
                .map_err(|e| SnapshotError::Compression(e.to_string()))?;
            (compressed, "snap.zst")
        } else {
            (encoded, "snap")
        };

        let name = format!("snapshot-{:012}.{}", snapshot.sequence, ext);
        let path = self.dir.join(&name);
        let tmp = self.dir.join(format!("{}.tmp", name));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        info!(
            sequence = snapshot.sequence,
            risks = snapshot.state.risks.len(),
            bytes = bytes.len(),
            "Snapshot written"
        );
        Ok(path)
    }
}

// ── Loader ──────────────────────────────────────────────────────────

pub struct SnapshotLoader {
    dir: PathBuf,
}

impl SnapshotLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load one snapshot file and verify its version and hash.
    pub fn load(&self, path: &Path) -> Result<Snapshot, SnapshotError> {
        let raw = fs::read(path)?;
        let compressed = path.extension().is_some_and(|ext| ext == "zst");
        let bytes = if compressed {
            zstd::decode_all(raw.as_slice())
                .map_err(|e| SnapshotError::Compression(e.to_string()))?
        } else {
            raw
        };
        let snapshot: Snapshot = bincode::deserialize(&bytes)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }
        snapshot.verify_integrity()?;
        debug!(path = %path.display(), sequence = snapshot.sequence, "Snapshot loaded");
        Ok(snapshot)
    }

    /// Newest snapshot, if any exist.
    pub fn load_latest(&self) -> Result<Option<Snapshot>, SnapshotError> {
        match self.list()?.pop() {
            Some((_, path)) => self.load(&path).map(Some),
            None => Ok(None),
        }
    }

    /// `(sequence, path)` pairs, oldest first.
    pub fn list(&self) -> Result<Vec<(u64, PathBuf)>, SnapshotError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(seq) = parse_snapshot_sequence(&entry.file_name().to_string_lossy()) {
                found.push((seq, entry.path()));
            }
        }
        found.sort_by_key(|(seq, _)| *seq);
        Ok(found)
    }
}

fn parse_snapshot_sequence(name: &str) -> Option<u64> {
    let rest = name.strip_prefix("snapshot-")?;
    let digits = rest
        .strip_suffix(".snap.zst")
        .or_else(|| rest.strip_suffix(".snap"))?;
    digits.parse().ok()
}

// ── Policies ────────────────────────────────────────────────────────

/// Decides when the next snapshot is due.
#[derive(Debug, Clone)]
pub struct SnapshotIntervalPolicy {
    pub interval: u64,
    pub last_snapshot_seq: u64,
}

impl SnapshotIntervalPolicy {
    pub fn new(interval: u64, last_snapshot_seq: u64) -> Self {
        Self {
            interval,
            last_snapshot_seq,
        }
    }

    pub fn should_snapshot(&self, sequence: u64) -> bool {
        self.interval > 0 && sequence >= self.last_snapshot_seq + self.interval
    }

    pub fn record_snapshot(&mut self, sequence: u64) {
        self.last_snapshot_seq = sequence;
    }
}

/// Delete all but the newest `keep` snapshots. Returns removed paths.
pub fn cleanup_snapshots(dir: &Path, keep: usize) -> Result<Vec<PathBuf>, SnapshotError> {
    let snapshots = SnapshotLoader::new(dir).list()?;
    let excess = snapshots.len().saturating_sub(keep.max(1));
    let mut removed = Vec::with_capacity(excess);
    for (_, path) in snapshots.into_iter().take(excess) {
        fs::remove_file(&path)?;
        removed.push(path);
    }
    if !removed.is_empty() {
        debug!(removed = removed.len(), "Old snapshots removed");
    }
    Ok(removed)
}

// ── Tests ───────────────────────────────────────────────────────────
