//! Durable storage for the risk register
//!
//! The register lives in memory as a `RegisterState`. Each change is a
//! `Mutation` that is appended to a checksummed journal before it is
//! applied; snapshots bound replay time; recovery rebuilds the state from
//! the newest snapshot plus the journal tail.
//!
//! # Modules
//! - `state`: register tables, mutations, link diffs, state hash
//! - `journal`: append-only CRC32C-framed writer
//! - `reader`: sequential reader with corruption detection
//! - `snapshot`: bincode + SHA-256 snapshots, optional zstd
//! - `recovery`: snapshot load and journal replay

pub mod journal;
pub mod reader;
pub mod recovery;
pub mod snapshot;
pub mod state;

pub use journal::{JournalConfig, JournalError, JournalWriter};
pub use recovery::{RecoveryEngine, RecoveryError, RecoveryReport};
pub use snapshot::{SnapshotConfig, SnapshotError};
pub use state::{LinkDiff, Mutation, RegisterState, StateError};
