//! Mutation Journal: append-only write-ahead log of register changes
//!
//! Every committed `Mutation` is framed, checksummed and appended before
//! the in-memory tables change, so a crash can be recovered by replaying
//! the journal on top of the latest snapshot.
//!
//! # Frame layout (little endian)
//! ```text
//! [body_len: u32]
//! [sequence: u64]
//! [timestamp: i64]
//! [kind_len: u16][kind: utf-8]
//! [payload_len: u32][payload: bincode(Mutation)]
//! [crc32c: u32]   over sequence, timestamp, kind, payload
//! ```

use crate::state::{Mutation, StateError};
use crc32c::crc32c;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Frames larger than this are treated as corruption.
pub const MAX_FRAME_BODY: usize = 64 * 1024 * 1024;

/// Smallest possible body: seq + ts + kind_len + payload_len + crc.
const MIN_FRAME_BODY: usize = 8 + 8 + 2 + 4 + 4;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Sequence error: expected {expected}, got {got}")]
    SequenceError { expected: u64, got: u64 },

    #[error("Journal size limit exceeded: {current} >= {limit}")]
    SizeLimitExceeded { current: u64, limit: u64 },

    #[error(transparent)]
    State(#[from] StateError),
}

// ── Journal Entry ───────────────────────────────────────────────────

/// One framed journal record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Gapless sequence, starting at 1
    pub sequence: u64,
    /// Caller-supplied unix nanoseconds of the change
    pub timestamp: i64,
    /// Mutation kind, e.g. `"InsertRisk"`
    pub kind: String,
    /// bincode-encoded `Mutation`
    pub payload: Vec<u8>,
    pub checksum: u32,
}

impl JournalEntry {
    pub fn new(sequence: u64, timestamp: i64, kind: impl Into<String>, payload: Vec<u8>) -> Self {
        let kind = kind.into();
        let checksum = Self::checksum_of(sequence, timestamp, &kind, &payload);
        Self {
            sequence,
            timestamp,
            kind,
            payload,
            checksum,
        }
    }

    /// Frame a mutation.
    pub fn for_mutation(
        sequence: u64,
        timestamp: i64,
        mutation: &Mutation,
    ) -> Result<Self, JournalError> {
        Ok(Self::new(sequence, timestamp, mutation.kind(), mutation.encode()?))
    }

    /// Decode the payload back into a mutation.
    pub fn mutation(&self) -> Result<Mutation, JournalError> {
        Ok(Mutation::decode(&self.payload)?)
    }

    fn checksum_of(sequence: u64, timestamp: i64, kind: &str, payload: &[u8]) -> u32 {
        let mut buf = Vec::with_capacity(16 + kind.len() + payload.len());
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(kind.as_bytes());
        buf.extend_from_slice(payload);
        crc32c(&buf)
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum == Self::checksum_of(self.sequence, self.timestamp, &self.kind, &self.payload)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let kind = self.kind.as_bytes();
        let body_len = MIN_FRAME_BODY + kind.len() + self.payload.len();

        let mut buf = Vec::with_capacity(4 + body_len);
        buf.extend_from_slice(&(body_len as u32).to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&(kind.len() as u16).to_le_bytes());
        buf.extend_from_slice(kind);
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Parse one frame from the front of `data`.
    ///
    /// Returns the entry and the number of bytes consumed. The checksum is
    /// NOT verified here; callers decide how to treat a mismatch.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), JournalError> {
        let mut frame = Frame { data, pos: 0 };
        let body_len = u32::from_le_bytes(frame.take()?) as usize;
        if body_len > MAX_FRAME_BODY {
            return Err(JournalError::Malformed(format!(
                "implausible body length {}",
                body_len
            )));
        }
        if body_len < MIN_FRAME_BODY {
            return Err(JournalError::Malformed(format!(
                "body length {} below minimum {}",
                body_len, MIN_FRAME_BODY
            )));
        }
        let total = 4 + body_len;
        if data.len() < total {
            return Err(JournalError::Malformed(format!(
                "incomplete frame: need {} bytes, have {}",
                total,
                data.len()
            )));
        }
        let mut frame = Frame {
            data: &data[..total],
            pos: 4,
        };

        let sequence = u64::from_le_bytes(frame.take()?);
        let timestamp = i64::from_le_bytes(frame.take()?);
        let kind_len = u16::from_le_bytes(frame.take()?) as usize;
        let kind = String::from_utf8(frame.slice(kind_len)?.to_vec())
            .map_err(|e| JournalError::Malformed(e.to_string()))?;
        let payload_len = u32::from_le_bytes(frame.take()?) as usize;
        let payload = frame.slice(payload_len)?.to_vec();
        let checksum = u32::from_le_bytes(frame.take()?);

        Ok((
            Self {
                sequence,
                timestamp,
                kind,
                payload,
                checksum,
            },
            total,
        ))
    }
}

/// Bounds-checked cursor over a frame.
struct Frame<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Frame<'a> {
    fn slice(&mut self, len: usize) -> Result<&'a [u8], JournalError> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len());
        match end {
            Some(end) => {
                let bytes = &self.data[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(JournalError::Malformed(format!(
                "field of {} bytes overruns frame at offset {}",
                len, self.pos
            ))),
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], JournalError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(N)?);
        Ok(out)
    }
}

// ── Policies & Configuration ────────────────────────────────────────

/// When buffered frames are handed to the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    EveryWrite,
    EveryN(usize),
}

/// When the journal file is fsync'd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsyncPolicy {
    EveryWrite,
    EveryN(usize),
    OnRotation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub dir: PathBuf,
    /// Rotate to a new file once the current one reaches this size.
    pub max_file_size: u64,
    /// Refuse appends once the directory holds this much (0 = unlimited).
    pub max_total_size: u64,
    pub flush_policy: FlushPolicy,
    pub fsync_policy: FsyncPolicy,
}

impl JournalConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/journal"),
            max_file_size: 16 * 1024 * 1024,
            max_total_size: 0,
            flush_policy: FlushPolicy::EveryWrite,
            fsync_policy: FsyncPolicy::EveryWrite,
        }
    }
}

// ── Journal Writer ──────────────────────────────────────────────────

/// Append-only writer for `journal-NNNNNN.bin` files.
pub struct JournalWriter {
    config: JournalConfig,
    writer: BufWriter<File>,
    current_file: PathBuf,
    current_file_size: u64,
    file_index: u64,
    total_size: u64,
    next_sequence: u64,
    unflushed: usize,
    unsynced: usize,
}

impl JournalWriter {
    /// Open (or create) the journal directory and append to its newest file.
    ///
    /// The writer starts expecting sequence 1; after recovery call
    /// `set_next_sequence` with the replayed position.
    pub fn open(config: JournalConfig) -> Result<Self, JournalError> {
        fs::create_dir_all(&config.dir)?;
        let file_index = latest_journal_index(&config.dir)?.unwrap_or(0);
        let current_file = journal_path(&config.dir, file_index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&current_file)?;
        let current_file_size = file.metadata()?.len();
        let total_size = directory_size(&config.dir)?;

        info!(
            dir = %config.dir.display(),
            file_index,
            total_size,
            "Journal opened"
        );

        Ok(Self {
            config,
            writer: BufWriter::new(file),
            current_file,
            current_file_size,
            file_index,
            total_size,
            next_sequence: 1,
            unflushed: 0,
            unsynced: 0,
        })
    }

    pub fn set_next_sequence(&mut self, sequence: u64) {
        self.next_sequence = sequence;
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn current_file_path(&self) -> &Path {
        &self.current_file
    }

    /// Append a pre-built entry. Its sequence must be the next one.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<(), JournalError> {
        if entry.sequence != self.next_sequence {
            return Err(JournalError::SequenceError {
                expected: self.next_sequence,
                got: entry.sequence,
            });
        }
        if self.config.max_total_size > 0 && self.total_size >= self.config.max_total_size {
            return Err(JournalError::SizeLimitExceeded {
                current: self.total_size,
                limit: self.config.max_total_size,
            });
        }
        if self.current_file_size >= self.config.max_file_size {
            self.rotate()?;
        }

        let bytes = entry.to_bytes();
        self.writer.write_all(&bytes)?;
        self.current_file_size += bytes.len() as u64;
        self.total_size += bytes.len() as u64;
        self.next_sequence = entry.sequence + 1;
        self.unflushed += 1;
        self.unsynced += 1;

        let flush = match self.config.flush_policy {
            FlushPolicy::EveryWrite => true,
            FlushPolicy::EveryN(n) => self.unflushed >= n,
        };
        if flush {
            self.writer.flush()?;
            self.unflushed = 0;
        }
        let fsync = match self.config.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => self.unsynced >= n,
            FsyncPolicy::OnRotation => false,
        };
        if fsync {
            self.writer.flush()?;
            self.writer.get_ref().sync_data()?;
            self.unsynced = 0;
        }

        debug!(sequence = entry.sequence, kind = %entry.kind, "Journal entry appended");
        Ok(())
    }

    /// Frame and append a mutation at the next sequence.
    pub fn append_mutation(
        &mut self,
        timestamp: i64,
        mutation: &Mutation,
    ) -> Result<JournalEntry, JournalError> {
        let entry = JournalEntry::for_mutation(self.next_sequence, timestamp, mutation)?;
        self.append(&entry)?;
        Ok(entry)
    }

    /// Flush and fsync everything written so far.
    pub fn sync(&mut self) -> Result<(), JournalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.unflushed = 0;
        self.unsynced = 0;
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), JournalError> {
        self.sync()?;
        self.file_index += 1;
        self.current_file = journal_path(&self.config.dir, self.file_index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_file)?;
        self.writer = BufWriter::new(file);
        self.current_file_size = 0;
        info!(file_index = self.file_index, "Journal rotated");
        Ok(())
    }
}

// ── File helpers ────────────────────────────────────────────────────

pub(crate) fn journal_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("journal-{:06}.bin", index))
}

pub(crate) fn parse_journal_index(name: &str) -> Option<u64> {
    name.strip_prefix("journal-")?
        .strip_suffix(".bin")?
        .parse()
        .ok()
}

/// Journal files in the directory, oldest first.
pub(crate) fn journal_files(dir: &Path) -> Result<Vec<PathBuf>, JournalError> {
    let mut files: Vec<(u64, PathBuf)> = Vec::new();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(index) = parse_journal_index(&name.to_string_lossy()) {
            files.push((index, entry.path()));
        }
    }
    files.sort_by_key(|(index, _)| *index);
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

fn latest_journal_index(dir: &Path) -> Result<Option<u64>, JournalError> {
    let files = journal_files(dir)?;
    Ok(files.last().and_then(|path| {
        path.file_name()
            .and_then(|name| parse_journal_index(&name.to_string_lossy()))
    }))
}

fn directory_size(dir: &Path) -> Result<u64, JournalError> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

// ── Tests ───────────────────────────────────────────────────────────
