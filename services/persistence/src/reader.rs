//! Journal Reader: sequential replay source with corruption detection
//!
//! Walks every `journal-NNNNNN.bin` file in index order, verifies each
//! frame's CRC32C and the gapless sequence, and records where the first
//! damaged frame sits. A torn tail after a crash is expected; recovery
//! keeps the valid prefix and reports the rest.

use crate::journal::{journal_files, JournalEntry, JournalError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Checksum mismatch in {file} at byte {offset}: sequence {sequence}")]
    ChecksumMismatch {
        file: String,
        offset: usize,
        sequence: u64,
    },

    #[error("Corrupt frame in {file} at byte {offset}: {detail}")]
    Corruption {
        file: String,
        offset: usize,
        detail: String,
    },

    #[error("Sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },
}

/// Where and why reading stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptionRecord {
    pub file: PathBuf,
    pub byte_offset: usize,
    pub kind: CorruptionKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionKind {
    ChecksumMismatch,
    TruncatedFrame,
    SequenceGap,
}

// ── Journal Reader ──────────────────────────────────────────────────

pub struct JournalReader {
    files: Vec<PathBuf>,
    file_idx: usize,
    data: Vec<u8>,
    pos: usize,
    last_sequence: Option<u64>,
}

impl JournalReader {
    /// Open a reader over every journal file in `dir`. A missing directory
    /// reads as an empty journal.
    pub fn open(dir: &Path) -> Result<Self, ReaderError> {
        let files = journal_files(dir)?;
        let data = match files.first() {
            Some(path) => fs::read(path)?,
            None => Vec::new(),
        };
        Ok(Self {
            files,
            file_idx: 0,
            data,
            pos: 0,
            last_sequence: None,
        })
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Next verified entry, or `None` at end of journal.
    ///
    /// Errors on a checksum mismatch, a truncated frame, or a sequence
    /// that does not follow the previous one.
    pub fn next_entry(&mut self) -> Result<Option<JournalEntry>, ReaderError> {
        while self.pos >= self.data.len() {
            if !self.advance_file()? {
                return Ok(None);
            }
        }

        let offset = self.pos;
        let (entry, consumed) = JournalEntry::from_bytes(&self.data[offset..]).map_err(|e| {
            ReaderError::Corruption {
                file: self.current_file_name(),
                offset,
                detail: e.to_string(),
            }
        })?;
        if !entry.verify_checksum() {
            return Err(ReaderError::ChecksumMismatch {
                file: self.current_file_name(),
                offset,
                sequence: entry.sequence,
            });
        }
        if let Some(prev) = self.last_sequence {
            if entry.sequence != prev + 1 {
                return Err(ReaderError::SequenceGap {
                    expected: prev + 1,
                    got: entry.sequence,
                });
            }
        }

        self.pos += consumed;
        self.last_sequence = Some(entry.sequence);
        Ok(Some(entry))
    }

    /// Read to the end, failing on the first problem.
    pub fn read_all_validated(&mut self) -> Result<Vec<JournalEntry>, ReaderError> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next_entry()? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Skip entries with `sequence < target`. Returns how many were skipped.
    pub fn seek_to_sequence(&mut self, target: u64) -> Result<u64, ReaderError> {
        let mut skipped = 0;
        loop {
            while self.pos >= self.data.len() {
                if !self.advance_file()? {
                    return Ok(skipped);
                }
            }
            let Ok((entry, consumed)) = JournalEntry::from_bytes(&self.data[self.pos..]) else {
                // Leave the damaged frame for next_entry to report.
                return Ok(skipped);
            };
            if entry.sequence >= target {
                return Ok(skipped);
            }
            self.pos += consumed;
            self.last_sequence = Some(entry.sequence);
            skipped += 1;
        }
    }

    /// Read the longest valid prefix. The second value describes the
    /// first damaged frame, if any; nothing after it is returned.
    pub fn recover_entries(&mut self) -> (Vec<JournalEntry>, Option<CorruptionRecord>) {
        let mut entries = Vec::new();
        loop {
            match self.next_entry() {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => return (entries, None),
                Err(err) => {
                    let record = self.corruption_record(&err);
                    warn!(
                        file = %record.file.display(),
                        offset = record.byte_offset,
                        detail = %record.detail,
                        recovered = entries.len(),
                        "Journal corruption, keeping valid prefix"
                    );
                    return (entries, Some(record));
                }
            }
        }
    }

    fn corruption_record(&self, err: &ReaderError) -> CorruptionRecord {
        let kind = match err {
            ReaderError::ChecksumMismatch { .. } => CorruptionKind::ChecksumMismatch,
            ReaderError::SequenceGap { .. } => CorruptionKind::SequenceGap,
            _ => CorruptionKind::TruncatedFrame,
        };
        CorruptionRecord {
            file: self.files.get(self.file_idx).cloned().unwrap_or_default(),
            byte_offset: self.pos,
            kind,
            detail: err.to_string(),
        }
    }

    fn current_file_name(&self) -> String {
        self.files
            .get(self.file_idx)
            .map(|path| path.display().to_string())
            .unwrap_or_default()
    }

    fn advance_file(&mut self) -> Result<bool, ReaderError> {
        if self.file_idx + 1 >= self.files.len() {
            return Ok(false);
        }
        self.file_idx += 1;
        self.data = fs::read(&self.files[self.file_idx])?;
        self.pos = 0;
        Ok(true)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
