//! Engine and store configuration
//!
//! Every field has a default, so a TOML file only needs the keys it
//! overrides:
//!
//! ```toml
//! require_components = false
//!
//! [[default_thresholds]]
//! severity = "low"
//! min_score = 1
//! max_score = 4
//!
//! [store]
//! durable = true
//! journal = { dir = "/var/lib/risk/journal" }
//! snapshots = { dir = "/var/lib/risk/snapshots", interval = 500 }
//! ```

use crate::thresholds;
use persistence::{JournalConfig, SnapshotConfig};
use risk_types::severity::{SeverityThreshold, ThresholdTable};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Validation limits and seeded thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskEngineConfig {
    /// Longest allowed title, in characters
    pub max_title_len: usize,
    /// Longest allowed ticket URL, in characters
    pub max_ticket_url_len: usize,
    /// Reject risks that link no component
    pub require_components: bool,
    /// Reject risks without an impact area
    pub require_impact_areas: bool,
    /// Upper end of the score space checked for gaps
    pub max_score: u32,
    /// Thresholds seeded into an empty register
    pub default_thresholds: Vec<SeverityThreshold>,
    pub store: StoreConfig,
}

impl Default for RiskEngineConfig {
    fn default() -> Self {
        Self {
            max_title_len: 255,
            max_ticket_url_len: 500,
            require_components: true,
            require_impact_areas: true,
            max_score: 25,
            default_thresholds: SeverityThreshold::defaults(),
            store: StoreConfig::default(),
        }
    }
}

impl RiskEngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_title_len == 0 {
            return Err(ConfigError::Invalid("max_title_len must be positive".into()));
        }
        if self.max_ticket_url_len == 0 {
            return Err(ConfigError::Invalid(
                "max_ticket_url_len must be positive".into(),
            ));
        }
        if self.max_score == 0 {
            return Err(ConfigError::Invalid("max_score must be positive".into()));
        }
        let mut severities: Vec<_> = self.default_thresholds.iter().map(|t| t.severity).collect();
        severities.sort();
        severities.dedup();
        if severities.len() != self.default_thresholds.len() {
            return Err(ConfigError::Invalid(
                "default_thresholds lists a severity more than once".into(),
            ));
        }
        thresholds::validate_table(&self.default_thresholds)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// The table an empty register starts from.
    pub fn seed_table(&self) -> ThresholdTable {
        ThresholdTable::from_rows(self.default_thresholds.iter().copied())
    }
}

/// Where and whether the register is persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Journal every mutation and take snapshots; otherwise memory only
    pub durable: bool,
    pub journal: JournalConfig,
    pub snapshots: SnapshotConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            durable: false,
            journal: JournalConfig::default(),
            snapshots: SnapshotConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Durable store rooted at `dir` (`dir/journal`, `dir/snapshots`).
    pub fn durable_at(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            durable: true,
            journal: JournalConfig::new(dir.join("journal")),
            snapshots: SnapshotConfig::new(dir.join("snapshots")),
        }
    }
}
