//! Run configuration.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Command-line flags are applied on top by the CLI.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::checksums::ChecksumAlgorithm;
use crate::error::ConfigError;
use crate::mount::MountRoot;

pub const DEFAULT_LEDGER: &str = "data_transfer_ledger.csv";
pub const DEFAULT_LOG_FILE: &str = "data_safe_guard.log";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SafeGuardConfig {
    /// Ledger of (Source, Destination) pairs
    pub ledger: PathBuf,

    /// Verify written files with this algorithm
    pub verify: Option<ChecksumAlgorithm>,

    pub logging: LoggingConfig,

    pub mount: MountConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: PathBuf,

    /// Level filter directive, e.g. "info" or "safeguard_engine=debug"
    pub level: String,

    /// Size at which the log file is rolled over
    pub max_bytes: u64,

    /// Number of rolled-over segments kept next to the live file
    pub max_files: usize,

    /// Also log to stderr
    pub console: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// External-volume namespaces; empty means every destination is local
    pub roots: Vec<MountRoot>,
}

impl Default for SafeGuardConfig {
    fn default() -> Self {
        SafeGuardConfig {
            ledger: PathBuf::from(DEFAULT_LEDGER),
            verify: None,
            logging: LoggingConfig::default(),
            mount: MountConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            file: PathBuf::from(DEFAULT_LOG_FILE),
            level: "info".to_string(),
            max_bytes: 1_000_000,
            max_files: 10,
            console: true,
        }
    }
}

impl Default for MountConfig {
    fn default() -> Self {
        MountConfig {
            roots: MountRoot::platform_defaults(),
        }
    }
}

impl SafeGuardConfig {
    /// Load a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
