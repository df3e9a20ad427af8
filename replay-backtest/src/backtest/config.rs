//! Replay configuration, loadable from TOML.
//!
//! ```toml
//! output_dir = "results"
//! warning_marker = "warning"
//! record_unscoreable = true
//!
//! [screener]
//! spread_widths = [5, 10]
//! min_credit_pct = 10.0
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::SpreadScreenerConfig;
use crate::signals::WARNING_MARKER;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Configuration for a replay run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Directory the report file is written into.
    pub output_dir: PathBuf,

    /// Alerts whose id contains this are notices, not trades. Empty disables.
    pub warning_marker: String,

    /// Keep alerts without a SELL leg in the report as OPEN.
    pub record_unscoreable: bool,

    /// Draw a progress bar over the snapshot loop.
    pub show_progress: bool,

    /// Reference signal engine settings.
    pub screener: SpreadScreenerConfig,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("results"),
            warning_marker: WARNING_MARKER.to_string(),
            record_unscoreable: true,
            show_progress: true,
            screener: SpreadScreenerConfig::default(),
        }
    }
}

impl ReplayConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}
