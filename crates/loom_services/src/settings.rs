//! Settings management
//!
//! Runtime settings are stored as JSON. Every field has a default, so a file
//! only needs to list what it overrides.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access settings file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("settings file {path} is not valid")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode settings")]
    Encode(#[source] serde_json::Error),

    #[error("invalid settings: {reason}")]
    Invalid { reason: String },
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub simulation: SimulationSettings,
    pub workers: WorkerSettings,
    /// `trace`, `debug`, `info`, `warn` or `error`.
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub tick_rate_hz: u32,
    /// Stop after this many ticks; `None` runs until interrupted.
    pub max_ticks: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub count: usize,
    /// Refuse to start workers when the host cannot share memory.
    pub require_shared_memory: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            simulation: SimulationSettings::default(),
            workers: WorkerSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            max_ticks: Some(600),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            count: 2,
            require_shared_memory: false,
        }
    }
}

impl Settings {
    /// Read and validate settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        tracing::debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Like [`Settings::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "no settings file; using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).map_err(SettingsError::Encode)?;
        fs::write(path, text).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.simulation.tick_rate_hz == 0 {
            return Err(SettingsError::Invalid {
                reason: "simulation.tick_rate_hz must be greater than zero".to_string(),
            });
        }
        self.log_level()?;
        Ok(())
    }

    /// Parsed `log_level`.
    pub fn log_level(&self) -> Result<tracing::Level, SettingsError> {
        tracing::Level::from_str(&self.log_level).map_err(|_| SettingsError::Invalid {
            reason: format!("unknown log_level '{}'", self.log_level),
        })
    }
}
