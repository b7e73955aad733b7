//! Session configuration
//!
//! Settings are plain serde structs persisted as TOML. Missing files or missing
//! fields degrade to defaults so a host can always start a session.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_DIR_NAME: &str = "crowd-controls";
const CONFIG_FILE_NAME: &str = "session.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// What the ingress buffer does when it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the oldest buffered event and accept the new one
    #[default]
    DropOldest,
    /// Refuse the new event and report `IngressError::Full` to the producer
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressSettings {
    /// Maximum number of events buffered between two ticks
    pub capacity: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for IngressSettings {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            overflow_policy: OverflowPolicy::DropOldest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickSettings {
    /// Interval used by hosts that drive `do_work` from a timer
    pub interval_ms: u64,
    /// How often the aggregator logs throughput stats
    pub stats_interval_secs: i64,
}

impl Default for TickSettings {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            stats_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Buffer size of the outbound command channel
    pub command_capacity: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            command_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub ingress: IngressSettings,
    pub tick: TickSettings,
    pub transport: TransportSettings,
}

impl SessionSettings {
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading session settings from {}", path.display());
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Default location: `<config dir>/crowd-controls/session.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Loads from the default location, falling back to defaults on any failure
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            warn!("No config directory available, using default session settings");
            return Self::default();
        };

        if !path.exists() {
            info!("No session settings at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load(&path) {
            Ok(settings) => {
                info!("Loaded session settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
