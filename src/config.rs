//! Scanner configuration.
//!
//! JSON file (every field optional) plus `WTF_*` environment overrides:
//! - `WTF_RESCAN_INTERVAL_MS`: WiFi re-scan period in milliseconds
//! - `WTF_DATABASE`: path of the SQLite history database
//! - `WTF_AUTO_PERSIST`: initial automatic persistence mode (true/false)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::merge::MergePolicy;
use crate::rules::ThreatRules;

pub const ENV_RESCAN_INTERVAL_MS: &str = "WTF_RESCAN_INTERVAL_MS";
pub const ENV_DATABASE: &str = "WTF_DATABASE";
pub const ENV_AUTO_PERSIST: &str = "WTF_AUTO_PERSIST";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// WiFi re-scan period while scanning.
    pub rescan_interval_ms: u64,
    pub merge_policy: MergePolicy,
    /// Automatic persistence when no preference has been stored yet.
    pub auto_persist: bool,
    /// History database. Unset keeps history in memory only.
    pub database_path: Option<PathBuf>,
    pub rules: ThreatRules,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            rescan_interval_ms: 5_000,
            merge_policy: MergePolicy::KeepStrongest,
            auto_persist: false,
            database_path: None,
            rules: ThreatRules::default(),
        }
    }
}

impl ScannerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rescan_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "rescan_interval_ms",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        log::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn rescan_interval(&self) -> Duration {
        Duration::from_millis(self.rescan_interval_ms)
    }

    /// Apply `WTF_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(ENV_RESCAN_INTERVAL_MS) {
            self.rescan_interval_ms = match val.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => ms,
                _ => {
                    return Err(ConfigError::Env {
                        key: ENV_RESCAN_INTERVAL_MS,
                        value: val,
                    })
                }
            };
            log::debug!("Override rescan_interval_ms from env: {}", self.rescan_interval_ms);
        }

        if let Some(val) = lookup(ENV_DATABASE) {
            let val = val.trim();
            self.database_path = (!val.is_empty()).then(|| PathBuf::from(val));
            log::debug!("Override database_path from env: {:?}", self.database_path);
        }

        if let Some(val) = lookup(ENV_AUTO_PERSIST) {
            self.auto_persist = val.trim().parse().map_err(|_| ConfigError::Env {
                key: ENV_AUTO_PERSIST,
                value: val.clone(),
            })?;
            log::debug!("Override auto_persist from env: {}", self.auto_persist);
        }

        Ok(())
    }
}
