//! Process settings read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ledger::UserId;

/// Runtime settings for the economy service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Path to the economy JSON configuration.
    pub economy_path: PathBuf,

    /// Path of the ledger snapshot file.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Seconds between background snapshot writes.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,

    /// Upper bound for any storage lock wait, in milliseconds.
    #[serde(default = "default_storage_timeout")]
    pub storage_timeout_ms: u64,

    /// Minimum spacing between broadcast deliveries, in milliseconds.
    #[serde(default = "default_broadcast_interval")]
    pub broadcast_interval_ms: u64,

    /// Listen address of the liveness probe.
    #[serde(default = "default_health_addr")]
    pub health_addr: SocketAddr,
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("ledger.json")
}

fn default_snapshot_interval() -> u64 {
    30
}

fn default_storage_timeout() -> u64 {
    2000
}

fn default_broadcast_interval() -> u64 {
    50 // stays under 20 messages per second
}

fn default_health_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            economy_path: PathBuf::from("economy.json"),
            snapshot_path: default_snapshot_path(),
            snapshot_interval_secs: default_snapshot_interval(),
            storage_timeout_ms: default_storage_timeout(),
            broadcast_interval_ms: default_broadcast_interval(),
            health_addr: default_health_addr(),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl BotSettings {
    /// Creates settings from environment variables with defaults.
    #[must_use]
    pub fn from_env_with_defaults() -> Self {
        Self {
            economy_path: std::env::var("ECONOMY_CONFIG")
                .map_or_else(|_| PathBuf::from("economy.json"), PathBuf::from),
            snapshot_path: std::env::var("LEDGER_SNAPSHOT_PATH")
                .map_or_else(|_| default_snapshot_path(), PathBuf::from),
            snapshot_interval_secs: env_parsed("SNAPSHOT_INTERVAL_SECS")
                .filter(|&secs| secs > 0)
                .unwrap_or_else(default_snapshot_interval),
            storage_timeout_ms: env_parsed("STORAGE_TIMEOUT_MS")
                .unwrap_or_else(default_storage_timeout),
            broadcast_interval_ms: env_parsed("BROADCAST_INTERVAL_MS")
                .unwrap_or_else(default_broadcast_interval),
            health_addr: env_parsed("HEALTH_ADDR").unwrap_or_else(default_health_addr),
        }
    }

    /// Reads the comma-separated `ADMIN_IDS` variable.
    ///
    /// # Errors
    ///
    /// Returns an error if any entry is not a valid user id.
    pub fn admin_ids_from_env() -> Result<Vec<UserId>, ConfigError> {
        match std::env::var("ADMIN_IDS") {
            Ok(raw) => parse_admin_ids(&raw),
            Err(_) => Ok(Vec::new()),
        }
    }

    #[must_use]
    pub const fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    /// Interval between snapshot writes; zero falls back to the default.
    #[must_use]
    pub fn snapshot_interval(&self) -> Duration {
        match self.snapshot_interval_secs {
            0 => Duration::from_secs(default_snapshot_interval()),
            secs => Duration::from_secs(secs),
        }
    }

    #[must_use]
    pub const fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }
}

/// Parses a comma-separated list of user ids, ignoring empty entries.
///
/// # Errors
///
/// Returns an error naming the first entry that is not an integer.
pub fn parse_admin_ids(raw: &str) -> Result<Vec<UserId>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map(UserId)
                .map_err(|_| ConfigError::InvalidAdminId(s.to_owned()))
        })
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid admin ID in ADMIN_IDS: '{0}' (must be an integer)")]
    InvalidAdminId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = BotSettings::default();
        assert_eq!(settings.snapshot_interval(), Duration::from_secs(30));
        assert_eq!(settings.storage_timeout(), Duration::from_secs(2));
        assert_eq!(settings.health_addr.port(), 8080);
    }

    #[test]
    fn test_zero_snapshot_interval_falls_back_to_default() {
        let settings = BotSettings {
            snapshot_interval_secs: 0,
            ..BotSettings::default()
        };
        assert_eq!(settings.snapshot_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_admin_ids() {
        let ids = parse_admin_ids(" 1, 22 ,,-5").unwrap();
        assert_eq!(ids, vec![UserId(1), UserId(22), UserId(-5)]);
    }

    #[test]
    fn test_parse_admin_ids_rejects_garbage() {
        assert!(matches!(
            parse_admin_ids("1,abc"),
            Err(ConfigError::InvalidAdminId(id)) if id == "abc"
        ));
    }
}
