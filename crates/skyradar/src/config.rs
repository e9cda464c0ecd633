//! Configuration management for skyradar.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "skyradar";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "flights.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SKYRADAR_`, `__` separates sections)
/// 2. TOML config file at `~/.config/skyradar/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Live tracking configuration.
    pub tracker: TrackerConfig,
    /// Incident retention configuration.
    pub incidents: IncidentConfig,
    /// Flight history configuration.
    pub history: HistoryConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind_addr: String,
    /// Seconds between heartbeat comments on idle streams.
    pub heartbeat_secs: u64,
    /// Number of snapshots buffered per stream before a slow viewer skips ahead.
    pub broadcast_capacity: usize,
}

/// Live tracking configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Seconds without a report after which a record is reaped.
    pub stale_timeout_secs: u64,
    /// Seconds between reaper sweeps.
    pub reap_interval_secs: u64,
    /// Maximum number of points kept in a flight path.
    pub path_cap: usize,
    /// Reject reports that carry neither an explicit id nor a reporter.
    pub require_reporter: bool,
    /// Altitude above ground (feet) above which an aircraft counts as airborne.
    pub airborne_agl_ft: f64,
}

/// Incident retention configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentConfig {
    /// Trailing window of retained incidents, in hours.
    pub window_hours: u32,
    /// Hard upper bound on retained incidents.
    pub capacity: usize,
}

/// Flight history configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Persist finished flights of qualified sessions.
    pub enabled: bool,
    /// Path to the database file.
    /// Defaults to `~/.local/share/skyradar/flights.db`
    pub database_path: Option<PathBuf>,
    /// A session must have more path points than this to be archived.
    pub min_path_points: usize,
    /// Maximum age of archived flights in days.
    /// Set to 0 for unlimited.
    pub max_age_days: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            heartbeat_secs: 30,
            broadcast_capacity: 64,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stale_timeout_secs: 12,
            reap_interval_secs: 5,
            path_cap: 500,
            require_reporter: false,
            airborne_agl_ft: 50.0,
        }
    }
}

impl Default for IncidentConfig {
    fn default() -> Self {
        Self {
            window_hours: 3,
            capacity: 1_000,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: None, // Resolved to the data dir at runtime
            min_path_points: 10,
            max_age_days: 365,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("SKYRADAR_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        let positive = [
            ("server.heartbeat_secs", self.server.heartbeat_secs),
            ("tracker.stale_timeout_secs", self.tracker.stale_timeout_secs),
            ("tracker.reap_interval_secs", self.tracker.reap_interval_secs),
            ("incidents.window_hours", u64::from(self.incidents.window_hours)),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::ConfigValidation {
                    message: format!("{name} must be greater than 0"),
                });
            }
        }

        let sizes = [
            ("server.broadcast_capacity", self.server.broadcast_capacity),
            ("tracker.path_cap", self.tracker.path_cap),
            ("incidents.capacity", self.incidents.capacity),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(Error::ConfigValidation {
                    message: format!("{name} must be greater than 0"),
                });
            }
        }

        if !self.tracker.airborne_agl_ft.is_finite() {
            return Err(Error::ConfigValidation {
                message: "tracker.airborne_agl_ft must be a finite number".to_string(),
            });
        }

        Ok(())
    }

    /// Parse the configured bind address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind_addr
            .parse()
            .map_err(|_| Error::ConfigValidation {
                message: format!("invalid bind address: {}", self.server.bind_addr),
            })
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.history
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the stale timeout as a Duration.
    #[must_use]
    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.tracker.stale_timeout_secs)
    }

    /// Get the reap interval as a Duration.
    #[must_use]
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.tracker.reap_interval_secs)
    }

    /// Get the stream heartbeat interval as a Duration.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.server.heartbeat_secs)
    }

    /// Get the incident retention window as a Duration.
    #[must_use]
    pub fn incident_window(&self) -> Duration {
        Duration::from_secs(u64::from(self.incidents.window_hours) * 60 * 60)
    }

    /// Get the archive max age as a Duration.
    #[must_use]
    pub fn max_age(&self) -> Option<Duration> {
        if self.history.max_age_days == 0 {
            None
        } else {
            Some(Duration::from_secs(
                u64::from(self.history.max_age_days) * 24 * 60 * 60,
            ))
        }
    }
}
