//! Coordinator configuration.
//!
//! Values come from an optional TOML file, `CORDO_*` environment variables,
//! and CLI flags, in that order of precedence (flags win). Every timeout in
//! the system is configurable here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP bind address.
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the session store database.
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Ceiling for `max_wait_ms` on the long-poll endpoint.
    pub long_poll_max_wait_secs: u64,
    /// How long a pending run may wait for a matching runner.
    pub no_match_ttl_secs: u64,
    /// Safety net between a stop signal and declaring the run stopped.
    pub stop_grace_secs: u64,
    /// How long terminal runs stay inspectable in the queue.
    pub terminal_retention_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            long_poll_max_wait_secs: 30,
            no_match_ttl_secs: 300,
            stop_grace_secs: 5,
            terminal_retention_secs: 900,
        }
    }
}

impl QueueConfig {
    pub fn long_poll_max_wait(&self) -> Duration {
        Duration::from_secs(self.long_poll_max_wait_secs)
    }

    pub fn no_match_ttl(&self) -> Duration {
        Duration::from_secs(self.no_match_ttl_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn terminal_retention(&self) -> Duration {
        Duration::from_secs(self.terminal_retention_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Runner goes `stale` after this long without a heartbeat.
    pub heartbeat_stale_secs: u64,
    /// Runner record is removed after this long without a heartbeat.
    pub heartbeat_remove_secs: u64,
    /// Lifecycle sweeper tick.
    pub sweep_interval_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            heartbeat_stale_secs: 120,
            heartbeat_remove_secs: 600,
            sweep_interval_secs: 15,
        }
    }
}

impl RunnerConfig {
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.heartbeat_stale_secs as i64)
    }

    pub fn remove_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.heartbeat_remove_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlueprintConfig {
    /// Root directory of blueprint definitions.
    pub root: PathBuf,
}

impl Default for BlueprintConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./blueprints"),
        }
    }
}

/// Full coordinator configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub queue: QueueConfig,
    pub runner: RunnerConfig,
    pub blueprints: BlueprintConfig,
}

impl CoordinatorConfig {
    /// Load from an optional file plus `CORDO_*` environment overrides
    /// (e.g. `CORDO_SERVER__LISTEN=127.0.0.1:9000`).
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        } else {
            if let Some(base) = dirs::config_dir() {
                builder = builder
                    .add_source(File::from(base.join("cordo/cordo.toml")).required(false));
            }
            builder = builder.add_source(File::with_name("cordo").required(false));
        }

        builder = builder.add_source(Environment::with_prefix("CORDO").separator("__"));

        builder
            .build()
            .context("reading configuration")?
            .try_deserialize()
            .context("parsing configuration")
    }

    /// Database file inside the data directory.
    pub fn database_path(&self) -> PathBuf {
        self.store.data_dir.join("cordo.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.queue.long_poll_max_wait(), Duration::from_secs(30));
        assert_eq!(config.queue.no_match_ttl(), Duration::from_secs(300));
        assert_eq!(config.queue.stop_grace(), Duration::from_secs(5));
        assert_eq!(config.runner.stale_after(), chrono::Duration::minutes(2));
        assert_eq!(config.runner.remove_after(), chrono::Duration::minutes(10));
        assert_eq!(config.blueprints.root, PathBuf::from("./blueprints"));
    }

    #[test]
    fn file_values_override_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cordo.toml");
        std::fs::write(
            &path,
            r#"
            [server]
            listen = "127.0.0.1:9000"

            [queue]
            no_match_ttl_secs = 60
            "#,
        )
        .unwrap();

        let config = CoordinatorConfig::load(Some(&path)).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert_eq!(config.queue.no_match_ttl(), Duration::from_secs(60));
        // Untouched sections keep defaults.
        assert_eq!(config.queue.stop_grace(), Duration::from_secs(5));
    }
}
