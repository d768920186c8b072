//! cronfleet.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duration::parse_duration;
use crate::registry::{JobRegistry, JobSpec, RegistryError};
use crate::types::Environment;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid job registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub instance: InstanceConfig,
    pub store: StoreConfig,
    pub lease: LeaseConfig,
    pub schedule: ScheduleConfig,
    pub jobs: Vec<JobSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Instance identifier. Detected at runtime when absent.
    pub address: Option<String>,
    pub environment: Option<Environment>,
    /// Address of the development instance; used when `environment`
    /// is not set.
    pub dev_address: Option<String>,
}

/// Which shared store backs the lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    Redb,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// `host:port` of the Redis server.
    pub address: String,
    pub password: Option<String>,
    pub database: Option<u32>,
    /// redb file shared by processes on one host.
    pub path: PathBuf,
    pub key_prefix: Option<String>,
    pub connect_timeout: String,
    pub io_timeout: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            address: "127.0.0.1:6379".to_string(),
            password: None,
            database: None,
            path: PathBuf::from("/var/lib/cronfleet/lease.redb"),
            key_prefix: None,
            connect_timeout: "250ms".to_string(),
            io_timeout: "250ms".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Result<Duration, ConfigError> {
        duration_field("store.connect_timeout", &self.connect_timeout)
    }

    pub fn io_timeout(&self) -> Result<Duration, ConfigError> {
        duration_field("store.io_timeout", &self.io_timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    pub poll_interval: String,
    pub safety_margin: String,
    pub init_marker_ttl: String,
    pub ledger_staleness: String,
    pub ledger_ttl: String,
    pub last_active_ttl: String,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            poll_interval: "60s".to_string(),
            safety_margin: "30s".to_string(),
            init_marker_ttl: "30s".to_string(),
            ledger_staleness: "300s".to_string(),
            ledger_ttl: "1h".to_string(),
            last_active_ttl: "10m".to_string(),
        }
    }
}

/// Resolved protocol timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseTimings {
    pub poll_interval: Duration,
    pub safety_margin: Duration,
    pub init_marker_ttl: Duration,
    pub ledger_staleness: Duration,
    pub ledger_ttl: Duration,
    pub last_active_ttl: Duration,
}

impl Default for LeaseTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            safety_margin: Duration::from_secs(30),
            init_marker_ttl: Duration::from_secs(30),
            ledger_staleness: Duration::from_secs(300),
            ledger_ttl: Duration::from_secs(3600),
            last_active_ttl: Duration::from_secs(600),
        }
    }
}

impl LeaseTimings {
    /// Expiry written with every claim and renewal.
    pub fn lease_ttl(&self) -> Duration {
        self.poll_interval + self.safety_margin
    }
}

impl LeaseConfig {
    pub fn timings(&self) -> Result<LeaseTimings, ConfigError> {
        let timings = LeaseTimings {
            poll_interval: duration_field("lease.poll_interval", &self.poll_interval)?,
            safety_margin: duration_field("lease.safety_margin", &self.safety_margin)?,
            init_marker_ttl: duration_field("lease.init_marker_ttl", &self.init_marker_ttl)?,
            ledger_staleness: duration_field("lease.ledger_staleness", &self.ledger_staleness)?,
            ledger_ttl: duration_field("lease.ledger_ttl", &self.ledger_ttl)?,
            last_active_ttl: duration_field("lease.last_active_ttl", &self.last_active_ttl)?,
        };
        if timings.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "lease.poll_interval must be greater than zero".to_string(),
            ));
        }
        if timings.init_marker_ttl.is_zero() {
            return Err(ConfigError::Invalid(
                "lease.init_marker_ttl must be greater than zero".to_string(),
            ));
        }
        Ok(timings)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Title printed in the table header.
    pub title: String,
    pub mailto: Option<String>,
    /// Program invoked with the job id as its argument.
    pub invoker: String,
    /// Command installed on standbys; runs one protocol tick.
    pub listener_command: String,
    /// Root of the per-environment log directories.
    pub log_dir: PathBuf,
    /// Program used to install and list the table.
    pub crontab_program: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            title: "cronfleet".to_string(),
            mailto: None,
            invoker: "/usr/local/bin/run-job".to_string(),
            listener_command: "/usr/local/bin/cronfleet activate".to_string(),
            log_dir: PathBuf::from("/var/log/cronfleet"),
            crontab_program: "crontab".to_string(),
        }
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validated job registry.
    pub fn registry(&self) -> Result<JobRegistry, ConfigError> {
        Ok(JobRegistry::new(self.jobs.clone())?)
    }

    /// Environment of an instance: explicit setting first, then the
    /// development address match.
    pub fn environment_for(&self, address: &str) -> Environment {
        match (self.instance.environment, &self.instance.dev_address) {
            (Some(env), _) => env,
            (None, Some(dev)) if dev == address => Environment::Dev,
            _ => Environment::Live,
        }
    }
}

fn duration_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = FleetConfig::from_toml("").unwrap();
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.address, "127.0.0.1:6379");
        assert!(config.jobs.is_empty());

        let timings = config.lease.timings().unwrap();
        assert_eq!(timings, LeaseTimings::default());
        assert_eq!(timings.lease_ttl(), Duration::from_secs(90));
    }

    #[test]
    fn parse_full_config() {
        let config = FleetConfig::from_toml(
            r#"
[instance]
address = "10.0.1.12"
dev_address = "10.0.0.5"

[store]
backend = "redb"
path = "/tmp/lease.redb"
key_prefix = "game"
io_timeout = "100ms"

[lease]
poll_interval = "1m"
safety_margin = "15s"

[schedule]
title = "Spacefellows"
mailto = "ops@example.com"
invoker = "/srv/app/cron/run cron"
log_dir = "/srv/app/cron/logs"

[[jobs]]
id = "stats5"
schedule = "*/5 * * * *"

[[jobs]]
id = "midnight"
schedule = "0 0 * * *"
"#,
        )
        .unwrap();

        assert_eq!(config.instance.address.as_deref(), Some("10.0.1.12"));
        assert_eq!(config.store.backend, StoreBackend::Redb);
        assert_eq!(config.store.io_timeout().unwrap(), Duration::from_millis(100));
        assert_eq!(config.store.connect_timeout().unwrap(), Duration::from_millis(250));
        assert_eq!(
            config.lease.timings().unwrap().lease_ttl(),
            Duration::from_secs(75)
        );

        let registry = config.registry().unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.jobs()[0].id, "stats5");
    }

    #[test]
    fn invalid_duration_is_reported() {
        let config = FleetConfig::from_toml("[lease]\npoll_interval = \"often\"\n").unwrap();
        let err = config.lease.timings().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration { field: "lease.poll_interval", .. }
        ));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let config = FleetConfig::from_toml("[lease]\npoll_interval = \"0s\"\n").unwrap();
        assert!(matches!(
            config.lease.timings().unwrap_err(),
            ConfigError::Invalid(_)
        ));
    }

    #[test]
    fn invalid_registry_is_reported() {
        let config = FleetConfig::from_toml(
            "[[jobs]]\nid = \"broken\"\nschedule = \"every minute\"\n",
        )
        .unwrap();
        assert!(matches!(
            config.registry().unwrap_err(),
            ConfigError::Registry(RegistryError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn environment_resolution() {
        let mut config = FleetConfig::default();
        assert_eq!(config.environment_for("10.0.0.5"), Environment::Live);

        config.instance.dev_address = Some("10.0.0.5".to_string());
        assert_eq!(config.environment_for("10.0.0.5"), Environment::Dev);
        assert_eq!(config.environment_for("10.0.0.6"), Environment::Live);

        config.instance.environment = Some(Environment::Live);
        assert_eq!(config.environment_for("10.0.0.5"), Environment::Live);
    }

    #[test]
    fn example_config_is_valid() {
        let config =
            FleetConfig::from_toml(include_str!("../../../config/cronfleet.example.toml")).unwrap();
        assert_eq!(config.registry().unwrap().len(), 10);
        assert_eq!(config.lease.timings().unwrap(), LeaseTimings::default());
        assert_eq!(config.store.key_prefix.as_deref(), Some("game"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = FleetConfig::from_file(Path::new("/nonexistent/cronfleet.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
