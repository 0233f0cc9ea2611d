//! Service configuration
//!
//! Loaded from YAML with `MELSRV_`-prefixed environment overrides (`__`
//! separates nesting levels, e.g. `MELSRV_SERVICE__LOG_LEVEL=debug`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MelsrvError, Result};
use crate::protocols::melsec::{validate_blocks, DataBlock, DataCode};
use crate::records::RecordSettings;
use crate::runtime::{PollerSettings, ReconnectPolicy, TcpConnector};
use crate::storage::BatchWriter;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "MELSRV_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSection {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Daily rolling log files go here when set
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

/// One PLC connection and everything polled from it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub source: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub data_code: DataCode,
    /// Seconds between polls
    pub polltime: f64,
    /// Seconds per output batch
    pub aggregationtime: f64,
    pub outputdirectory: PathBuf,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: f64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout: f64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(flatten)]
    pub records: RecordSettings,
    pub datablocks: Vec<DataBlock>,
}

/// Reconnect policy as written in configuration (seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_delay")]
    pub delay: f64,
    /// 0 retries forever
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay: f64,
    #[serde(default)]
    pub jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: default_reconnect_delay(),
            max_attempts: 0,
            backoff_multiplier: default_backoff_multiplier(),
            max_delay: default_max_delay(),
            jitter: false,
        }
    }
}

fn default_service_name() -> String {
    "melsrv".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_connect_timeout() -> f64 {
    5.0
}

fn default_read_timeout() -> f64 {
    1.0
}

fn default_reconnect_delay() -> f64 {
    3.0
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_max_delay() -> f64 {
    60.0
}

/// Seconds to a duration; rejects negative, NaN and infinite values
fn seconds(value: f64, what: &str, source: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| MelsrvError::config(format!("{}: invalid {} '{}'", source, what, value)))
}

fn positive_seconds(value: f64, what: &str, source: &str) -> Result<Duration> {
    let duration = seconds(value, what, source)?;
    if duration.is_zero() {
        return Err(MelsrvError::config(format!(
            "{}: {} must be greater than zero",
            source, what
        )));
    }
    Ok(duration)
}

impl ServiceConfig {
    /// Load from a YAML file with environment overrides, then validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = common::config_loader::load_yaml_config(path, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate an in-memory YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = common::config_loader::parse_yaml_config(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.connections.is_empty() {
            return Err(MelsrvError::config("No connections configured"));
        }

        let mut sources = HashSet::new();
        for connection in &self.connections {
            if !sources.insert(connection.source.as_str()) {
                return Err(MelsrvError::config(format!(
                    "Duplicate source '{}'",
                    connection.source
                )));
            }
            connection.validate()?;
        }

        debug!("Validated {} connection(s)", self.connections.len());
        Ok(())
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(MelsrvError::config("Connection with empty source name"));
        }
        if self.host.trim().is_empty() {
            return Err(MelsrvError::config(format!("{}: host is empty", self.source)));
        }
        if self.port == 0 {
            return Err(MelsrvError::config(format!("{}: port is 0", self.source)));
        }
        if self.datablocks.is_empty() {
            return Err(MelsrvError::config(format!(
                "{}: no datablocks configured",
                self.source
            )));
        }

        self.poller_settings()?;
        self.connector()?;
        validate_blocks(&self.datablocks)?;

        for computed in &self.records.computed {
            if computed.name.trim().is_empty() || computed.expression.trim().is_empty() {
                return Err(MelsrvError::config(format!(
                    "{}: computed fields need a name and an expression",
                    self.source
                )));
            }
        }
        for target in &self.records.split {
            if target.source.trim().is_empty() {
                return Err(MelsrvError::config(format!(
                    "{}: split target without a source name",
                    self.source
                )));
            }
        }
        Ok(())
    }

    pub fn poller_settings(&self) -> Result<PollerSettings> {
        let source = self.source.as_str();
        let delay = seconds(self.reconnect.delay, "reconnect delay", source)?;
        let max_delay = seconds(self.reconnect.max_delay, "reconnect max_delay", source)?;
        let multiplier = self.reconnect.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(MelsrvError::config(format!(
                "{}: backoff_multiplier must be at least 1.0",
                source
            )));
        }

        Ok(PollerSettings {
            source: self.source.clone(),
            poll_interval: positive_seconds(self.polltime, "polltime", source)?,
            aggregation: positive_seconds(self.aggregationtime, "aggregationtime", source)?,
            data_code: self.data_code,
            read_timeout: positive_seconds(self.read_timeout, "read_timeout", source)?,
            reconnect: ReconnectPolicy {
                max_attempts: self.reconnect.max_attempts,
                initial_delay: delay,
                max_delay: max_delay.max(delay),
                backoff_multiplier: self.reconnect.backoff_multiplier,
                jitter: self.reconnect.jitter,
            },
            blocks: self.datablocks.clone(),
            records: self.records.clone(),
        })
    }

    pub fn connector(&self) -> Result<TcpConnector> {
        Ok(TcpConnector::new(
            self.host.clone(),
            self.port,
            positive_seconds(self.connect_timeout, "connect_timeout", &self.source)?,
        ))
    }

    pub fn writer(&self) -> BatchWriter {
        BatchWriter::new(self.outputdirectory.clone())
    }
}
