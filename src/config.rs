//! TOML configuration for the `loop-bridge` binary.
//!
//! Every field has a serde default, so a partial (or empty) file is valid.

use std::{
    path::Path,
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    host::HostConfig,
    net::tcp::{config::DEFAULT_PORT, Logger, TransportConfig},
    reactor::{DEFAULT_MAX_READS_PER_EVENT, DEFAULT_MAX_TICKS, DEFAULT_READ_BUFFER_SIZE},
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to write default config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub transport: TransportSettings,
    #[serde(default)]
    pub host: HostSettings,
    #[serde(default)]
    pub client: ClientSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_ticks() -> usize {
    DEFAULT_MAX_TICKS
}

fn default_tick_interval() -> u64 {
    16 // ~60 ticks per second
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

fn default_max_reads() -> usize {
    DEFAULT_MAX_READS_PER_EVENT
}

fn default_true() -> bool {
    true
}

fn default_grace_period() -> u64 {
    5
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportSettings {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Pump iterations allowed per tick
    #[serde(default = "default_max_ticks")]
    pub max_ticks_per_frame: usize,
    /// Sleep between ticks of the driver loop, in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Reads serviced per socket before yielding to the next pump iteration
    #[serde(default = "default_max_reads")]
    pub max_reads_per_event: usize,
    #[serde(default = "default_true")]
    pub no_delay: bool,
    #[serde(default = "default_true")]
    pub simultaneous_accepts: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_ticks_per_frame: default_max_ticks(),
            tick_interval_ms: default_tick_interval(),
            read_buffer_size: default_read_buffer_size(),
            max_reads_per_event: default_max_reads(),
            no_delay: true,
            simultaneous_accepts: true,
        }
    }
}

impl TransportSettings {
    pub fn to_transport_config(&self, logger: Arc<dyn Logger>) -> TransportConfig {
        TransportConfig::builder()
            .port(self.port)
            .max_ticks_per_frame(self.max_ticks_per_frame)
            .read_buffer_size(self.read_buffer_size)
            .max_reads_per_event(self.max_reads_per_event)
            .no_delay(self.no_delay)
            .simultaneous_accepts(self.simultaneous_accepts)
            .logger(logger)
            .build()
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSettings {
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
    /// Shut down automatically after this many seconds
    #[serde(default)]
    pub session_limit_secs: Option<u64>,
    #[serde(default)]
    pub activate_on_start: bool,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period(),
            session_limit_secs: None,
            activate_on_start: false,
        }
    }
}

impl HostSettings {
    pub fn to_host_config(&self) -> HostConfig {
        HostConfig {
            grace_period: Duration::from_secs(self.grace_period_secs),
            session_limit: self.session_limit_secs.map(Duration::from_secs),
            activate_on_start: self.activate_on_start,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// IP literal to connect to
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Reads `path`, or writes the defaults there when it does not exist yet.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = AppConfig::default();
            std::fs::write(path, toml::to_string_pretty(&config)?)?;
            Ok(config)
        }
    }
}
