use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::{ConnectOptions, QoS};

fn default_host() -> String {
    "localhost".to_owned()
}

fn default_port() -> u16 {
    1883
}

fn default_keepalive_secs() -> u64 {
    60
}

fn default_qos() -> u8 {
    1
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_owned()
}

/// Client configuration
///
/// ```toml
/// [broker]
/// host = "localhost"
/// port = 1883
///
/// [requests]
/// timeout_secs = 15
/// match_by_correlation_id = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FimpConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub requests: RequestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FimpConfig {
    pub const ENV_CONFIG_PATH: &'static str = "FIMP_CONFIG";

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(config_path = %path.display(), "loading configuration");
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("unable to read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Load from `FIMP_CONFIG` if set, otherwise from `fallback`
    pub fn load_from_env_or(fallback: impl AsRef<Path>) -> Result<Self> {
        match std::env::var(Self::ENV_CONFIG_PATH) {
            Ok(path) if !path.trim().is_empty() => Self::load(PathBuf::from(path)),
            _ => Self::load(fallback),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.broker.port == 0 {
            return Err(Error::Config("broker.port must be non-zero".to_string()));
        }
        QoS::try_from(self.broker.qos)?;
        if self.requests.timeout_secs == 0 {
            return Err(Error::Config("requests.timeout_secs must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_qos")]
    pub qos: u8,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            keepalive_secs: default_keepalive_secs(),
            client_id: None,
            qos: default_qos(),
        }
    }
}

impl BrokerConfig {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            host: self.host.clone(),
            port: self.port,
            keepalive: Duration::from_secs(self.keepalive_secs),
            client_id: self.client_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Require `response.corid == request.uid` on top of topic and filters
    #[serde(default)]
    pub match_by_correlation_id: bool,
    /// Write `corid` into outgoing envelopes
    #[serde(default)]
    pub emit_corid: bool,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            match_by_correlation_id: false,
            emit_corid: false,
        }
    }
}

impl RequestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Log output formats
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when neither `FIMP_LOG` nor `RUST_LOG` is set
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
