//! Configuration management
//!
//! This module handles loading and validation of the daemon configuration
//! file. The file is TOML (see [`TomlConfig`]); it is converted into the
//! typed [`Config`] the rest of the agent consumes.

mod toml_parser;
mod validation;

pub use toml_parser::{TomlConfig, TomlSchemeConfig, TomlSourceConfig};

use crate::error::Result;
use crate::scheme::SchemeKind;
use crate::source::{ConfigSource, KeymasterServer, UdpuApi};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/keymaster-agent/config.toml";

/// Daemon configuration
#[derive(Clone)]
pub struct Config {
    /// Time between the starts of two sync cycles
    pub sync_period: Duration,

    /// Bound on any single source or scheme call
    pub call_timeout: Duration,

    /// Private key forced onto every managed interface
    pub private_key: Option<String>,

    /// Where desired state comes from
    pub source: SourceConfig,

    /// How interfaces are persisted
    pub scheme: SchemeConfig,
}

/// Config source selection
#[derive(Clone)]
pub enum SourceConfig {
    /// keymaster-server at `url`, authenticated with `token`
    KeymasterServer {
        /// Base URL
        url: String,
        /// API token
        token: String,
    },

    /// uDPU API at `url`, serving the server interface of `network_name`
    Udpu {
        /// Base URL
        url: String,
        /// Network name
        network_name: String,
    },
}

/// Config scheme selection
#[derive(Debug, Clone)]
pub struct SchemeConfig {
    /// Requested scheme
    pub kind: SchemeKind,

    /// Directory for `wg` scheme config files
    pub config_dir: PathBuf,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let toml_config = TomlConfig::from_file(path)?;
        Ok(toml_config.into())
    }

    /// Parse configuration from a TOML string
    pub fn parse(toml: &str) -> Result<Self> {
        Ok(TomlConfig::parse(toml)?.into())
    }

    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_seconds("sync_period_secs", self.sync_period.as_secs())?;
        validation::validate_seconds("call_timeout_secs", self.call_timeout.as_secs())?;

        if let Some(private_key) = &self.private_key {
            validation::validate_private_key("private_key", private_key)?;
        }

        self.source.validate()?;
        validation::validate_config_dir("scheme.config_dir", &self.scheme.config_dir)?;

        Ok(())
    }
}

impl SourceConfig {
    /// Source kind as written in the config file
    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::KeymasterServer { .. } => "keymaster_server",
            SourceConfig::Udpu { .. } => "udpu",
        }
    }

    /// Base URL of the source
    pub fn url(&self) -> &str {
        match self {
            SourceConfig::KeymasterServer { url, .. } | SourceConfig::Udpu { url, .. } => url,
        }
    }

    /// Validate source settings
    pub fn validate(&self) -> Result<()> {
        validation::validate_url("source.url", self.url())?;
        match self {
            SourceConfig::KeymasterServer { token, .. } => {
                validation::validate_token("source.token", token)
            }
            SourceConfig::Udpu { network_name, .. } => {
                validation::validate_network_name("source.network_name", network_name)
            }
        }
    }

    /// Build the configured source with a per-request `timeout`
    pub fn build(&self, timeout: Duration) -> Result<Arc<dyn ConfigSource>> {
        let source: Arc<dyn ConfigSource> = match self {
            SourceConfig::KeymasterServer { url, token } => {
                Arc::new(KeymasterServer::new(url, token, timeout)?)
            }
            SourceConfig::Udpu { url, network_name } => {
                Arc::new(UdpuApi::new(url, network_name, timeout)?)
            }
        };
        Ok(source)
    }
}

// Keep secrets out of logs
impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceConfig::KeymasterServer { url, .. } => f
                .debug_struct("KeymasterServer")
                .field("url", url)
                .field("token", &"[REDACTED]")
                .finish(),
            SourceConfig::Udpu { url, network_name } => f
                .debug_struct("Udpu")
                .field("url", url)
                .field("network_name", network_name)
                .finish(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("sync_period", &self.sync_period)
            .field("call_timeout", &self.call_timeout)
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("source", &self.source)
            .field("scheme", &self.scheme)
            .finish()
    }
}
