//! TOML configuration file parser
//!
//! Example:
//!
//! ```toml
//! sync_period_secs = 60
//! call_timeout_secs = 30
//! # private_key = "..."   # same WireGuard identity on several hosts
//!
//! [source]
//! kind = "keymaster_server"
//! url = "https://keymaster.example.com"
//! token = "..."
//!
//! [scheme]
//! kind = "auto"
//! config_dir = "/etc/keymaster-agent/wireguard"
//! ```

use crate::config::{Config, SchemeConfig, SourceConfig};
use crate::error::{KeymasterError, Result};
use crate::scheme::SchemeKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// TOML configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    /// Seconds between the starts of two sync cycles
    #[serde(default = "default_sync_period_secs")]
    pub sync_period_secs: u64,

    /// Seconds any single source or scheme call may take
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Private key forced onto every managed interface
    #[serde(default)]
    pub private_key: Option<String>,

    /// Where desired state comes from
    pub source: TomlSourceConfig,

    /// How interfaces are persisted
    #[serde(default)]
    pub scheme: TomlSchemeConfig,
}

/// TOML source configuration, tagged by `kind`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TomlSourceConfig {
    /// keymaster-server
    KeymasterServer {
        /// Base URL of the server
        url: String,
        /// API token
        token: String,
    },

    /// uDPU API
    Udpu {
        /// Base URL of the API
        url: String,
        /// Network whose server interface this host runs
        #[serde(default = "default_network_name")]
        network_name: String,
    },
}

/// TOML scheme configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlSchemeConfig {
    /// Scheme selection
    #[serde(default)]
    pub kind: SchemeKind,

    /// Directory for `wg` scheme config files
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
}

impl Default for TomlSchemeConfig {
    fn default() -> Self {
        Self {
            kind: SchemeKind::default(),
            config_dir: default_config_dir(),
        }
    }
}

impl TomlConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            KeymasterError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml)
            .map_err(|e| KeymasterError::Config(format!("Failed to parse TOML config: {}", e)))
    }
}

// Convert TOML config to internal Config
impl From<TomlConfig> for Config {
    fn from(toml: TomlConfig) -> Self {
        Config {
            sync_period: Duration::from_secs(toml.sync_period_secs),
            call_timeout: Duration::from_secs(toml.call_timeout_secs),
            private_key: toml.private_key,
            source: toml.source.into(),
            scheme: toml.scheme.into(),
        }
    }
}

impl From<TomlSourceConfig> for SourceConfig {
    fn from(toml: TomlSourceConfig) -> Self {
        match toml {
            TomlSourceConfig::KeymasterServer { url, token } => {
                SourceConfig::KeymasterServer { url, token }
            }
            TomlSourceConfig::Udpu { url, network_name } => SourceConfig::Udpu { url, network_name },
        }
    }
}

impl From<TomlSchemeConfig> for SchemeConfig {
    fn from(toml: TomlSchemeConfig) -> Self {
        SchemeConfig {
            kind: toml.kind,
            config_dir: toml.config_dir,
        }
    }
}

// Default value functions
fn default_sync_period_secs() -> u64 {
    60
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_network_name() -> String {
    "default".to_string()
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/keymaster-agent/wireguard")
}
