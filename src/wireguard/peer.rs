//! WireGuard peer records
//!
//! A peer comes in two forms: [`PeerConfig`], the loosely typed dict form
//! exchanged with config sources, and [`Peer`], the validated value the
//! reconciliation engine and config schemes work with.

use crate::error::{KeymasterError, Result};
use crate::wireguard::validation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Peer configuration as received from a config source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Base64-encoded public key
    #[serde(default)]
    pub public_key: Option<String>,

    /// Allowed IP ranges (CIDR notation)
    #[serde(default)]
    pub allowed_ips: Vec<String>,

    /// Peer endpoint (host:port)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Persistent keepalive interval in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_keepalive: Option<i64>,

    /// Base64-encoded preshared key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preshared_key: Option<String>,
}

impl PeerConfig {
    /// Create a peer configuration with the two required fields
    pub fn new(public_key: impl Into<String>, allowed_ips: Vec<String>) -> Self {
        Self {
            public_key: Some(public_key.into()),
            allowed_ips,
            ..Default::default()
        }
    }

    /// Whether this record carries a usable public key
    pub fn has_public_key(&self) -> bool {
        self.public_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// A validated WireGuard peer
///
/// Equality is structural over every field; `allowed_ips` order matters.
#[derive(Clone, PartialEq, Eq)]
pub struct Peer {
    public_key: String,
    allowed_ips: Vec<String>,
    endpoint: Option<String>,
    persistent_keepalive: Option<u16>,
    preshared_key: Option<String>,
}

impl Peer {
    /// Validate a peer configuration
    pub fn new(config: PeerConfig) -> Result<Self> {
        Self::try_from(config)
    }

    /// Peer's public key
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Allowed IP ranges, in configured order
    pub fn allowed_ips(&self) -> &[String] {
        &self.allowed_ips
    }

    /// Endpoint as `host:port`
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Endpoint split into host and port
    pub fn endpoint_parts(&self) -> Option<(&str, &str)> {
        self.endpoint.as_deref().and_then(|e| e.split_once(':'))
    }

    /// Persistent keepalive interval in seconds
    pub fn persistent_keepalive(&self) -> Option<u16> {
        self.persistent_keepalive
    }

    /// Preshared key
    pub fn preshared_key(&self) -> Option<&str> {
        self.preshared_key.as_deref()
    }
}

impl TryFrom<PeerConfig> for Peer {
    type Error = KeymasterError;

    fn try_from(config: PeerConfig) -> Result<Self> {
        let public_key = config
            .public_key
            .ok_or_else(|| KeymasterError::validation("public_key", "is required"))?;
        validation::validate_required("public_key", &public_key)?;

        validation::validate_non_empty("allowed_ips", &config.allowed_ips)?;
        for (i, allowed_ip) in config.allowed_ips.iter().enumerate() {
            validation::validate_network_cidr(&format!("allowed_ips[{}]", i), allowed_ip)?;
        }

        if let Some(endpoint) = &config.endpoint {
            validation::validate_endpoint("endpoint", endpoint)?;
        }

        let persistent_keepalive = config
            .persistent_keepalive
            .map(|secs| validation::validate_u16("persistent_keepalive", secs))
            .transpose()?;

        Ok(Self {
            public_key,
            allowed_ips: config.allowed_ips,
            endpoint: config.endpoint,
            persistent_keepalive,
            preshared_key: config.preshared_key,
        })
    }
}

impl From<&Peer> for PeerConfig {
    fn from(peer: &Peer) -> Self {
        PeerConfig {
            public_key: Some(peer.public_key.clone()),
            allowed_ips: peer.allowed_ips.clone(),
            endpoint: peer.endpoint.clone(),
            persistent_keepalive: peer.persistent_keepalive.map(i64::from),
            preshared_key: peer.preshared_key.clone(),
        }
    }
}

// Keep preshared keys out of logs
impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("public_key", &self.public_key)
            .field("allowed_ips", &self.allowed_ips)
            .field("endpoint", &self.endpoint)
            .field("persistent_keepalive", &self.persistent_keepalive)
            .field(
                "preshared_key",
                &self.preshared_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}
