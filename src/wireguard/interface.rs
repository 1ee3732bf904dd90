//! WireGuard interface records
//!
//! [`InterfaceConfig`] is the dict form: what a config source declares or an
//! operator writes by hand, possibly without a private key. [`Interface`] is
//! the validated value; it is only obtainable by converting a complete
//! configuration, so every `Interface` in the system satisfies the field
//! rules in [`crate::wireguard::validation`].

use crate::error::{KeymasterError, Result};
use crate::wireguard::peer::{Peer, PeerConfig};
use crate::wireguard::validation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Source-specific correlation data carried alongside an interface.
///
/// Never compared, never written to a config scheme.
pub type AuxiliaryData = BTreeMap<String, String>;

/// Auxiliary key holding the remote record id
pub const AUX_ID: &str = "id";

/// Auxiliary key holding the public key the source last recorded
pub const AUX_OLD_PUBLIC_KEY: &str = "old_public_key";

/// Interface configuration as declared by a config source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Interface name (e.g. "wg0")
    pub name: String,

    /// Interface addresses with prefix length (e.g. "10.0.0.1/24")
    #[serde(default)]
    pub addresses: Vec<String>,

    /// Base64-encoded private key; sources leave this unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    /// UDP listen port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<i64>,

    /// Firewall mark applied to outgoing packets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fw_mark: Option<i64>,

    /// WireGuard peers
    #[serde(default)]
    pub peers: Vec<PeerConfig>,

    /// Correlation data for the config source
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub auxiliary_data: AuxiliaryData,
}

impl InterfaceConfig {
    /// Create a configuration with a name and addresses
    pub fn new(name: impl Into<String>, addresses: Vec<String>) -> Self {
        Self {
            name: name.into(),
            addresses,
            ..Default::default()
        }
    }

    /// Replace the private key, returning the updated configuration
    pub fn with_private_key(mut self, private_key: impl Into<String>) -> Self {
        self.private_key = Some(private_key.into());
        self
    }

    /// Public key the source last recorded for this interface
    pub fn last_known_public_key(&self) -> Option<&str> {
        self.auxiliary_data.get(AUX_OLD_PUBLIC_KEY).map(String::as_str)
    }
}

/// A validated WireGuard interface and its peers
///
/// Equality covers every field except the auxiliary data.
#[derive(Clone)]
pub struct Interface {
    name: String,
    addresses: Vec<String>,
    private_key: String,
    listen_port: Option<u16>,
    fw_mark: Option<u32>,
    peers: Vec<Peer>,
    auxiliary_data: AuxiliaryData,
}

impl Interface {
    /// Validate a complete interface configuration
    pub fn new(config: InterfaceConfig) -> Result<Self> {
        Self::try_from(config)
    }

    /// Interface name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interface addresses, in configured order
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Base64-encoded private key
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// UDP listen port
    pub fn listen_port(&self) -> Option<u16> {
        self.listen_port
    }

    /// Firewall mark
    pub fn fw_mark(&self) -> Option<u32> {
        self.fw_mark
    }

    /// Peers, in configured order
    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    /// Correlation data for the config source
    pub fn auxiliary_data(&self) -> &AuxiliaryData {
        &self.auxiliary_data
    }

    /// Remote record id, if the source provided one
    pub fn remote_id(&self) -> Option<&str> {
        self.auxiliary_data.get(AUX_ID).map(String::as_str)
    }

    /// Public key the source last recorded for this interface
    pub fn last_known_public_key(&self) -> Option<&str> {
        self.auxiliary_data.get(AUX_OLD_PUBLIC_KEY).map(String::as_str)
    }
}

impl TryFrom<InterfaceConfig> for Interface {
    type Error = KeymasterError;

    fn try_from(config: InterfaceConfig) -> Result<Self> {
        validation::validate_required("name", &config.name)?;

        validation::validate_non_empty("addresses", &config.addresses)?;
        for (i, address) in config.addresses.iter().enumerate() {
            validation::validate_interface_cidr(&format!("addresses[{}]", i), address)?;
        }

        let private_key = config
            .private_key
            .ok_or_else(|| KeymasterError::validation("private_key", "is required"))?;
        validation::validate_required("private_key", &private_key)?;

        let listen_port = config
            .listen_port
            .map(|port| validation::validate_u16("listen_port", port))
            .transpose()?;

        let fw_mark = config
            .fw_mark
            .map(|mark| validation::validate_u32("fw_mark", mark))
            .transpose()?;

        let peers = config
            .peers
            .into_iter()
            .enumerate()
            .map(|(i, peer)| Peer::try_from(peer).map_err(|e| e.within(&format!("peers[{}]", i))))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: config.name,
            addresses: config.addresses,
            private_key,
            listen_port,
            fw_mark,
            peers,
            auxiliary_data: config.auxiliary_data,
        })
    }
}

impl From<&Interface> for InterfaceConfig {
    fn from(interface: &Interface) -> Self {
        InterfaceConfig {
            name: interface.name.clone(),
            addresses: interface.addresses.clone(),
            private_key: Some(interface.private_key.clone()),
            listen_port: interface.listen_port.map(i64::from),
            fw_mark: interface.fw_mark.map(i64::from),
            peers: interface.peers.iter().map(PeerConfig::from).collect(),
            auxiliary_data: interface.auxiliary_data.clone(),
        }
    }
}

impl PartialEq for Interface {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.addresses == other.addresses
            && self.private_key == other.private_key
            && self.listen_port == other.listen_port
            && self.fw_mark == other.fw_mark
            && self.peers == other.peers
    }
}

impl Eq for Interface {}

// Ensure private keys are never accidentally logged
impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("name", &self.name)
            .field("addresses", &self.addresses)
            .field("private_key", &"[REDACTED]")
            .field("listen_port", &self.listen_port)
            .field("fw_mark", &self.fw_mark)
            .field("peers", &self.peers)
            .field("auxiliary_data", &self.auxiliary_data)
            .finish()
    }
}
