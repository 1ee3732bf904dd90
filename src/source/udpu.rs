//! uDPU API config source
//!
//! The uDPU API models a star network: one server interface per network
//! name, with every client of the network as its peer. This source fetches
//! the server side of one network.

use crate::error::{KeymasterError, Result};
use crate::source::http::{id_to_string, ApiClient};
use crate::source::{drop_keyless_peers, ConfigSource};
use crate::wireguard::{Interface, InterfaceConfig, PeerConfig, AUX_ID, AUX_OLD_PUBLIC_KEY};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

/// `{ "interface": {...}, "peers": [...] }` as returned by the API
#[derive(Debug, Deserialize)]
struct UpstreamConfig {
    interface: UpstreamInterface,
    #[serde(default)]
    peers: Vec<UpstreamPeer>,
}

#[derive(Debug, Deserialize)]
struct UpstreamInterface {
    #[serde(rename = "_id")]
    id: serde_json::Value,
    name: String,
    addresses: Vec<String>,
    #[serde(default)]
    listen_port: Option<i64>,
    #[serde(default)]
    public_key: Option<String>,
}

// Peers are full interface records of the other network members; only the
// fields describing them as a peer are used.
#[derive(Debug, Deserialize)]
struct UpstreamPeer {
    #[serde(default)]
    public_key: Option<String>,
    #[serde(default)]
    allowed_ips: Vec<String>,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    persistent_keepalive: Option<i64>,
}

#[derive(Debug, Serialize)]
struct PublicKeyPatch<'a> {
    public_key: &'a str,
}

/// Config source backed by the uDPU API
#[derive(Debug, Clone)]
pub struct UdpuApi {
    api: ApiClient,
    network_name: String,
}

impl UdpuApi {
    /// Create a source for the server interface of `network_name`
    pub fn new(url: &str, network_name: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(url, timeout)?,
            network_name: network_name.to_string(),
        })
    }

    fn parse_from_upstream(upstream: UpstreamConfig) -> InterfaceConfig {
        let interface = upstream.interface;

        let mut config = InterfaceConfig::new(interface.name, interface.addresses);
        config.listen_port = interface.listen_port;
        config.peers = upstream
            .peers
            .into_iter()
            .map(|peer| PeerConfig {
                public_key: peer.public_key,
                allowed_ips: peer.allowed_ips,
                endpoint: peer.endpoint,
                persistent_keepalive: peer.persistent_keepalive,
                preshared_key: None,
            })
            .collect();
        drop_keyless_peers(&config.name, &mut config.peers);

        if let Some(id) = id_to_string(&interface.id) {
            config.auxiliary_data.insert(AUX_ID.to_string(), id);
        }
        if let Some(public_key) = interface.public_key.filter(|k| !k.is_empty()) {
            config
                .auxiliary_data
                .insert(AUX_OLD_PUBLIC_KEY.to_string(), public_key);
        }

        config
    }
}

#[async_trait]
impl ConfigSource for UdpuApi {
    #[instrument(skip(self), fields(network = %self.network_name))]
    async fn get_config(&self) -> Result<Vec<InterfaceConfig>> {
        let path = format!("/v1/wireguard/config/server/{}", self.network_name);
        let upstream: UpstreamConfig = self.api.get_json(&path).await?;
        Ok(vec![Self::parse_from_upstream(upstream)])
    }

    #[instrument(skip(self, interface, public_key), fields(interface = interface.name()))]
    async fn patch_public_key(&self, interface: &Interface, public_key: &str) -> Result<()> {
        let id = interface.remote_id().ok_or_else(|| {
            KeymasterError::validation(
                "auxiliary_data.id",
                format!("interface {} has no upstream id to patch", interface.name()),
            )
        })?;

        self.api
            .patch_json(
                &format!("/v1/interfaces/server/{}", id),
                &PublicKeyPatch { public_key },
            )
            .await?;

        info!(public_key, "public key uploaded");
        Ok(())
    }
}
