//! keymaster-server config source
//!
//! `GET /api/configs/` returns every interface this host should run, each
//! record carrying the server-side `id` and the `public_key` the server
//! currently holds for it.

use crate::error::{KeymasterError, Result};
use crate::source::http::{id_to_string, ApiClient};
use crate::source::{drop_keyless_peers, ConfigSource};
use crate::wireguard::{Interface, InterfaceConfig, AUX_ID, AUX_OLD_PUBLIC_KEY};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Interface record as served by keymaster-server
#[derive(Debug, Deserialize)]
struct RemoteInterface {
    id: serde_json::Value,
    #[serde(default)]
    public_key: Option<String>,
    #[serde(flatten)]
    config: InterfaceConfig,
}

#[derive(Debug, Serialize)]
struct PublicKeyPatch<'a> {
    public_key: &'a str,
}

/// Config source backed by keymaster-server
#[derive(Debug, Clone)]
pub struct KeymasterServer {
    api: ApiClient,
}

impl KeymasterServer {
    /// Create a source for the server at `url`, authenticating with `token`
    pub fn new(url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let api = ApiClient::new(url, timeout)?.with_authorization(format!("Token {}", token));
        Ok(Self { api })
    }

    fn into_config(remote: RemoteInterface) -> InterfaceConfig {
        let mut config = remote.config;
        // Private keys never come from the server
        config.private_key = None;
        if let Some(id) = id_to_string(&remote.id) {
            config.auxiliary_data.insert(AUX_ID.to_string(), id);
        }
        if let Some(public_key) = remote.public_key.filter(|k| !k.is_empty()) {
            config
                .auxiliary_data
                .insert(AUX_OLD_PUBLIC_KEY.to_string(), public_key);
        }
        drop_keyless_peers(&config.name, &mut config.peers);
        config
    }
}

#[async_trait]
impl ConfigSource for KeymasterServer {
    #[instrument(skip(self), fields(server = %self.api.base_url()))]
    async fn get_config(&self) -> Result<Vec<InterfaceConfig>> {
        let remote: Vec<RemoteInterface> = self.api.get_json("/api/configs/").await?;
        debug!(count = remote.len(), "fetched interface configs");
        Ok(remote.into_iter().map(Self::into_config).collect())
    }

    #[instrument(skip(self, interface, public_key), fields(interface = interface.name()))]
    async fn patch_public_key(&self, interface: &Interface, public_key: &str) -> Result<()> {
        let id = interface.remote_id().ok_or_else(|| {
            KeymasterError::validation(
                "auxiliary_data.id",
                format!("interface {} has no server id to patch", interface.name()),
            )
        })?;

        self.api
            .patch_json(&format!("/api/interfaces/{}/", id), &PublicKeyPatch { public_key })
            .await?;

        info!(public_key, "public key uploaded");
        Ok(())
    }
}
