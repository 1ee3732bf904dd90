//! Configuration sources
//!
//! A config source declares the desired set of interfaces and is told which
//! public key is in effect for each of them. Sources never see private keys
//! they did not issue and never touch the local system.

mod http;
mod keymaster;
mod udpu;

pub use http::{validate_base_url, ApiClient, DEFAULT_REQUEST_TIMEOUT};
pub use keymaster::KeymasterServer;
pub use udpu::UdpuApi;

use crate::error::Result;
use crate::wireguard::{Interface, InterfaceConfig, PeerConfig};
use async_trait::async_trait;
use tracing::debug;

/// Source of desired interface state
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetch the desired interfaces.
    ///
    /// Returned configurations carry no private key; the reconciliation
    /// engine supplies one before validating them.
    async fn get_config(&self) -> Result<Vec<InterfaceConfig>>;

    /// Record `public_key` as the key now in effect for `interface`
    async fn patch_public_key(&self, interface: &Interface, public_key: &str) -> Result<()>;
}

/// Drop peer records that cannot identify a peer
pub(crate) fn drop_keyless_peers(interface: &str, peers: &mut Vec<PeerConfig>) {
    let before = peers.len();
    peers.retain(PeerConfig::has_public_key);
    let dropped = before - peers.len();
    if dropped > 0 {
        debug!(interface, dropped, "ignoring peers without a public key");
    }
}
