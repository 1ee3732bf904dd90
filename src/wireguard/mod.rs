//! WireGuard data model
//!
//! Interface and peer records with their validation rules, the WireGuard
//! configuration file codec, and the key-material capability.

pub mod codec;
mod interface;
mod keys;
mod peer;
pub mod validation;

pub use interface::{AuxiliaryData, Interface, InterfaceConfig, AUX_ID, AUX_OLD_PUBLIC_KEY};
pub use keys::{KeyMaterial, PrivateKey, PublicKey, X25519Keys};
pub use peer::{Peer, PeerConfig};

#[cfg(test)]
pub use keys::MockKeyMaterial;
