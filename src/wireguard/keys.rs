//! WireGuard key material
//!
//! The reconciliation engine treats keys as opaque base64 strings and reaches
//! key generation and public-key derivation only through the [`KeyMaterial`]
//! capability. [`X25519Keys`] implements it natively with x25519, producing
//! the same encoding as `wg genkey` / `wg pubkey`.

use crate::error::{KeymasterError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::fmt;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// Key generation and derivation capability
#[cfg_attr(test, mockall::automock)]
pub trait KeyMaterial: Send + Sync {
    /// Generate a new base64-encoded private key
    fn generate_private_key(&self) -> Result<String>;

    /// Derive the base64-encoded public key for a base64-encoded private key
    fn derive_public_key(&self, private_key: &str) -> Result<String>;
}

/// Native x25519 key material
#[derive(Debug, Clone, Copy, Default)]
pub struct X25519Keys;

impl X25519Keys {
    /// Create the native key capability
    pub fn new() -> Self {
        Self
    }
}

impl KeyMaterial for X25519Keys {
    fn generate_private_key(&self) -> Result<String> {
        Ok(PrivateKey::generate().to_base64())
    }

    fn derive_public_key(&self, private_key: &str) -> Result<String> {
        Ok(PrivateKey::from_base64(private_key)?.public_key().to_base64())
    }
}

/// WireGuard private key (32 bytes, x25519)
#[derive(Clone)]
pub struct PrivateKey {
    secret: Zeroizing<[u8; 32]>,
}

impl PrivateKey {
    /// Generate a new random private key
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        Self {
            secret: Zeroizing::new(secret.to_bytes()),
        }
    }

    /// Parse a private key from base64-encoded string
    pub fn from_base64(s: &str) -> Result<Self> {
        let decoded = Zeroizing::new(
            BASE64
                .decode(s.trim())
                .map_err(|e| KeymasterError::KeyMaterial(format!("Invalid base64 private key: {}", e)))?,
        );

        if decoded.len() != 32 {
            return Err(KeymasterError::KeyMaterial(format!(
                "Invalid private key length: expected 32 bytes, got {}",
                decoded.len()
            )));
        }

        let mut bytes = Zeroizing::new([0u8; 32]);
        bytes.copy_from_slice(&decoded);
        Ok(Self { secret: bytes })
    }

    /// Convert to base64-encoded string
    pub fn to_base64(&self) -> String {
        BASE64.encode(*self.secret)
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(*self.secret);
        let public = X25519PublicKey::from(&secret);
        PublicKey {
            key: public.to_bytes(),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

/// WireGuard public key (32 bytes, x25519)
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey {
    key: [u8; 32],
}

impl PublicKey {
    /// Convert to base64-encoded string
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.key)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}
