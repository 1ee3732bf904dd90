//! keymaster-agent: WireGuard reconciliation daemon
//!
//! This library keeps the WireGuard interfaces of a host in sync with the
//! desired state published by a remote configuration source.
//!
//! # Architecture
//!
//! The agent periodically fetches the interfaces a source (keymaster-server
//! or the uDPU API) declares for this host, compares them with what a config
//! scheme (`wg` + `ip`, or OpenWrt UCI) currently has, and converges the host
//! toward the desired state. Private keys are generated locally and never
//! leave the host; only the derived public key is reported back.
//!
//! # Modules
//!
//! - `config`: Daemon configuration file parsing and validation
//! - `wireguard`: Interface/peer model, config file codec and key material
//! - `source`: Config sources (desired state)
//! - `scheme`: Config schemes (current state on the host)
//! - `reconcile`: The reconciliation engine
//! - `daemon`: Periodic sync loop
//! - `error`: Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod daemon;
pub mod error;
pub mod reconcile;
pub mod scheme;
pub mod source;
pub mod wireguard;

// Re-export commonly used types
pub use error::{KeymasterError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
