//! Outcome of one reconciliation cycle

use crate::error::KeymasterError;
use std::fmt;

/// Step of the cycle that failed for an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Reading the current interface from the scheme
    Read,
    /// Assembling and validating the desired interface
    Validate,
    /// Generating a private key for a new interface
    GenerateKey,
    /// Deriving the public key of the effective private key
    DeriveKey,
    /// Writing the interface to the scheme
    Write,
    /// Deleting the interface from the scheme
    Delete,
    /// Reporting the public key to the source
    PatchPublicKey,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Read => "read",
            Operation::Validate => "validate",
            Operation::GenerateKey => "generate_key",
            Operation::DeriveKey => "derive_key",
            Operation::Write => "write",
            Operation::Delete => "delete",
            Operation::PatchPublicKey => "patch_public_key",
        };
        f.write_str(name)
    }
}

/// A failed step for one interface
#[derive(Debug)]
pub struct InterfaceFailure {
    /// Interface name
    pub interface: String,
    /// Step that failed
    pub operation: Operation,
    /// The failure
    pub error: KeymasterError,
}

impl fmt::Display for InterfaceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} failed: {}", self.interface, self.operation, self.error)
    }
}

/// What one cycle did, interface by interface
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Interfaces written for the first time
    pub created: Vec<String>,
    /// Existing interfaces rewritten because they differed or were missing from the host
    pub updated: Vec<String>,
    /// Existing interfaces already in the desired state
    pub unchanged: Vec<String>,
    /// Interfaces removed because the source no longer lists them
    pub deleted: Vec<String>,
    /// Interfaces whose public key was reported to the source
    pub patched: Vec<String>,
    /// Steps that failed, in the order they happened
    pub failures: Vec<InterfaceFailure>,
}

impl SyncReport {
    /// Whether every step of the cycle succeeded
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether the cycle changed anything locally or remotely
    pub fn has_changes(&self) -> bool {
        !(self.created.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
            && self.patched.is_empty())
    }

    pub(crate) fn record_failure(
        &mut self,
        interface: impl Into<String>,
        operation: Operation,
        error: KeymasterError,
    ) {
        self.failures.push(InterfaceFailure {
            interface: interface.into(),
            operation,
            error,
        });
    }

    /// Failure recorded for `interface`, if any
    pub fn failure_for(&self, interface: &str) -> Option<&InterfaceFailure> {
        self.failures.iter().find(|f| f.interface == interface)
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created={} updated={} unchanged={} deleted={} patched={} failed={}",
            self.created.len(),
            self.updated.len(),
            self.unchanged.len(),
            self.deleted.len(),
            self.patched.len(),
            self.failures.len()
        )
    }
}
