//! Reconciliation engine
//!
//! One call to [`Reconciler::sync`] is one cycle: read the interfaces the
//! scheme currently manages, fetch the desired set from the source, delete
//! what is no longer desired, write what is new or different, and report
//! public keys the source does not know yet.
//!
//! Failures are isolated per interface. Only listing the current interfaces
//! or fetching the desired set aborts the cycle; anything else is recorded in
//! the [`SyncReport`] and the cycle moves on to the next interface.

mod report;

pub use report::{InterfaceFailure, Operation, SyncReport};

use crate::error::{KeymasterError, Result};
use crate::scheme::ConfigScheme;
use crate::source::ConfigSource;
use crate::wireguard::{Interface, InterfaceConfig, KeyMaterial};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Default bound on a single source or scheme call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

type StepResult<T> = std::result::Result<T, (Operation, KeymasterError)>;

fn failed(operation: Operation) -> impl FnOnce(KeymasterError) -> (Operation, KeymasterError) {
    move |error| (operation, error)
}

/// Interfaces read from the scheme at the start of a cycle
#[derive(Debug, Default)]
struct CurrentState {
    interfaces: BTreeMap<String, Interface>,
    // Listed but unreadable; only deleted, never rewritten
    unreadable: BTreeSet<String>,
}

impl CurrentState {
    /// Every listed name, readable or not
    fn names(&self) -> impl Iterator<Item = &String> {
        self.interfaces.keys().chain(self.unreadable.iter())
    }
}

/// Drives the scheme toward the state declared by the source
pub struct Reconciler {
    source: Arc<dyn ConfigSource>,
    scheme: Arc<dyn ConfigScheme>,
    keys: Arc<dyn KeyMaterial>,
    forced_private_key: Option<String>,
    call_timeout: Duration,
}

impl Reconciler {
    /// Create a reconciler over the given capabilities
    pub fn new(
        source: Arc<dyn ConfigSource>,
        scheme: Arc<dyn ConfigScheme>,
        keys: Arc<dyn KeyMaterial>,
    ) -> Self {
        Self {
            source,
            scheme,
            keys,
            forced_private_key: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Use `private_key` for every interface, replacing stored keys
    pub fn with_forced_private_key(mut self, private_key: Option<String>) -> Self {
        self.forced_private_key = private_key;
        self
    }

    /// Bound every source and scheme call by `timeout`
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    async fn call<T, F>(&self, what: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.call_timeout, future)
            .await
            .map_err(|_| {
                KeymasterError::Timeout(format!(
                    "{} did not complete within {:?}",
                    what, self.call_timeout
                ))
            })?
    }

    /// Run one reconciliation cycle
    #[instrument(skip(self), fields(scheme = self.scheme.name()))]
    pub async fn sync(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        let current = self.read_current(&mut report).await?;
        debug!(
            current = current.interfaces.len(),
            unreadable = current.unreadable.len(),
            "read current interfaces"
        );

        let desired = self.call("get_config", self.source.get_config()).await?;
        let desired = dedupe(desired, &mut report);
        debug!(desired = desired.len(), "fetched desired interfaces");

        let desired_names: HashSet<&str> = desired.iter().map(|c| c.name.as_str()).collect();
        for name in current.names() {
            if desired_names.contains(name.as_str()) {
                continue;
            }
            match self.call("delete", self.scheme.delete(name)).await {
                Ok(()) => {
                    info!(interface = %name, "interface deleted");
                    report.deleted.push(name.clone());
                }
                Err(e) => {
                    warn!(interface = %name, error = %e, "failed to delete interface");
                    report.record_failure(name.clone(), Operation::Delete, e);
                }
            }
        }

        for config in desired {
            let name = config.name.clone();
            if current.unreadable.contains(&name) {
                debug!(interface = %name, "skipping unreadable interface");
                continue;
            }
            let existing = current.interfaces.get(&name);
            if let Err((operation, e)) = self.converge(config, existing, &mut report).await {
                warn!(interface = %name, %operation, error = %e, "failed to reconcile interface");
                report.record_failure(name, operation, e);
            }
        }

        info!(%report, "sync complete");
        Ok(report)
    }

    async fn read_current(&self, report: &mut SyncReport) -> Result<CurrentState> {
        let names = self
            .call("interface_names", self.scheme.interface_names())
            .await?;

        let mut state = CurrentState::default();
        for name in names {
            match self.call("read", self.scheme.read(&name)).await {
                Ok(interface) => {
                    state.interfaces.insert(name, interface);
                }
                // Disappeared between listing and reading
                Err(e) if e.is_not_found() => {
                    debug!(interface = %name, "interface vanished before it could be read");
                }
                Err(e) => {
                    warn!(interface = %name, error = %e, "failed to read interface");
                    state.unreadable.insert(name.clone());
                    report.record_failure(name, Operation::Read, e);
                }
            }
        }
        Ok(state)
    }

    fn effective_private_key(&self, existing: Option<&Interface>) -> StepResult<String> {
        if let Some(forced) = &self.forced_private_key {
            return Ok(forced.clone());
        }
        match existing {
            Some(interface) => Ok(interface.private_key().to_string()),
            None => self
                .keys
                .generate_private_key()
                .map_err(failed(Operation::GenerateKey)),
        }
    }

    async fn converge(
        &self,
        config: InterfaceConfig,
        existing: Option<&Interface>,
        report: &mut SyncReport,
    ) -> StepResult<()> {
        let private_key = self.effective_private_key(existing)?;
        let desired =
            Interface::try_from(config.with_private_key(private_key)).map_err(failed(Operation::Validate))?;
        let name = desired.name().to_string();

        match existing {
            None => {
                self.call("write", self.scheme.write(&desired))
                    .await
                    .map_err(failed(Operation::Write))?;
                info!(interface = %name, "interface created");
                report.created.push(name.clone());
            }
            Some(current) => {
                // Stored configuration can outlive the live device (e.g. a reboot)
                let live = self
                    .call("interface_exists", self.scheme.interface_exists(&name))
                    .await
                    .map_err(failed(Operation::Read))?;

                if !live || *current != desired {
                    self.call("write", self.scheme.write(&desired))
                        .await
                        .map_err(failed(Operation::Write))?;
                    info!(interface = %name, live, "interface updated");
                    report.updated.push(name.clone());
                } else {
                    debug!(interface = %name, "interface unchanged");
                    report.unchanged.push(name.clone());
                }
            }
        }

        let public_key = self
            .keys
            .derive_public_key(desired.private_key())
            .map_err(failed(Operation::DeriveKey))?;

        if desired.last_known_public_key() != Some(public_key.as_str()) {
            self.call(
                "patch_public_key",
                self.source.patch_public_key(&desired, &public_key),
            )
            .await
            .map_err(failed(Operation::PatchPublicKey))?;
            info!(interface = %name, %public_key, "public key reported to source");
            report.patched.push(name);
        }

        Ok(())
    }
}

/// Keep the first desired interface of each name
fn dedupe(desired: Vec<InterfaceConfig>, report: &mut SyncReport) -> Vec<InterfaceConfig> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(desired.len());
    for config in desired {
        if seen.insert(config.name.clone()) {
            unique.push(config);
        } else {
            warn!(interface = %config.name, "duplicate interface in desired state");
            report.record_failure(
                config.name.clone(),
                Operation::Validate,
                KeymasterError::validation("name", format!("duplicate interface {}", config.name)),
            );
        }
    }
    unique
}
