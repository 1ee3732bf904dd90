//! Config schemes
//!
//! A config scheme materializes interfaces on the host and reads them back.
//! Two schemes are provided: [`WgScheme`] drives `ip` and `wg` and keeps the
//! private key in a config directory, [`UciScheme`] stores everything in
//! OpenWrt's UCI `network` package.

pub mod command;
mod uci;
mod wg;

pub use command::{CommandOutput, CommandRunner, SystemCommandRunner, DEFAULT_COMMAND_TIMEOUT};
pub use uci::UciScheme;
pub use wg::WgScheme;

use crate::error::{KeymasterError, Result};
use crate::wireguard::Interface;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// How interfaces are persisted on the host
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigScheme: Send + Sync {
    /// Short scheme name for logs
    fn name(&self) -> &'static str;

    /// Whether an interface called `name` exists
    async fn interface_exists(&self, name: &str) -> Result<bool>;

    /// Read the interface called `name`; `NotFound` when it does not exist
    async fn read(&self, name: &str) -> Result<Interface>;

    /// Create or update `interface`
    async fn write(&self, interface: &Interface) -> Result<()>;

    /// Remove the interface called `name`; removing an absent one succeeds
    async fn delete(&self, name: &str) -> Result<()>;

    /// Names of the interfaces this scheme manages
    async fn interface_names(&self) -> Result<Vec<String>>;
}

/// Scheme selection from the daemon configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeKind {
    /// UCI when available, otherwise `wg`
    #[default]
    Auto,
    /// [`WgScheme`]
    Wg,
    /// [`UciScheme`]
    Uci,
}

impl fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemeKind::Auto => write!(f, "auto"),
            SchemeKind::Wg => write!(f, "wg"),
            SchemeKind::Uci => write!(f, "uci"),
        }
    }
}

/// Host tools available to the schemes, probed once at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// `wg` is installed
    pub wg: bool,
    /// `ip` is installed
    pub ip: bool,
    /// `uci` is installed
    pub uci: bool,
}

impl Capabilities {
    /// Probe the host with `which`
    pub async fn probe(runner: &dyn CommandRunner) -> Self {
        let capabilities = Self {
            wg: has_tool(runner, "wg").await,
            ip: has_tool(runner, "ip").await,
            uci: has_tool(runner, "uci").await,
        };
        debug!(?capabilities, "probed host capabilities");
        capabilities
    }

    /// Resolve `Auto` to a concrete scheme
    pub fn resolve(&self, kind: SchemeKind) -> SchemeKind {
        match kind {
            SchemeKind::Auto if self.uci => SchemeKind::Uci,
            SchemeKind::Auto => SchemeKind::Wg,
            other => other,
        }
    }

    fn missing_for(&self, kind: SchemeKind) -> Vec<&'static str> {
        let required = match kind {
            SchemeKind::Uci => vec![("uci", self.uci)],
            _ => vec![("wg", self.wg), ("ip", self.ip)],
        };
        required
            .into_iter()
            .filter(|(_, present)| !present)
            .map(|(tool, _)| tool)
            .collect()
    }
}

async fn has_tool(runner: &dyn CommandRunner, tool: &str) -> bool {
    matches!(runner.run("which", &[tool], None).await, Ok(output) if output.success)
}

/// Build the scheme selected by `kind`
pub fn build_scheme(
    kind: SchemeKind,
    capabilities: Capabilities,
    config_dir: impl Into<PathBuf>,
    runner: Arc<dyn CommandRunner>,
) -> Result<Arc<dyn ConfigScheme>> {
    let resolved = capabilities.resolve(kind);

    let missing = capabilities.missing_for(resolved);
    if !missing.is_empty() {
        return Err(KeymasterError::Config(format!(
            "scheme {} requires missing tools: {}",
            resolved,
            missing.join(", ")
        )));
    }

    info!(requested = %kind, scheme = %resolved, "using config scheme");
    let scheme: Arc<dyn ConfigScheme> = match resolved {
        SchemeKind::Uci => Arc::new(UciScheme::new(runner)),
        _ => Arc::new(WgScheme::new(config_dir, runner)),
    };
    Ok(scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WhichRunner(&'static [&'static str]);

    #[async_trait]
    impl CommandRunner for WhichRunner {
        async fn run(&self, program: &str, args: &[&str], _: Option<&str>) -> Result<CommandOutput> {
            assert_eq!(program, "which");
            if self.0.contains(&args[0]) {
                Ok(CommandOutput::ok(format!("/usr/bin/{}\n", args[0])))
            } else {
                Ok(CommandOutput::failed(1, ""))
            }
        }
    }

    #[tokio::test]
    async fn test_probe() {
        let caps = Capabilities::probe(&WhichRunner(&["wg", "ip"])).await;
        assert_eq!(
            caps,
            Capabilities {
                wg: true,
                ip: true,
                uci: false
            }
        );
    }

    #[test]
    fn test_auto_prefers_uci() {
        let caps = Capabilities {
            wg: true,
            ip: true,
            uci: true,
        };
        assert_eq!(caps.resolve(SchemeKind::Auto), SchemeKind::Uci);
        assert_eq!(caps.resolve(SchemeKind::Wg), SchemeKind::Wg);

        let caps = Capabilities {
            uci: false,
            ..caps
        };
        assert_eq!(caps.resolve(SchemeKind::Auto), SchemeKind::Wg);
    }

    #[test]
    fn test_build_scheme() {
        let runner: Arc<dyn CommandRunner> = Arc::new(WhichRunner(&[]));
        let caps = Capabilities {
            wg: true,
            ip: true,
            uci: false,
        };

        let scheme = build_scheme(SchemeKind::Auto, caps, "/tmp/wg", runner.clone()).unwrap();
        assert_eq!(scheme.name(), "wg");

        let err = build_scheme(SchemeKind::Uci, caps, "/tmp/wg", runner.clone()).err().unwrap();
        assert!(matches!(err, KeymasterError::Config(msg) if msg.contains("uci")));

        let err = build_scheme(SchemeKind::Wg, Capabilities::default(), "/tmp/wg", runner)
            .err().unwrap();
        assert!(matches!(err, KeymasterError::Config(msg) if msg.contains("wg, ip")));
    }

    #[test]
    fn test_scheme_kind_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            kind: SchemeKind,
        }
        let w: Wrapper = toml::from_str(r#"kind = "uci""#).unwrap();
        assert_eq!(w.kind, SchemeKind::Uci);
        assert!(toml::from_str::<Wrapper>(r#"kind = "nmcli""#).is_err());
    }
}
