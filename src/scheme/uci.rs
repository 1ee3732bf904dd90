//! OpenWrt UCI config scheme
//!
//! An interface `X` is a section `network.X=interface` with
//! `proto='wireguard'`; its peers are sections of type `wireguard_X`,
//! written as `X_peer0`, `X_peer1`, ... in peer order. netifd builds the
//! device from this configuration, so the scheme never touches `ip` or `wg`.

use crate::error::{KeymasterError, Result};
use crate::scheme::command::CommandRunner;
use crate::scheme::ConfigScheme;
use crate::wireguard::{Interface, InterfaceConfig, PeerConfig};
use async_trait::async_trait;
use std::fmt::Write as FmtWrite;
use std::sync::Arc;
use tracing::{debug, info};

const PACKAGE: &str = "network";
const WIREGUARD_PROTO: &str = "wireguard";
const DEFAULT_ENDPOINT_PORT: &str = "51820";

/// Section header line of `uci show`: `network.<name>=<type>`
#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    kind: String,
    proto: Option<String>,
}

/// Sections of the `network` package in file order
fn parse_show(output: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();

    for line in output.lines() {
        let Some((path, value)) = line.trim().split_once('=') else {
            continue;
        };
        let Some(path) = path.strip_prefix("network.") else {
            continue;
        };
        let value = unquote(value);

        match path.split_once('.') {
            None => sections.push(Section {
                name: path.to_string(),
                kind: value.to_string(),
                proto: None,
            }),
            Some((name, "proto")) => {
                if let Some(section) = sections.iter_mut().find(|s| s.name == name) {
                    section.proto = Some(value.to_string());
                }
            }
            Some(_) => {}
        }
    }

    sections
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
}

/// Quote a value for a `uci batch` script
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn peer_section_type(interface: &str) -> String {
    format!("wireguard_{}", interface)
}

fn parse_integer(field: &str, value: &str) -> Result<i64> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => value.parse::<i64>(),
    };
    parsed.map_err(|_| KeymasterError::validation(field, format!("'{}' is not an integer", value)))
}

/// Batch script that replaces `interface` and its peers
fn write_script(interface: &Interface, stale_sections: &[String]) -> String {
    let name = interface.name();
    let mut script = String::new();

    for section in stale_sections {
        let _ = writeln!(script, "delete {}.{}", PACKAGE, section);
    }

    let _ = writeln!(script, "set {}.{}=interface", PACKAGE, name);
    let _ = writeln!(script, "set {}.{}.proto={}", PACKAGE, name, quote(WIREGUARD_PROTO));
    let _ = writeln!(
        script,
        "set {}.{}.private_key={}",
        PACKAGE,
        name,
        quote(interface.private_key())
    );
    for address in interface.addresses() {
        let _ = writeln!(script, "add_list {}.{}.addresses={}", PACKAGE, name, quote(address));
    }
    if let Some(port) = interface.listen_port() {
        let _ = writeln!(script, "set {}.{}.listen_port={}", PACKAGE, name, quote(&port.to_string()));
    }
    if let Some(mark) = interface.fw_mark() {
        let _ = writeln!(script, "set {}.{}.fwmark={}", PACKAGE, name, quote(&mark.to_string()));
    }

    for (i, peer) in interface.peers().iter().enumerate() {
        let section = format!("{}.{}_peer{}", PACKAGE, name, i);
        let _ = writeln!(script, "set {}={}", section, peer_section_type(name));
        let _ = writeln!(script, "set {}.public_key={}", section, quote(peer.public_key()));
        for allowed_ip in peer.allowed_ips() {
            let _ = writeln!(script, "add_list {}.allowed_ips={}", section, quote(allowed_ip));
        }
        if let Some((host, port)) = peer.endpoint_parts() {
            let _ = writeln!(script, "set {}.endpoint_host={}", section, quote(host));
            let _ = writeln!(script, "set {}.endpoint_port={}", section, quote(port));
        }
        if let Some(psk) = peer.preshared_key() {
            let _ = writeln!(script, "set {}.preshared_key={}", section, quote(psk));
        }
        if let Some(keepalive) = peer.persistent_keepalive() {
            let _ = writeln!(
                script,
                "set {}.persistent_keepalive={}",
                section,
                quote(&keepalive.to_string())
            );
        }
    }

    let _ = writeln!(script, "commit {}", PACKAGE);
    script
}

/// Config scheme backed by UCI
pub struct UciScheme {
    runner: Arc<dyn CommandRunner>,
}

impl UciScheme {
    /// Create a scheme running `uci` through `runner`
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn show(&self) -> Result<Vec<Section>> {
        let output = self.runner.run_checked("uci", &["show", PACKAGE], None).await?;
        Ok(parse_show(&output))
    }

    /// `uci -q get`; a failed lookup means the option is unset
    async fn get(&self, path: &str) -> Result<Option<String>> {
        let output = self.runner.run("uci", &["-q", "get", path], None).await?;
        if !output.success {
            return Ok(None);
        }
        let value = output.stdout.trim();
        Ok((!value.is_empty()).then(|| value.to_string()))
    }

    async fn get_option(&self, section: &str, option: &str) -> Result<Option<String>> {
        self.get(&format!("{}.{}.{}", PACKAGE, section, option)).await
    }

    async fn get_list(&self, section: &str, option: &str) -> Result<Vec<String>> {
        Ok(self
            .get_option(section, option)
            .await?
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default())
    }

    async fn get_integer(&self, section: &str, option: &str) -> Result<Option<i64>> {
        self.get_option(section, option)
            .await?
            .map(|value| parse_integer(option, &value))
            .transpose()
    }

    async fn read_peer(&self, section: &str) -> Result<PeerConfig> {
        let endpoint_host = self.get_option(section, "endpoint_host").await?;
        let endpoint_port = self.get_option(section, "endpoint_port").await?;
        let endpoint = endpoint_host.map(|host| {
            format!(
                "{}:{}",
                host,
                endpoint_port.as_deref().unwrap_or(DEFAULT_ENDPOINT_PORT)
            )
        });

        Ok(PeerConfig {
            public_key: self.get_option(section, "public_key").await?,
            allowed_ips: self.get_list(section, "allowed_ips").await?,
            endpoint,
            persistent_keepalive: self.get_integer(section, "persistent_keepalive").await?,
            preshared_key: self.get_option(section, "preshared_key").await?,
        })
    }

    /// Sections belonging to `name`: its peers, then the interface itself
    fn owned_sections(sections: &[Section], name: &str) -> Vec<String> {
        let peer_type = peer_section_type(name);
        let mut owned: Vec<String> = sections
            .iter()
            .filter(|s| s.kind == peer_type)
            .map(|s| s.name.clone())
            .collect();
        if sections.iter().any(|s| s.name == name) {
            owned.push(name.to_string());
        }
        owned
    }

    async fn batch(&self, script: &str) -> Result<()> {
        self.runner.run_checked("uci", &["batch"], Some(script)).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigScheme for UciScheme {
    fn name(&self) -> &'static str {
        "uci"
    }

    async fn interface_exists(&self, name: &str) -> Result<bool> {
        let kind = self.get(&format!("{}.{}", PACKAGE, name)).await?;
        if kind.as_deref() != Some("interface") {
            return Ok(false);
        }
        let proto = self.get_option(name, "proto").await?;
        Ok(proto.as_deref() == Some(WIREGUARD_PROTO))
    }

    async fn read(&self, name: &str) -> Result<Interface> {
        if !self.interface_exists(name).await? {
            return Err(KeymasterError::NotFound(format!(
                "{}.{} is not a wireguard interface",
                PACKAGE, name
            )));
        }

        let peer_type = peer_section_type(name);
        let mut peers = Vec::new();
        for section in self.show().await?.iter().filter(|s| s.kind == peer_type) {
            peers.push(self.read_peer(&section.name).await?);
        }

        let config = InterfaceConfig {
            name: name.to_string(),
            addresses: self.get_list(name, "addresses").await?,
            private_key: self.get_option(name, "private_key").await?,
            listen_port: self.get_integer(name, "listen_port").await?,
            fw_mark: self.get_integer(name, "fwmark").await?,
            peers,
            auxiliary_data: Default::default(),
        };

        Interface::try_from(config)
    }

    async fn write(&self, interface: &Interface) -> Result<()> {
        let sections = self.show().await?;
        let stale = Self::owned_sections(&sections, interface.name());
        debug!(interface = interface.name(), stale = stale.len(), "replacing uci sections");

        self.batch(&write_script(interface, &stale)).await?;
        info!(interface = interface.name(), "uci configuration committed");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let sections = self.show().await?;
        let owned = Self::owned_sections(&sections, name);
        if owned.is_empty() {
            return Ok(());
        }

        let mut script = String::new();
        for section in &owned {
            let _ = writeln!(script, "delete {}.{}", PACKAGE, section);
        }
        let _ = writeln!(script, "commit {}", PACKAGE);

        self.batch(&script).await?;
        info!(interface = name, "uci configuration removed");
        Ok(())
    }

    async fn interface_names(&self) -> Result<Vec<String>> {
        Ok(self
            .show()
            .await?
            .into_iter()
            .filter(|s| s.kind == "interface" && s.proto.as_deref() == Some(WIREGUARD_PROTO))
            .map(|s| s.name)
            .collect())
    }
}
