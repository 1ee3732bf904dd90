//! `wg` + `ip` config scheme
//!
//! Interface state lives in three places: the link and its addresses (via
//! `ip`), the live WireGuard configuration (via `wg setconf`), and a
//! `<name>.conf` file in the config directory. The file is needed because
//! `wg show` never reveals the private key; its presence is also what marks
//! an interface as managed by this agent. The file also records the
//! interface addresses in a leading comment so that an interface whose link
//! vanished (after a reboot, say) can still be read back with its key.

use crate::error::{KeymasterError, Result};
use crate::scheme::command::CommandRunner;
use crate::scheme::ConfigScheme;
use crate::wireguard::{codec, Interface};
use async_trait::async_trait;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const CONF_EXTENSION: &str = "conf";
const ADDRESS_COMMENT: &str = "# Address = ";

/// One entry of `ip -br -j address`
#[derive(Debug, Deserialize)]
struct LinkAddresses {
    ifname: String,
    #[serde(default)]
    addr_info: Vec<AddressInfo>,
}

#[derive(Debug, Deserialize)]
struct AddressInfo {
    local: String,
    prefixlen: u8,
}

/// Addresses configured on `name`, as `<ip>/<prefixlen>`
fn parse_address_list(json: &str, name: &str) -> Result<Vec<String>> {
    let links: Vec<LinkAddresses> = serde_json::from_str(json)?;
    Ok(links
        .into_iter()
        .filter(|link| link.ifname == name)
        .flat_map(|link| link.addr_info)
        .map(|addr| format!("{}/{}", addr.local, addr.prefixlen))
        .collect())
}

/// Addresses recorded in a config file's `# Address = ` comment
fn recorded_addresses(text: &str) -> Vec<String> {
    text.lines()
        .find_map(|line| line.trim().strip_prefix(ADDRESS_COMMENT))
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|address| !address.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Config file contents: the address comment followed by the codec output
fn config_file_text(interface: &Interface) -> String {
    format!(
        "{}{}\n{}",
        ADDRESS_COMMENT,
        interface.addresses().join(", "),
        codec::serialize(interface)
    )
}

/// Config scheme driving `ip` and `wg`
pub struct WgScheme {
    config_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl WgScheme {
    /// Create a scheme keeping its config files in `config_dir`
    pub fn new(config_dir: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config_dir: config_dir.into(),
            runner,
        }
    }

    /// Directory holding the managed config files
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.config_dir.join(format!("{}.{}", name, CONF_EXTENSION))
    }

    async fn address_list(&self, name: &str) -> Result<Vec<String>> {
        let json = self
            .runner
            .run_checked("ip", &["-br", "-j", "address"], None)
            .await?;
        parse_address_list(&json, name)
    }

    async fn sync_addresses(&self, interface: &Interface) -> Result<()> {
        let name = interface.name();
        let current = self.address_list(name).await?;

        for address in interface.addresses() {
            if !current.contains(address) {
                debug!(interface = name, %address, "adding address");
                self.runner
                    .run_checked("ip", &["address", "add", address, "dev", name], None)
                    .await?;
            }
        }
        for address in &current {
            if !interface.addresses().contains(address) {
                debug!(interface = name, %address, "removing address");
                self.runner
                    .run_checked("ip", &["address", "del", address, "dev", name], None)
                    .await?;
            }
        }
        Ok(())
    }

    async fn write_config_file(&self, interface: &Interface) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.config_dir).await?;

        let path = self.config_path(interface.name());
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&path).await?;
        file.write_all(config_file_text(interface).as_bytes()).await?;
        file.flush().await?;

        // The mode above only applies to newly created files
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        Ok(path)
    }
}

#[async_trait]
impl ConfigScheme for WgScheme {
    fn name(&self) -> &'static str {
        "wg"
    }

    async fn interface_exists(&self, name: &str) -> Result<bool> {
        let output = self.runner.run("ip", &["link", "show", name], None).await?;
        Ok(output.success)
    }

    async fn read(&self, name: &str) -> Result<Interface> {
        let path = self.config_path(name);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(KeymasterError::NotFound(format!(
                    "{} has no config file at {}",
                    name,
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let addresses = if self.interface_exists(name).await? {
            self.address_list(name).await?
        } else {
            debug!(interface = name, "link is missing, using recorded addresses");
            recorded_addresses(&text)
        };
        codec::parse(name, &addresses, &text)
    }

    async fn write(&self, interface: &Interface) -> Result<()> {
        let name = interface.name();

        if !self.interface_exists(name).await? {
            info!(interface = name, "creating link");
            self.runner
                .run_checked("ip", &["link", "add", name, "type", "wireguard"], None)
                .await?;
        }

        self.sync_addresses(interface).await?;

        self.runner
            .run_checked("ip", &["link", "set", name, "up"], None)
            .await?;

        let path = self.write_config_file(interface).await?;
        let path = path.to_string_lossy();
        self.runner
            .run_checked("wg", &["setconf", name, &path], None)
            .await?;

        debug!(interface = name, "configuration loaded");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        if self.interface_exists(name).await? {
            info!(interface = name, "deleting link");
            self.runner
                .run_checked("ip", &["link", "delete", name], None)
                .await?;
        }

        match tokio::fs::remove_file(self.config_path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn interface_names(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.config_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CONF_EXTENSION) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IP_BRIEF: &str = r#"[
        {"ifname": "lo", "operstate": "UNKNOWN", "addr_info": [
            {"local": "127.0.0.1", "prefixlen": 8},
            {"local": "::1", "prefixlen": 128}
        ]},
        {"ifname": "wg0", "operstate": "UNKNOWN", "addr_info": [
            {"local": "10.0.0.1", "prefixlen": 24},
            {"local": "fd00::1", "prefixlen": 64}
        ]},
        {"ifname": "eth0", "operstate": "DOWN"}
    ]"#;

    #[test]
    fn test_parse_address_list() {
        assert_eq!(
            parse_address_list(IP_BRIEF, "wg0").unwrap(),
            ["10.0.0.1/24", "fd00::1/64"]
        );
        assert!(parse_address_list(IP_BRIEF, "eth0").unwrap().is_empty());
        assert!(parse_address_list(IP_BRIEF, "wg9").unwrap().is_empty());
    }

    #[test]
    fn test_recorded_addresses() {
        let text = "# Address = 10.0.0.1/24, fd00::1/64\n[Interface]\nPrivateKey = k\n";
        assert_eq!(recorded_addresses(text), ["10.0.0.1/24", "fd00::1/64"]);
        assert!(recorded_addresses("[Interface]\nPrivateKey = k\n").is_empty());
        assert!(recorded_addresses("# Address = \n").is_empty());
    }

    #[test]
    fn test_parse_address_list_rejects_garbage() {
        assert!(matches!(
            parse_address_list("not json", "wg0"),
            Err(KeymasterError::Serialization(_))
        ));
    }
}
