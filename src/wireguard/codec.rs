//! WireGuard configuration file format
//!
//! Reads and writes the `[Interface]` / `[Peer]` key=value format understood
//! by `wg setconf`. The format carries neither the interface name nor its
//! addresses, so callers supply both when parsing.
//!
//! Parsing is lenient about layout (files may have been edited by hand):
//! every space and tab is dropped before a line is looked at, `\r\n` line
//! endings are accepted, and comments, lines before the first section header
//! and unknown keys are ignored.

use crate::error::{KeymasterError, Result};
use crate::wireguard::interface::{Interface, InterfaceConfig};
use crate::wireguard::peer::PeerConfig;
use std::fmt::Write as FmtWrite;

const INTERFACE_HEADER: &str = "[Interface]";
const PEER_HEADER: &str = "[Peer]";

/// A non-blank line with its 1-based line number
#[derive(Debug)]
struct Line {
    number: usize,
    text: String,
}

impl Line {
    /// Split into key and value on the first `=`
    fn key_value(&self) -> Result<(&str, &str)> {
        self.text.split_once('=').ok_or_else(|| {
            KeymasterError::parse(self.number, format!("expected key = value, found '{}'", self.text))
        })
    }

    fn integer(&self, key: &str, value: &str) -> Result<i64> {
        let parsed = match value.strip_prefix("0x") {
            Some(hex) => i64::from_str_radix(hex, 16),
            None => value.parse::<i64>(),
        };
        parsed.map_err(|_| {
            KeymasterError::parse(self.number, format!("{} must be an integer, found '{}'", key, value))
        })
    }
}

/// Lines belonging to one `[Peer]` section
#[derive(Debug)]
struct PeerBlock {
    header_line: usize,
    lines: Vec<Line>,
}

/// The document split into its interface and peer sections
#[derive(Debug, Default)]
struct Sections {
    interface: Vec<Line>,
    peers: Vec<PeerBlock>,
}

enum Context {
    Preamble,
    Interface,
    Peer,
}

fn split_sections(text: &str) -> Sections {
    let mut sections = Sections::default();
    let mut context = Context::Preamble;

    for (index, raw) in text.lines().enumerate() {
        let stripped: String = raw
            .chars()
            .filter(|c| !matches!(c, ' ' | '\t' | '\r'))
            .collect();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        if stripped == INTERFACE_HEADER {
            context = Context::Interface;
            continue;
        }
        if stripped == PEER_HEADER {
            context = Context::Peer;
            sections.peers.push(PeerBlock {
                header_line: index + 1,
                lines: Vec::new(),
            });
            continue;
        }

        let line = Line {
            number: index + 1,
            text: stripped,
        };
        match context {
            Context::Preamble => {}
            Context::Interface => sections.interface.push(line),
            Context::Peer => {
                if let Some(block) = sections.peers.last_mut() {
                    block.lines.push(line);
                }
            }
        }
    }

    sections
}

fn parse_peer(block: &PeerBlock) -> Result<PeerConfig> {
    let mut peer = PeerConfig::default();
    let mut saw_allowed_ips = false;

    for line in &block.lines {
        let (key, value) = line.key_value()?;
        match key {
            "PublicKey" => peer.public_key = Some(value.to_string()),
            "AllowedIPs" => {
                saw_allowed_ips = true;
                peer.allowed_ips = value
                    .split(',')
                    .filter(|ip| !ip.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "Endpoint" => peer.endpoint = Some(value.to_string()),
            "PersistentKeepalive" => {
                peer.persistent_keepalive = Some(line.integer(key, value)?)
            }
            "PresharedKey" => peer.preshared_key = Some(value.to_string()),
            _ => {}
        }
    }

    if peer.public_key.is_none() {
        return Err(KeymasterError::parse(
            block.header_line,
            "[Peer] section is missing PublicKey",
        ));
    }
    if !saw_allowed_ips {
        return Err(KeymasterError::parse(
            block.header_line,
            "[Peer] section is missing AllowedIPs",
        ));
    }

    Ok(peer)
}

/// Parse a configuration file into an [`InterfaceConfig`] without validating it
pub fn parse_config(name: &str, addresses: &[String], text: &str) -> Result<InterfaceConfig> {
    let sections = split_sections(text);
    let mut config = InterfaceConfig::new(name, addresses.to_vec());

    for line in &sections.interface {
        let (key, value) = line.key_value()?;
        match key {
            "PrivateKey" => config.private_key = Some(value.to_string()),
            "ListenPort" => config.listen_port = Some(line.integer(key, value)?),
            "FwMark" if value == "off" => config.fw_mark = None,
            "FwMark" => config.fw_mark = Some(line.integer(key, value)?),
            _ => {}
        }
    }

    if config.private_key.is_none() {
        return Err(KeymasterError::parse(
            0,
            "[Interface] section is missing PrivateKey",
        ));
    }

    config.peers = sections
        .peers
        .iter()
        .map(parse_peer)
        .collect::<Result<Vec<_>>>()?;

    Ok(config)
}

/// Parse a configuration file into a validated [`Interface`]
pub fn parse(name: &str, addresses: &[String], text: &str) -> Result<Interface> {
    Interface::try_from(parse_config(name, addresses, text)?)
}

/// Serialize an interface to the configuration file format
///
/// Name and addresses are not part of the output.
pub fn serialize(interface: &Interface) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "{}", INTERFACE_HEADER);
    let _ = writeln!(out, "PrivateKey = {}", interface.private_key());
    if let Some(port) = interface.listen_port() {
        let _ = writeln!(out, "ListenPort = {}", port);
    }
    if let Some(mark) = interface.fw_mark() {
        let _ = writeln!(out, "FwMark = {}", mark);
    }

    for peer in interface.peers() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", PEER_HEADER);
        let _ = writeln!(out, "PublicKey = {}", peer.public_key());
        let _ = writeln!(out, "AllowedIPs = {}", peer.allowed_ips().join(", "));
        if let Some(endpoint) = peer.endpoint() {
            let _ = writeln!(out, "Endpoint = {}", endpoint);
        }
        if let Some(keepalive) = peer.persistent_keepalive() {
            let _ = writeln!(out, "PersistentKeepalive = {}", keepalive);
        }
        if let Some(psk) = peer.preshared_key() {
            let _ = writeln!(out, "PresharedKey = {}", psk);
        }
    }

    out
}
