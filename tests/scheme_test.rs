//! Config schemes driven through a scripted command runner

mod common;

use common::ScriptedRunner;
use keymaster_agent::error::KeymasterError;
use keymaster_agent::scheme::{CommandOutput, ConfigScheme, UciScheme, WgScheme};
use keymaster_agent::wireguard::{Interface, InterfaceConfig, PeerConfig};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn wg0() -> Interface {
    let mut config = InterfaceConfig::new("wg0", vec!["10.0.0.1/24".to_string()])
        .with_private_key("cHJpdmF0ZS1rZXktZm9yLXRlc3RzLW9ubHktMTIzNDU=");
    config.listen_port = Some(51820);
    let mut peer = PeerConfig::new("pk1", vec!["10.0.0.0/24".to_string()]);
    peer.endpoint = Some("vpn.example.com:51820".to_string());
    config.peers = vec![peer];
    Interface::new(config).unwrap()
}

fn addresses_json(name: &str, addresses: &[(&str, u8)]) -> CommandOutput {
    let info: Vec<String> = addresses
        .iter()
        .map(|(local, prefixlen)| format!(r#"{{"local": "{}", "prefixlen": {}}}"#, local, prefixlen))
        .collect();
    CommandOutput::ok(format!(
        r#"[{{"ifname": "lo", "addr_info": [{{"local": "127.0.0.1", "prefixlen": 8}}]}},
            {{"ifname": "{}", "addr_info": [{}]}}]"#,
        name,
        info.join(", ")
    ))
}

fn wg_scheme(dir: &Path, runner: &Arc<ScriptedRunner>) -> WgScheme {
    WgScheme::new(dir, runner.clone())
}

#[tokio::test]
async fn test_wg_write_creates_link_and_config() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(
        ScriptedRunner::default()
            .on("ip link show", CommandOutput::failed(1, "Device \"wg0\" does not exist."))
            .on("ip -br -j address", addresses_json("eth0", &[("192.168.1.5", 24)])),
    );
    let scheme = wg_scheme(dir.path(), &runner);

    scheme.write(&wg0()).await.unwrap();

    let conf = dir.path().join("wg0.conf");
    assert_eq!(
        runner.calls(),
        [
            "ip link show wg0".to_string(),
            "ip link add wg0 type wireguard".to_string(),
            "ip -br -j address".to_string(),
            "ip address add 10.0.0.1/24 dev wg0".to_string(),
            "ip link set wg0 up".to_string(),
            format!("wg setconf wg0 {}", conf.display()),
        ]
    );

    let text = std::fs::read_to_string(&conf).unwrap();
    assert!(text.contains("PrivateKey = cHJpdmF0ZS1rZXktZm9yLXRlc3RzLW9ubHktMTIzNDU="));
    assert!(text.contains("Endpoint = vpn.example.com:51820"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&conf).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[tokio::test]
async fn test_wg_rewrite_only_fixes_differences() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(
        ScriptedRunner::default()
            .on("ip -br -j address", addresses_json("wg0", &[("10.0.0.1", 24), ("10.9.0.1", 16)])),
    );
    let scheme = wg_scheme(dir.path(), &runner);

    scheme.write(&wg0()).await.unwrap();

    let calls = runner.calls();
    assert!(!calls.iter().any(|c| c.starts_with("ip link add")));
    assert!(!calls.iter().any(|c| c.starts_with("ip address add")));
    assert!(calls.contains(&"ip address del 10.9.0.1/16 dev wg0".to_string()));
}

#[tokio::test]
async fn test_wg_read_returns_what_was_written() {
    let dir = TempDir::new().unwrap();
    let writer = Arc::new(
        ScriptedRunner::default().on("ip -br -j address", addresses_json("wg0", &[("10.0.0.1", 24)])),
    );
    wg_scheme(dir.path(), &writer).write(&wg0()).await.unwrap();

    let reader = Arc::new(
        ScriptedRunner::default().on("ip -br -j address", addresses_json("wg0", &[("10.0.0.1", 24)])),
    );
    let scheme = wg_scheme(dir.path(), &reader);

    assert!(scheme.interface_exists("wg0").await.unwrap());
    let interface = scheme.read("wg0").await.unwrap();
    assert_eq!(interface, wg0());
    assert_eq!(scheme.interface_names().await.unwrap(), ["wg0"]);
}

#[tokio::test]
async fn test_wg_read_without_config_file_is_not_found() {
    let dir = TempDir::new().unwrap();

    // Link exists but this agent never wrote a config for it
    let runner = Arc::new(ScriptedRunner::default());
    let err = wg_scheme(dir.path(), &runner).read("wg5").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_wg_read_after_link_vanished_keeps_stored_key() {
    let dir = TempDir::new().unwrap();
    let writer = Arc::new(
        ScriptedRunner::default().on("ip -br -j address", addresses_json("wg0", &[("10.0.0.1", 24)])),
    );
    wg_scheme(dir.path(), &writer).write(&wg0()).await.unwrap();

    let text = std::fs::read_to_string(dir.path().join("wg0.conf")).unwrap();
    assert!(text.starts_with("# Address = 10.0.0.1/24\n"));

    // After a reboot the link and its addresses are gone, the file is not
    let reader = Arc::new(
        ScriptedRunner::default()
            .on("ip link show", CommandOutput::failed(1, "Device \"wg0\" does not exist."))
            .on("ip -br -j address", addresses_json("eth0", &[("192.168.1.5", 24)])),
    );
    let scheme = wg_scheme(dir.path(), &reader);

    assert!(!scheme.interface_exists("wg0").await.unwrap());
    let interface = scheme.read("wg0").await.unwrap();
    assert_eq!(interface, wg0());
    assert!(!reader.calls().contains(&"ip -br -j address".to_string()));
}

#[tokio::test]
async fn test_wg_read_without_link_or_recorded_addresses_is_invalid() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("wg6.conf"), "[Interface]\nPrivateKey = abc\n").unwrap();
    let runner = Arc::new(ScriptedRunner::default().on("ip link show", CommandOutput::failed(1, "")));

    let err = wg_scheme(dir.path(), &runner).read("wg6").await.unwrap_err();
    assert!(!err.is_not_found());
    assert!(matches!(err, KeymasterError::Validation { .. }), "got {err}");
}

#[tokio::test]
async fn test_wg_read_rejects_corrupt_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("wg0.conf"), "[Interface]\nListenPort = 51820\n").unwrap();
    let runner = Arc::new(
        ScriptedRunner::default().on("ip -br -j address", addresses_json("wg0", &[("10.0.0.1", 24)])),
    );

    let err = wg_scheme(dir.path(), &runner).read("wg0").await.unwrap_err();
    assert!(matches!(err, KeymasterError::Parse { .. }), "got {err}");
}

#[tokio::test]
async fn test_wg_delete_removes_link_and_file() {
    let dir = TempDir::new().unwrap();
    let conf = dir.path().join("wg0.conf");
    std::fs::write(&conf, "[Interface]\nPrivateKey = abc\n").unwrap();
    let runner = Arc::new(ScriptedRunner::default());
    let scheme = wg_scheme(dir.path(), &runner);

    scheme.delete("wg0").await.unwrap();

    assert!(runner.calls().contains(&"ip link delete wg0".to_string()));
    assert!(!conf.exists());
    assert!(scheme.interface_names().await.unwrap().is_empty());

    // Deleting again is not an error
    let runner = Arc::new(ScriptedRunner::default().on("ip link show", CommandOutput::failed(1, "")));
    wg_scheme(dir.path(), &runner).delete("wg0").await.unwrap();
    assert!(!runner.calls().iter().any(|c| c.starts_with("ip link delete")));
}

#[tokio::test]
async fn test_wg_names_ignore_other_files() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("wg1.conf"), "").unwrap();
    std::fs::write(dir.path().join("wg0.conf"), "").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "").unwrap();
    std::fs::create_dir(dir.path().join("backup.conf")).unwrap();

    let runner = Arc::new(ScriptedRunner::default());
    let names = wg_scheme(dir.path(), &runner).interface_names().await.unwrap();
    assert_eq!(names, ["wg0", "wg1"]);

    let missing = wg_scheme(&dir.path().join("absent"), &runner);
    assert!(missing.interface_names().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_wg_command_failure_is_transport() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(
        ScriptedRunner::default()
            .on("ip -br -j address", addresses_json("wg0", &[]))
            .on("wg setconf", CommandOutput::failed(1, "Unable to modify interface")),
    );

    let err = wg_scheme(dir.path(), &runner).write(&wg0()).await.unwrap_err();
    match err {
        KeymasterError::Transport(message) => assert!(message.contains("Unable to modify interface")),
        other => panic!("unexpected error: {other}"),
    }
}

const UCI_SHOW: &str = "\
network.loopback=interface
network.loopback.proto='static'
network.wg0=interface
network.wg0.proto='wireguard'
network.wg0_peer0=wireguard_wg0
network.wg0_peer0.public_key='pk1'
network.lan=interface
network.lan.proto='static'
network.wg1=interface
network.wg1.proto='wireguard'
";

fn uci_runner() -> ScriptedRunner {
    ScriptedRunner::default()
        .on("uci show network", CommandOutput::ok(UCI_SHOW))
        .on("uci -q get network.wg0", CommandOutput::ok("interface\n"))
        .on("uci -q get network.wg0.", CommandOutput::failed(1, ""))
        .on("uci -q get network.wg0_peer0", CommandOutput::failed(1, ""))
        .on("uci -q get network.wg0.proto", CommandOutput::ok("wireguard\n"))
        .on(
            "uci -q get network.wg0.private_key",
            CommandOutput::ok("cHJpdmF0ZS1rZXktZm9yLXRlc3RzLW9ubHktMTIzNDU=\n"),
        )
        .on("uci -q get network.wg0.addresses", CommandOutput::ok("10.0.0.1/24\n"))
        .on("uci -q get network.wg0.listen_port", CommandOutput::ok("51820\n"))
        .on("uci -q get network.wg0_peer0.public_key", CommandOutput::ok("pk1\n"))
        .on("uci -q get network.wg0_peer0.allowed_ips", CommandOutput::ok("10.0.0.0/24\n"))
        .on(
            "uci -q get network.wg0_peer0.endpoint_host",
            CommandOutput::ok("vpn.example.com\n"),
        )
}

#[tokio::test]
async fn test_uci_read() {
    let runner = Arc::new(uci_runner());
    let scheme = UciScheme::new(runner.clone());

    let interface = scheme.read("wg0").await.unwrap();

    // No endpoint_port option, so the WireGuard default applies
    assert_eq!(interface, wg0());
    assert!(runner.inputs().is_empty());
}

#[tokio::test]
async fn test_uci_non_wireguard_section_is_not_found() {
    let runner = Arc::new(
        uci_runner()
            .on("uci -q get network.lan", CommandOutput::ok("interface\n"))
            .on("uci -q get network.lan.proto", CommandOutput::ok("static\n")),
    );
    let scheme = UciScheme::new(runner);

    assert!(!scheme.interface_exists("lan").await.unwrap());
    assert!(scheme.read("lan").await.unwrap_err().is_not_found());
    assert!(scheme.read("wg9").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_uci_interface_names() {
    let scheme = UciScheme::new(Arc::new(uci_runner()));
    assert_eq!(scheme.interface_names().await.unwrap(), ["wg0", "wg1"]);
}

#[tokio::test]
async fn test_uci_write_replaces_owned_sections() {
    let runner = Arc::new(uci_runner());
    let scheme = UciScheme::new(runner.clone());

    scheme.write(&wg0()).await.unwrap();

    assert!(runner.calls().contains(&"uci batch".to_string()));
    let inputs = runner.inputs();
    assert_eq!(inputs.len(), 1);
    let script = &inputs[0];
    assert!(script.starts_with("delete network.wg0_peer0\ndelete network.wg0\nset network.wg0=interface\n"));
    assert!(script.contains("set network.wg0_peer0.endpoint_host='vpn.example.com'\n"));
    assert!(script.ends_with("commit network\n"));
}

#[tokio::test]
async fn test_uci_delete() {
    let runner = Arc::new(uci_runner());
    let scheme = UciScheme::new(runner.clone());

    scheme.delete("wg0").await.unwrap();
    assert_eq!(
        runner.inputs(),
        ["delete network.wg0_peer0\ndelete network.wg0\ncommit network\n".to_string()]
    );

    // Nothing to remove, nothing committed
    scheme.delete("wg9").await.unwrap();
    assert_eq!(runner.inputs().len(), 1);
}

#[tokio::test]
async fn test_uci_batch_failure_is_transport() {
    let runner = Arc::new(uci_runner().on("uci batch", CommandOutput::failed(1, "uci: Invalid argument")));
    let err = UciScheme::new(runner).write(&wg0()).await.unwrap_err();
    assert!(matches!(err, KeymasterError::Transport(_)), "got {err}");
}
