//! Recording fakes for the capability traits

#![allow(dead_code)]

use async_trait::async_trait;
use keymaster_agent::error::{KeymasterError, Result};
use keymaster_agent::scheme::{CommandOutput, CommandRunner, ConfigScheme};
use keymaster_agent::source::ConfigSource;
use keymaster_agent::wireguard::{
    Interface, InterfaceConfig, KeyMaterial, PeerConfig, AUX_ID, AUX_OLD_PUBLIC_KEY,
};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Desired interface as a source would declare it
pub fn desired(name: &str, address: &str, peer_key: &str, peer_net: &str) -> InterfaceConfig {
    let mut config = InterfaceConfig::new(name, vec![address.to_string()]);
    config.peers = vec![PeerConfig::new(peer_key, vec![peer_net.to_string()])];
    config
        .auxiliary_data
        .insert(AUX_ID.to_string(), format!("id-{}", name));
    config
}

/// Interface as a scheme would hold it
pub fn installed(config: &InterfaceConfig, private_key: &str) -> Interface {
    let mut config = config.clone().with_private_key(private_key);
    config.auxiliary_data.clear();
    Interface::new(config).expect("valid interface")
}

/// In-memory scheme that records writes and deletes
#[derive(Default)]
pub struct MemoryScheme {
    interfaces: Mutex<BTreeMap<String, Interface>>,
    written: Mutex<Vec<Interface>>,
    deleted: Mutex<Vec<String>>,
    failing_writes: Mutex<HashSet<String>>,
}

impl MemoryScheme {
    pub fn with(interfaces: Vec<Interface>) -> Self {
        let scheme = Self::default();
        {
            let mut map = scheme.interfaces.lock().unwrap();
            for interface in interfaces {
                map.insert(interface.name().to_string(), interface);
            }
        }
        scheme
    }

    pub fn fail_writes_for(&self, name: &str) {
        self.failing_writes.lock().unwrap().insert(name.to_string());
    }

    pub fn written(&self) -> Vec<Interface> {
        self.written.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn get(&self, name: &str) -> Option<Interface> {
        self.interfaces.lock().unwrap().get(name).cloned()
    }

    pub fn clear_log(&self) {
        self.written.lock().unwrap().clear();
        self.deleted.lock().unwrap().clear();
    }
}

#[async_trait]
impl ConfigScheme for MemoryScheme {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn interface_exists(&self, name: &str) -> Result<bool> {
        Ok(self.interfaces.lock().unwrap().contains_key(name))
    }

    async fn read(&self, name: &str) -> Result<Interface> {
        self.get(name)
            .ok_or_else(|| KeymasterError::NotFound(name.to_string()))
    }

    async fn write(&self, interface: &Interface) -> Result<()> {
        if self.failing_writes.lock().unwrap().contains(interface.name()) {
            return Err(KeymasterError::Transport(format!(
                "ip link add {} failed",
                interface.name()
            )));
        }
        self.written.lock().unwrap().push(interface.clone());
        self.interfaces
            .lock()
            .unwrap()
            .insert(interface.name().to_string(), interface.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(name.to_string());
        self.interfaces.lock().unwrap().remove(name);
        Ok(())
    }

    async fn interface_names(&self) -> Result<Vec<String>> {
        Ok(self.interfaces.lock().unwrap().keys().cloned().collect())
    }
}

/// What a scripted source does on one `get_config` call
pub enum Fetch {
    Fail,
    Panic,
}

/// Source serving a fixed desired set and recording patches.
///
/// Like a real server it remembers patched keys and serves them back as
/// `old_public_key` afterwards.
#[derive(Default)]
pub struct RecordingSource {
    desired: Mutex<Vec<InterfaceConfig>>,
    patches: Mutex<Vec<(String, String)>>,
    script: Mutex<VecDeque<Fetch>>,
    fetches: AtomicUsize,
}

impl RecordingSource {
    pub fn serving(desired: Vec<InterfaceConfig>) -> Self {
        Self {
            desired: Mutex::new(desired),
            ..Default::default()
        }
    }

    /// Misbehave on the next calls, in order, before serving normally
    pub fn then(self, fetch: Fetch) -> Self {
        self.script.lock().unwrap().push_back(fetch);
        self
    }

    pub fn patches(&self) -> Vec<(String, String)> {
        self.patches.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigSource for RecordingSource {
    async fn get_config(&self) -> Result<Vec<InterfaceConfig>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Fetch::Fail) => Err(KeymasterError::Transport("connection refused".to_string())),
            Some(Fetch::Panic) => panic!("source blew up"),
            None => Ok(self.desired.lock().unwrap().clone()),
        }
    }

    async fn patch_public_key(&self, interface: &Interface, public_key: &str) -> Result<()> {
        self.patches
            .lock()
            .unwrap()
            .push((interface.name().to_string(), public_key.to_string()));

        let mut desired = self.desired.lock().unwrap();
        for config in desired.iter_mut().filter(|c| c.name == interface.name()) {
            config
                .auxiliary_data
                .insert(AUX_OLD_PUBLIC_KEY.to_string(), public_key.to_string());
        }
        Ok(())
    }
}

/// Deterministic key material: `private-N` keys with `public(<key>)` publics
#[derive(Default)]
pub struct CountingKeys {
    generated: AtomicUsize,
}

impl CountingKeys {
    pub fn generated(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }

    pub fn public_of(private_key: &str) -> String {
        format!("public({})", private_key)
    }
}

impl KeyMaterial for CountingKeys {
    fn generate_private_key(&self) -> Result<String> {
        let n = self.generated.fetch_add(1, Ordering::SeqCst);
        Ok(format!("private-{}", n))
    }

    fn derive_public_key(&self, private_key: &str) -> Result<String> {
        Ok(Self::public_of(private_key))
    }
}

/// Command runner answering from a script and recording every call
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<Vec<(String, CommandOutput)>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedRunner {
    /// Answer commands whose line starts with `prefix`; later rules win
    pub fn on(self, prefix: &str, output: CommandOutput) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push((prefix.to_string(), output));
        self
    }

    /// Command lines run so far
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(line, _)| line.clone())
            .collect()
    }

    /// Stdin fed to commands so far
    pub fn inputs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, stdin)| stdin.clone())
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str], stdin: Option<&str>) -> Result<CommandOutput> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls
            .lock()
            .unwrap()
            .push((line.clone(), stdin.map(str::to_string)));

        let responses = self.responses.lock().unwrap();
        let output = responses
            .iter()
            .rev()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok(""));
        Ok(output)
    }
}
