// # Hyper-V Target Source
//
// This crate provides a Hyper-V target source for the vmhosts system.
//
// ## Purpose
//
// Publishes every running Hyper-V virtual machine as `<vm name><suffix>`
// pointing at the first address its network adapters report. Intended for
// Windows hosts where guests get fresh addresses from the Default Switch on
// every boot.
//
// ## Architecture
//
// All discovery goes through PowerShell:
// - `Get-VM` lists the running machines
// - `Get-VMNetworkAdapter` lists the addresses of one machine
// - `Get-NetIPAddress` finds the WSL gateway when a host alias is configured
//
// Output parsing lives in plain functions so it can be tested on any platform.
// Commands run behind the [`PowerShell`] trait with a per-command timeout.

use std::net::{IpAddr, Ipv4Addr};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use vmhosts_core::SourceRegistry;
use vmhosts_core::config::SourceConfig;
use vmhosts_core::traits::{ManagedTarget, SourceFactory, TargetSource};
use vmhosts_core::{Error, Result};

/// Lists the names of running virtual machines, one per line
const LIST_RUNNING_VMS: &str =
    "Get-VM | Where-Object {$_.State -eq 'Running'} | Select-Object -ExpandProperty Name";

/// Lists the IPv4 addresses of the WSL virtual switch on the host
const LIST_WSL_GATEWAY: &str = "Get-NetIPAddress -AddressFamily IPv4 -InterfaceAlias '*WSL*' | Select-Object -ExpandProperty IPAddress";

/// Something that can run a PowerShell script and return its stdout
#[async_trait]
pub trait PowerShell: Send + Sync {
    /// Run `script`, failing on spawn errors, timeouts and non-zero exit
    async fn run(&self, script: &str) -> Result<String>;
}

/// Runs scripts through the system `powershell` executable
#[derive(Debug, Clone)]
pub struct SystemPowerShell {
    timeout: Duration,
}

impl SystemPowerShell {
    /// Create a runner with a per-command timeout
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl PowerShell for SystemPowerShell {
    async fn run(&self, script: &str) -> Result<String> {
        debug!("Running powershell: {}", script);

        let child = Command::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command", script])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                Error::target_source(format!(
                    "powershell timed out after {:?}: {}",
                    self.timeout, script
                ))
            })?
            .map_err(|e| Error::target_source(format!("Failed to run powershell: {}", e)))?;

        if !output.status.success() {
            return Err(Error::target_source(format!(
                "powershell exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Target source listing running Hyper-V virtual machines
pub struct HyperVSource {
    shell: Box<dyn PowerShell>,
    domain_suffix: String,
    host_alias: Option<String>,
}

impl HyperVSource {
    /// Create a source using the system PowerShell
    pub fn new(domain_suffix: impl Into<String>, command_timeout: Duration) -> Self {
        Self::with_shell(
            Box::new(SystemPowerShell::new(command_timeout)),
            domain_suffix,
        )
    }

    /// Create a source with a custom PowerShell runner
    pub fn with_shell(shell: Box<dyn PowerShell>, domain_suffix: impl Into<String>) -> Self {
        Self {
            shell,
            domain_suffix: domain_suffix.into(),
            host_alias: None,
        }
    }

    /// Also publish the WSL gateway address under `alias`
    pub fn with_host_alias(mut self, alias: Option<String>) -> Self {
        self.host_alias = alias;
        self
    }

    /// Hostname published for a VM
    pub fn hostname_for(&self, vm_name: &str) -> String {
        format!("{}{}", vm_name, self.domain_suffix)
    }

    /// Names of running virtual machines
    pub async fn running_vm_names(&self) -> Result<Vec<String>> {
        let output = self.shell.run(LIST_RUNNING_VMS).await?;
        Ok(parse_vm_names(&output))
    }

    /// Addresses reported by the network adapters of `vm_name`
    pub async fn vm_addresses(&self, vm_name: &str) -> Result<Vec<IpAddr>> {
        let script = format!(
            "Get-VMNetworkAdapter -VMName {} | Select-Object -ExpandProperty IPAddresses",
            quote(vm_name)
        );
        let output = self.shell.run(&script).await?;
        Ok(parse_addresses(&output))
    }

    /// First IPv4 address of the WSL virtual switch
    pub async fn wsl_gateway(&self) -> Result<Option<Ipv4Addr>> {
        let output = self.shell.run(LIST_WSL_GATEWAY).await?;
        Ok(parse_addresses(&output).into_iter().find_map(|ip| match ip {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        }))
    }
}

#[async_trait]
impl TargetSource for HyperVSource {
    async fn list_managed_targets(&self) -> Result<Vec<ManagedTarget>> {
        let names = self.running_vm_names().await?;
        debug!("Running VMs: {:?}", names);

        let mut targets = Vec::with_capacity(names.len() + 1);
        for name in &names {
            match self.vm_addresses(name).await {
                Ok(addrs) => {
                    info!("VM {} reports addresses {:?}", name, addrs);
                    let target = addrs
                        .into_iter()
                        .fold(ManagedTarget::new(self.hostname_for(name)), |target, addr| {
                            target.with_addr(addr)
                        });
                    targets.push(target);
                }
                Err(e) => {
                    // Still reported, so the engine keeps the VM's current entry.
                    warn!("Failed to get addresses for VM {}: {}", name, e);
                    targets.push(ManagedTarget::new(self.hostname_for(name)));
                }
            }
        }

        if let Some(alias) = &self.host_alias {
            match self.wsl_gateway().await {
                Ok(Some(gateway)) => {
                    targets.push(ManagedTarget::new(alias).with_addr(IpAddr::V4(gateway)))
                }
                Ok(None) => warn!("No WSL gateway address found for host alias {}", alias),
                Err(e) => warn!("Failed to get WSL gateway for host alias {}: {}", alias, e),
            }
        }

        Ok(targets)
    }

    fn source_name(&self) -> &'static str {
        "hyper_v"
    }
}

/// Split `Get-VM` output into VM names
pub fn parse_vm_names(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse one address per line, ignoring anything that is not an address
pub fn parse_addresses(output: &str) -> Vec<IpAddr> {
    output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// Quote a value as a PowerShell single-quoted string literal
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Factory for creating Hyper-V target sources
pub struct HyperVFactory;

impl SourceFactory for HyperVFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn TargetSource>> {
        match config {
            SourceConfig::HyperV {
                domain_suffix,
                host_alias,
                command_timeout_secs,
            } => Ok(Box::new(
                HyperVSource::new(
                    domain_suffix.clone(),
                    Duration::from_secs(*command_timeout_secs),
                )
                .with_host_alias(host_alias.clone()),
            )),
            _ => Err(Error::config("Invalid config for Hyper-V target source")),
        }
    }
}

/// Register the Hyper-V target source with a registry
pub fn register(registry: &SourceRegistry) {
    registry.register_source("hyper_v", Box::new(HyperVFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Answers scripts from a table; unknown scripts fail
    struct ScriptedShell {
        responses: HashMap<String, String>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedShell {
        fn new(responses: &[(&str, &str)]) -> Self {
            Self {
                responses: responses
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Handle on the scripts run so far, readable after the shell is boxed
        fn calls(&self) -> Arc<Mutex<Vec<String>>> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl PowerShell for ScriptedShell {
        async fn run(&self, script: &str) -> Result<String> {
            self.calls.lock().unwrap().push(script.to_string());
            self.responses
                .get(script)
                .cloned()
                .ok_or_else(|| Error::target_source(format!("no such VM: {}", script)))
        }
    }

    fn adapter_script(name: &str) -> String {
        format!(
            "Get-VMNetworkAdapter -VMName '{}' | Select-Object -ExpandProperty IPAddresses",
            name
        )
    }

    #[test]
    fn test_parse_vm_names() {
        let names = parse_vm_names("devbox\r\nbuild-agent\r\n\r\n  spaced  \r\n");
        assert_eq!(names, vec!["devbox", "build-agent", "spaced"]);
        assert!(parse_vm_names("").is_empty());
    }

    #[test]
    fn test_parse_addresses_skips_garbage() {
        let addrs = parse_addresses("172.20.1.10\r\nfe80::215:5dff:fe00:101\r\n\r\nN/A\r\n");
        assert_eq!(
            addrs,
            vec![
                "172.20.1.10".parse::<IpAddr>().unwrap(),
                "fe80::215:5dff:fe00:101".parse::<IpAddr>().unwrap(),
            ]
        );
    }

    #[test]
    fn test_quote_escapes_single_quotes() {
        assert_eq!(quote("devbox"), "'devbox'");
        assert_eq!(quote("bob's vm"), "'bob''s vm'");
    }

    #[tokio::test]
    async fn test_lists_targets_with_partial_results() {
        let devbox = adapter_script("devbox");
        let shell = ScriptedShell::new(&[
            (LIST_RUNNING_VMS, "devbox\r\nbroken\r\n"),
            (devbox.as_str(), "fe80::1\r\n172.20.1.10\r\n172.20.1.11\r\n"),
        ]);
        let calls = shell.calls();
        let source = HyperVSource::with_shell(Box::new(shell), ".example.com");

        let targets = source.list_managed_targets().await.unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].hostname, "devbox.example.com");
        assert_eq!(
            targets[0].preferred_address(false),
            Some("172.20.1.10".parse().unwrap())
        );
        assert_eq!(targets[0].ipv6.len(), 1);
        assert!(targets[0].comment.is_empty());

        // A VM whose adapter query failed is still reported, without addresses.
        assert_eq!(targets[1].hostname, "broken.example.com");
        assert!(targets[1].ipv4.is_empty() && targets[1].ipv6.is_empty());

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                LIST_RUNNING_VMS.to_string(),
                adapter_script("devbox"),
                adapter_script("broken"),
            ]
        );
    }

    #[tokio::test]
    async fn test_adapter_query_quotes_vm_name() {
        let quoted = adapter_script("bob''s vm");
        let shell = ScriptedShell::new(&[
            (LIST_RUNNING_VMS, "bob's vm\r\n"),
            (quoted.as_str(), "172.20.1.12\r\n"),
        ]);
        let calls = shell.calls();
        let source = HyperVSource::with_shell(Box::new(shell), ".example.com");

        assert_eq!(
            source.vm_addresses("bob's vm").await.unwrap(),
            vec!["172.20.1.12".parse::<IpAddr>().unwrap()]
        );
        assert_eq!(calls.lock().unwrap().last(), Some(&quoted));
    }

    #[tokio::test]
    async fn test_vm_listing_failure_is_an_error() {
        let source = HyperVSource::with_shell(Box::new(ScriptedShell::new(&[])), ".example.com");
        let err = source.list_managed_targets().await.unwrap_err();
        assert!(matches!(err, Error::TargetSource(_)));
    }

    #[tokio::test]
    async fn test_host_alias_uses_wsl_gateway() {
        let shell = ScriptedShell::new(&[
            (LIST_RUNNING_VMS, ""),
            (LIST_WSL_GATEWAY, "172.28.16.1\r\n"),
        ]);
        let source = HyperVSource::with_shell(Box::new(shell), ".example.com")
            .with_host_alias(Some("windows.example.com".to_string()));

        let targets = source.list_managed_targets().await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].hostname, "windows.example.com");
        assert_eq!(targets[0].ipv4, vec![Ipv4Addr::new(172, 28, 16, 1)]);
    }

    #[tokio::test]
    async fn test_missing_gateway_is_not_fatal() {
        let shell = ScriptedShell::new(&[(LIST_RUNNING_VMS, "")]);
        let source = HyperVSource::with_shell(Box::new(shell), ".example.com")
            .with_host_alias(Some("windows.example.com".to_string()));

        assert!(source.list_managed_targets().await.unwrap().is_empty());
    }

    #[test]
    fn test_factory_and_registration() {
        let factory = HyperVFactory;
        assert!(factory.create(&SourceConfig::default()).is_ok());
        assert!(
            factory
                .create(&SourceConfig::Static { targets: vec![] })
                .is_err()
        );

        let registry = SourceRegistry::with_builtin();
        register(&registry);
        assert_eq!(registry.list_sources(), vec!["hyper_v", "static"]);

        let source = registry.create_source(&SourceConfig::default()).ok().unwrap();
        assert_eq!(source.source_name(), "hyper_v");
    }
}
