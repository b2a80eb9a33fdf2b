// # vmhostsd - hosts file sync daemon
//
// The vmhostsd daemon is a thin integration layer. It is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering target sources
// 4. Running the sync engine once, or until SIGTERM/SIGINT
//
// All hosts file logic lives in vmhosts-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Hosts File
// - `VMHOSTS_HOSTS_PATH`: Hosts file to manage (default: platform hosts file)
// - `VMHOSTS_MARKER`: Comment substring marking managed entries (default: "managed by api")
// - `VMHOSTS_COMMENT`: Comment written on new entries (default: "managed by api - hyper-vm")
// - `VMHOSTS_BACKUP`: Keep `<hosts>.backup` with the previous content (true/false)
//
// ### Target Source
// - `VMHOSTS_SOURCE_TYPE`: Source type (hyper_v, static)
// - `VMHOSTS_DOMAIN_SUFFIX`: Suffix appended to VM names (hyper_v)
// - `VMHOSTS_HOST_ALIAS`: Publish the WSL gateway under this name (hyper_v)
// - `VMHOSTS_STATIC_TARGETS`: `name=ip,name=ip` list (static)
//
// ### Sync
// - `VMHOSTS_INTERVAL_SECS`: Seconds between cycles
// - `VMHOSTS_PRUNE`: Remove managed entries whose VM is gone (true/false)
// - `VMHOSTS_INCLUDE_IPV6`: Publish IPv6 when a VM has no IPv4 (true/false)
// - `VMHOSTS_ONESHOT`: Run a single cycle and exit (true/false)
// - `VMHOSTS_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```powershell
// $env:VMHOSTS_DOMAIN_SUFFIX = ".lab.internal"
// $env:VMHOSTS_PRUNE = "true"
//
// vmhostsd
// ```

use anyhow::{Context, Result};
use std::env;
use std::net::IpAddr;
use std::process::ExitCode;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

use vmhosts_core::config::{
    DEFAULT_COMMENT, DEFAULT_DOMAIN_SUFFIX, DEFAULT_MARKER, HostsFileConfig, SourceConfig,
    StaticTarget, SyncConfig, VmHostsConfig,
};
use vmhosts_core::{DEFAULT_HOSTS_PATH, HostsSync, SourceRegistry, SyncEvent};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum VmHostsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<VmHostsExitCode> for ExitCode {
    fn from(code: VmHostsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    hosts_path: String,
    marker: String,
    comment: String,
    backup: bool,
    source_type: String,
    domain_suffix: String,
    host_alias: Option<String>,
    static_targets: Vec<StaticTarget>,
    interval_secs: u64,
    prune: bool,
    include_ipv6: bool,
    oneshot: bool,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let flag = |key: &str| -> Result<bool> {
            match lookup(key) {
                None => Ok(false),
                Some(value) => parse_bool(&value)
                    .with_context(|| format!("{} must be true or false. Got: {}", key, value)),
            }
        };

        Ok(Self {
            hosts_path: lookup("VMHOSTS_HOSTS_PATH")
                .unwrap_or_else(|| DEFAULT_HOSTS_PATH.to_string()),
            marker: lookup("VMHOSTS_MARKER").unwrap_or_else(|| DEFAULT_MARKER.to_string()),
            comment: lookup("VMHOSTS_COMMENT").unwrap_or_else(|| DEFAULT_COMMENT.to_string()),
            backup: flag("VMHOSTS_BACKUP")?,
            source_type: lookup("VMHOSTS_SOURCE_TYPE").unwrap_or_else(|| "hyper_v".to_string()),
            domain_suffix: lookup("VMHOSTS_DOMAIN_SUFFIX")
                .unwrap_or_else(|| DEFAULT_DOMAIN_SUFFIX.to_string()),
            host_alias: lookup("VMHOSTS_HOST_ALIAS").filter(|s| !s.trim().is_empty()),
            static_targets: lookup("VMHOSTS_STATIC_TARGETS")
                .map(|s| parse_static_targets(&s))
                .transpose()?
                .unwrap_or_default(),
            interval_secs: lookup("VMHOSTS_INTERVAL_SECS")
                .map(|s| {
                    s.trim().parse::<u64>().with_context(|| {
                        format!("VMHOSTS_INTERVAL_SECS must be a number. Got: {}", s)
                    })
                })
                .transpose()?
                .unwrap_or(30),
            prune: flag("VMHOSTS_PRUNE")?,
            include_ipv6: flag("VMHOSTS_INCLUDE_IPV6")?,
            oneshot: flag("VMHOSTS_ONESHOT")?,
            log_level: lookup("VMHOSTS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.source_type.as_str() {
            "hyper_v" | "static" => {}
            _ => anyhow::bail!(
                "VMHOSTS_SOURCE_TYPE '{}' is not supported. \
                Supported types: hyper_v, static",
                self.source_type
            ),
        }

        if self.source_type == "static" && self.static_targets.is_empty() {
            anyhow::bail!(
                "VMHOSTS_STATIC_TARGETS must contain at least one target when \
                VMHOSTS_SOURCE_TYPE=static. \
                Set it via: VMHOSTS_STATIC_TARGETS=nas.lab=192.168.1.20"
            );
        }

        if !(5..=86400).contains(&self.interval_secs) {
            anyhow::bail!(
                "VMHOSTS_INTERVAL_SECS must be between 5 and 86400 seconds. Got: {}",
                self.interval_secs
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "VMHOSTS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.to_vmhosts_config()
            .validate()
            .context("Invalid vmhosts configuration")?;

        Ok(())
    }

    /// Build the library configuration
    fn to_vmhosts_config(&self) -> VmHostsConfig {
        let source = match self.source_type.as_str() {
            "static" => SourceConfig::Static {
                targets: self.static_targets.clone(),
            },
            _ => SourceConfig::HyperV {
                domain_suffix: self.domain_suffix.clone(),
                host_alias: self.host_alias.clone(),
                command_timeout_secs: 30,
            },
        };

        VmHostsConfig {
            hosts_file: HostsFileConfig {
                path: self.hosts_path.clone(),
                marker: self.marker.clone(),
                backup: self.backup,
            },
            source,
            sync: SyncConfig {
                interval_secs: self.interval_secs,
                prune_stale: self.prune,
                allow_ipv6: self.include_ipv6,
                comment: self.comment.clone(),
                ..SyncConfig::default()
            },
        }
    }
}

/// Parse a boolean flag value
fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("not a boolean: {}", other),
    }
}

/// Parse `name=ip,name=ip`
fn parse_static_targets(value: &str) -> Result<Vec<StaticTarget>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (name, ip) = pair.split_once('=').with_context(|| {
                format!(
                    "VMHOSTS_STATIC_TARGETS entries must look like name=ip. Got: {}",
                    pair
                )
            })?;
            let ip: IpAddr = ip.trim().parse().with_context(|| {
                format!("VMHOSTS_STATIC_TARGETS has an invalid address: {}", ip)
            })?;
            Ok(StaticTarget::new(name.trim(), ip))
        })
        .collect()
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return VmHostsExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return VmHostsExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return VmHostsExitCode::ConfigError.into();
    }

    info!("Starting vmhostsd daemon");
    info!(
        "Managing {} (marker {:?}, source {})",
        config.hosts_path, config.marker, config.source_type
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return VmHostsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            VmHostsExitCode::RuntimeError
        } else {
            VmHostsExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let registry = SourceRegistry::with_builtin();

    #[cfg(feature = "hyperv")]
    {
        info!("Registering Hyper-V target source");
        vmhosts_source_hyperv::register(&registry);
    }

    let vmhosts_config = config.to_vmhosts_config();
    let source = registry
        .create_source(&vmhosts_config.source)
        .context("Failed to create target source")?;

    let (engine, mut event_rx) = HostsSync::new(source, vmhosts_config)?;

    if config.oneshot {
        let report = engine.sync_once().await?;
        info!(
            "Sync finished: {} upserted, {} removed, {} unchanged, {} skipped, committed: {}",
            report.upserted, report.removed, report.unchanged, report.skipped, report.committed
        );
        return Ok(());
    }

    // Keep the channel drained so events are never reported as dropped
    let events = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                SyncEvent::Stopped { .. } => {
                    debug!("Sync event: {:?}", event);
                    break;
                }
                event => debug!("Sync event: {:?}", event),
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let signals = tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => info!("Received shutdown signal: {}", signal),
            Err(e) => error!("Shutdown signal error: {:#}", e),
        }
        let _ = shutdown_tx.send(());
    });

    info!("Starting sync engine");
    let result = engine.run_with_shutdown(Some(shutdown_rx)).await;

    signals.abort();
    drop(engine);
    let _ = events.await;

    info!("Shutting down daemon");
    result.map_err(Into::into)
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Wait for shutdown signals (Ctrl-C only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for CTRL-C")?;
    Ok("CTRL-C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.hosts_path, DEFAULT_HOSTS_PATH);
        assert_eq!(config.source_type, "hyper_v");
        assert_eq!(config.interval_secs, 30);
        assert!(!config.prune && !config.oneshot);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_static_targets_parsing() {
        let config = config_from(&[
            ("VMHOSTS_SOURCE_TYPE", "static"),
            ("VMHOSTS_STATIC_TARGETS", "nas.lab=192.168.1.20, v6.lab=fd00::1,"),
        ])
        .unwrap();
        assert_eq!(config.static_targets.len(), 2);
        assert_eq!(config.static_targets[1].hostname, "v6.lab");
        assert!(config.validate().is_ok());

        let SourceConfig::Static { targets } = config.to_vmhosts_config().source else {
            panic!("expected static source");
        };
        assert_eq!(targets[0].ip, "192.168.1.20".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_malformed_values_are_config_errors() {
        assert!(config_from(&[("VMHOSTS_STATIC_TARGETS", "nas.lab")]).is_err());
        assert!(config_from(&[("VMHOSTS_STATIC_TARGETS", "nas.lab=nope")]).is_err());
        assert!(config_from(&[("VMHOSTS_PRUNE", "maybe")]).is_err());
        assert!(config_from(&[("VMHOSTS_INTERVAL_SECS", "soon")]).is_err());
    }

    #[test]
    fn test_validation_errors() {
        let static_without_targets = config_from(&[("VMHOSTS_SOURCE_TYPE", "static")]).unwrap();
        assert!(static_without_targets.validate().is_err());

        let unknown_source = config_from(&[("VMHOSTS_SOURCE_TYPE", "vmware")]).unwrap();
        assert!(unknown_source.validate().is_err());

        let bad_comment = config_from(&[("VMHOSTS_COMMENT", "hand written")]).unwrap();
        let err = bad_comment.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("ownership marker"));

        let too_fast = config_from(&[("VMHOSTS_INTERVAL_SECS", "1")]).unwrap();
        assert!(too_fast.validate().is_err());
    }

    #[test]
    fn test_flags() {
        let config = config_from(&[
            ("VMHOSTS_PRUNE", "true"),
            ("VMHOSTS_ONESHOT", "1"),
            ("VMHOSTS_BACKUP", "yes"),
            ("VMHOSTS_INCLUDE_IPV6", "off"),
        ])
        .unwrap();
        assert!(config.prune && config.oneshot && config.backup);
        assert!(!config.include_ipv6);

        let sync = config.to_vmhosts_config().sync;
        assert!(sync.prune_stale);
        assert_eq!(sync.comment, DEFAULT_COMMENT);
    }
}
