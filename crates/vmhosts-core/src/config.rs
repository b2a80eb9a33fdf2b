//! Configuration types for the vmhosts system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::entry::{normalize_comment, validate_hostname};
use crate::hosts_file::DEFAULT_HOSTS_PATH;

/// Substring that marks a hosts file entry as managed by this tool
pub const DEFAULT_MARKER: &str = "managed by api";

/// Comment written on entries created by the sync engine
pub const DEFAULT_COMMENT: &str = "managed by api - hyper-vm";

/// Suffix appended to VM names to form hostnames
pub const DEFAULT_DOMAIN_SUFFIX: &str = ".example.com";

/// Main vmhosts configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmHostsConfig {
    /// Hosts file configuration
    #[serde(default)]
    pub hosts_file: HostsFileConfig,

    /// Target source configuration
    pub source: SourceConfig,

    /// Optional sync engine settings
    #[serde(default)]
    pub sync: SyncConfig,
}

impl VmHostsConfig {
    /// Create a new configuration with defaults for the given source
    pub fn new(source: SourceConfig) -> Self {
        Self {
            hosts_file: HostsFileConfig::default(),
            source,
            sync: SyncConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.hosts_file.validate()?;
        self.source.validate()?;
        self.sync.validate()?;

        // Entries we write must be recognized as ours on the next load.
        if !normalize_comment(&self.sync.comment).contains(&self.hosts_file.marker) {
            return Err(crate::Error::config(format!(
                "Entry comment '{}' does not contain the ownership marker '{}'",
                self.sync.comment, self.hosts_file.marker
            )));
        }

        if self.sync.prune_stale && self.hosts_file.marker.is_empty() {
            return Err(crate::Error::config(
                "Pruning stale entries requires a non-empty ownership marker",
            ));
        }

        Ok(())
    }
}

/// Hosts file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostsFileConfig {
    /// Path to the hosts file
    #[serde(default = "default_hosts_path")]
    pub path: String,

    /// Substring a comment must contain for the entry to be managed
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Keep a `.backup` copy of the previous content on every commit
    #[serde(default)]
    pub backup: bool,
}

impl HostsFileConfig {
    /// Validate the hosts file configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.path.is_empty() {
            return Err(crate::Error::config("Hosts file path cannot be empty"));
        }
        // Parsed comments never carry whitespace runs or padding.
        if normalize_comment(&self.marker) != self.marker {
            return Err(crate::Error::config(format!(
                "Ownership marker {:?} must use single spaces without leading or trailing whitespace",
                self.marker
            )));
        }
        Ok(())
    }
}

impl Default for HostsFileConfig {
    fn default() -> Self {
        Self {
            path: default_hosts_path(),
            marker: default_marker(),
            backup: false,
        }
    }
}

/// Target source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Running Hyper-V virtual machines (Windows)
    HyperV {
        /// Suffix appended to each VM name (e.g. ".example.com")
        #[serde(default = "default_domain_suffix")]
        domain_suffix: String,
        /// Publish the WSL gateway address under this hostname
        #[serde(default)]
        host_alias: Option<String>,
        /// Timeout for each PowerShell invocation (in seconds)
        #[serde(default = "default_command_timeout_secs")]
        command_timeout_secs: u64,
    },

    /// Fixed list of targets
    Static {
        /// Targets to publish
        targets: Vec<StaticTarget>,
    },

    /// Custom target source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SourceConfig {
    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::HyperV {
                domain_suffix,
                host_alias,
                command_timeout_secs,
            } => {
                if domain_suffix.chars().any(char::is_whitespace) {
                    return Err(crate::Error::config(
                        "Hyper-V domain suffix cannot contain whitespace",
                    ));
                }
                if let Some(alias) = host_alias {
                    validate_hostname(alias).map_err(|e| {
                        crate::Error::config(format!("Invalid host alias: {}", e))
                    })?;
                }
                if *command_timeout_secs == 0 {
                    return Err(crate::Error::config(
                        "Hyper-V command timeout must be > 0",
                    ));
                }
                Ok(())
            }
            SourceConfig::Static { targets } => {
                for target in targets {
                    validate_hostname(&target.hostname).map_err(|e| {
                        crate::Error::config(format!("Invalid static target: {}", e))
                    })?;
                }
                Ok(())
            }
            SourceConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom source factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom source config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the source type name
    pub fn type_name(&self) -> &str {
        match self {
            SourceConfig::HyperV { .. } => "hyper_v",
            SourceConfig::Static { .. } => "static",
            SourceConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::HyperV {
            domain_suffix: default_domain_suffix(),
            host_alias: None,
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

/// A statically configured target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticTarget {
    /// Hostname to publish
    pub hostname: String,
    /// Address to publish
    pub ip: IpAddr,
    /// Comment override
    #[serde(default)]
    pub comment: Option<String>,
}

impl StaticTarget {
    /// Create a new static target
    pub fn new(hostname: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            hostname: hostname.into(),
            ip,
            comment: None,
        }
    }
}

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Interval between sync cycles (in seconds)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Remove managed entries whose hostname is no longer discovered
    #[serde(default)]
    pub prune_stale: bool,

    /// Publish an IPv6 address when a target has no IPv4 address
    #[serde(default)]
    pub allow_ipv6: bool,

    /// Comment for entries whose target does not provide one
    #[serde(default = "default_comment")]
    pub comment: String,

    /// Capacity of the sync event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl SyncConfig {
    /// Validate the sync configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Sync interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.comment.contains(['\r', '\n']) {
            return Err(crate::Error::config("Entry comment cannot contain line breaks"));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            prune_stale: false,
            allow_ipv6: false,
            comment: default_comment(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_hosts_path() -> String {
    DEFAULT_HOSTS_PATH.to_string()
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_string()
}

fn default_comment() -> String {
    DEFAULT_COMMENT.to_string()
}

fn default_domain_suffix() -> String {
    DEFAULT_DOMAIN_SUFFIX.to_string()
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_interval_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = VmHostsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.source.type_name(), "hyper_v");
        assert_eq!(config.hosts_file.marker, DEFAULT_MARKER);
    }

    #[test]
    fn test_comment_must_carry_marker() {
        let mut config = VmHostsConfig::default();
        config.sync.comment = "added by hand".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ownership marker"));
    }

    #[test]
    fn test_prune_requires_marker() {
        let mut config = VmHostsConfig::default();
        config.hosts_file.marker = String::new();
        assert!(config.validate().is_ok());

        config.sync.prune_stale = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_static_targets_are_validated() {
        let config = VmHostsConfig::new(SourceConfig::Static {
            targets: vec![StaticTarget::new("bad host", "10.0.0.1".parse().unwrap())],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_tagged_source() {
        let json = serde_json::json!({
            "hosts_file": { "path": "/tmp/hosts" },
            "source": {
                "type": "static",
                "targets": [{ "hostname": "vm1.lab", "ip": "10.0.0.5" }]
            },
            "sync": { "prune_stale": true }
        });
        let config: VmHostsConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.hosts_file.path, "/tmp/hosts");
        assert_eq!(config.hosts_file.marker, DEFAULT_MARKER);
        assert!(config.sync.prune_stale);
        assert_eq!(config.sync.interval_secs, 30);
        assert!(config.validate().is_ok());

        let SourceConfig::Static { targets } = &config.source else {
            panic!("expected static source");
        };
        assert_eq!(targets[0].ip, "10.0.0.5".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_marker_must_be_normalized() {
        for marker in ["managed  by api", "managed\tby api", " managed by api", "managed\nby"] {
            let mut config = VmHostsConfig::default();
            config.hosts_file.marker = marker.to_string();
            config.sync.comment = format!("{} - hyper-vm", marker);
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("single spaces"), "{:?}", marker);
        }
    }

    #[test]
    fn test_comment_marker_check_ignores_spacing() {
        let mut config = VmHostsConfig::default();
        config.sync.comment = "managed  by\tapi - hyper-vm".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = VmHostsConfig::default();
        config.sync.interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
