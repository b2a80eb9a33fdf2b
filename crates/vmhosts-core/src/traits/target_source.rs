// # Target Source Trait
//
// Defines the interface for discovering the hosts that should be present in
// the hosts file.
//
// ## Implementations
//
// - Hyper-V (PowerShell): `vmhosts-source-hyperv` crate
// - Static list from configuration: `sources::StaticTargetSource`
//
// ## Usage
//
// ```rust,ignore
// use vmhosts_core::TargetSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* TargetSource implementation */;
//
//     for target in source.list_managed_targets().await? {
//         println!("{} -> {:?}", target.hostname, target.preferred_address(true));
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A discovered host and its addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedTarget {
    /// Hostname to publish
    pub hostname: String,
    /// IPv4 addresses, in discovery order
    #[serde(default)]
    pub ipv4: Vec<Ipv4Addr>,
    /// IPv6 addresses, in discovery order
    #[serde(default)]
    pub ipv6: Vec<Ipv6Addr>,
    /// Ownership comment; the sync engine's default comment is used when empty
    #[serde(default)]
    pub comment: String,
}

impl ManagedTarget {
    /// Create a target without addresses
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ipv4: Vec::new(),
            ipv6: Vec::new(),
            comment: String::new(),
        }
    }

    /// Add an address, sorted into the matching family
    pub fn with_addr(mut self, addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => self.ipv4.push(v4),
            IpAddr::V6(v6) => self.ipv6.push(v6),
        }
        self
    }

    /// Set the ownership comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// The address to publish for this target
    ///
    /// The first IPv4 address wins; the first IPv6 address is used only when
    /// there is no IPv4 address and `allow_ipv6` is set.
    pub fn preferred_address(&self, allow_ipv6: bool) -> Option<IpAddr> {
        self.ipv4
            .first()
            .copied()
            .map(IpAddr::V4)
            .or_else(|| {
                allow_ipv6
                    .then(|| self.ipv6.first().copied().map(IpAddr::V6))
                    .flatten()
            })
    }
}

/// Trait for target discovery implementations
///
/// Sources are data producers only: they report what exists right now and
/// never touch the hosts file, retry, or schedule themselves. Any external
/// command they run must carry its own timeout.
///
/// A source may return partial results (for example when one VM cannot be
/// queried) as long as it logs what it skipped; it should fail only when
/// nothing meaningful can be reported.
#[async_trait]
pub trait TargetSource: Send + Sync {
    /// List the hosts that should currently be present in the hosts file
    async fn list_managed_targets(&self) -> Result<Vec<ManagedTarget>, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing target sources from configuration
pub trait SourceFactory: Send + Sync {
    /// Create a TargetSource instance from configuration
    fn create(
        &self,
        config: &crate::config::SourceConfig,
    ) -> Result<Box<dyn TargetSource>, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_address_prefers_first_ipv4() {
        let target = ManagedTarget::new("vm1")
            .with_addr("fe80::1".parse().unwrap())
            .with_addr("172.20.1.10".parse().unwrap())
            .with_addr("172.20.1.11".parse().unwrap());
        assert_eq!(
            target.preferred_address(true),
            Some("172.20.1.10".parse().unwrap())
        );
    }

    #[test]
    fn test_preferred_address_ipv6_fallback() {
        let target = ManagedTarget::new("vm6").with_addr("fd00::5".parse().unwrap());
        assert_eq!(target.preferred_address(false), None);
        assert_eq!(
            target.preferred_address(true),
            Some("fd00::5".parse().unwrap())
        );
        assert_eq!(ManagedTarget::new("empty").preferred_address(true), None);
    }
}
