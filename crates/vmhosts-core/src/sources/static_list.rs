// # Static Target Source
//
// TargetSource backed by a fixed list from configuration.
//
// ## When to Use
//
// - Pinning hosts that are not discoverable (appliances, containers)
// - Testing the sync engine without a hypervisor
// - Embedding applications that already know their targets

use async_trait::async_trait;

use crate::config::{SourceConfig, StaticTarget};
use crate::traits::{ManagedTarget, SourceFactory, TargetSource};
use crate::Error;

/// Target source that always reports the same targets
///
/// # Example
///
/// ```rust
/// use vmhosts_core::config::StaticTarget;
/// use vmhosts_core::sources::StaticTargetSource;
/// use vmhosts_core::TargetSource;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let source = StaticTargetSource::new(vec![
///         StaticTarget::new("nas.lab", "192.168.1.20".parse()?),
///     ]);
///
///     let targets = source.list_managed_targets().await?;
///     assert_eq!(targets[0].hostname, "nas.lab");
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticTargetSource {
    targets: Vec<StaticTarget>,
}

impl StaticTargetSource {
    /// Create a source from configured targets
    pub fn new(targets: Vec<StaticTarget>) -> Self {
        Self { targets }
    }

    /// Number of configured targets
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether no targets are configured
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[async_trait]
impl TargetSource for StaticTargetSource {
    async fn list_managed_targets(&self) -> Result<Vec<ManagedTarget>, Error> {
        Ok(self
            .targets
            .iter()
            .map(|target| {
                let managed = ManagedTarget::new(&target.hostname).with_addr(target.ip);
                match &target.comment {
                    Some(comment) => managed.with_comment(comment),
                    None => managed,
                }
            })
            .collect())
    }

    fn source_name(&self) -> &'static str {
        "static"
    }
}

/// Factory for creating static target sources
pub struct StaticSourceFactory;

impl SourceFactory for StaticSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn TargetSource>, Error> {
        match config {
            SourceConfig::Static { targets } => {
                Ok(Box::new(StaticTargetSource::new(targets.clone())))
            }
            _ => Err(Error::config("Invalid config for static target source")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_lists_targets() {
        let mut pinned = StaticTarget::new("pinned.lab", "fd00::7".parse().unwrap());
        pinned.comment = Some("managed by api - pinned".to_string());
        let source = StaticTargetSource::new(vec![
            StaticTarget::new("vm1.lab", "10.0.0.5".parse().unwrap()),
            pinned,
        ]);

        let targets = source.list_managed_targets().await.unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].ipv4, vec!["10.0.0.5".parse::<std::net::Ipv4Addr>().unwrap()]);
        assert!(targets[0].comment.is_empty());
        assert_eq!(targets[1].ipv6.len(), 1);
        assert_eq!(targets[1].comment, "managed by api - pinned");
    }

    #[test]
    fn test_factory_rejects_other_configs() {
        let factory = StaticSourceFactory;
        assert!(factory.create(&SourceConfig::default()).is_err());
        assert!(factory
            .create(&SourceConfig::Static { targets: vec![] })
            .is_ok());
    }
}
