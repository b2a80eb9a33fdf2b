//! Plugin-based target source registry
//!
//! The registry allows target sources to be registered dynamically at
//! runtime, avoiding hardcoded if-else chains in the daemon.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vmhosts_core::registry::SourceRegistry;
//! use vmhosts_core::config::SourceConfig;
//!
//! let registry = SourceRegistry::with_builtin();
//! vmhosts_source_hyperv::register(&registry);
//!
//! let source = registry.create_source(&SourceConfig::default())?;
//! ```
//!
//! ## Registration
//!
//! Source crates expose a `register()` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &SourceRegistry) {
//!     registry.register_source("hyper_v", Box::new(HyperVFactory));
//! }
//! ```

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::sources::StaticSourceFactory;
use crate::traits::{SourceFactory, TargetSource};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Registry mapping source type names to factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<HashMap<String, Box<dyn SourceFactory>>>,
}

impl SourceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the sources built into this crate
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register_source("static", Box::new(StaticSourceFactory));
        registry
    }

    /// Register a target source factory
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_source(&self, name: impl Into<String>, factory: Box<dyn SourceFactory>) {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        sources.insert(name.into(), factory);
    }

    /// Create a target source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn TargetSource>)`: Created source instance
    /// - `Err(Error)`: If the source type is not registered or creation fails
    pub fn create_source(&self, config: &SourceConfig) -> Result<Box<dyn TargetSource>> {
        let source_type = config.type_name();
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown source type: {}", source_type)))?;

        factory.create(config)
    }

    /// List all registered source types
    pub fn list_sources(&self) -> Vec<String> {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a source type is registered
    pub fn has_source(&self, name: &str) -> bool {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.contains_key(name)
    }
}
