//! Core traits for the vmhosts system
//!
//! - [`TargetSource`]: Discover hosts that belong in the hosts file

pub mod target_source;

pub use target_source::{ManagedTarget, SourceFactory, TargetSource};
