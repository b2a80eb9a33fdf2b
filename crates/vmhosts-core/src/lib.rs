// # vmhosts-core
//
// Core library for keeping a hosts file in sync with virtual machine names.
//
// ## Architecture Overview
//
// This library provides the building blocks for hosts file management:
// - **parser**: Turns one hosts file line into zero or more entries
// - **HostsStore**: Managed entries keyed by hostname, plus the lines they own
// - **writer**: Replays unmanaged lines verbatim, appends managed entries,
//   commits atomically
// - **HostsFile**: Load / mutate / commit session over one hosts file
// - **TargetSource**: Trait for discovering which hosts should exist
// - **HostsSync**: Engine that drives discover → upsert → prune → commit
// - **SourceRegistry**: Plugin-based registry for target sources
//
// ## Design Principles
//
// 1. **Ownership by marker**: Only entries whose comment carries the marker
//    are ever rewritten; every other line survives byte for byte
// 2. **Atomic commits**: The hosts file is replaced by rename, never edited
//    in place
// 3. **Plugin-Based**: Sources are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library

pub mod entry;
pub mod parser;
pub mod store;
pub mod writer;
pub mod hosts_file;
pub mod traits;
pub mod sources;
pub mod registry;
pub mod sync;
pub mod config;
pub mod error;

// Re-export core types for convenience
pub use entry::HostEntry;
pub use parser::{ParseError, parse_line};
pub use store::HostsStore;
pub use writer::CommitOptions;
pub use hosts_file::{DEFAULT_HOSTS_PATH, HostsFile};
pub use traits::{ManagedTarget, SourceFactory, TargetSource};
pub use registry::SourceRegistry;
pub use sync::{HostsSync, SyncEvent, SyncReport};
pub use config::{HostsFileConfig, SourceConfig, StaticTarget, SyncConfig, VmHostsConfig};
pub use error::{Error, Result};
