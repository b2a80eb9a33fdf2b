// # Target Source Implementations
//
// Built-in implementations of the TargetSource trait. Platform-specific
// sources live in their own crates.

pub mod static_list;

pub use static_list::{StaticSourceFactory, StaticTargetSource};
