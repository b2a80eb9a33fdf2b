//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal test doubles and fixtures that verify
//! hosts file contracts without touching the real system hosts file.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use vmhosts_core::config::{HostsFileConfig, SourceConfig, SyncConfig, VmHostsConfig};
use vmhosts_core::error::{Error, Result};
use vmhosts_core::traits::{ManagedTarget, TargetSource};

/// Marker used by every fixture
pub const MARKER: &str = "managed by api";

/// Comment used by every fixture
pub const COMMENT: &str = "managed by api - hyper-vm";

/// A hosts file written to a temporary directory
pub struct HostsFixture {
    /// Keeps the directory alive for the test's duration
    pub dir: TempDir,
    /// Path of the hosts file inside `dir`
    pub path: PathBuf,
}

impl HostsFixture {
    /// Create a fixture with the given initial content
    pub fn new(content: &[u8]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, content).unwrap();
        Self { dir, path }
    }

    /// Current raw content of the hosts file
    pub fn read(&self) -> Vec<u8> {
        std::fs::read(&self.path).unwrap()
    }

    /// Current content of the hosts file as text
    pub fn read_string(&self) -> String {
        String::from_utf8(self.read()).unwrap()
    }

    /// Modification time of the hosts file
    pub fn modified(&self) -> std::time::SystemTime {
        std::fs::metadata(&self.path).unwrap().modified().unwrap()
    }

    /// Config pointing at this fixture
    pub fn config(&self, prune_stale: bool) -> VmHostsConfig {
        VmHostsConfig {
            hosts_file: HostsFileConfig {
                path: self.path.to_string_lossy().into_owned(),
                marker: MARKER.to_string(),
                backup: false,
            },
            source: SourceConfig::Static { targets: vec![] },
            sync: SyncConfig {
                interval_secs: 1,
                prune_stale,
                allow_ipv6: false,
                comment: COMMENT.to_string(),
                event_channel_capacity: 100,
            },
        }
    }
}

/// A TargetSource whose targets can be changed between cycles
pub struct ScriptedTargetSource {
    /// Targets returned by the next call
    targets: Arc<Mutex<Vec<ManagedTarget>>>,
    /// When set, list_managed_targets() fails
    failing: Arc<AtomicBool>,
    /// Call counter for list_managed_targets()
    list_call_count: Arc<AtomicUsize>,
}

impl ScriptedTargetSource {
    pub fn new(targets: Vec<ManagedTarget>) -> Self {
        Self {
            targets: Arc::new(Mutex::new(targets)),
            failing: Arc::new(AtomicBool::new(false)),
            list_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replace the targets returned by later calls
    pub fn set_targets(&self, targets: Vec<ManagedTarget>) {
        *self.targets.lock().unwrap() = targets;
    }

    /// Make later calls fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Get the number of times list_managed_targets() was called
    pub fn list_call_count(&self) -> usize {
        self.list_call_count.load(Ordering::SeqCst)
    }

    /// Create a new ScriptedTargetSource that shares state with an existing one
    pub fn sharing_state_with(other: &Self) -> Self {
        Self {
            targets: Arc::clone(&other.targets),
            failing: Arc::clone(&other.failing),
            list_call_count: Arc::clone(&other.list_call_count),
        }
    }
}

#[async_trait::async_trait]
impl TargetSource for ScriptedTargetSource {
    async fn list_managed_targets(&self) -> Result<Vec<ManagedTarget>> {
        self.list_call_count.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::target_source("scripted failure"));
        }
        Ok(self.targets.lock().unwrap().clone())
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// A target with one IPv4 address
pub fn target(hostname: &str, ip: &str) -> ManagedTarget {
    ManagedTarget::new(hostname).with_addr(ip.parse().unwrap())
}

/// Split rendered content into lines, asserting CRLF termination
pub fn crlf_lines(content: &str) -> Vec<&str> {
    assert!(
        content.is_empty() || content.ends_with("\r\n"),
        "content must end with CRLF: {:?}",
        content
    );
    content
        .strip_suffix("\r\n")
        .map(|body| body.split("\r\n").collect())
        .unwrap_or_default()
}
