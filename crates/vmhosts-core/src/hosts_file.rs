// # Hosts File
//
// Owns one load -> mutate -> commit cycle over a hosts file.
//
// ## Lifecycle
//
// 1. `HostsFile::open()` reads the whole file and loads the store
// 2. `add()` / `remove()` / `upsert()` mutate the in-memory store
// 3. `commit()` consumes the handle and atomically rewrites the file
//
// The original lines are kept alongside the store so that owned line indices
// always refer to the content they were loaded from. Nothing is locked: the
// caller must make sure no other writer touches the file during a cycle.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::entry::HostEntry;
use crate::error::{Error, Result};
use crate::store::HostsStore;
use crate::writer::{self, CommitOptions};

/// Default hosts file location for the current platform
#[cfg(windows)]
pub const DEFAULT_HOSTS_PATH: &str = "C:/Windows/System32/drivers/etc/hosts";

/// Default hosts file location for the current platform
#[cfg(not(windows))]
pub const DEFAULT_HOSTS_PATH: &str = "/etc/hosts";

/// An opened hosts file with its managed entries
///
/// # Example
///
/// ```rust,no_run
/// use vmhosts_core::{HostEntry, HostsFile};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut hosts = HostsFile::open("/etc/hosts", "managed by api").await?;
///
///     hosts.upsert(HostEntry::new("172.20.1.10", "devbox.example.com", "managed by api"));
///     hosts.remove("retired.example.com")?;
///
///     hosts.commit().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct HostsFile {
    path: PathBuf,
    lines: Vec<Vec<u8>>,
    store: HostsStore,
    options: CommitOptions,
    changed: bool,
}

impl HostsFile {
    /// Read and parse the hosts file at `path`
    ///
    /// Only entries whose comment contains `filter` are loaded; an empty
    /// filter loads every entry.
    pub async fn open<P: AsRef<Path>>(path: P, filter: impl Into<String>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let content = fs::read(&path).await.map_err(|e| {
            Error::hosts_file(format!(
                "Failed to open hosts file {}: {}",
                path.display(),
                e
            ))
        })?;

        let hosts = Self::from_bytes(path, &content, filter)?;
        debug!(
            "Opened {}: {} lines, {} managed entries",
            hosts.path.display(),
            hosts.lines.len(),
            hosts.store.len()
        );
        Ok(hosts)
    }

    /// Build a handle from content already read from `path`
    pub fn from_bytes(path: PathBuf, content: &[u8], filter: impl Into<String>) -> Result<Self> {
        let lines: Vec<Vec<u8>> = split_lines(content)
            .into_iter()
            .map(<[u8]>::to_vec)
            .collect();
        let store = HostsStore::load(lines.iter().map(Ok::<_, std::io::Error>), filter)?;

        Ok(Self {
            path,
            lines,
            store,
            options: CommitOptions::default(),
            changed: false,
        })
    }

    /// Keep a `.backup` copy of the previous content on commit
    pub fn with_backup(mut self, backup: bool) -> Self {
        self.options.backup = backup;
        self
    }

    /// Insert a new entry, failing on an existing hostname
    pub fn add(&mut self, entry: HostEntry) -> Result<()> {
        self.store.add(entry)?;
        self.changed = true;
        Ok(())
    }

    /// Remove the entry for `hostname`, failing if absent
    pub fn remove(&mut self, hostname: &str) -> Result<HostEntry> {
        let removed = self.store.remove(hostname)?;
        self.changed = true;
        Ok(removed)
    }

    /// Insert or update an entry; `false` means nothing changed
    pub fn upsert(&mut self, entry: HostEntry) -> bool {
        let changed = self.store.upsert(entry);
        self.changed |= changed;
        changed
    }

    /// Managed entries in write order
    pub fn entries(&self) -> Vec<&HostEntry> {
        self.store.entries()
    }

    /// The underlying store
    pub fn store(&self) -> &HostsStore {
        &self.store
    }

    /// Raw original lines, without terminators
    pub fn lines(&self) -> &[Vec<u8>] {
        &self.lines
    }

    /// Path of the hosts file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether any mutation changed the store since open
    pub fn has_changes(&self) -> bool {
        self.changed
    }

    /// Render the content `commit()` would write
    pub fn render(&self) -> Vec<u8> {
        writer::render(&self.store, &self.lines)
    }

    /// Atomically rewrite the hosts file, returning the bytes written
    pub async fn commit(self) -> Result<usize> {
        writer::commit(&self.path, &self.store, &self.lines, self.options).await
    }
}

/// Split file content into lines without their terminators
///
/// Both `\n` and `\r\n` terminate a line. A trailing terminator does not
/// start an extra empty line.
pub fn split_lines(content: &[u8]) -> Vec<&[u8]> {
    if content.is_empty() {
        return Vec::new();
    }
    let body = content.strip_suffix(b"\n").unwrap_or(content);
    body.split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect()
}
