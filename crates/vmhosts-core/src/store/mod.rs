// # Hosts Store
//
// In-memory view of the managed part of a hosts file.
//
// ## Ownership
//
// Loading records, for every line that produced at least one entry passing
// the filter, the line index in `owned_lines`. Owned lines are dropped when
// the file is regenerated and replaced by the store's current entries.
// Everything else (blank lines, comments, unmanaged static entries, lines
// that fail to parse) is never owned and survives rewrite untouched.
//
// ## Ordering
//
// Entries are written in insertion order. Replacing an existing hostname keeps
// its position; removing and re-adding moves it to the end.

use std::collections::{BTreeSet, HashMap};
use std::io;

use tracing::{debug, trace};

use crate::entry::HostEntry;
use crate::error::{Error, Result};
use crate::parser::parse_raw_line;

/// An entry plus its position in write order
#[derive(Debug, Clone)]
struct Slot {
    seq: u64,
    entry: HostEntry,
}

/// Hostname-keyed set of managed entries
///
/// # Example
///
/// ```rust
/// use vmhosts_core::{HostEntry, HostsStore};
///
/// let lines = ["127.0.0.1 localhost", "10.0.0.5 vm1    # managed by api"];
/// let mut store = HostsStore::load(
///     lines.iter().map(|l| Ok::<_, std::io::Error>(l.as_bytes())),
///     "managed by api",
/// )
/// .unwrap();
///
/// assert_eq!(store.len(), 1);
/// assert!(store.owned_lines().contains(&1));
///
/// let changed = store.upsert(HostEntry::new("10.0.0.6", "vm1", "managed by api"));
/// assert!(changed);
/// ```
#[derive(Debug, Clone, Default)]
pub struct HostsStore {
    filter: String,
    entries: HashMap<String, Slot>,
    owned_lines: BTreeSet<usize>,
    next_seq: u64,
}

impl HostsStore {
    /// Create an empty store with the given ownership filter
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            ..Self::default()
        }
    }

    /// Build a store from a stream of raw lines
    ///
    /// Lines that do not parse, or whose comment does not contain `filter`,
    /// are skipped. Only a failure to read the stream is an error.
    pub fn load<I, L>(lines: I, filter: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = io::Result<L>>,
        L: AsRef<[u8]>,
    {
        let mut store = Self::new(filter);
        let mut skipped = 0usize;

        for (index, line) in lines.into_iter().enumerate() {
            let line = line.map_err(|e| {
                Error::hosts_file(format!("Failed to read line {}: {}", index, e))
            })?;

            let entries = match parse_raw_line(index, line.as_ref()) {
                Ok(entries) => entries,
                Err(e) if e.is_benign() => continue,
                Err(e) => {
                    debug!("Skipping unparsable hosts line: {}", e);
                    skipped += 1;
                    continue;
                }
            };

            for entry in entries {
                if !store.is_managed(&entry) {
                    trace!("Entry not managed, leaving in place: {}", entry);
                    continue;
                }
                store.owned_lines.insert(index);
                store.insert_or_replace(entry);
            }
        }

        debug!(
            "Loaded {} managed entries from {} owned lines ({} malformed lines skipped)",
            store.entries.len(),
            store.owned_lines.len(),
            skipped
        );
        Ok(store)
    }

    /// Insert a new entry
    ///
    /// Fails with [`Error::DuplicateHostname`] if the hostname is already present.
    pub fn add(&mut self, entry: HostEntry) -> Result<()> {
        if self.entries.contains_key(&entry.hostname) {
            return Err(Error::duplicate(entry.hostname));
        }
        self.insert_or_replace(entry);
        Ok(())
    }

    /// Remove the entry for `hostname`
    ///
    /// Fails with [`Error::NotFound`] if the hostname is absent. The line the
    /// entry was loaded from stays owned, so it is dropped on rewrite.
    pub fn remove(&mut self, hostname: &str) -> Result<HostEntry> {
        self.entries
            .remove(hostname)
            .map(|slot| slot.entry)
            .ok_or_else(|| Error::not_found(hostname))
    }

    /// Insert or update the entry keyed by its hostname
    ///
    /// Returns `false` when an entry with the same IP, hostname and comment
    /// is already stored; the store is left untouched in that case.
    pub fn upsert(&mut self, entry: HostEntry) -> bool {
        if let Some(existing) = self.entries.get(&entry.hostname) {
            if existing.entry.same_record(&entry) {
                debug!("Entry is unchanged, no update needed: {}", entry);
                return false;
            }
        }
        debug!("Upserting entry: {}", entry);
        self.insert_or_replace(entry);
        true
    }

    /// Look up the entry for `hostname`
    pub fn get(&self, hostname: &str) -> Option<&HostEntry> {
        self.entries.get(hostname).map(|slot| &slot.entry)
    }

    /// Whether `hostname` is present
    pub fn contains(&self, hostname: &str) -> bool {
        self.entries.contains_key(hostname)
    }

    /// Entries in write order
    pub fn entries(&self) -> Vec<&HostEntry> {
        let mut slots: Vec<&Slot> = self.entries.values().collect();
        slots.sort_by_key(|slot| slot.seq);
        slots.into_iter().map(|slot| &slot.entry).collect()
    }

    /// Hostnames whose entries carry the ownership marker
    ///
    /// With an empty filter every stored hostname counts as managed.
    pub fn managed_hostnames(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|entry| self.is_managed(entry))
            .map(|entry| entry.hostname.clone())
            .collect()
    }

    /// Whether `entry` passes this store's ownership filter
    pub fn is_managed(&self, entry: &HostEntry) -> bool {
        entry.matches_filter(&self.filter)
    }

    /// Original line indices dropped on rewrite
    pub fn owned_lines(&self) -> &BTreeSet<usize> {
        &self.owned_lines
    }

    /// Whether the line at `index` is owned
    pub fn owns_line(&self, index: usize) -> bool {
        self.owned_lines.contains(&index)
    }

    /// The ownership filter this store was loaded with
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert_or_replace(&mut self, entry: HostEntry) {
        match self.entries.get_mut(&entry.hostname) {
            Some(slot) => slot.entry = entry,
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.entries.insert(entry.hostname.clone(), Slot { seq, entry });
            }
        }
    }
}
