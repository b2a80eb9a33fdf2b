//! Hosts sync engine
//!
//! The HostsSync engine is responsible for:
//! - Asking a TargetSource which hosts exist right now
//! - Upserting one managed entry per discovered hostname
//! - Optionally pruning managed entries that were not discovered
//! - Committing the hosts file only when something changed
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ TargetSource │─── Vec<ManagedTarget> ───┐
//! └──────────────┘                          │
//!                                           ▼
//!                                   ┌──────────────┐
//!                                   │  HostsSync   │
//!                                   └──────────────┘
//!                                           │
//!                     ┌─────────────────────┼─────────────────────┐
//!                     ▼                     ▼                     ▼
//!              ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!              │  HostsFile  │       │   commit    │       │   Events    │
//!              │ (upsert)    │       │ (if dirty)  │       │  (notify)   │
//!              └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. Open and load the hosts file
//! 2. List targets from the source
//! 3. Upsert entries, prune stale managed entries if configured
//! 4. Commit when any entry changed
//! 5. Emit an event for monitoring/logging
//!
//! Cycles never overlap and a cycle is never interrupted by shutdown. A
//! failed cycle is reported and the next tick starts a fresh one; there is no
//! retry within a cycle.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, info, warn};

use crate::config::{HostsFileConfig, SyncConfig, VmHostsConfig};
use crate::entry::{HostEntry, normalize_comment, validate_hostname};
use crate::error::Result;
use crate::hosts_file::HostsFile;
use crate::traits::{ManagedTarget, TargetSource};

/// Events emitted by the HostsSync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Engine started
    Started {
        source: &'static str,
        interval_secs: u64,
    },

    /// Cycle finished and the hosts file was rewritten
    CycleCompleted { report: SyncReport },

    /// Cycle finished without any change to the hosts file
    Unchanged { report: SyncReport },

    /// Cycle failed
    CycleFailed { error: String },

    /// Engine stopped
    Stopped { reason: String },
}

/// Outcome of one sync cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Targets reported by the source
    pub targets: usize,
    /// Entries inserted or updated
    pub upserted: usize,
    /// Entries already up to date
    pub unchanged: usize,
    /// Managed entries pruned because their target disappeared
    pub removed: usize,
    /// Targets ignored (invalid hostname, no usable address, foreign comment)
    pub skipped: usize,
    /// Whether the hosts file was rewritten
    pub committed: bool,
    /// Bytes written when committed
    pub bytes_written: usize,
    /// When the cycle finished
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    fn new(targets: usize) -> Self {
        Self {
            targets,
            upserted: 0,
            unchanged: 0,
            removed: 0,
            skipped: 0,
            committed: false,
            bytes_written: 0,
            finished_at: Utc::now(),
        }
    }

    /// Whether the cycle changed any entry
    pub fn has_changes(&self) -> bool {
        self.upserted > 0 || self.removed > 0
    }
}

/// Core sync engine
///
/// ## Lifecycle
///
/// 1. Create with [`HostsSync::new()`]
/// 2. Run a single cycle with [`HostsSync::sync_once()`], or loop with
///    [`HostsSync::run()`]
/// 3. The loop runs until a shutdown signal is received
///
/// The engine assumes it is the only writer of the hosts file.
pub struct HostsSync {
    /// Source of targets
    source: Box<dyn TargetSource>,

    /// Hosts file location and ownership marker
    hosts_file: HostsFileConfig,

    /// Cycle settings
    sync: SyncConfig,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<SyncEvent>,
}

impl HostsSync {
    /// Create a new sync engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields sync events
    pub fn new(
        source: Box<dyn TargetSource>,
        config: VmHostsConfig,
    ) -> Result<(Self, mpsc::Receiver<SyncEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.sync.event_channel_capacity);

        let engine = Self {
            source,
            hosts_file: config.hosts_file,
            sync: config.sync,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run one discover -> upsert -> prune -> commit cycle
    pub async fn sync_once(&self) -> Result<SyncReport> {
        let mut hosts = HostsFile::open(&self.hosts_file.path, self.hosts_file.marker.clone())
            .await?
            .with_backup(self.hosts_file.backup);

        let targets = self.source.list_managed_targets().await?;
        debug!(
            "Source {} reported {} targets",
            self.source.source_name(),
            targets.len()
        );

        let mut report = SyncReport::new(targets.len());
        let mut discovered = HashSet::new();

        for target in &targets {
            if let Err(e) = validate_hostname(&target.hostname) {
                warn!("Skipping target {:?}: {}", target.hostname, e);
                report.skipped += 1;
                continue;
            }
            // A known host without a usable address keeps its current entry.
            discovered.insert(target.hostname.as_str());

            let Some(entry) = self.entry_for(target) else {
                report.skipped += 1;
                continue;
            };

            if hosts.upsert(entry) {
                info!(
                    "Upserted {} -> {}",
                    target.hostname,
                    hosts
                        .store()
                        .get(&target.hostname)
                        .map(|e| e.ip.as_str())
                        .unwrap_or_default()
                );
                report.upserted += 1;
            } else {
                report.unchanged += 1;
            }
        }

        if self.sync.prune_stale {
            for hostname in hosts.store().managed_hostnames() {
                if discovered.contains(hostname.as_str()) {
                    continue;
                }
                hosts.remove(&hostname)?;
                info!("Pruned stale entry {}", hostname);
                report.removed += 1;
            }
        }

        if hosts.has_changes() {
            report.bytes_written = hosts.commit().await?;
            report.committed = true;
        } else {
            debug!("Hosts file already up to date, skipping commit");
        }

        report.finished_at = Utc::now();
        Ok(report)
    }

    /// Build the entry for a target, or `None` if it cannot be published
    fn entry_for(&self, target: &ManagedTarget) -> Option<HostEntry> {
        let Some(addr) = target.preferred_address(self.sync.allow_ipv6) else {
            warn!("Skipping target {}: no usable address", target.hostname);
            return None;
        };

        // Written comments must compare equal to what the parser reads back.
        let comment = match normalize_comment(&target.comment) {
            c if c.is_empty() => normalize_comment(&self.sync.comment),
            c => c,
        };
        if !comment.contains(&self.hosts_file.marker) {
            warn!(
                "Skipping target {}: comment {:?} lacks ownership marker {:?}",
                target.hostname, comment, self.hosts_file.marker
            );
            return None;
        }

        Some(HostEntry::from_addr(addr, &target.hostname, comment))
    }

    /// Run the engine until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        self.run_with_shutdown(None).await
    }

    /// Run the engine until `shutdown_rx` fires (or Ctrl-C when `None`)
    ///
    /// The first cycle starts immediately; later cycles follow the configured
    /// interval. A cycle in progress always completes before shutdown.
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.emit_event(SyncEvent::Started {
            source: self.source.source_name(),
            interval_secs: self.sync.interval_secs,
        });
        info!(
            "Syncing {} from source {} every {}s",
            self.hosts_file.path,
            self.source.source_name(),
            self.sync.interval_secs
        );

        let mut interval = tokio::time::interval(Duration::from_secs(self.sync.interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(interval);

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(_) = ticks.next() => {
                    self.run_cycle().await;
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(SyncEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }
            }
        }

        info!("Sync engine stopped");
        Ok(())
    }

    /// Run one cycle, turning the outcome into events
    async fn run_cycle(&self) {
        match self.sync_once().await {
            Ok(report) if report.committed => {
                info!(
                    "Sync cycle committed: {} upserted, {} removed, {} unchanged, {} skipped",
                    report.upserted, report.removed, report.unchanged, report.skipped
                );
                self.emit_event(SyncEvent::CycleCompleted { report });
            }
            Ok(report) => {
                debug!("Sync cycle made no changes ({} targets)", report.targets);
                self.emit_event(SyncEvent::Unchanged { report });
            }
            Err(e) => {
                error!("Sync cycle failed: {}", e);
                self.emit_event(SyncEvent::CycleFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    /// Emit a sync event
    fn emit_event(&self, event: SyncEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
