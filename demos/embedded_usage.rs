//! Minimal embedding example for vmhosts-core
//!
//! This example demonstrates using vmhosts-core as a library in a custom
//! application: direct hosts file edits with `HostsFile`, then the sync
//! engine driven by an application-defined target source. It works on a
//! scratch copy of a hosts file, never on the system one.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use tracing::info;
use vmhosts_core::config::{HostsFileConfig, SourceConfig, SyncConfig};
use vmhosts_core::traits::{ManagedTarget, TargetSource};
use vmhosts_core::{HostEntry, HostsFile, HostsSync, Result, VmHostsConfig};

const MARKER: &str = "managed by api";
const COMMENT: &str = "managed by api - embedded";

/// Target source backed by the application's own inventory
#[derive(Clone, Default)]
struct InventorySource {
    machines: Arc<Mutex<Vec<(String, IpAddr)>>>,
}

impl InventorySource {
    fn set(&self, machines: &[(&str, [u8; 4])]) {
        let mut guard = self.machines.lock().unwrap_or_else(|e| e.into_inner());
        *guard = machines
            .iter()
            .map(|(name, ip)| (name.to_string(), IpAddr::from(*ip)))
            .collect();
    }
}

#[async_trait::async_trait]
impl TargetSource for InventorySource {
    async fn list_managed_targets(&self) -> Result<Vec<ManagedTarget>> {
        let machines = self.machines.lock().unwrap_or_else(|e| e.into_inner());
        Ok(machines
            .iter()
            .map(|(name, ip)| ManagedTarget::new(format!("{}.lab.internal", name)).with_addr(*ip))
            .collect())
    }

    fn source_name(&self) -> &'static str {
        "inventory"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    println!("=== Embedded vmhosts-core Example ===\n");

    let path = std::env::temp_dir().join(format!("vmhosts-demo-{}.hosts", std::process::id()));
    tokio::fs::write(
        &path,
        "# scratch hosts file\n127.0.0.1 localhost\n192.168.1.2 printer # added by hand\n",
    )
    .await?;

    // Direct edits: open, mutate, commit
    println!("1. Editing the hosts file directly...");
    let mut hosts = HostsFile::open(&path, MARKER).await?;
    hosts.add(HostEntry::new("10.0.0.5", "legacy.lab.internal", COMMENT))?;
    let written = hosts.commit().await?;
    info!("Committed {} bytes", written);

    // Sync engine with a custom source
    println!("2. Creating sync engine...");
    let inventory = InventorySource::default();
    inventory.set(&[("web", [10, 0, 0, 10]), ("db", [10, 0, 0, 11])]);

    let config = VmHostsConfig {
        hosts_file: HostsFileConfig {
            path: path.to_string_lossy().into_owned(),
            marker: MARKER.to_string(),
            backup: false,
        },
        source: SourceConfig::Custom {
            factory: "inventory".to_string(),
            config: serde_json::json!({}),
        },
        sync: SyncConfig {
            prune_stale: true,
            comment: COMMENT.to_string(),
            ..SyncConfig::default()
        },
    };

    let (engine, mut event_rx) = HostsSync::new(Box::new(inventory.clone()), config)?;

    let event_listener = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("[Event] {:?}", event);
        }
    });

    println!("3. Running cycles...");
    let report = engine.sync_once().await?;
    println!("   first cycle: {} upserted, {} pruned", report.upserted, report.removed);

    inventory.set(&[("web", [10, 0, 0, 42])]);
    let report = engine.sync_once().await?;
    println!("   second cycle: {} upserted, {} pruned", report.upserted, report.removed);

    let report = engine.sync_once().await?;
    println!("   third cycle committed: {}", report.committed);

    println!("4. Running the engine loop briefly...");
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let engine_handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
    let _ = shutdown_tx.send(());
    if let Ok(result) = engine_handle.await {
        result?;
    }
    let _ = tokio::time::timeout(tokio::time::Duration::from_millis(100), event_listener).await;

    println!("\n5. Final hosts file:\n");
    print!("{}", tokio::fs::read_to_string(&path).await?);

    tokio::fs::remove_file(&path).await?;

    println!("\n=== Embedding Successful ===");
    println!("Key Points:");
    println!("- Unmanaged lines are preserved byte for byte");
    println!("- Stale managed entries are pruned");
    println!("- Unchanged cycles do not rewrite the file");

    Ok(())
}
