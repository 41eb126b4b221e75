//! # Connection Sync Simulator
//!
//! Drives a `SyncCoordinator` against connection responses stored as JSON
//! files, with geofences kept in memory.
//!
//! ## Usage
//! ```bash
//! # Sync the connections in ./responses (reads ./responses/<id>.json)
//! cargo run -p connect-sync --bin connect-sim -- --dir ./responses LMhuSZW9
//!
//! # Use a specific database and config file
//! cargo run -p connect-sync --bin connect-sim -- --db ./connect_dev.db --config ./sync.toml LMhuSZW9
//!
//! # Tear everything down
//! cargo run -p connect-sync --bin connect-sim -- --logout
//! ```
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show debug messages
//! - Default: `info,connect=debug,sqlx=warn`

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

use connect_db::{Database, DbConfig};
use connect_sync::{
    ConnectionFetcher, FetchError, InMemoryTriggerMonitor, SyncConfig, SyncCoordinatorBuilder,
    SyncReason,
};

/// Serves `<dir>/<connection_id>.json` as the connection response.
struct FileFetcher {
    dir: PathBuf,
}

#[async_trait]
impl ConnectionFetcher for FileFetcher {
    async fn fetch(&self, connection_id: &str, _token: Option<&str>) -> Result<Vec<u8>, FetchError> {
        let path = self.dir.join(format!("{connection_id}.json"));
        tokio::fs::read(&path)
            .await
            .map_err(|e| FetchError::Network(format!("{}: {e}", path.display())))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,connect=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut dir = PathBuf::from(".");
    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut logout = false;
    let mut connection_ids = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--dir" => {
                if i + 1 < args.len() {
                    dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--logout" => logout = true,
            "--help" | "-h" => {
                println!("Connection Sync Simulator");
                println!();
                println!("Usage: connect-sim [OPTIONS] [CONNECTION_ID]...");
                println!();
                println!("Options:");
                println!("      --dir <DIR>      Directory of <id>.json responses (default: .)");
                println!("  -d, --db <PATH>      Database file path (default: from config)");
                println!("  -c, --config <PATH>  Config file path");
                println!("      --logout         Remove every geofence and clear local state");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            id => connection_ids.push(id.to_string()),
        }
        i += 1;
    }

    init_tracing();

    let config = SyncConfig::load_or_default(config_path);
    let db_path = db_path
        .or_else(|| config.database_path())
        .unwrap_or_else(|| PathBuf::from("./connect_dev.db"));

    println!("Connection Sync Simulator");
    println!("=========================");
    println!("Database:  {}", db_path.display());
    println!("Responses: {}", dir.display());
    println!("Capacity:  {}", config.region_capacity());
    println!();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = Database::new(DbConfig::new(&db_path).connect_timeout(Duration::from_secs(10))).await?;

    let monitor = Arc::new(InMemoryTriggerMonitor::new(config.region_capacity()));
    let coordinator = SyncCoordinatorBuilder::new(config)
        .with_database(db.clone())
        .with_fetcher(Arc::new(FileFetcher { dir }))
        .with_monitor(monitor)
        .build()?;

    coordinator.initialize().await?;

    if logout {
        coordinator.logout().await?;
        println!("✓ Logged out, local state cleared");
        db.close().await;
        return Ok(());
    }

    for id in &connection_ids {
        if coordinator.register_connection(id).await? {
            println!("✓ Registered {id}");
        }
    }

    if !coordinator.status().await.logged_in {
        coordinator.login().await?;
    }

    let outcome = coordinator.sync(SyncReason::ManualUpdate).await;
    let status = coordinator.status().await;

    println!();
    println!("Outcome: {outcome}");
    if let Some(error) = &status.last_error {
        println!("Error:   {error}");
    }

    println!();
    println!("Connections:");
    for connection in coordinator.connections().await? {
        println!("  {} - {}", connection.id(), connection.name());
    }

    println!();
    println!("Monitored regions:");
    for region in coordinator.monitored_regions().await? {
        println!(
            "  {} r={}m ({}, {})",
            region.identifier, region.radius, region.center.latitude, region.center.longitude
        );
    }

    db.close().await;
    Ok(())
}
