//! # connect-sync: Synchronization Coordinator for Connections
//!
//! This crate keeps the locally stored connection snapshots and the OS
//! geofence registrations in step with the server.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Sync Coordinator Architecture                       │
//! │                                                                         │
//! │   login  logout  update  background fetch  silent push  foreground     │
//! │     │      │       │            │               │            │          │
//! │  ┌──▼──────▼───────▼────────────▼───────────────▼────────────▼──────┐  │
//! │  │                 SyncCoordinator (single-flight)                  │  │
//! │  │                                                                  │  │
//! │  │  One episode at a time. Concurrent requests join it.            │  │
//! │  │  stop → Cancelled.  Background budget → NoData.                 │  │
//! │  └──────┬──────────────────────┬─────────────────────┬──────────────┘  │
//! │         ▼                      ▼                     ▼                  │
//! │  ┌────────────────┐  ┌───────────────────┐  ┌────────────────────┐     │
//! │  │ConnectionFetch.│  │  connect-core     │  │  TriggerMonitor    │     │
//! │  │                │  │                   │  │                    │     │
//! │  │ raw JSON per   │  │ parse, location   │  │ OS geofences       │     │
//! │  │ connection     │  │ regions, diff     │  │ add / remove       │     │
//! │  └────────────────┘  └───────────────────┘  └────────────────────┘     │
//! │                                 │                                       │
//! │                       ┌─────────▼─────────┐                             │
//! │                       │    connect-db     │                             │
//! │                       │ regions, snapshots│                             │
//! │                       │ registry, token   │                             │
//! │                       └───────────────────┘                             │
//! │                                                                         │
//! │  EVENTS (to the host via SyncEventEmitter):                            │
//! │  • status changes                                                      │
//! │  • outcome delivered per caller                                        │
//! │  • per-region registration failures                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`coordinator`] - `SyncCoordinator` and its builder
//! - [`adapter`] - Network and geofencing adapter traits
//! - [`outcome`] - `SyncOutcome`, `SyncReason`, completions
//! - [`events`] - Status snapshot and event emitter
//! - [`config`] - Coordinator configuration (capacity, budgets, API URL)
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use connect_sync::{SyncConfig, SyncCoordinatorBuilder, SyncReason};
//! use connect_db::{Database, DbConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new("connect.db")).await?;
//!
//! let coordinator = SyncCoordinatorBuilder::new(config)
//!     .with_database(db)
//!     .with_fetcher(Arc::new(fetcher))
//!     .with_monitor(Arc::new(monitor))
//!     .build()?;
//!
//! coordinator.initialize().await?;
//! coordinator.login().await?;
//!
//! let outcome = coordinator.sync(SyncReason::ManualUpdate).await;
//! println!("Outcome: {outcome}");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod adapter;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod outcome;

// =============================================================================
// Re-exports
// =============================================================================

pub use adapter::{
    ConnectionFetcher, FetchError, InMemoryTriggerMonitor, RegionAction, RegionApplyError,
    RegionApplyResult, TriggerMonitor,
};
pub use config::{StorageSettings, SyncConfig, SyncSettings};
pub use coordinator::{SyncCoordinator, SyncCoordinatorBuilder};
pub use error::{SyncError, SyncResult};
pub use events::{NoOpEmitter, SyncEventEmitter, SyncState, SyncStatus};
pub use outcome::{Completion, SyncOutcome, SyncReason};
