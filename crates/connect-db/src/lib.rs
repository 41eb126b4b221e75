//! # connect-db: Local Store for Connection Sync
//!
//! This crate persists everything the sync coordinator must remember between
//! launches. It uses SQLite with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Connection Sync Data Flow                        │
//! │                                                                         │
//! │  SyncCoordinator (connect-sync)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    connect-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐ │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │ │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │ │   │
//! │  │   │               │    │ RegionRepo     │    │ 001_init.sql │ │   │
//! │  │   │ SqlitePool    │◄───│ SnapshotRepo   │    │              │ │   │
//! │  │   │ commit_sync   │    │ RegistryRepo   │    │              │ │   │
//! │  │   │ clear_all     │    │ CredentialRepo │    │              │ │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘ │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/com.ifttt.connect/connect.db                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, sync commits and logout teardown
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use connect_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/connect.db")).await?;
//!
//! db.registry().register("LMhuSZW9").await?;
//! let monitored = db.regions().list().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::credential::CredentialRepository;
pub use repository::region::RegionRepository;
pub use repository::registry::RegistryRepository;
pub use repository::snapshot::{Snapshot, SnapshotRepository};
