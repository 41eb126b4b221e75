//! # Repository Module
//!
//! Repository implementations for the sync store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  SyncCoordinator                                                       │
//! │       │                                                                 │
//! │       │  db.regions().list()                                           │
//! │       ▼                                                                 │
//! │  RegionRepository      → monitored_regions                             │
//! │  SnapshotRepository    → connection_snapshots                          │
//! │  RegistryRepository    → registered_connections                        │
//! │  CredentialRepository  → credentials                                   │
//! │                                                                         │
//! │  Each repository owns exactly one table. Writes that span tables       │
//! │  live on `Database` and run inside one transaction.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`region::RegionRepository`] - Mirror of the OS geofence registrations
//! - [`snapshot::SnapshotRepository`] - Last good payload per connection
//! - [`registry::RegistryRepository`] - Connection ids to sync
//! - [`credential::CredentialRepository`] - User token

pub mod credential;
pub mod region;
pub mod registry;
pub mod snapshot;
