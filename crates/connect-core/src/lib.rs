//! # connect-core: Pure Domain Model for Connection Sync
//!
//! This crate holds the connection model and the geofence reconciler as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Connection Sync Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Host app glue (login, background fetch, push)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                connect-sync (SyncCoordinator)                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ connect-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │  ┌────────────┐  ┌──────────┐  ┌───────────┐  ┌─────────────┐ │   │
//! │  │  │ connection │  │ trigger  │  │  region   │  │  reconcile  │ │   │
//! │  │  │   parse    │  │ Location │  │  Region   │  │  RegionDiff │ │   │
//! │  │  │   images   │  │  Other   │  │ Coordinate│  │  capacity   │ │   │
//! │  │  └────────────┘  └──────────┘  └───────────┘  └─────────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`connection`] - `Connection`, `Feature`, cover images, response parsing
//! - [`trigger`] - `Trigger` variants and their wire shape
//! - [`region`] - `Region` and `Coordinate` value objects
//! - [`storage`] - `ConnectionStorage`, the derived location view
//! - [`reconcile`] - Region diffing against the monitored set
//! - [`identifier`] - `ifttt_` namespacing of region identifiers
//! - [`validation`] - Range checks for trigger fields
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use connect_core::{reconcile, Connection, ConnectionStorage};
//!
//! let raw = br#"{
//!     "id": "abc123",
//!     "name": "Arrive home",
//!     "user_triggers": [{
//!         "type": "location", "id": "home", "radius": 150.0,
//!         "center": { "lat": 40.7128, "lng": -74.0060 }
//!     }]
//! }"#;
//!
//! let connection = Connection::parse(raw).unwrap();
//! let active = ConnectionStorage::new(&connection).location_regions();
//!
//! let diff = reconcile::diff(&active, &[], connect_core::DEFAULT_REGION_CAPACITY);
//! assert_eq!(diff.to_add[0].identifier, "ifttt_home");
//! assert!(diff.to_remove.is_empty());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod connection;
pub mod error;
pub mod identifier;
pub mod reconcile;
pub mod region;
pub mod storage;
pub mod trigger;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use connection::{Connection, ConnectionStatus, CoverImage, Feature, ImageSize};
pub use error::{CoreError, CoreResult, ParseError, ValidationError};
pub use identifier::{add_prefix, is_sdk_owned, strip_prefix, IFTTT_PREFIX};
pub use reconcile::RegionDiff;
pub use region::{Coordinate, Region};
pub use storage::ConnectionStorage;
pub use trigger::Trigger;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default number of geofences an app may register.
///
/// iOS caps region monitoring at 20 regions per app. The coordinator takes
/// its capacity from configuration; this is only the default.
pub const DEFAULT_REGION_CAPACITY: usize = 20;
