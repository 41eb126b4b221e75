//! # Platform Adapters
//!
//! The two boundaries the coordinator talks through: the network and the OS
//! geofencing facility. Both are traits so hosts plug in their own platform
//! code and tests plug in fakes.
//!
//! ## Boundaries
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SyncCoordinator                                 │
//! │                                                                         │
//! │        │ fetch(id, token)                     │ currently_monitored()   │
//! │        ▼                                      │ apply(add, remove)      │
//! │  ┌───────────────────────┐                    ▼                         │
//! │  │  ConnectionFetcher    │       ┌─────────────────────────────┐        │
//! │  │                       │       │  TriggerMonitor             │        │
//! │  │  Ok(bytes)            │       │                             │        │
//! │  │  Err(Auth)    fatal   │       │  per-region results:        │        │
//! │  │  Err(Network) retry   │       │  Ok / Err(RegionApplyError) │        │
//! │  │               later   │       │  (logged, never fatal)      │        │
//! │  └───────────────────────┘       └─────────────────────────────┘        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;

use connect_core::{Coordinate, Region};

// =============================================================================
// Network Adapter
// =============================================================================

/// Failure of a single connection fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The token was missing or rejected.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The request did not complete.
    #[error("network failure: {0}")]
    Network(String),
}

/// Fetches the raw state of one connection.
#[async_trait]
pub trait ConnectionFetcher: Send + Sync {
    /// Returns the raw response body for `connection_id`.
    async fn fetch(&self, connection_id: &str, token: Option<&str>) -> Result<Vec<u8>, FetchError>;
}

// =============================================================================
// Trigger Monitor Adapter
// =============================================================================

/// Registration call made for a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionAction {
    Add,
    Remove,
}

impl std::fmt::Display for RegionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionAction::Add => write!(f, "add"),
            RegionAction::Remove => write!(f, "remove"),
        }
    }
}

/// Failure of one geofence registration call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionApplyError {
    /// The OS refused the call.
    #[error("rejected by the platform: {0}")]
    Rejected(String),

    /// The OS limit on monitored regions was reached.
    #[error("region capacity exceeded")]
    CapacityExceeded,

    /// Region monitoring is unavailable (permission denied, hardware).
    #[error("region monitoring unavailable: {0}")]
    Unavailable(String),
}

/// Result of one registration call.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionApplyResult {
    pub region: Region,
    pub action: RegionAction,
    pub result: Result<(), RegionApplyError>,
}

impl RegionApplyResult {
    pub fn ok(region: Region, action: RegionAction) -> Self {
        RegionApplyResult {
            region,
            action,
            result: Ok(()),
        }
    }

    pub fn failed(region: Region, action: RegionAction, error: RegionApplyError) -> Self {
        RegionApplyResult {
            region,
            action,
            result: Err(error),
        }
    }
}

/// The OS geofencing facility.
#[async_trait]
pub trait TriggerMonitor: Send + Sync {
    /// Every region the OS reports as monitored, including ones the SDK
    /// does not own.
    async fn currently_monitored(&self) -> Vec<Region>;

    /// Removes `to_remove`, then registers `to_add`. One result per region.
    async fn apply(&self, to_add: &[Region], to_remove: &[Region]) -> Vec<RegionApplyResult>;

    /// Last known device location, used to keep the nearest regions when
    /// over capacity.
    fn last_known_location(&self) -> Option<Coordinate> {
        None
    }
}

// =============================================================================
// In-Memory Trigger Monitor
// =============================================================================

/// A `TriggerMonitor` that keeps registrations in memory.
///
/// Behaves like the OS facility: a capacity limit, identifiers unique, and
/// optional per-identifier failures. Used by `connect-sim` and tests.
#[derive(Debug)]
pub struct InMemoryTriggerMonitor {
    capacity: usize,
    regions: Mutex<Vec<Region>>,
    failing: HashSet<String>,
    location: Option<Coordinate>,
    apply_calls: AtomicUsize,
}

impl InMemoryTriggerMonitor {
    pub fn new(capacity: usize) -> Self {
        InMemoryTriggerMonitor {
            capacity,
            regions: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            location: None,
            apply_calls: AtomicUsize::new(0),
        }
    }

    /// Starts with regions already registered (possibly by other code).
    pub fn with_regions(mut self, regions: Vec<Region>) -> Self {
        self.regions = Mutex::new(regions);
        self
    }

    /// Every call touching `identifier` fails with `Rejected`.
    pub fn failing_on(mut self, identifier: impl Into<String>) -> Self {
        self.failing.insert(identifier.into());
        self
    }

    /// Reports `location` as the last known device location.
    pub fn with_location(mut self, location: Coordinate) -> Self {
        self.location = Some(location);
        self
    }

    /// Number of `apply` calls so far.
    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    fn check(&self, region: &Region) -> Result<(), RegionApplyError> {
        if self.failing.contains(&region.identifier) {
            Err(RegionApplyError::Rejected(format!(
                "refused {}",
                region.identifier
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TriggerMonitor for InMemoryTriggerMonitor {
    async fn currently_monitored(&self) -> Vec<Region> {
        self.regions.lock().await.clone()
    }

    async fn apply(&self, to_add: &[Region], to_remove: &[Region]) -> Vec<RegionApplyResult> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        let mut regions = self.regions.lock().await;
        let mut results = Vec::with_capacity(to_add.len() + to_remove.len());

        for region in to_remove {
            let result = self.check(region).map(|()| {
                regions.retain(|r| r.identifier != region.identifier);
            });
            results.push(RegionApplyResult {
                region: region.clone(),
                action: RegionAction::Remove,
                result,
            });
        }

        for region in to_add {
            let replaces = regions.iter().any(|r| r.identifier == region.identifier);
            let result = self.check(region).and_then(|()| {
                if !replaces && regions.len() >= self.capacity {
                    return Err(RegionApplyError::CapacityExceeded);
                }
                regions.retain(|r| r.identifier != region.identifier);
                regions.push(region.clone());
                Ok(())
            });
            results.push(RegionApplyResult {
                region: region.clone(),
                action: RegionAction::Add,
                result,
            });
        }

        results
    }

    fn last_known_location(&self) -> Option<Coordinate> {
        self.location
    }
}
