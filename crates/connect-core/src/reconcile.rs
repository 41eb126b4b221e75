//! # Region Reconciler
//!
//! Computes which geofences to register and deregister so the monitored set
//! matches the active location triggers, within the OS capacity limit.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  active (all connections)           monitored (OS mirror)              │
//! │        │                                   │                            │
//! │        ▼                                   │                            │
//! │  dedup by identifier                       │                            │
//! │        │                                   │                            │
//! │        ▼                                   │                            │
//! │  order: nearest to origin, else as given   │                            │
//! │        │                                   │                            │
//! │        ▼                                   │                            │
//! │  selected = first `capacity`               │                            │
//! │        │                                   │                            │
//! │        └────────────┬──────────────────────┘                            │
//! │                     ▼                                                   │
//! │  monitored ∖ selected           → to_remove                            │
//! │  selected ∖ monitored           → to_add                               │
//! │  same id, different geometry    → to_remove AND to_add                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Removals must be applied before additions: a geometry change removes and
//! re-adds the same identifier.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::region::{Coordinate, Region};

/// Registration changes needed to reach the target monitored set.
#[derive(Debug, Clone, Default)]
pub struct RegionDiff {
    pub to_add: Vec<Region>,
    pub to_remove: Vec<Region>,
}

impl RegionDiff {
    /// True when the monitored set is already correct.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Total number of registration calls this diff implies.
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

/// Diffs `active` against `monitored`, truncating in the order given.
pub fn diff(active: &[Region], monitored: &[Region], capacity: usize) -> RegionDiff {
    diff_with_origin(active, monitored, capacity, None)
}

/// Diffs `active` against `monitored`.
///
/// When `active` holds more regions than `capacity`, the regions nearest to
/// `origin` are kept. Without an origin the first `capacity` regions win.
/// Ties keep their original order.
pub fn diff_with_origin(
    active: &[Region],
    monitored: &[Region],
    capacity: usize,
    origin: Option<&Coordinate>,
) -> RegionDiff {
    let mut candidates = unique(active);

    if let Some(origin) = origin {
        candidates.sort_by(|a, b| {
            origin
                .distance_to(&a.center)
                .total_cmp(&origin.distance_to(&b.center))
        });
    }

    if candidates.len() > capacity {
        debug!(
            active = candidates.len(),
            capacity,
            by_distance = origin.is_some(),
            "Truncating active regions to capacity"
        );
        candidates.truncate(capacity);
    }

    let selected: HashMap<&str, &Region> = candidates
        .iter()
        .map(|region| (region.identifier.as_str(), *region))
        .collect();

    let monitored = unique(monitored);
    let monitored_by_id: HashMap<&str, &Region> = monitored
        .iter()
        .map(|region| (region.identifier.as_str(), *region))
        .collect();

    let to_remove = monitored
        .iter()
        .filter(|region| match selected.get(region.identifier.as_str()) {
            Some(target) => !target.same_geometry(region),
            None => true,
        })
        .map(|region| (*region).clone())
        .collect();

    let to_add = candidates
        .iter()
        .filter(|region| match monitored_by_id.get(region.identifier.as_str()) {
            Some(current) => !current.same_geometry(region),
            None => true,
        })
        .map(|region| (*region).clone())
        .collect();

    RegionDiff { to_add, to_remove }
}

/// Applies a diff to a monitored set: removals first, then additions.
pub fn apply(monitored: &[Region], diff: &RegionDiff) -> Vec<Region> {
    let mut result: Vec<Region> = unique(monitored)
        .into_iter()
        .filter(|region| !diff.to_remove.iter().any(|r| r.is_identical(region)))
        .cloned()
        .collect();

    for region in &diff.to_add {
        result.retain(|existing| existing.identifier != region.identifier);
        result.push(region.clone());
    }

    result
}

/// First occurrence of each identifier, in input order.
fn unique(regions: &[Region]) -> Vec<&Region> {
    let mut seen = HashSet::new();
    regions
        .iter()
        .filter(|region| seen.insert(region.identifier.as_str()))
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
