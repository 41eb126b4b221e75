//! # Status and Events
//!
//! A snapshot of what the coordinator is doing, and the hook hosts implement
//! to hear about it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use connect_core::Region;

use crate::adapter::{RegionAction, RegionApplyError};
use crate::outcome::{SyncOutcome, SyncReason};

// =============================================================================
// Sync Status
// =============================================================================

/// Coordinator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
}

/// Current sync status for external queries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    /// Idle or syncing.
    pub state: SyncState,

    /// Whether a user session is active.
    pub logged_in: bool,

    /// Entry point that started the running episode.
    pub current_reason: Option<SyncReason>,

    /// Outcome of the last finished episode.
    pub last_outcome: Option<SyncOutcome>,

    /// When the last episode committed.
    pub last_sync: Option<DateTime<Utc>>,

    /// Last error message (if any).
    pub last_error: Option<String>,

    /// Number of regions in the persisted monitored set.
    pub monitored_regions: usize,
}

impl SyncStatus {
    pub fn is_syncing(&self) -> bool {
        self.state == SyncState::Syncing
    }
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Trait for emitting sync events (implemented by the host integration).
pub trait SyncEventEmitter: Send + Sync {
    /// Emits a status change event.
    fn emit_status(&self, status: &SyncStatus);

    /// Emits the outcome delivered to a caller.
    fn emit_outcome(&self, reason: SyncReason, outcome: SyncOutcome);

    /// Emits a failed geofence registration.
    fn emit_region_failure(&self, region: &Region, action: RegionAction, error: &RegionApplyError);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_outcome(&self, _reason: SyncReason, _outcome: SyncOutcome) {}
    fn emit_region_failure(&self, _region: &Region, _action: RegionAction, _error: &RegionApplyError) {}
}
