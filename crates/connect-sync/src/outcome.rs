//! # Sync Outcomes
//!
//! What a caller learns when its request resolves, why the request was made,
//! and the single-use continuation that delivers the answer.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Outcome
// =============================================================================

/// Coarse result of a sync episode, as seen by every attached caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The episode changed a snapshot or the monitored regions.
    NewData,
    /// The episode finished without changes, or the caller's deadline passed.
    NoData,
    /// The episode failed. Details are in `SyncStatus::last_error`.
    Failed,
    /// `stop_current_synchronization` or `logout` ended the episode.
    Cancelled,
}

impl SyncOutcome {
    /// Returns true for outcomes that are not failures.
    ///
    /// `Cancelled` is not a failure.
    pub fn is_success(&self) -> bool {
        !matches!(self, SyncOutcome::Failed)
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::NewData => write!(f, "new_data"),
            SyncOutcome::NoData => write!(f, "no_data"),
            SyncOutcome::Failed => write!(f, "failed"),
            SyncOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

// =============================================================================
// Reason
// =============================================================================

/// Entry point that asked for a sync. Carried through for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncReason {
    Login,
    Logout,
    ManualUpdate,
    BackgroundFetch,
    SilentPush,
    BackgroundProcess,
    AppForeground,
    Stop,
}

impl SyncReason {
    /// Entry points the OS gives a limited amount of time.
    pub fn has_time_budget(&self) -> bool {
        matches!(self, SyncReason::BackgroundFetch | SyncReason::BackgroundProcess)
    }
}

impl fmt::Display for SyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncReason::Login => "login",
            SyncReason::Logout => "logout",
            SyncReason::ManualUpdate => "manual_update",
            SyncReason::BackgroundFetch => "background_fetch",
            SyncReason::SilentPush => "silent_push",
            SyncReason::BackgroundProcess => "background_process",
            SyncReason::AppForeground => "app_foreground",
            SyncReason::Stop => "stop",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Completion
// =============================================================================

/// A continuation invoked exactly once with the caller's outcome.
///
/// Consuming `complete` makes a second invocation impossible.
pub struct Completion(Box<dyn FnOnce(SyncOutcome) + Send + 'static>);

impl Completion {
    pub fn new(f: impl FnOnce(SyncOutcome) + Send + 'static) -> Self {
        Completion(Box::new(f))
    }

    /// A completion for fire-and-forget entry points.
    pub fn noop() -> Self {
        Completion::new(|_| {})
    }

    /// Adapts a success flag callback: `true` unless the outcome is `Failed`.
    pub fn from_success(f: impl FnOnce(bool) + Send + 'static) -> Self {
        Completion::new(move |outcome| f(outcome.is_success()))
    }

    pub(crate) fn complete(self, outcome: SyncOutcome) {
        (self.0)(outcome)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Completion")
    }
}
