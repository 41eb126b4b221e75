//! # Synchronization Coordinator
//!
//! Owns the monitored region set and the connection snapshots, and runs at
//! most one sync episode at a time.
//!
//! ## Episode Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncCoordinator                                  │
//! │                                                                         │
//! │  request(reason, completion)                                           │
//! │       │                                                                 │
//! │       ├── logged out? ───────────────► completion(NoData)              │
//! │       │                                                                 │
//! │       ├── Syncing? ── attach waiter ──► (resolved with the episode)    │
//! │       │                                                                 │
//! │       ▼  Idle                                                           │
//! │  ┌──────────────────────────── Syncing ───────────────────────────┐    │
//! │  │                                                                │    │
//! │  │  fetch every registered connection   ◄── cancel token aborts   │    │
//! │  │       │                                                        │    │
//! │  │       ▼                                                        │    │
//! │  │  parse (malformed → keep previous snapshot)                    │    │
//! │  │       │                                                        │    │
//! │  │       ▼                                                        │    │
//! │  │  union location regions → reconcile against persisted set     │    │
//! │  │       │                                                        │    │
//! │  │  ─ ─ ─│─ ─ ─ state lock, episode still current? ─ ─ ─ ─ ─ ─    │    │
//! │  │       ▼                                                        │    │
//! │  │  apply diff via TriggerMonitor (per-region failures logged)    │    │
//! │  │       │                                                        │    │
//! │  │       ▼                                                        │    │
//! │  │  commit regions + snapshots in one transaction                 │    │
//! │  └───────┬────────────────────────────────────────────────────────┘    │
//! │          ▼                                                              │
//! │  every waiter ◄── NewData | NoData | Failed                            │
//! │  Idle                                                                  │
//! │                                                                         │
//! │  stop_current_synchronization() ── waiters ◄── Cancelled, Idle         │
//! │  background waiters past budget  ── waiter  ◄── NoData (episode runs)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All state transitions happen under one `tokio::sync::Mutex`. Completions
//! always run after the lock is released. A caller's completion sits in a
//! take-once slot shared with its deadline task, so a background deadline
//! can answer without waiting for the lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::try_join_all;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use connect_core::reconcile::{self, RegionDiff};
use connect_core::validation::validate_identifier;
use connect_core::{is_sdk_owned, Connection, ConnectionStorage, Coordinate, Region};
use connect_db::Database;

use crate::adapter::{ConnectionFetcher, RegionAction, RegionApplyResult, TriggerMonitor};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{NoOpEmitter, SyncEventEmitter, SyncState, SyncStatus};
use crate::outcome::{Completion, SyncOutcome, SyncReason};

// =============================================================================
// Episode State
// =============================================================================

/// A completion that is delivered by whichever side takes it first: the
/// episode or the caller's deadline.
#[derive(Clone)]
struct CompletionSlot(Arc<std::sync::Mutex<Option<Completion>>>);

impl CompletionSlot {
    fn new(completion: Completion) -> Self {
        CompletionSlot(Arc::new(std::sync::Mutex::new(Some(completion))))
    }

    fn take(&self) -> Option<Completion> {
        match self.0.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

/// A caller attached to an episode.
struct Waiter {
    reason: SyncReason,
    slot: CompletionSlot,
}

impl Waiter {
    fn new(reason: SyncReason, completion: Completion) -> Self {
        Waiter {
            reason,
            slot: CompletionSlot::new(completion),
        }
    }
}

/// One in-flight sync.
struct Episode {
    id: Uuid,
    reason: SyncReason,
    /// Aborts the fetch and invalidates any late result.
    cancel: CancellationToken,
    /// Fired once the episode resolves, for whatever reason.
    done: CancellationToken,
    waiters: Vec<Waiter>,
}

enum Phase {
    Idle,
    Syncing(Episode),
}

struct State {
    logged_in: bool,
    phase: Phase,
    status: SyncStatus,
}

impl State {
    fn is_current(&self, episode_id: Uuid) -> bool {
        matches!(&self.phase, Phase::Syncing(episode) if episode.id == episode_id)
    }

    /// Ends `episode_id` with `outcome` and hands back its waiters.
    fn finish(&mut self, episode_id: Uuid, outcome: SyncOutcome, error: Option<String>) -> Vec<Waiter> {
        if !self.is_current(episode_id) {
            return Vec::new();
        }

        let waiters = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Syncing(episode) => {
                episode.done.cancel();
                episode.waiters
            }
            Phase::Idle => Vec::new(),
        };

        self.status.state = SyncState::Idle;
        self.status.current_reason = None;
        self.status.last_outcome = Some(outcome);
        self.status.last_error = error;
        waiters
    }

    /// Cancels the running episode, if any, and hands back its waiters.
    fn cancel_current(&mut self) -> Option<(Uuid, SyncReason, Vec<Waiter>)> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Syncing(episode) => {
                episode.cancel.cancel();
                episode.done.cancel();
                self.status.state = SyncState::Idle;
                self.status.current_reason = None;
                self.status.last_outcome = Some(SyncOutcome::Cancelled);
                Some((episode.id, episode.reason, episode.waiters))
            }
            Phase::Idle => None,
        }
    }
}

/// Everything computed before the commit point.
struct Plan {
    /// Freshly parsed connections, to be stored as snapshots.
    snapshots: Vec<Connection>,
    /// Connections whose regions are active: every fresh one plus the
    /// previous snapshot of each malformed response.
    current: Vec<Connection>,
    /// Persisted monitored set the diff was computed against.
    monitored: Vec<Region>,
    capacity: usize,
    origin: Option<Coordinate>,
    diff: RegionDiff,
    /// Ids whose fresh snapshot differs from the stored one.
    changed: HashSet<String>,
}

// =============================================================================
// Coordinator
// =============================================================================

struct Inner {
    config: SyncConfig,
    db: Database,
    fetcher: Arc<dyn ConnectionFetcher>,
    monitor: Arc<dyn TriggerMonitor>,
    emitter: Arc<dyn SyncEventEmitter>,
    state: Mutex<State>,
}

/// The process-wide synchronization coordinator.
///
/// Cloning is cheap and every clone drives the same coordinator.
///
/// ## Example
/// ```rust,ignore
/// let coordinator = SyncCoordinatorBuilder::new(config)
///     .with_database(db)
///     .with_fetcher(Arc::new(HttpFetcher::new()))
///     .with_monitor(Arc::new(platform_monitor))
///     .build()?;
///
/// coordinator.initialize().await?;
/// coordinator.register_connection("LMhuSZW9").await?;
/// coordinator.login().await?;
///
/// coordinator.handle_background_fetch(|outcome| {
///     println!("background fetch finished: {outcome}");
/// }).await;
/// ```
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    /// Creates a coordinator with the no-op event emitter.
    pub fn new(
        config: SyncConfig,
        db: Database,
        fetcher: Arc<dyn ConnectionFetcher>,
        monitor: Arc<dyn TriggerMonitor>,
    ) -> Self {
        Self::with_emitter(config, db, fetcher, monitor, Arc::new(NoOpEmitter))
    }

    /// Creates a coordinator with a custom event emitter.
    pub fn with_emitter(
        config: SyncConfig,
        db: Database,
        fetcher: Arc<dyn ConnectionFetcher>,
        monitor: Arc<dyn TriggerMonitor>,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        let state = State {
            logged_in: false,
            phase: Phase::Idle,
            status: SyncStatus::default(),
        };

        SyncCoordinator {
            inner: Arc::new(Inner {
                config,
                db,
                fetcher,
                monitor,
                emitter,
                state: Mutex::new(state),
            }),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Restores the session flag and reconciles the persisted region set with
    /// what the OS reports. Call once at process start.
    ///
    /// The OS is authoritative: if it disagrees with the store, the store is
    /// overwritten with the OS's `ifttt_` regions.
    pub async fn initialize(&self) -> SyncResult<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;

        let logged_in = inner.db.credentials().session_active().await?;

        let os_owned: Vec<Region> = inner
            .monitor
            .currently_monitored()
            .await
            .into_iter()
            .filter(|region| is_sdk_owned(&region.identifier))
            .collect();
        let persisted = inner.db.regions().list().await?;

        let in_sync = os_owned.len() == persisted.len()
            && persisted
                .iter()
                .all(|p| os_owned.iter().any(|o| o.is_identical(p)));

        if !in_sync {
            warn!(
                persisted = persisted.len(),
                os = os_owned.len(),
                "Persisted regions disagree with the OS, adopting the OS set"
            );
            inner.db.regions().replace_all(&os_owned).await?;
        }

        state.logged_in = logged_in;
        state.status.logged_in = logged_in;
        state.status.monitored_regions = os_owned.len();
        let status = state.status.clone();
        drop(state);

        info!(logged_in, regions = os_owned.len(), "Sync coordinator initialized");
        inner.emitter.emit_status(&status);
        Ok(())
    }

    /// Starts a session and syncs.
    pub async fn login(&self) -> SyncResult<()> {
        self.inner.db.credentials().mark_session_active().await?;

        {
            let mut state = self.inner.state.lock().await;
            state.logged_in = true;
            state.status.logged_in = true;
        }

        info!("User logged in");
        self.request(SyncReason::Login, Completion::noop()).await;
        Ok(())
    }

    /// Ends the session: cancels any running episode, removes every SDK-owned
    /// geofence and clears the token, snapshots, registry and region set.
    pub async fn logout(&self) -> SyncResult<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;

        let cancelled = state.cancel_current();
        state.logged_in = false;
        state.status.logged_in = false;

        let teardown = inner.teardown().await;
        if teardown.is_ok() {
            state.status.monitored_regions = 0;
        }
        let status = state.status.clone();
        drop(state);

        match &teardown {
            Ok(()) => info!(reason = %SyncReason::Logout, "User logged out"),
            Err(e) => error!(reason = %SyncReason::Logout, error = %e, "Logout teardown failed"),
        }

        if let Some((episode_id, _, waiters)) = cancelled {
            debug!(episode = %episode_id, waiters = waiters.len(), "Logout cancelled running sync");
            inner.deliver(waiters, SyncOutcome::Cancelled);
        }
        inner.emitter.emit_status(&status);
        teardown
    }

    /// Stores `token` (if given) and syncs.
    pub async fn update(&self, token: Option<&str>) -> SyncResult<()> {
        if let Some(token) = token {
            self.inner.db.credentials().set_user_token(token).await?;
            debug!("User token updated");
        }

        self.request(SyncReason::ManualUpdate, Completion::noop()).await;
        Ok(())
    }

    /// Cancels the running episode. Every attached caller gets `Cancelled`.
    pub async fn stop_current_synchronization(&self) {
        let mut state = self.inner.state.lock().await;
        let cancelled = state.cancel_current();
        let status = state.status.clone();
        drop(state);

        let Some((episode_id, reason, waiters)) = cancelled else {
            debug!(reason = %SyncReason::Stop, "No synchronization to stop");
            return;
        };

        info!(
            episode = %episode_id,
            started_by = %reason,
            waiters = waiters.len(),
            reason = %SyncReason::Stop,
            "Stopped current synchronization"
        );
        self.inner.deliver(waiters, SyncOutcome::Cancelled);
        self.inner.emitter.emit_status(&status);
    }

    // =========================================================================
    // Entry Points
    // =========================================================================

    /// OS background-fetch callback. Answers within the background budget.
    pub async fn handle_background_fetch(&self, completion: impl FnOnce(SyncOutcome) + Send + 'static) {
        self.request(SyncReason::BackgroundFetch, Completion::new(completion))
            .await;
    }

    /// Silent push notification callback.
    pub async fn handle_silent_push(&self, completion: impl FnOnce(SyncOutcome) + Send + 'static) {
        self.request(SyncReason::SilentPush, Completion::new(completion))
            .await;
    }

    /// App-managed background process. `completion` receives `true` unless
    /// the sync failed. Answers within the background budget.
    pub async fn start_background_process(&self, completion: impl FnOnce(bool) + Send + 'static) {
        self.request(SyncReason::BackgroundProcess, Completion::from_success(completion))
            .await;
    }

    /// The app came to the foreground.
    pub async fn handle_app_foreground(&self) {
        self.request(SyncReason::AppForeground, Completion::noop())
            .await;
    }

    /// Requests a sync and waits for this caller's outcome.
    pub async fn sync(&self, reason: SyncReason) -> SyncOutcome {
        let (tx, rx) = oneshot::channel();
        self.request(
            reason,
            Completion::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        )
        .await;

        rx.await.unwrap_or(SyncOutcome::Failed)
    }

    /// Requests a sync. Joins the running episode if there is one.
    ///
    /// `completion` is invoked exactly once.
    pub async fn request(&self, reason: SyncReason, completion: Completion) {
        let inner = &self.inner;
        let mut guard = inner.state.lock().await;
        let state = &mut *guard;

        if !state.logged_in {
            drop(guard);
            debug!(reason = %reason, "Not logged in, nothing to sync");
            inner.deliver(vec![Waiter::new(reason, completion)], SyncOutcome::NoData);
            return;
        }

        let waiter = Waiter::new(reason, completion);
        let slot = waiter.slot.clone();

        let (episode_id, done, started) = match &mut state.phase {
            Phase::Syncing(episode) => {
                episode.waiters.push(waiter);
                debug!(
                    episode = %episode.id,
                    reason = %reason,
                    waiters = episode.waiters.len(),
                    "Joining in-flight sync"
                );
                (episode.id, episode.done.clone(), None)
            }
            Phase::Idle => {
                let episode = Episode {
                    id: Uuid::new_v4(),
                    reason,
                    cancel: CancellationToken::new(),
                    done: CancellationToken::new(),
                    waiters: vec![waiter],
                };
                let handles = (episode.id, episode.done.clone(), Some(episode.cancel.clone()));
                state.phase = Phase::Syncing(episode);
                state.status.state = SyncState::Syncing;
                state.status.current_reason = Some(reason);
                handles
            }
        };
        let status = state.status.clone();
        drop(guard);

        if let Some(cancel) = started {
            info!(episode = %episode_id, reason = %reason, "Starting sync");
            inner.emitter.emit_status(&status);
            tokio::spawn(inner.clone().run_episode(episode_id, cancel));
        }

        if reason.has_time_budget() {
            tokio::spawn(inner.clone().enforce_deadline(episode_id, slot, reason, done));
        }
    }

    // =========================================================================
    // Connection Registry
    // =========================================================================

    /// Adds a connection to the set that is synced. Returns false if it was
    /// already registered.
    pub async fn register_connection(&self, connection_id: &str) -> SyncResult<bool> {
        validate_identifier(connection_id)
            .map_err(|e| SyncError::InvalidArgument(e.to_string()))?;

        let _state = self.inner.state.lock().await;
        let added = self.inner.db.registry().register(connection_id).await?;
        info!(connection_id = %connection_id, added, "Connection registered");
        Ok(added)
    }

    /// Removes a connection and its snapshot. Its regions are removed by the
    /// next sync.
    ///
    /// Holds the state lock, so a running episode either commits before the
    /// removal or sees it and leaves the connection out.
    pub async fn unregister_connection(&self, connection_id: &str) -> SyncResult<bool> {
        let _state = self.inner.state.lock().await;
        let removed = self.inner.db.registry().unregister(connection_id).await?;
        self.inner.db.snapshots().delete(connection_id).await?;
        info!(connection_id = %connection_id, removed, "Connection unregistered");
        Ok(removed)
    }

    // =========================================================================
    // Readers
    // =========================================================================

    /// Current status.
    pub async fn status(&self) -> SyncStatus {
        self.inner.state.lock().await.status.clone()
    }

    /// Every stored connection snapshot.
    pub async fn connections(&self) -> SyncResult<Vec<Connection>> {
        let snapshots = self.inner.db.snapshots().list().await?;
        Ok(snapshots.into_iter().map(|s| s.connection).collect())
    }

    /// The stored snapshot of one connection. Wrap it in
    /// [`ConnectionStorage`] for the derived location view.
    pub async fn connection(&self, connection_id: &str) -> SyncResult<Option<Connection>> {
        let snapshot = self.inner.db.snapshots().get(connection_id).await?;
        Ok(snapshot.map(|s| s.connection))
    }

    /// The persisted monitored region set.
    pub async fn monitored_regions(&self) -> SyncResult<Vec<Region>> {
        Ok(self.inner.db.regions().list().await?)
    }
}

// =============================================================================
// Episode Pipeline
// =============================================================================

impl Inner {
    async fn run_episode(self: Arc<Self>, episode_id: Uuid, cancel: CancellationToken) {
        let prepared = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(episode = %episode_id, "Sync cancelled before commit");
                return;
            }
            result = self.prepare(episode_id) => result,
        };

        let mut state = self.state.lock().await;
        if cancel.is_cancelled() || !state.is_current(episode_id) {
            warn!(episode = %episode_id, "Discarding results of a cancelled sync");
            return;
        }

        let result = match prepared {
            Ok(plan) => self.commit(episode_id, plan).await,
            Err(e) => Err(e),
        };

        let (outcome, error) = match result {
            Ok((outcome, regions)) => {
                state.status.monitored_regions = regions;
                state.status.last_sync = Some(Utc::now());
                (outcome, None)
            }
            Err(e) => {
                error!(
                    episode = %episode_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    auth = e.is_auth_error(),
                    "Sync failed"
                );
                (SyncOutcome::Failed, Some(e.to_string()))
            }
        };

        let waiters = state.finish(episode_id, outcome, error);
        let status = state.status.clone();
        drop(state);

        info!(episode = %episode_id, outcome = %outcome, waiters = waiters.len(), "Sync finished");
        self.deliver(waiters, outcome);
        self.emitter.emit_status(&status);
    }

    /// Fetch, parse and reconcile. Touches no persisted state.
    async fn prepare(&self, episode_id: Uuid) -> SyncResult<Plan> {
        let ids = self.db.registry().list().await?;
        let token = self.db.credentials().user_token().await?;
        let previous: HashMap<String, Connection> = self
            .db
            .snapshots()
            .list()
            .await?
            .into_iter()
            .map(|s| (s.connection.id().to_string(), s.connection))
            .collect();

        debug!(episode = %episode_id, connections = ids.len(), "Fetching connections");
        let responses = try_join_all(ids.iter().map(|id| self.fetch_one(id, token.as_deref()))).await?;

        let mut snapshots = Vec::with_capacity(ids.len());
        let mut current = Vec::with_capacity(ids.len());
        let mut changed = HashSet::new();

        for (id, raw) in ids.iter().zip(responses) {
            match parse_response(id, &raw) {
                Ok(connection) => {
                    let is_new = !previous
                        .get(id)
                        .is_some_and(|stored| stored.is_identical(&connection));
                    debug!(
                        episode = %episode_id,
                        connection_id = %id,
                        triggers = connection.active_user_triggers().len(),
                        changed = is_new,
                        "Parsed connection"
                    );
                    if is_new {
                        changed.insert(id.clone());
                    }
                    current.push(connection.clone());
                    snapshots.push(connection);
                }
                Err(e) => {
                    warn!(
                        episode = %episode_id,
                        connection_id = %id,
                        error = %e,
                        "Keeping previous snapshot of malformed connection"
                    );
                    if let Some(connection) = previous.get(id) {
                        current.push(connection.clone());
                    }
                }
            }
        }

        let active = active_regions(&current);

        let monitored = self.db.regions().list().await?;
        let foreign = self
            .monitor
            .currently_monitored()
            .await
            .iter()
            .filter(|region| !is_sdk_owned(&region.identifier))
            .count();
        let capacity = self.config.region_capacity().saturating_sub(foreign);
        let origin = self.monitor.last_known_location();

        let diff = reconcile::diff_with_origin(&active, &monitored, capacity, origin.as_ref());
        debug!(
            episode = %episode_id,
            active = active.len(),
            capacity,
            foreign,
            added = diff.to_add.len(),
            removed = diff.to_remove.len(),
            "Regions reconciled"
        );

        Ok(Plan {
            snapshots,
            current,
            monitored,
            capacity,
            origin,
            diff,
            changed,
        })
    }

    async fn fetch_one(&self, connection_id: &str, token: Option<&str>) -> SyncResult<Vec<u8>> {
        let timeout = self.config.fetch_timeout();

        match tokio::time::timeout(timeout, self.fetcher.fetch(connection_id, token)).await {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(e)) => {
                warn!(connection_id = %connection_id, error = %e, "Fetch failed");
                Err(e.into())
            }
            Err(_) => {
                warn!(connection_id = %connection_id, timeout_secs = timeout.as_secs(), "Fetch timed out");
                Err(SyncError::Timeout(timeout.as_secs()))
            }
        }
    }

    /// Applies the diff to the OS and persists the outcome. Caller holds the
    /// state lock. Returns the outcome and the persisted region count.
    async fn commit(&self, episode_id: Uuid, plan: Plan) -> SyncResult<(SyncOutcome, usize)> {
        let Plan {
            mut snapshots,
            mut current,
            monitored,
            capacity,
            origin,
            mut diff,
            mut changed,
        } = plan;

        // Connections unregistered while the fetch was in flight.
        let registered: HashSet<String> = self.db.registry().list().await?.into_iter().collect();
        if current.iter().any(|connection| !registered.contains(connection.id())) {
            snapshots.retain(|connection| registered.contains(connection.id()));
            current.retain(|connection| registered.contains(connection.id()));
            changed.retain(|id| registered.contains(id));
            diff = reconcile::diff_with_origin(
                &active_regions(&current),
                &monitored,
                capacity,
                origin.as_ref(),
            );
            debug!(
                episode = %episode_id,
                remaining = current.len(),
                added = diff.to_add.len(),
                removed = diff.to_remove.len(),
                "Left out connections unregistered during sync"
            );
        }

        let mut target = reconcile::apply(&monitored, &diff);

        if !diff.is_empty() {
            let results = self.monitor.apply(&diff.to_add, &diff.to_remove).await;
            let failures = self.record_failures(episode_id, &results);
            for result in results.iter().filter(|r| r.result.is_err()) {
                match result.action {
                    RegionAction::Add => target.retain(|r| !r.is_identical(&result.region)),
                    RegionAction::Remove => {
                        if !target.iter().any(|r| r.identifier == result.region.identifier) {
                            target.push(result.region.clone());
                        }
                    }
                }
            }
            if failures > 0 {
                warn!(episode = %episode_id, failures, "Some regions could not be applied");
            }
        }

        self.db.commit_sync(&target, &snapshots).await?;

        let outcome = if !changed.is_empty() || !diff.is_empty() {
            SyncOutcome::NewData
        } else {
            SyncOutcome::NoData
        };

        info!(
            episode = %episode_id,
            added = diff.to_add.len(),
            removed = diff.to_remove.len(),
            snapshots = snapshots.len(),
            regions = target.len(),
            "Sync committed"
        );
        Ok((outcome, target.len()))
    }

    fn record_failures(&self, episode_id: Uuid, results: &[RegionApplyResult]) -> usize {
        let mut failures = 0;
        for result in results {
            if let Err(e) = &result.result {
                failures += 1;
                warn!(
                    episode = %episode_id,
                    region = %result.region.identifier,
                    action = %result.action,
                    error = %e,
                    "Region apply failed"
                );
                self.emitter.emit_region_failure(&result.region, result.action, e);
            }
        }
        failures
    }

    /// Answers a background caller with `NoData` once its budget runs out.
    /// The episode itself keeps running and still commits.
    async fn enforce_deadline(
        self: Arc<Self>,
        episode_id: Uuid,
        slot: CompletionSlot,
        reason: SyncReason,
        done: CancellationToken,
    ) {
        let budget = self.config.background_time_budget();

        tokio::select! {
            _ = done.cancelled() => return,
            _ = tokio::time::sleep(budget) => {}
        }

        // The episode may be mid-commit and holding the state lock.
        if let Some(completion) = slot.take() {
            info!(
                episode = %episode_id,
                reason = %reason,
                budget_secs = budget.as_secs(),
                "Background time budget exhausted, reporting no data"
            );
            self.emitter.emit_outcome(reason, SyncOutcome::NoData);
            completion.complete(SyncOutcome::NoData);
        }
    }

    /// Removes every SDK-owned region from the OS and clears the store.
    async fn teardown(&self) -> SyncResult<()> {
        let mut owned = self.db.regions().list().await?;
        for region in self.monitor.currently_monitored().await {
            if is_sdk_owned(&region.identifier)
                && !owned.iter().any(|r| r.identifier == region.identifier)
            {
                owned.push(region);
            }
        }

        if !owned.is_empty() {
            let results = self.monitor.apply(&[], &owned).await;
            self.record_failures(Uuid::nil(), &results);
        }

        self.db.clear_all().await?;
        Ok(())
    }

    /// Completes every waiter whose deadline has not already answered it.
    fn deliver(&self, waiters: Vec<Waiter>, outcome: SyncOutcome) {
        for waiter in waiters {
            if let Some(completion) = waiter.slot.take() {
                self.emitter.emit_outcome(waiter.reason, outcome);
                completion.complete(outcome);
            }
        }
    }
}

/// Union of the location regions of `connections`, in connection order.
fn active_regions(connections: &[Connection]) -> Vec<Region> {
    connections
        .iter()
        .flat_map(|connection| ConnectionStorage::new(connection).location_regions())
        .collect()
}

fn parse_response(connection_id: &str, raw: &[u8]) -> SyncResult<Connection> {
    Connection::parse(raw).map_err(|source| SyncError::MalformedResponse {
        connection_id: connection_id.to_string(),
        source,
    })
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating a SyncCoordinator with options.
pub struct SyncCoordinatorBuilder {
    config: SyncConfig,
    db: Option<Database>,
    fetcher: Option<Arc<dyn ConnectionFetcher>>,
    monitor: Option<Arc<dyn TriggerMonitor>>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
}

impl SyncCoordinatorBuilder {
    /// Creates a new builder with the given config.
    pub fn new(config: SyncConfig) -> Self {
        SyncCoordinatorBuilder {
            config,
            db: None,
            fetcher: None,
            monitor: None,
            emitter: None,
        }
    }

    /// Sets the database.
    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    /// Sets the network adapter.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ConnectionFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Sets the geofencing adapter.
    pub fn with_monitor(mut self, monitor: Arc<dyn TriggerMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Sets the event emitter.
    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Builds the SyncCoordinator.
    pub fn build(self) -> SyncResult<SyncCoordinator> {
        self.config.validate()?;

        let db = self
            .db
            .ok_or_else(|| SyncError::InvalidConfig("Database required".into()))?;
        let fetcher = self
            .fetcher
            .ok_or_else(|| SyncError::InvalidConfig("Connection fetcher required".into()))?;
        let monitor = self
            .monitor
            .ok_or_else(|| SyncError::InvalidConfig("Trigger monitor required".into()))?;
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));

        Ok(SyncCoordinator::with_emitter(
            self.config,
            db,
            fetcher,
            monitor,
            emitter,
        ))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{FetchError, InMemoryTriggerMonitor, RegionApplyError};
    use async_trait::async_trait;
    use connect_core::Coordinate;
    use connect_db::DbConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    const FIXTURE: &str = include_str!("../../connect-core/fixtures/fetch_connection_response.json");
    const FIXTURE_ID: &str = "LMhuSZW9";

    // -------------------------------------------------------------------------
    // Fakes
    // -------------------------------------------------------------------------

    struct MockFetcher {
        responses: std::sync::Mutex<HashMap<String, Result<Vec<u8>, FetchError>>>,
        calls: AtomicUsize,
        gate: Option<Arc<Semaphore>>,
    }

    impl MockFetcher {
        fn new() -> Self {
            MockFetcher {
                responses: std::sync::Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
                gate: None,
            }
        }

        /// Fetches block until the returned semaphore gets a permit.
        fn gated(mut self) -> (Self, Arc<Semaphore>) {
            let gate = Arc::new(Semaphore::new(0));
            self.gate = Some(gate.clone());
            (self, gate)
        }

        fn respond(self, id: &str, response: Result<Vec<u8>, FetchError>) -> Self {
            self.set(id, response);
            self
        }

        fn set(&self, id: &str, response: Result<Vec<u8>, FetchError>) {
            self.responses.lock().unwrap().insert(id.to_string(), response);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConnectionFetcher for MockFetcher {
        async fn fetch(&self, connection_id: &str, _token: Option<&str>) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await.unwrap();
            }
            self.responses
                .lock()
                .unwrap()
                .get(connection_id)
                .cloned()
                .unwrap_or_else(|| Err(FetchError::Network("no response".into())))
        }
    }

    #[derive(Default)]
    struct RecordingEmitter {
        outcomes: std::sync::Mutex<Vec<(SyncReason, SyncOutcome)>>,
        failures: std::sync::Mutex<Vec<(String, RegionAction)>>,
    }

    impl SyncEventEmitter for RecordingEmitter {
        fn emit_status(&self, _status: &SyncStatus) {}

        fn emit_outcome(&self, reason: SyncReason, outcome: SyncOutcome) {
            self.outcomes.lock().unwrap().push((reason, outcome));
        }

        fn emit_region_failure(&self, region: &Region, action: RegionAction, _error: &RegionApplyError) {
            self.failures.lock().unwrap().push((region.identifier.clone(), action));
        }
    }

    /// Registrations block until the gate gets a permit.
    struct GatedMonitor {
        inner: InMemoryTriggerMonitor,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl TriggerMonitor for GatedMonitor {
        async fn currently_monitored(&self) -> Vec<Region> {
            self.inner.currently_monitored().await
        }

        async fn apply(&self, to_add: &[Region], to_remove: &[Region]) -> Vec<RegionApplyResult> {
            let _permit = self.gate.acquire().await.unwrap();
            self.inner.apply(to_add, to_remove).await
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn fixture() -> Result<Vec<u8>, FetchError> {
        Ok(FIXTURE.as_bytes().to_vec())
    }

    fn location_connection(id: &str, trigger_id: &str, radius: f64, lat: f64) -> Result<Vec<u8>, FetchError> {
        let body = json!({
            "id": id,
            "name": format!("Connection {id}"),
            "user_triggers": [{
                "type": "location",
                "id": trigger_id,
                "radius": radius,
                "center": { "lat": lat, "lng": 0.0 }
            }]
        });
        Ok(body.to_string().into_bytes())
    }

    fn region(id: &str) -> Region {
        Region::new(id, 50.0, Coordinate::new(0.0, 0.0).unwrap()).unwrap()
    }

    struct Harness {
        coordinator: SyncCoordinator,
        fetcher: Arc<MockFetcher>,
        monitor: Arc<InMemoryTriggerMonitor>,
        emitter: Arc<RecordingEmitter>,
        db: Database,
    }

    async fn harness(fetcher: MockFetcher, monitor: InMemoryTriggerMonitor, config: SyncConfig) -> Harness {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let fetcher = Arc::new(fetcher);
        let monitor = Arc::new(monitor);
        let emitter = Arc::new(RecordingEmitter::default());

        let coordinator = SyncCoordinatorBuilder::new(config)
            .with_database(db.clone())
            .with_fetcher(fetcher.clone())
            .with_monitor(monitor.clone())
            .with_emitter(emitter.clone())
            .build()
            .unwrap();

        Harness {
            coordinator,
            fetcher,
            monitor,
            emitter,
            db,
        }
    }

    async fn logged_in(fetcher: MockFetcher, monitor: InMemoryTriggerMonitor) -> Harness {
        let h = harness(fetcher, monitor, SyncConfig::default()).await;
        h.db.credentials().mark_session_active().await.unwrap();
        h.coordinator.initialize().await.unwrap();
        h
    }

    async fn wait_until_idle(coordinator: &SyncCoordinator) {
        for _ in 0..200 {
            if !coordinator.status().await.is_syncing() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("coordinator never went idle");
    }

    // -------------------------------------------------------------------------
    // Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_fixture_end_to_end() {
        let h = logged_in(
            MockFetcher::new().respond(FIXTURE_ID, fixture()),
            InMemoryTriggerMonitor::new(20),
        )
        .await;
        h.coordinator.register_connection(FIXTURE_ID).await.unwrap();

        assert_eq!(h.coordinator.sync(SyncReason::ManualUpdate).await, SyncOutcome::NewData);

        let os = h.monitor.currently_monitored().await;
        assert_eq!(os.len(), 1);
        assert_eq!(os[0].identifier, "ifttt_somecoolidentifier");
        assert_eq!(os[0].radius, 123.4567890);
        assert_eq!(os[0].center.latitude, 12.45678920);
        assert_eq!(os[0].center.longitude, -98.5432112);

        let persisted = h.coordinator.monitored_regions().await.unwrap();
        assert!(persisted[0].is_identical(&os[0]));

        let stored = h.coordinator.connection(FIXTURE_ID).await.unwrap().unwrap();
        assert!(ConnectionStorage::new(&stored).has_location_triggers());

        let status = h.coordinator.status().await;
        assert_eq!(status.last_outcome, Some(SyncOutcome::NewData));
        assert_eq!(status.monitored_regions, 1);
        assert!(status.last_sync.is_some());

        // Nothing changed the second time round.
        assert_eq!(h.coordinator.sync(SyncReason::SilentPush).await, SyncOutcome::NoData);
        assert_eq!(h.monitor.apply_calls(), 1);
        assert_eq!(h.fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_fetch() {
        let (fetcher, gate) = MockFetcher::new().respond(FIXTURE_ID, fixture()).gated();
        let h = logged_in(fetcher, InMemoryTriggerMonitor::new(20)).await;
        h.coordinator.register_connection(FIXTURE_ID).await.unwrap();

        let mut receivers = Vec::new();
        for reason in [
            SyncReason::ManualUpdate,
            SyncReason::SilentPush,
            SyncReason::BackgroundFetch,
            SyncReason::AppForeground,
            SyncReason::SilentPush,
        ] {
            let (tx, rx) = oneshot::channel();
            h.coordinator
                .request(reason, Completion::new(move |o| tx.send(o).unwrap()))
                .await;
            receivers.push(rx);
        }
        assert!(h.coordinator.status().await.is_syncing());

        gate.add_permits(1);

        for rx in receivers {
            assert_eq!(rx.await.unwrap(), SyncOutcome::NewData);
        }
        assert_eq!(h.fetcher.calls(), 1);
        assert_eq!(h.monitor.apply_calls(), 1);
        assert_eq!(h.emitter.outcomes.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_stop_cancels_and_discards_late_response() {
        let (fetcher, gate) = MockFetcher::new().respond(FIXTURE_ID, fixture()).gated();
        let h = logged_in(fetcher, InMemoryTriggerMonitor::new(20)).await;
        h.coordinator.register_connection(FIXTURE_ID).await.unwrap();

        let (tx, rx) = oneshot::channel();
        h.coordinator
            .handle_silent_push(move |o| tx.send(o).unwrap())
            .await;

        h.coordinator.stop_current_synchronization().await;
        assert_eq!(rx.await.unwrap(), SyncOutcome::Cancelled);

        // The response arrives after the stop.
        gate.add_permits(10);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(h.coordinator.monitored_regions().await.unwrap().is_empty());
        assert!(h.coordinator.connections().await.unwrap().is_empty());
        assert!(h.monitor.currently_monitored().await.is_empty());

        let status = h.coordinator.status().await;
        assert!(!status.is_syncing());
        assert_eq!(status.last_outcome, Some(SyncOutcome::Cancelled));

        // A fresh request starts a new episode.
        assert_eq!(h.coordinator.sync(SyncReason::ManualUpdate).await, SyncOutcome::NewData);
        assert_eq!(h.monitor.currently_monitored().await.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_a_no_op() {
        let h = logged_in(MockFetcher::new(), InMemoryTriggerMonitor::new(20)).await;
        h.coordinator.stop_current_synchronization().await;
        assert!(h.coordinator.status().await.last_outcome.is_none());
    }

    #[tokio::test]
    async fn test_background_deadline_reports_no_data_and_still_commits() {
        let (fetcher, gate) = MockFetcher::new().respond(FIXTURE_ID, fixture()).gated();
        let mut config = SyncConfig::default();
        config.sync.background_time_budget_secs = 1;
        let h = harness(fetcher, InMemoryTriggerMonitor::new(20), config).await;
        h.db.credentials().mark_session_active().await.unwrap();
        h.coordinator.initialize().await.unwrap();
        h.coordinator.register_connection(FIXTURE_ID).await.unwrap();

        let (tx, rx) = oneshot::channel();
        h.coordinator
            .start_background_process(move |ok| tx.send(ok).unwrap())
            .await;
        let (fetch_tx, fetch_rx) = oneshot::channel();
        h.coordinator
            .handle_background_fetch(move |o| fetch_tx.send(o).unwrap())
            .await;

        assert!(rx.await.unwrap());
        assert_eq!(fetch_rx.await.unwrap(), SyncOutcome::NoData);
        assert!(h.coordinator.status().await.is_syncing());

        gate.add_permits(1);
        wait_until_idle(&h.coordinator).await;

        assert_eq!(h.coordinator.monitored_regions().await.unwrap().len(), 1);
        assert_eq!(h.coordinator.status().await.last_outcome, Some(SyncOutcome::NewData));

        let outcomes = h.emitter.outcomes.lock().unwrap().clone();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.contains(&(SyncReason::BackgroundProcess, SyncOutcome::NoData)));
        assert!(outcomes.contains(&(SyncReason::BackgroundFetch, SyncOutcome::NoData)));
    }

    #[tokio::test]
    async fn test_auth_error_fails_without_persisting() {
        let h = logged_in(
            MockFetcher::new().respond(FIXTURE_ID, Err(FetchError::Auth("token expired".into()))),
            InMemoryTriggerMonitor::new(20),
        )
        .await;
        h.coordinator.register_connection(FIXTURE_ID).await.unwrap();

        assert_eq!(h.coordinator.sync(SyncReason::BackgroundFetch).await, SyncOutcome::Failed);

        let status = h.coordinator.status().await;
        assert!(status.last_error.unwrap().contains("Authentication"));
        assert!(h.coordinator.connections().await.unwrap().is_empty());
        assert_eq!(h.monitor.apply_calls(), 0);
    }

    #[tokio::test]
    async fn test_network_error_in_one_connection_fails_episode() {
        let h = logged_in(
            MockFetcher::new()
                .respond("a", location_connection("a", "home", 100.0, 1.0))
                .respond("b", Err(FetchError::Network("connection reset".into()))),
            InMemoryTriggerMonitor::new(20),
        )
        .await;
        h.coordinator.register_connection("a").await.unwrap();
        h.coordinator.register_connection("b").await.unwrap();

        assert_eq!(h.coordinator.sync(SyncReason::SilentPush).await, SyncOutcome::Failed);
        assert!(h.coordinator.monitored_regions().await.unwrap().is_empty());
        assert!(h.coordinator.connections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_background_process_reports_failure_as_false() {
        let h = logged_in(
            MockFetcher::new().respond(FIXTURE_ID, Err(FetchError::Network("offline".into()))),
            InMemoryTriggerMonitor::new(20),
        )
        .await;
        h.coordinator.register_connection(FIXTURE_ID).await.unwrap();

        let (tx, rx) = oneshot::channel();
        h.coordinator
            .start_background_process(move |ok| tx.send(ok).unwrap())
            .await;
        assert!(!rx.await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_connection_keeps_previous_snapshot() {
        let fetcher = MockFetcher::new()
            .respond("a", location_connection("a", "home", 100.0, 1.0))
            .respond("b", location_connection("b", "work", 200.0, 2.0));
        let h = logged_in(fetcher, InMemoryTriggerMonitor::new(20)).await;
        h.coordinator.register_connection("a").await.unwrap();
        h.coordinator.register_connection("b").await.unwrap();
        assert_eq!(h.coordinator.sync(SyncReason::ManualUpdate).await, SyncOutcome::NewData);

        h.fetcher.set("a", Ok(b"{\"id\": 42}".to_vec()));
        h.fetcher.set("b", location_connection("b", "work", 250.0, 2.0));
        assert_eq!(h.coordinator.sync(SyncReason::ManualUpdate).await, SyncOutcome::NewData);

        let kept = h.coordinator.connection("a").await.unwrap().unwrap();
        assert_eq!(kept.name(), "Connection a");

        let regions = h.coordinator.monitored_regions().await.unwrap();
        assert_eq!(regions.len(), 2);
        let work = regions.iter().find(|r| r.identifier == "ifttt_work").unwrap();
        assert_eq!(work.radius, 250.0);
        assert!(regions.iter().any(|r| r.identifier == "ifttt_home"));
    }

    #[tokio::test]
    async fn test_region_apply_failure_is_not_fatal() {
        let fetcher = MockFetcher::new()
            .respond("a", location_connection("a", "home", 100.0, 1.0))
            .respond("b", location_connection("b", "work", 200.0, 2.0));
        let h = logged_in(fetcher, InMemoryTriggerMonitor::new(20).failing_on("ifttt_work")).await;
        h.coordinator.register_connection("a").await.unwrap();
        h.coordinator.register_connection("b").await.unwrap();

        assert_eq!(h.coordinator.sync(SyncReason::ManualUpdate).await, SyncOutcome::NewData);

        let ids: Vec<String> = h
            .coordinator
            .monitored_regions()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.identifier)
            .collect();
        assert_eq!(ids, vec!["ifttt_home"]);
        assert_eq!(h.coordinator.connections().await.unwrap().len(), 2);
        assert_eq!(
            *h.emitter.failures.lock().unwrap(),
            vec![("ifttt_work".to_string(), RegionAction::Add)]
        );
    }

    #[tokio::test]
    async fn test_foreign_regions_reduce_capacity_and_are_kept() {
        let fetcher = MockFetcher::new()
            .respond("a", location_connection("a", "home", 100.0, 1.0))
            .respond("b", location_connection("b", "work", 200.0, 2.0));
        let monitor = InMemoryTriggerMonitor::new(2).with_regions(vec![region("other_app_fence")]);
        let mut config = SyncConfig::default();
        config.sync.region_capacity = 2;

        let h = harness(fetcher, monitor, config).await;
        h.db.credentials().mark_session_active().await.unwrap();
        h.coordinator.initialize().await.unwrap();
        h.coordinator.register_connection("a").await.unwrap();
        h.coordinator.register_connection("b").await.unwrap();

        assert_eq!(h.coordinator.sync(SyncReason::ManualUpdate).await, SyncOutcome::NewData);

        let os: Vec<String> = h
            .monitor
            .currently_monitored()
            .await
            .into_iter()
            .map(|r| r.identifier)
            .collect();
        assert_eq!(os, vec!["other_app_fence", "ifttt_home"]);
        assert!(h.emitter.failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nearest_regions_win_when_over_capacity() {
        let fetcher = MockFetcher::new()
            .respond("far", location_connection("far", "far", 100.0, 60.0))
            .respond("near", location_connection("near", "near", 100.0, 0.5));
        let monitor = InMemoryTriggerMonitor::new(1).with_location(Coordinate::new(0.0, 0.0).unwrap());
        let mut config = SyncConfig::default();
        config.sync.region_capacity = 1;

        let h = harness(fetcher, monitor, config).await;
        h.db.credentials().mark_session_active().await.unwrap();
        h.coordinator.initialize().await.unwrap();
        h.coordinator.register_connection("far").await.unwrap();
        h.coordinator.register_connection("near").await.unwrap();

        h.coordinator.sync(SyncReason::ManualUpdate).await;

        let regions = h.coordinator.monitored_regions().await.unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].identifier, "ifttt_near");
    }

    #[tokio::test]
    async fn test_logout_tears_down_everything() {
        let monitor = InMemoryTriggerMonitor::new(20).with_regions(vec![region("other_app_fence")]);
        let h = logged_in(MockFetcher::new().respond(FIXTURE_ID, fixture()), monitor).await;
        h.coordinator.register_connection(FIXTURE_ID).await.unwrap();
        h.coordinator.update(Some("user-token")).await.unwrap();
        wait_until_idle(&h.coordinator).await;
        assert_eq!(h.db.credentials().user_token().await.unwrap().as_deref(), Some("user-token"));
        assert_eq!(h.monitor.currently_monitored().await.len(), 2);

        h.coordinator.logout().await.unwrap();

        let os: Vec<String> = h
            .monitor
            .currently_monitored()
            .await
            .into_iter()
            .map(|r| r.identifier)
            .collect();
        assert_eq!(os, vec!["other_app_fence"]);
        assert!(h.db.credentials().user_token().await.unwrap().is_none());
        assert!(h.db.registry().list().await.unwrap().is_empty());
        assert!(h.coordinator.connections().await.unwrap().is_empty());
        assert!(h.coordinator.monitored_regions().await.unwrap().is_empty());
        assert!(!h.coordinator.status().await.logged_in);

        // Requests while logged out answer immediately without fetching.
        let calls = h.fetcher.calls();
        assert_eq!(h.coordinator.sync(SyncReason::SilentPush).await, SyncOutcome::NoData);
        assert_eq!(h.fetcher.calls(), calls);
    }

    #[tokio::test]
    async fn test_logout_cancels_running_sync() {
        let (fetcher, gate) = MockFetcher::new().respond(FIXTURE_ID, fixture()).gated();
        let h = logged_in(fetcher, InMemoryTriggerMonitor::new(20)).await;
        h.coordinator.register_connection(FIXTURE_ID).await.unwrap();

        let (tx, rx) = oneshot::channel();
        h.coordinator
            .handle_background_fetch(move |o| tx.send(o).unwrap())
            .await;

        h.coordinator.logout().await.unwrap();
        assert_eq!(rx.await.unwrap(), SyncOutcome::Cancelled);

        gate.add_permits(10);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.monitor.currently_monitored().await.is_empty());
    }

    #[tokio::test]
    async fn test_login_starts_session_and_syncs() {
        let h = harness(
            MockFetcher::new().respond(FIXTURE_ID, fixture()),
            InMemoryTriggerMonitor::new(20),
            SyncConfig::default(),
        )
        .await;
        h.coordinator.initialize().await.unwrap();
        assert!(!h.coordinator.status().await.logged_in);
        h.coordinator.register_connection(FIXTURE_ID).await.unwrap();

        h.coordinator.login().await.unwrap();
        wait_until_idle(&h.coordinator).await;

        assert!(h.coordinator.status().await.logged_in);
        assert!(h.db.credentials().session_active().await.unwrap());
        assert_eq!(h.monitor.currently_monitored().await.len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_adopts_os_regions() {
        let monitor = InMemoryTriggerMonitor::new(20)
            .with_regions(vec![region("ifttt_from_os"), region("other_app_fence")]);
        let h = harness(MockFetcher::new(), monitor, SyncConfig::default()).await;
        h.db.regions().insert(&region("ifttt_stale")).await.unwrap();

        h.coordinator.initialize().await.unwrap();

        let ids: Vec<String> = h
            .coordinator
            .monitored_regions()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.identifier)
            .collect();
        assert_eq!(ids, vec!["ifttt_from_os"]);
        assert_eq!(h.coordinator.status().await.monitored_regions, 1);
    }

    #[tokio::test]
    async fn test_unregister_removes_regions_on_next_sync() {
        let h = logged_in(
            MockFetcher::new().respond(FIXTURE_ID, fixture()),
            InMemoryTriggerMonitor::new(20),
        )
        .await;
        h.coordinator.register_connection(FIXTURE_ID).await.unwrap();
        h.coordinator.sync(SyncReason::ManualUpdate).await;

        assert!(h.coordinator.unregister_connection(FIXTURE_ID).await.unwrap());
        assert!(h.coordinator.connection(FIXTURE_ID).await.unwrap().is_none());

        assert_eq!(h.coordinator.sync(SyncReason::AppForeground).await, SyncOutcome::NewData);
        assert!(h.monitor.currently_monitored().await.is_empty());
        assert!(h.coordinator.monitored_regions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_blank_ids() {
        let h = logged_in(MockFetcher::new(), InMemoryTriggerMonitor::new(20)).await;
        let err = h.coordinator.register_connection("   ").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
        assert!(h.coordinator.register_connection("abc").await.unwrap());
        assert!(!h.coordinator.register_connection("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_builder_requires_adapters() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let result = SyncCoordinatorBuilder::new(SyncConfig::default())
            .with_database(db)
            .build();
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_unregister_during_fetch_is_not_undone_by_commit() {
        let (fetcher, gate) = MockFetcher::new().respond(FIXTURE_ID, fixture()).gated();
        let h = logged_in(fetcher, InMemoryTriggerMonitor::new(20)).await;
        h.coordinator.register_connection(FIXTURE_ID).await.unwrap();

        let (tx, rx) = oneshot::channel();
        h.coordinator
            .request(SyncReason::ManualUpdate, Completion::new(move |o| tx.send(o).unwrap()))
            .await;

        // The episode has read the registry and is blocked in the fetch.
        while h.fetcher.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(h.coordinator.unregister_connection(FIXTURE_ID).await.unwrap());
        gate.add_permits(1);

        assert_eq!(rx.await.unwrap(), SyncOutcome::NoData);
        assert!(h.coordinator.connection(FIXTURE_ID).await.unwrap().is_none());
        assert!(h.coordinator.connections().await.unwrap().is_empty());
        assert!(h.coordinator.monitored_regions().await.unwrap().is_empty());
        assert!(h.monitor.currently_monitored().await.is_empty());
        assert_eq!(h.monitor.apply_calls(), 0);
    }

    #[tokio::test]
    async fn test_moved_geofence_outside_capacity_counts_as_new_data() {
        let fetcher = MockFetcher::new()
            .respond("a", location_connection("a", "home", 100.0, 1.0))
            .respond("b", location_connection("b", "work", 200.0, 2.0));
        let mut config = SyncConfig::default();
        config.sync.region_capacity = 1;

        let h = harness(fetcher, InMemoryTriggerMonitor::new(1), config).await;
        h.db.credentials().mark_session_active().await.unwrap();
        h.coordinator.initialize().await.unwrap();
        h.coordinator.register_connection("a").await.unwrap();
        h.coordinator.register_connection("b").await.unwrap();
        assert_eq!(h.coordinator.sync(SyncReason::ManualUpdate).await, SyncOutcome::NewData);

        // "work" is truncated away, so only the snapshot changes.
        h.fetcher.set("b", location_connection("b", "work", 250.0, 2.0));
        assert_eq!(h.coordinator.sync(SyncReason::SilentPush).await, SyncOutcome::NewData);
        assert_eq!(h.monitor.apply_calls(), 1);

        let stored = h.coordinator.connection("b").await.unwrap().unwrap();
        let work = ConnectionStorage::new(&stored).location_regions();
        assert_eq!(work[0].radius, 250.0);

        assert_eq!(h.coordinator.sync(SyncReason::SilentPush).await, SyncOutcome::NoData);
    }

    #[tokio::test]
    async fn test_deadline_answers_while_commit_is_blocked() {
        let gate = Arc::new(Semaphore::new(0));
        let monitor = Arc::new(GatedMonitor {
            inner: InMemoryTriggerMonitor::new(20),
            gate: gate.clone(),
        });
        let mut config = SyncConfig::default();
        config.sync.background_time_budget_secs = 1;

        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.credentials().mark_session_active().await.unwrap();
        let coordinator = SyncCoordinatorBuilder::new(config)
            .with_database(db)
            .with_fetcher(Arc::new(MockFetcher::new().respond(FIXTURE_ID, fixture())))
            .with_monitor(monitor.clone())
            .build()
            .unwrap();
        coordinator.initialize().await.unwrap();
        coordinator.register_connection(FIXTURE_ID).await.unwrap();

        let (tx, rx) = oneshot::channel();
        coordinator
            .handle_background_fetch(move |o| tx.send(o).unwrap())
            .await;

        // The fetch is instant; the episode then holds the state lock while
        // the OS registration is blocked.
        let outcome = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("background caller answered within its budget")
            .unwrap();
        assert_eq!(outcome, SyncOutcome::NoData);

        gate.add_permits(1);
        wait_until_idle(&coordinator).await;

        assert_eq!(coordinator.monitored_regions().await.unwrap().len(), 1);
        assert_eq!(monitor.currently_monitored().await.len(), 1);
        assert_eq!(coordinator.status().await.last_outcome, Some(SyncOutcome::NewData));
    }
}
