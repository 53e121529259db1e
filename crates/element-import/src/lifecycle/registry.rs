//! In-memory registry of running import jobs.
//!
//! All state lives in one record behind one lock: the per-job entries (each
//! owning its cancellation token), the sticky terminated set, the fleet token
//! and the creation/shutdown flags. Every job token is a child of the fleet
//! token, so cancelling the fleet halts every job at once.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::LifecycleError;

/// Runtime status of a registered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeStatus {
    Running,
    Cancelled,
    Finished,
}

/// Result of [`JobRegistry::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Cancelled,
    NotFound,
    AlreadyTerminal,
}

#[derive(Debug)]
struct JobEntry {
    status: RuntimeStatus,
    token: CancellationToken,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

/// Serializable view of one registered job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSnapshot {
    pub job_id: i32,
    pub status: RuntimeStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub elapsed_ms: i64,
}

impl RuntimeSnapshot {
    fn from_entry(job_id: i32, entry: &JobEntry, now: DateTime<Utc>) -> Self {
        let since = entry.started_at.unwrap_or(entry.created_at);
        let until = entry.completed_at.or(entry.cancelled_at).unwrap_or(now);
        Self {
            job_id,
            status: entry.status,
            created_at: entry.created_at,
            started_at: entry.started_at,
            cancelled_at: entry.cancelled_at,
            completed_at: entry.completed_at,
            elapsed_ms: (until - since).num_milliseconds().max(0),
        }
    }
}

#[derive(Debug)]
struct RegistryState {
    jobs: HashMap<i32, JobEntry>,
    /// Ids whose cancellation was requested. Survives unregister and is only
    /// cleared by a fresh registration.
    terminated: HashSet<i32>,
    fleet: CancellationToken,
    creation_blocked: bool,
    shutting_down: bool,
    /// Jobs with a rollback in flight.
    rollbacks: HashSet<i32>,
}

impl RegistryState {
    fn has_cancelled_jobs(&self) -> bool {
        self.jobs
            .values()
            .any(|entry| entry.status == RuntimeStatus::Cancelled)
    }
}

pub struct JobRegistry {
    state: RwLock<RegistryState>,
    unregistered: Notify,
    tracker: TaskTracker,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                jobs: HashMap::new(),
                terminated: HashSet::new(),
                fleet: CancellationToken::new(),
                creation_blocked: false,
                shutting_down: false,
                rollbacks: HashSet::new(),
            }),
            unregistered: Notify::new(),
            tracker: TaskTracker::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    // ─── Transitions ────────────────────────────────────────────────────────

    /// Registers `job_id` and returns its cancellation token.
    ///
    /// A fresh registration clears a previous terminated mark for the id,
    /// lifts the creation block and, unless the registry is shutting down,
    /// replaces a halted fleet token.
    pub fn register(&self, job_id: i32) -> Result<CancellationToken, LifecycleError> {
        let mut state = self.write();
        if state.shutting_down {
            log::debug!("Rejected registration of job {}: shutting down", job_id);
            return Err(LifecycleError::ShuttingDown);
        }
        if let Some(entry) = state.jobs.get(&job_id) {
            if entry.status != RuntimeStatus::Finished {
                return Err(LifecycleError::AlreadyRunning { job_id });
            }
        }

        state.terminated.remove(&job_id);
        state.creation_blocked = false;
        if state.fleet.is_cancelled() {
            log::info!("Resetting halted fleet token");
            state.fleet = CancellationToken::new();
        }

        let token = state.fleet.child_token();
        state.jobs.insert(
            job_id,
            JobEntry {
                status: RuntimeStatus::Running,
                token: token.clone(),
                created_at: Utc::now(),
                started_at: None,
                cancelled_at: None,
                completed_at: None,
            },
        );
        log::debug!("Registered job {}", job_id);
        Ok(token)
    }

    pub fn mark_started(&self, job_id: i32) {
        if let Some(entry) = self.write().jobs.get_mut(&job_id) {
            entry.started_at.get_or_insert_with(Utc::now);
        }
    }

    /// Records that the job's driver reached a terminal state.
    pub fn mark_finished(&self, job_id: i32) {
        if let Some(entry) = self.write().jobs.get_mut(&job_id) {
            if entry.status == RuntimeStatus::Running {
                entry.status = RuntimeStatus::Finished;
            }
            entry.completed_at = Some(Utc::now());
        }
    }

    /// Cancels a registered job: fires its token, latches the terminated mark,
    /// sets global termination and blocks job creation until the job
    /// unregisters. Every other in-flight job stops at its next check; the
    /// next registration installs a fresh fleet token.
    pub fn cancel(&self, job_id: i32) -> CancelOutcome {
        let mut state = self.write();
        let Some(entry) = state.jobs.get_mut(&job_id) else {
            return CancelOutcome::NotFound;
        };
        if entry.status != RuntimeStatus::Running {
            return CancelOutcome::AlreadyTerminal;
        }

        entry.token.cancel();
        entry.status = RuntimeStatus::Cancelled;
        entry.cancelled_at = Some(Utc::now());
        state.terminated.insert(job_id);
        state.fleet.cancel();
        state.creation_blocked = true;
        log::debug!("Cancelled job {}", job_id);
        CancelOutcome::Cancelled
    }

    /// Latches the terminated mark without touching any entry.
    pub fn mark_terminated(&self, job_id: i32) {
        self.write().terminated.insert(job_id);
    }

    /// Cancellation of a job with no running entry: latches the terminated mark and
    /// sets global termination. Creation stays open since no driver will
    /// unregister to lift a block.
    pub fn terminate_unregistered(&self, job_id: i32) {
        let mut state = self.write();
        state.terminated.insert(job_id);
        state.fleet.cancel();
    }

    /// Removes the job's entry. The terminated mark stays.
    pub fn unregister(&self, job_id: i32) {
        {
            let mut state = self.write();
            if state.jobs.remove(&job_id).is_none() {
                return;
            }
            if state.creation_blocked && !state.has_cancelled_jobs() {
                state.creation_blocked = false;
            }
        }
        log::debug!("Unregistered job {}", job_id);
        self.unregistered.notify_waiters();
    }

    /// Cancels the fleet token, halting every registered job.
    pub fn halt_all(&self) {
        let state = self.read();
        log::info!("Halting {} registered job(s)", state.jobs.len());
        state.fleet.cancel();
    }

    /// Claims the rollback slot of a job. Only one rollback per job may be in
    /// flight.
    pub fn begin_rollback(&self, job_id: i32) -> bool {
        self.write().rollbacks.insert(job_id)
    }

    pub fn end_rollback(&self, job_id: i32) {
        self.write().rollbacks.remove(&job_id);
    }

    // ─── Observers ──────────────────────────────────────────────────────────

    pub fn is_running(&self, job_id: i32) -> bool {
        self.read()
            .jobs
            .get(&job_id)
            .is_some_and(|entry| entry.status == RuntimeStatus::Running)
    }

    pub fn is_registered(&self, job_id: i32) -> bool {
        self.read().jobs.contains_key(&job_id)
    }

    pub fn is_terminated(&self, job_id: i32) -> bool {
        self.read().terminated.contains(&job_id)
    }

    pub fn is_global_termination_set(&self) -> bool {
        self.read().fleet.is_cancelled()
    }

    pub fn is_creation_blocked(&self) -> bool {
        self.read().creation_blocked
    }

    pub fn is_shutting_down(&self) -> bool {
        self.read().shutting_down
    }

    pub fn is_rollback_in_progress(&self, job_id: i32) -> bool {
        self.read().rollbacks.contains(&job_id)
    }

    pub fn token(&self, job_id: i32) -> Option<CancellationToken> {
        self.read().jobs.get(&job_id).map(|entry| entry.token.clone())
    }

    /// Ids of jobs still running, ascending.
    pub fn running_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self
            .read()
            .jobs
            .iter()
            .filter(|(_, entry)| entry.status == RuntimeStatus::Running)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn snapshot(&self, job_id: i32) -> Option<RuntimeSnapshot> {
        let now = Utc::now();
        self.read()
            .jobs
            .get(&job_id)
            .map(|entry| RuntimeSnapshot::from_entry(job_id, entry, now))
    }

    /// Snapshots of every registered job, by id.
    pub fn snapshots(&self) -> Vec<RuntimeSnapshot> {
        let now = Utc::now();
        let mut out: Vec<RuntimeSnapshot> = self
            .read()
            .jobs
            .iter()
            .map(|(id, entry)| RuntimeSnapshot::from_entry(*id, entry, now))
            .collect();
        out.sort_by_key(|snapshot| snapshot.job_id);
        out
    }

    // ─── Tasks ──────────────────────────────────────────────────────────────

    /// Spawns a task that graceful shutdown waits for.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Waits until `job_id` is unregistered. Returns false on timeout.
    pub async fn wait_unregistered(&self, job_id: i32, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.unregistered.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_registered(job_id) {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return !self.is_registered(job_id);
            }
        }
    }

    /// Stops accepting jobs, halts the fleet and waits for tracked tasks.
    pub async fn graceful_shutdown(&self, timeout: Duration) -> Result<(), LifecycleError> {
        {
            let mut state = self.write();
            state.shutting_down = true;
            state.fleet.cancel();
        }
        log::info!("Shutting down import engine");
        self.tracker.close();

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                log::info!("Import engine stopped");
                Ok(())
            }
            Err(_) => {
                let remaining = self.read().jobs.len();
                log::error!(
                    "Shutdown timed out after {:?} with {} job(s) registered",
                    timeout,
                    remaining
                );
                Err(LifecycleError::ShutdownTimeout { timeout, remaining })
            }
        }
    }
}
