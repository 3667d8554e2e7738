use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::registry::ClientRegistry;
use crate::config::ConfigSubscriber;
use crate::domain::job::{DependencyId, Job, JobState};
use crate::error::{Error, Result};
use crate::id::JobId;
use crate::optimizing::OptimizingStatus;
use crate::repository::Repository;

const RECENTLY_COMPLETED_CAPACITY: usize = 5;

/// Wakes the scheduler loop out of its idle sleep. A fresh submission, a job
/// finishing, or a cancellation request all push one of these rather than
/// the loop polling on a fixed cadence alone (Design Note "Global wake-up
/// sentinel").
#[derive(Debug, Clone)]
pub enum ScheduleEvent {
    Wake,
    JobFinished { job_id: JobId, outcome: JobOutcome },
    Cancel { job_id: JobId, wait_for_stop: bool },
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JobOutcome {
    Completed { score: f64 },
    Error,
}

#[derive(Default)]
pub struct SchedulerMetrics {
    pub scheduled: AtomicU64,
    pub cancelled: AtomicU64,
    pub completed: AtomicU64,
    pub running_now: AtomicU64,
}

struct SchedulerState {
    pending: IndexMap<JobId, Job>,
    running: IndexMap<JobId, Job>,
    recently_completed: Vec<Job>,
}

/// The main coordinator (C6, §4.1): owns the Pending/Running queues behind a
/// single non-async mutex, reserves clients from the registry before
/// dispatching, and persists every state transition before it takes effect
/// in memory so a crash mid-transition recovers to the pre-transition state.
pub struct SchedulerCore {
    state: Mutex<SchedulerState>,
    repository: Arc<dyn Repository>,
    registry: Arc<ClientRegistry>,
    tunables: ConfigSubscriber,
    metrics: Arc<SchedulerMetrics>,
    events_tx: mpsc::Sender<ScheduleEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<ScheduleEvent>>>,
    cancellation_token: CancellationToken,
    optimizing_status: RwLock<Option<Arc<dyn OptimizingStatus>>>,
    /// Condition-variable stand-ins for `Cancel(jobID, true)` (§5): a waiter
    /// registered here is released with the job's terminal record as soon as
    /// `handle_cancel` finishes processing that id.
    waiters: Mutex<HashMap<JobId, Vec<oneshot::Sender<Job>>>>,
}

impl SchedulerCore {
    pub fn new(repository: Arc<dyn Repository>, registry: Arc<ClientRegistry>, tunables: ConfigSubscriber) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(256);
        Arc::new(Self {
            state: Mutex::new(SchedulerState {
                pending: IndexMap::new(),
                running: IndexMap::new(),
                recently_completed: Vec::new(),
            }),
            repository,
            registry,
            tunables,
            metrics: Arc::new(SchedulerMetrics::default()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            cancellation_token: CancellationToken::new(),
            optimizing_status: RwLock::new(None),
            waiters: Mutex::new(HashMap::new()),
        })
    }

    /// Wires the optimizing-job controller in after construction (the two
    /// are mutually dependent — the controller needs a `SchedulerCore` to
    /// submit iterations to) so dependency resolution can answer "is `d`'s
    /// parent optimizing job done running?" for jobs that depend on one.
    pub fn set_optimizing_status(&self, status: Arc<dyn OptimizingStatus>) {
        *self.optimizing_status.write() = Some(status);
    }

    pub fn metrics(&self) -> Arc<SchedulerMetrics> {
        self.metrics.clone()
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle { events_tx: self.events_tx.clone() }
    }

    /// `Admit(job, folder)` (§4.1): as `submit`, but also stamps the job's
    /// logical UI folder before persisting it.
    pub async fn admit(&self, mut job: Job, folder: Option<String>) -> Result<JobId> {
        if let Some(folder) = folder {
            job.folder_name = Some(folder);
        }
        self.submit(job).await
    }

    /// Admits a job into the Pending queue and persists it durably before
    /// returning, per §4.1's admission contract.
    pub async fn submit(&self, job: Job) -> Result<JobId> {
        job.validate()?;
        let id = job.id;
        {
            let mut state = self.state.lock();
            if state.pending.contains_key(&id) || state.running.contains_key(&id) {
                return Err(Error::admission(format!("job {id} already submitted")));
            }
            state.pending.insert(id, job.clone());
        }
        self.repository.put_job(&job).await?;
        self.metrics.scheduled.fetch_add(1, Ordering::Relaxed);
        let _ = self.events_tx.send(ScheduleEvent::Wake).await;
        Ok(id)
    }

    /// `Cancel(jobID, waitForStop) -> Job?` (§4.1): removes a Pending job
    /// synchronously, or signals a Running one, in both cases returning the
    /// affected record or `None` if `job_id` is unknown (§5: "Cancellation of
    /// a Pending job is always synchronous... [a Running job] is considered
    /// terminal immediately"). When `wait_for_stop` is set, the caller
    /// additionally blocks on the job's condition-variable stand-in,
    /// released once `handle_cancel` has finished recording the terminal
    /// state (§5: "`Cancel(jobID, true)` blocks the caller on a condition
    /// variable associated with the job record").
    pub async fn cancel(&self, job_id: JobId, wait_for_stop: bool) -> Result<Option<Job>> {
        let waiter = wait_for_stop.then(|| {
            let (tx, rx) = oneshot::channel();
            self.waiters.lock().entry(job_id).or_default().push(tx);
            rx
        });

        let job = match self.handle_cancel(job_id).await {
            Ok(job) => job,
            Err(Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let _ = self.events_tx.send(ScheduleEvent::Wake).await;

        if let Some(rx) = waiter {
            let _ = rx.await;
        }
        Ok(Some(job))
    }

    /// `Disable(jobID)` (§4.1): valid only for a Pending job not already
    /// Running or terminal.
    pub async fn disable(&self, job_id: JobId) -> Result<()> {
        let mut job = {
            let state = self.state.lock();
            match state.pending.get(&job_id) {
                Some(j) => j.clone(),
                None => return Err(Error::not_found("job", job_id.to_string())),
            }
        };
        job.transition(JobState::Disabled)?;
        self.repository.put_job(&job).await?;
        self.state.lock().pending.insert(job_id, job);
        Ok(())
    }

    /// `Enable(jobID)` (§4.1): the reverse of `disable`.
    pub async fn enable(&self, job_id: JobId) -> Result<()> {
        let mut job = {
            let state = self.state.lock();
            match state.pending.get(&job_id) {
                Some(j) => j.clone(),
                None => return Err(Error::not_found("job", job_id.to_string())),
            }
        };
        job.transition(JobState::NotYetStarted)?;
        self.repository.put_job(&job).await?;
        self.state.lock().pending.insert(job_id, job);
        let _ = self.events_tx.try_send(ScheduleEvent::Wake);
        Ok(())
    }

    /// `CancelAndDelete(jobID)` (§4.1): only valid while the job is still
    /// Pending and is not an iteration of an optimizing job; purges the
    /// persisted record entirely rather than leaving a Cancelled tombstone.
    pub async fn cancel_and_delete(&self, job_id: JobId) -> Result<()> {
        let job = {
            let state = self.state.lock();
            state
                .pending
                .get(&job_id)
                .cloned()
                .ok_or_else(|| Error::not_found("job", job_id.to_string()))?
        };
        if job.parent_optimizing_job_id.is_some() {
            return Err(Error::admission(format!(
                "job {job_id} is an optimizing-job iteration and cannot be cancel-and-deleted"
            )));
        }
        self.state.lock().pending.shift_remove(&job_id);
        self.repository.delete_job(job_id).await?;
        self.metrics.cancelled.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn get(&self, job_id: JobId) -> Option<Job> {
        let state = self.state.lock();
        state
            .pending
            .get(&job_id)
            .or_else(|| state.running.get(&job_id))
            .cloned()
            .or_else(|| state.recently_completed.iter().find(|j| j.id == job_id).cloned())
    }

    pub fn get_pending(&self) -> Vec<Job> {
        self.state.lock().pending.values().cloned().collect()
    }

    pub fn get_running(&self) -> Vec<Job> {
        self.state.lock().running.values().cloned().collect()
    }

    /// `GetRecentlyCompleted()` (§4.1): the 5 most recently completed jobs,
    /// newest first.
    pub fn get_recently_completed(&self) -> Vec<Job> {
        self.state.lock().recently_completed.clone()
    }

    /// `PendingReason(jobID)` (§4.1): a human-readable diagnostic for why a
    /// Pending job hasn't started yet, or `None` if the id isn't Pending.
    pub fn pending_reason(&self, job_id: JobId) -> Option<String> {
        let state = self.state.lock();
        let job = state.pending.get(&job_id)?;

        if job.state == JobState::Disabled {
            return Some(format!("Job \"{}\" is disabled.", job.name));
        }

        let cutoff = Utc::now()
            + chrono::Duration::from_std(self.tunables.get().start_buffer).unwrap_or(chrono::Duration::zero());
        if !job.is_time_eligible(cutoff) {
            return Some(format!(
                "Scheduled start time {} has not yet arrived.",
                job.scheduled_start_time
            ));
        }

        for dep in &job.depends_on {
            if !self.dependency_resolved(&state, *dep) {
                return Some(self.describe_unresolved_dependency(&state, *dep));
            }
        }

        let available = self.registry.available_worker_count();
        if available < job.client_requirement {
            return Some(format!(
                "Insufficient clients available: need {}, have {}.",
                job.client_requirement, available
            ));
        }

        Some("No reason — next loop will start it.".to_string())
    }

    fn describe_unresolved_dependency(&self, state: &SchedulerState, dep: DependencyId) -> String {
        match dep {
            DependencyId::Job(id) => match state.pending.get(&id) {
                Some(dep_job) if dep_job.state == JobState::Disabled => {
                    format!("Waiting on dependency job \"{}\" ({id}), which is disabled.", dep_job.name)
                }
                Some(dep_job) => format!("Waiting on dependency job \"{}\" ({id}).", dep_job.name),
                None if state.running.contains_key(&id) => {
                    format!("Waiting on dependency job {id}, which is still running.")
                }
                None => format!("Waiting on dependency job {id}."),
            },
            DependencyId::Optimizing(id) => format!("Waiting on dependency optimizing job {id} to finish running."),
        }
    }

    /// A dependency on a plain job is resolved once that job has left the
    /// Pending ∪ Running set; a dependency on an optimizing job is resolved
    /// once its `doneRunning()` first becomes true (§3.1 invariant).
    fn dependency_resolved(&self, state: &SchedulerState, dep: DependencyId) -> bool {
        match dep {
            DependencyId::Job(id) => !state.pending.contains_key(&id) && !state.running.contains_key(&id),
            DependencyId::Optimizing(id) => self
                .optimizing_status
                .read()
                .as_ref()
                .map(|s| s.done_running(id))
                .unwrap_or(false),
        }
    }

    fn record_completed(state: &mut SchedulerState, job: Job) {
        state.recently_completed.insert(0, job);
        state.recently_completed.truncate(RECENTLY_COMPLETED_CAPACITY);
    }

    /// Reserves clients and moves every eligible Pending job into Running.
    /// Iterates Pending in insertion order so earlier submissions are tried
    /// first (fairness, §5), but a job missing clients never blocks jobs
    /// behind it. Jobs still waiting on their start time, a dependency, or
    /// (when `waitForClients` is set) client availability are left in
    /// place; jobs that opted out of waiting for clients are terminalized
    /// instead (§4.1 step 2).
    async fn dispatch_pending(&self) -> Result<()> {
        let cutoff = Utc::now()
            + chrono::Duration::from_std(self.tunables.get().start_buffer).unwrap_or(chrono::Duration::zero());

        let candidates: Vec<Job> = {
            let state = self.state.lock();
            state
                .pending
                .values()
                .filter(|job| job.state != JobState::Disabled)
                .filter(|job| job.is_time_eligible(cutoff))
                .filter(|job| job.dependencies_satisfied(|dep| self.dependency_resolved(&state, dep)))
                .cloned()
                .collect()
        };

        for mut job in candidates {
            let reserved = match self.registry.try_reserve_for(&job) {
                Ok(ids) => ids,
                Err(_) if job.wait_for_clients => {
                    debug!(job_id = %job.id, "insufficient clients, leaving pending");
                    continue;
                }
                Err(_) => {
                    job.push_log("Insufficient clients available.");
                    if job.transition(JobState::StoppedDueToError).is_err() {
                        continue;
                    }
                    if let Err(e) = self.repository.put_job(&job).await {
                        warn!(job_id = %job.id, error = %e, "failed to persist error state, leaving pending");
                    }
                    let mut state = self.state.lock();
                    state.pending.shift_remove(&job.id);
                    Self::record_completed(&mut state, job);
                    self.metrics.cancelled.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            job.assign_clients(reserved.clone());
            let monitors = self.registry.reserve_monitors_for(&job, &reserved);
            job.assign_monitor_clients(monitors);
            if let Err(e) = job.transition(JobState::Running) {
                self.registry.release(&reserved);
                warn!(job_id = %job.id, error = %e, "failed to transition job to running");
                continue;
            }

            if let Err(e) = self.repository.put_job(&job).await {
                self.registry.release(&reserved);
                warn!(job_id = %job.id, error = %e, "failed to persist running job, reverting");
                continue;
            }

            let mut state = self.state.lock();
            state.pending.shift_remove(&job.id);
            state.running.insert(job.id, job);
            self.metrics.running_now.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// `JobDone(job)` (§4.1): invoked when the connection handler sees a
    /// `JobCompleted` message. Updates the persisted record, folds the job
    /// into the recently-completed list, and releases its clients; the
    /// caller is responsible for separately notifying the optimizing-job
    /// controller (this core has no reference back to it).
    async fn handle_job_finished(&self, job_id: JobId, outcome: JobOutcome) -> Result<()> {
        let mut job = {
            let mut state = self.state.lock();
            match state.running.shift_remove(&job_id) {
                Some(job) => job,
                None => return Ok(()),
            }
        };
        self.registry.release(&job.assigned_clients);
        self.registry.release(&job.assigned_monitor_clients);
        let target = match outcome {
            JobOutcome::Completed { .. } => JobState::Completed,
            JobOutcome::Error => JobState::StoppedDueToError,
        };
        if let Err(e) = job.transition(target) {
            // Repository write failures when transitioning to a terminal
            // state are logged, not fatal (§4.1 failure semantics) — but an
            // illegal transition here means this job was already resolved
            // by a concurrent cancel; either way it must not re-enter the
            // queue.
            warn!(job_id = %job_id, error = %e, "job already resolved before completion arrived");
        }
        if let Err(e) = self.repository.put_job(&job).await {
            job.push_log(format!("failed to persist terminal state: {e}"));
        }
        self.metrics.running_now.fetch_sub(1, Ordering::Relaxed);
        if target == JobState::Completed {
            self.metrics.completed.fetch_add(1, Ordering::Relaxed);
        }
        let mut state = self.state.lock();
        Self::record_completed(&mut state, job);
        Ok(())
    }

    async fn handle_cancel(&self, job_id: JobId) -> Result<Job> {
        let mut job = {
            let mut state = self.state.lock();
            if let Some(job) = state.pending.shift_remove(&job_id) {
                Some(job)
            } else {
                state.running.shift_remove(&job_id)
            }
        }
        .ok_or_else(|| Error::not_found("job", job_id.to_string()))?;

        self.registry.release(&job.assigned_clients);
        self.registry.release(&job.assigned_monitor_clients);
        job.transition(JobState::Cancelled)?;
        self.repository.put_job(&job).await?;
        self.metrics.cancelled.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.state.lock();
            Self::record_completed(&mut state, job.clone());
        }
        for waiter in self.waiters.lock().remove(&job_id).into_iter().flatten() {
            let _ = waiter.send(job.clone());
        }
        Ok(job)
    }

    /// Loads every non-terminal job from the repository and re-admits it to
    /// Pending, rewriting previously-`Running` jobs to `StoppedByShutdown`
    /// along the way (§4.1 startup recovery steps 1-3).
    pub async fn recover(&self) -> Result<usize> {
        let outcome = crate::scheduler::recovery::recover(self.repository.as_ref()).await?;
        let mut state = self.state.lock();
        let count = outcome.pending.len();
        for job in outcome.pending {
            state.pending.insert(job.id, job);
        }
        for job in outcome.shutdown {
            Self::record_completed(&mut state, job);
        }
        Ok(count)
    }

    /// The main coordinator loop: wakes on `ScheduleEvent`s or on the
    /// configured poll delay, whichever comes first, and drives one dispatch
    /// pass per wake-up.
    pub async fn run(self: Arc<Self>) {
        let mut rx = self
            .events_rx
            .lock()
            .take()
            .expect("SchedulerCore::run must only be called once");
        let mut tunables = self.tunables.clone();

        loop {
            let delay = tunables.get().scheduler_delay;
            tokio::select! {
                _ = self.cancellation_token.cancelled() => {
                    info!("scheduler shutting down");
                    break;
                }
                event = rx.recv() => {
                    match event {
                        Some(ScheduleEvent::Stop) | None => break,
                        Some(ScheduleEvent::Wake) => {}
                        Some(ScheduleEvent::JobFinished { job_id, outcome }) => {
                            if let Err(e) = self.handle_job_finished(job_id, outcome).await {
                                warn!(job_id = %job_id, error = %e, "failed to record job completion");
                            }
                        }
                        Some(ScheduleEvent::Cancel { job_id, .. }) => {
                            if let Err(e) = self.handle_cancel(job_id).await {
                                warn!(job_id = %job_id, error = %e, "failed to cancel job");
                            }
                        }
                    }
                }
                _ = sleep(delay) => {}
                _ = tunables.changed() => { continue; }
            }

            if let Err(e) = self.dispatch_pending().await {
                warn!(error = %e, "dispatch pass failed");
            }
        }
    }

    pub fn shutdown(&self) {
        self.cancellation_token.cancel();
    }
}

#[derive(Clone)]
pub struct SchedulerHandle {
    events_tx: mpsc::Sender<ScheduleEvent>,
}

impl SchedulerHandle {
    pub async fn job_finished(&self, job_id: JobId, outcome: JobOutcome) {
        let _ = self.events_tx.send(ScheduleEvent::JobFinished { job_id, outcome }).await;
    }

    pub async fn cancel(&self, job_id: JobId) {
        let _ = self.events_tx.send(ScheduleEvent::Cancel { job_id, wait_for_stop: false }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::client::{ClientKind, ClientRecord};
    use crate::repository::memory::InMemoryRepository;

    fn make_core() -> Arc<SchedulerCore> {
        let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let registry = Arc::new(ClientRegistry::new());
        let (_handle, sub) = crate::config::ConfigHandle::new(crate::config::SchedulerTunables {
            scheduler_delay: std::time::Duration::from_millis(10),
            start_buffer: std::time::Duration::from_millis(0),
        });
        SchedulerCore::new(repo, registry, sub)
    }

    #[tokio::test]
    async fn submit_then_dispatch_runs_job_with_enough_clients() {
        let core = make_core();
        core.registry.register(ClientRecord::new(ClientKind::Worker, "a")).unwrap();
        core.registry.register(ClientRecord::new(ClientKind::Worker, "b")).unwrap();

        let job = Job::new("probe", 2, Vec::new());
        let id = core.submit(job).await.unwrap();
        core.dispatch_pending().await.unwrap();

        let state = core.state.lock();
        assert!(state.running.contains_key(&id));
        assert!(!state.pending.contains_key(&id));
    }

    #[tokio::test]
    async fn job_without_enough_clients_stays_pending_when_waiting() {
        let core = make_core();
        core.registry.register(ClientRecord::new(ClientKind::Worker, "a")).unwrap();

        let job = Job::new("probe", 2, Vec::new());
        let id = core.submit(job).await.unwrap();
        core.dispatch_pending().await.unwrap();

        let state = core.state.lock();
        assert!(state.pending.contains_key(&id));
        assert!(!state.running.contains_key(&id));
    }

    #[tokio::test]
    async fn insufficient_clients_without_waiting_becomes_stopped_due_to_error() {
        let core = make_core();
        core.registry.register(ClientRecord::new(ClientKind::Worker, "a")).unwrap();

        let job = Job::new("probe", 2, Vec::new()).with_wait_for_clients(false);
        let id = core.submit(job).await.unwrap();
        core.dispatch_pending().await.unwrap();

        let state = core.state.lock();
        assert!(!state.pending.contains_key(&id));
        assert_eq!(state.recently_completed[0].state, JobState::StoppedDueToError);
        assert_eq!(core.metrics().cancelled.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn disabled_job_is_skipped_by_dispatch() {
        let core = make_core();
        core.registry.register(ClientRecord::new(ClientKind::Worker, "a")).unwrap();
        let job = Job::new("probe", 1, Vec::new());
        let id = core.submit(job).await.unwrap();
        core.disable(id).await.unwrap();
        core.dispatch_pending().await.unwrap();

        let state = core.state.lock();
        assert!(state.pending.contains_key(&id));
        assert_eq!(state.pending.get(&id).unwrap().state, JobState::Disabled);
    }

    #[tokio::test]
    async fn enable_makes_a_disabled_job_eligible_again() {
        let core = make_core();
        core.registry.register(ClientRecord::new(ClientKind::Worker, "a")).unwrap();
        let job = Job::new("probe", 1, Vec::new());
        let id = core.submit(job).await.unwrap();
        core.disable(id).await.unwrap();
        core.enable(id).await.unwrap();
        core.dispatch_pending().await.unwrap();

        let state = core.state.lock();
        assert!(state.running.contains_key(&id));
    }

    #[tokio::test]
    async fn dependency_chain_blocks_until_parent_finishes() {
        let core = make_core();
        core.registry.register(ClientRecord::new(ClientKind::Worker, "a")).unwrap();

        let parent = Job::new("parent", 1, Vec::new());
        let parent_id = parent.id;
        let mut child = Job::new("child", 1, Vec::new());
        child.depends_on.push(DependencyId::Job(parent_id));

        core.submit(parent).await.unwrap();
        let child_id = core.submit(child).await.unwrap();
        core.dispatch_pending().await.unwrap();

        {
            let state = core.state.lock();
            assert!(state.running.contains_key(&parent_id));
            assert!(state.pending.contains_key(&child_id));
        }

        core.handle_job_finished(parent_id, JobOutcome::Completed { score: 1.0 }).await.unwrap();
        core.dispatch_pending().await.unwrap();

        let state = core.state.lock();
        assert!(state.running.contains_key(&child_id));
    }

    #[tokio::test]
    async fn pending_reason_names_disabled_dependency() {
        let core = make_core();
        core.registry.register(ClientRecord::new(ClientKind::Worker, "a")).unwrap();

        let dep = Job::new("dep", 1, Vec::new());
        let dep_id = dep.id;
        core.submit(dep).await.unwrap();
        core.disable(dep_id).await.unwrap();

        let mut job = Job::new("waiter", 1, Vec::new());
        job.depends_on.push(DependencyId::Job(dep_id));
        let job_id = core.submit(job).await.unwrap();
        core.dispatch_pending().await.unwrap();

        let reason = core.pending_reason(job_id).unwrap();
        assert!(reason.contains("disabled"), "reason was: {reason}");
    }

    #[tokio::test]
    async fn cancel_releases_reserved_clients() {
        let core = make_core();
        core.registry.register(ClientRecord::new(ClientKind::Worker, "a")).unwrap();

        let job = Job::new("probe", 1, Vec::new());
        let id = core.submit(job).await.unwrap();
        core.dispatch_pending().await.unwrap();
        assert_eq!(core.registry.available_worker_count(), 0);

        core.handle_cancel(id).await.unwrap();
        assert_eq!(core.registry.available_worker_count(), 1);
    }

    #[tokio::test]
    async fn cancel_of_pending_job_is_synchronous_and_returns_it() {
        let core = make_core();
        let job = Job::new("probe", 1, Vec::new());
        let id = core.submit(job).await.unwrap();

        let cancelled = core.cancel(id, false).await.unwrap().expect("job was known");
        assert_eq!(cancelled.state, JobState::Cancelled);
        assert!(!core.state.lock().pending.contains_key(&id));
    }

    #[tokio::test]
    async fn cancel_of_unknown_job_returns_none() {
        let core = make_core();
        let result = core.cancel(JobId::new(), false).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn cancel_with_wait_for_stop_blocks_until_processed_and_returns_cancelled_job() {
        let core = make_core();
        core.registry.register(ClientRecord::new(ClientKind::Worker, "a")).unwrap();
        let job = Job::new("probe", 1, Vec::new());
        let id = core.submit(job).await.unwrap();
        core.dispatch_pending().await.unwrap();
        assert!(core.state.lock().running.contains_key(&id));

        let cancelled = core.cancel(id, true).await.unwrap().expect("job was known");
        assert_eq!(cancelled.state, JobState::Cancelled);
        assert_eq!(core.registry.available_worker_count(), 1);
    }

    #[tokio::test]
    async fn cancel_and_delete_rejects_optimizing_iteration() {
        let core = make_core();
        let mut job = Job::new("iteration", 1, Vec::new());
        job.parent_optimizing_job_id = Some(crate::id::OptimizingJobId::new());
        let id = core.submit(job).await.unwrap();

        assert!(core.cancel_and_delete(id).await.is_err());
        assert!(core.state.lock().pending.contains_key(&id));
    }

    #[tokio::test]
    async fn cancel_and_delete_purges_plain_pending_job() {
        let core = make_core();
        let job = Job::new("probe", 1, Vec::new());
        let id = core.submit(job).await.unwrap();

        core.cancel_and_delete(id).await.unwrap();
        assert!(core.repository.get_job(id).await.unwrap().is_none());
        assert!(!core.state.lock().pending.contains_key(&id));
    }

    #[tokio::test]
    async fn recover_demotes_stale_running_to_stopped_by_shutdown() {
        let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let mut stale_running = Job::new("was-running", 1, Vec::new());
        stale_running.transition(JobState::Running).unwrap();
        repo.put_job(&stale_running).await.unwrap();

        let mut not_yet = Job::new("waiting", 1, Vec::new());
        not_yet.transition(JobState::Disabled).unwrap();
        repo.put_job(&not_yet).await.unwrap();

        let mut done = Job::new("done", 1, Vec::new());
        done.transition(JobState::Running).unwrap();
        done.transition(JobState::Completed).unwrap();
        repo.put_job(&done).await.unwrap();

        let registry = Arc::new(ClientRegistry::new());
        let (_handle, sub) = crate::config::ConfigHandle::new(crate::config::SchedulerTunables::default());
        let core = SchedulerCore::new(repo, registry, sub);
        let recovered = core.recover().await.unwrap();
        assert_eq!(recovered, 1);

        let state = core.state.lock();
        assert!(state.pending.contains_key(&not_yet.id));
        assert!(!state.pending.contains_key(&stale_running.id));
        assert!(!state.pending.contains_key(&done.id));
        assert_eq!(state.recently_completed[0].state, JobState::StoppedByShutdown);
    }
}
