use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::domain::job::JobState;
use crate::domain::optimizing_job::{score_for_state, OptimizingJob};
use crate::error::{Error, Result};
use crate::id::{JobId, OptimizingJobId};
use crate::repository::Repository;
use crate::scheduler::{JobOutcome, SchedulerCore};

/// Narrow view the scheduler needs onto an optimizing job's lifecycle, so
/// `dependencies_satisfied` can resolve a dependency on an `OptimizingJob`
/// without the scheduler core owning the controller itself (§3.1 invariant:
/// a dependent job may start once the optimizing job's `doneRunning()`
/// first becomes true).
pub trait OptimizingStatus: Send + Sync {
    fn done_running(&self, id: OptimizingJobId) -> bool;
}

/// Drives an `OptimizingJob`'s iteration loop (C8, §4.2): at most one
/// iteration is ever outstanding at a time, each finished iteration is
/// scored and folded into the running best, and once the thread-count
/// search stops the best configuration found is re-run once more (if
/// requested and it didn't already run last) before the optimizing job
/// itself is reported complete.
pub struct OptimizingController {
    jobs: Mutex<HashMap<OptimizingJobId, OptimizingJob>>,
    job_index: Mutex<HashMap<JobId, OptimizingJobId>>,
    iteration_threads: Mutex<HashMap<JobId, u32>>,
    repository: Arc<dyn Repository>,
    scheduler: Arc<SchedulerCore>,
}

impl OptimizingController {
    pub fn new(repository: Arc<dyn Repository>, scheduler: Arc<SchedulerCore>) -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::new(HashMap::new()),
            job_index: Mutex::new(HashMap::new()),
            iteration_threads: Mutex::new(HashMap::new()),
            repository,
            scheduler,
        })
    }

    /// `GetUncompletedOptimizing()` (§4.1 observer surface).
    pub fn uncompleted(&self) -> Vec<OptimizingJob> {
        self.jobs.lock().values().filter(|oj| !oj.done_running()).cloned().collect()
    }

    pub fn get(&self, id: OptimizingJobId) -> Option<OptimizingJob> {
        self.jobs.lock().get(&id).cloned()
    }

    /// Recovers every non-terminal optimizing job from the repository into
    /// the in-memory map without re-admitting any children; the scheduler's
    /// own recovery pass re-admits surviving children, whose
    /// `JobDone`/finish notifications drive this controller onward exactly
    /// as they would for a freshly submitted search.
    pub async fn recover(&self) -> Result<usize> {
        let all = self.repository.list_optimizing_jobs().await?;
        let mut jobs = self.jobs.lock();
        let mut count = 0;
        for mut oj in all {
            if oj.done_running() {
                continue;
            }
            if let Some(child) = oj.current_iteration_job {
                self.job_index.lock().insert(child, oj.id);
            }
            if oj.state == JobState::Running {
                // The process restarted mid-search; the child it was
                // waiting on was demoted to StoppedByShutdown by the
                // scheduler's own recovery, so stop the search rather than
                // silently resuming it against a client pool that has
                // changed shape.
                oj.current_iteration_job = None;
                oj.stop_reason = Some("Stopped by server shutdown.".to_string());
                oj.state = JobState::StoppedByShutdown;
            }
            count += 1;
            jobs.insert(oj.id, oj);
        }
        Ok(count)
    }

    pub async fn submit(&self, optimizing_job: OptimizingJob) -> Result<OptimizingJobId> {
        optimizing_job.validate()?;
        let id = optimizing_job.id;
        self.repository.put_optimizing_job(&optimizing_job).await?;
        self.jobs.lock().insert(id, optimizing_job);
        self.advance(id).await?;
        Ok(id)
    }

    /// `CancelOptimizing(oj) -> runningFound` (§4.1): removes the Pending
    /// iteration or signals the Running one, returning whether anything was
    /// actually running so the caller knows whether to wait.
    pub async fn cancel(&self, id: OptimizingJobId) -> Result<bool> {
        let outstanding: Vec<JobId> = {
            let jobs = self.jobs.lock();
            let oj = jobs.get(&id).ok_or_else(|| Error::not_found("optimizing_job", id.to_string()))?;
            [oj.current_iteration_job, oj.rerun_job].into_iter().flatten().collect()
        };
        let mut any = false;
        for job_id in outstanding {
            self.scheduler.cancel(job_id, false).await?;
            any = true;
        }
        {
            let mut jobs = self.jobs.lock();
            if let Some(oj) = jobs.get_mut(&id) {
                oj.stop_reason = Some("Cancelled by operator.".to_string());
            }
        }
        Ok(any)
    }

    /// Invoked by whatever observes job completion (the scheduler's own
    /// event stream in production, direct calls in tests) once a job this
    /// controller is tracking has reached a terminal state.
    pub async fn on_job_finished(&self, job_id: JobId, outcome: JobOutcome) -> Result<()> {
        let Some(optimizing_id) = self.job_index.lock().remove(&job_id) else {
            return Ok(());
        };
        let threads = self.iteration_threads.lock().remove(&job_id).unwrap_or(0);

        let is_rerun = {
            let jobs = self.jobs.lock();
            jobs.get(&optimizing_id).map(|oj| oj.rerun_job == Some(job_id)).unwrap_or(false)
        };

        if is_rerun {
            let snapshot = {
                let mut jobs = self.jobs.lock();
                let Some(oj) = jobs.get_mut(&optimizing_id) else { return Ok(()) };
                let final_state = match outcome {
                    JobOutcome::Completed { .. } => JobState::Completed,
                    JobOutcome::Error => JobState::StoppedDueToError,
                };
                oj.finish(final_state)?;
                oj.clone()
            };
            self.repository.put_optimizing_job(&snapshot).await?;
            info!(optimizing_job_id = %optimizing_id, "optimizing job complete");
            return Ok(());
        }

        if outcome == JobOutcome::Error {
            // The algorithm's abort path: an abnormally terminated
            // iteration aborts the whole search rather than being scored
            // (§4.2 point 1).
            let snapshot = {
                let mut jobs = self.jobs.lock();
                let Some(oj) = jobs.get_mut(&optimizing_id) else { return Ok(()) };
                oj.stop_reason = Some("Iteration stopped due to error.".to_string());
                oj.finish(JobState::StoppedDueToError).ok();
                oj.clone()
            };
            self.repository.put_optimizing_job(&snapshot).await?;
            warn!(optimizing_job_id = %optimizing_id, job_id = %job_id, "optimizing job iteration failed, aborting search");
            return Ok(());
        }

        let score = match outcome {
            JobOutcome::Completed { score } => score_for_state(JobState::Completed, score),
            JobOutcome::Error => unreachable!("handled above"),
        };

        {
            let mut jobs = self.jobs.lock();
            if let Some(oj) = jobs.get_mut(&optimizing_id) {
                oj.record_iteration(job_id, threads, score);
            }
        }
        let snapshot = self.jobs.lock().get(&optimizing_id).cloned();
        if let Some(oj) = snapshot {
            self.repository.put_optimizing_job(&oj).await?;
        }

        self.advance(optimizing_id).await
    }

    async fn advance(&self, id: OptimizingJobId) -> Result<()> {
        let next_job = {
            let mut jobs = self.jobs.lock();
            let Some(oj) = jobs.get_mut(&id) else {
                return Ok(());
            };
            if oj.done_running() {
                return Ok(());
            }
            let job = oj.next_child_job();
            if job.is_some() {
                oj.mark_running();
            }
            job
        };

        match next_job {
            Some(job) => {
                let snapshot = self.jobs.lock().get(&id).cloned();
                if let Some(oj) = snapshot {
                    self.repository.put_optimizing_job(&oj).await?;
                }
                self.iteration_threads.lock().insert(job.id, job.threads_per_client);
                self.job_index.lock().insert(job.id, id);
                if let Err(e) = self.scheduler.submit(job).await {
                    warn!(optimizing_job_id = %id, error = %e, "failed to submit optimizing job iteration");
                    return Err(e);
                }
                Ok(())
            }
            None => {
                // The search stopped and no re-run was warranted (the best
                // iteration already ran most recently, or re-run wasn't
                // requested): report completion immediately.
                let snapshot = {
                    let mut jobs = self.jobs.lock();
                    let Some(oj) = jobs.get_mut(&id) else { return Ok(()) };
                    if oj.done_running() {
                        return Ok(());
                    }
                    oj.finish(JobState::Completed)?;
                    oj.clone()
                };
                self.repository.put_optimizing_job(&snapshot).await?;
                info!(optimizing_job_id = %id, "optimizing job complete");
                Ok(())
            }
        }
    }
}

impl OptimizingStatus for OptimizingController {
    fn done_running(&self, id: OptimizingJobId) -> bool {
        self.jobs.lock().get(&id).map(|oj| oj.done_running()).unwrap_or(true)
    }
}
