use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::parameter::Parameter;
use crate::error::{Error, Result};
use crate::id::{ClientId, JobGroupId, JobId, OptimizingJobId};

/// Lifecycle state of a `Job`.
///
/// `NotYetStarted` is the only admissible state for a freshly submitted job.
/// `Running` is the only state the scheduler may dispatch clients against.
/// The four terminal variants and `Cancelled` never transition further;
/// `Disabled` is a holding state a job can be moved into and out of before it
/// has ever run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    NotYetStarted,
    Running,
    Completed,
    StoppedDueToError,
    StoppedByShutdown,
    StoppedByUser,
    Cancelled,
    Disabled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed
                | JobState::StoppedDueToError
                | JobState::StoppedByShutdown
                | JobState::StoppedByUser
                | JobState::Cancelled
        )
    }

    /// A job in this state is held in the scheduler's Pending map, waiting
    /// either on its start time/dependencies/clients (`NotYetStarted`) or on
    /// an operator re-`Enable` (`Disabled`).
    pub fn is_waiting(self) -> bool {
        matches!(self, JobState::NotYetStarted | JobState::Disabled)
    }

    /// Whether `to` is a legal transition target from `self` (§3.6).
    pub fn can_transition_to(self, to: JobState) -> bool {
        use JobState::*;
        match (self, to) {
            (NotYetStarted, Running | Cancelled | Disabled) => true,
            (Disabled, NotYetStarted | Cancelled) => true,
            (Running, Completed | StoppedDueToError | StoppedByShutdown | StoppedByUser | Cancelled) => true,
            _ => false,
        }
    }
}

/// A dependency named by a `Job`: either another concrete `Job` (satisfied
/// once that job leaves Pending ∪ Running) or the parent of an
/// `OptimizingJob` (satisfied once `doneRunning()` first becomes true, per
/// §3.1's invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyId {
    Job(JobId),
    Optimizing(OptimizingJobId),
}

impl From<JobId> for DependencyId {
    fn from(id: JobId) -> Self {
        DependencyId::Job(id)
    }
}

impl From<OptimizingJobId> for DependencyId {
    fn from(id: OptimizingJobId) -> Self {
        DependencyId::Optimizing(id)
    }
}

/// A single runnable unit of work (§3.1).
///
/// `client_requirement` is the number of worker clients the scheduler must
/// reserve before the job may enter `Running`; `threads_per_client` is the
/// per-client thread count an `OptimizingJob`'s controller varies between
/// iterations; `depends_on` names jobs (or optimizing-job parents) that must
/// be resolved before this one is eligible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub job_class: String,
    #[serde(default)]
    pub job_class_version: Option<String>,
    pub state: JobState,
    pub client_requirement: u32,
    #[serde(default = "default_threads_per_client")]
    pub threads_per_client: u32,
    #[serde(default)]
    pub thread_startup_delay_ms: u64,
    #[serde(default)]
    pub depends_on: Vec<DependencyId>,
    pub parameters: Vec<Parameter>,
    pub folder_name: Option<String>,
    #[serde(default)]
    pub group_id: Option<JobGroupId>,
    #[serde(default)]
    pub parent_optimizing_job_id: Option<OptimizingJobId>,
    #[serde(default)]
    pub requested_clients: Vec<ClientId>,
    #[serde(default)]
    pub requested_monitor_clients: Vec<ClientId>,
    #[serde(default = "default_true")]
    pub wait_for_clients: bool,
    #[serde(default)]
    pub report_in_progress_stats: bool,
    #[serde(default)]
    pub in_progress_report_interval_secs: u32,
    #[serde(default)]
    pub collection_interval_secs: u32,
    #[serde(default)]
    pub max_duration_secs: Option<u64>,
    pub scheduled_start_time: DateTime<Utc>,
    #[serde(default)]
    pub scheduled_stop_time: Option<DateTime<Utc>>,
    pub assigned_clients: Vec<ClientId>,
    #[serde(default)]
    pub assigned_monitor_clients: Vec<ClientId>,
    pub created_at: DateTime<Utc>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_stop_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_duration_secs: Option<i64>,
    #[serde(default)]
    pub log_messages: Vec<String>,
    #[serde(default)]
    pub stat_tracker_payload: Option<Vec<u8>>,
    pub version: u32,
}

fn default_threads_per_client() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Job {
    pub fn new(name: impl Into<String>, client_requirement: u32, parameters: Vec<Parameter>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: JobId::new(),
            job_class: name.clone(),
            job_class_version: None,
            name,
            state: JobState::NotYetStarted,
            client_requirement,
            threads_per_client: 1,
            thread_startup_delay_ms: 0,
            depends_on: Vec::new(),
            parameters,
            folder_name: None,
            group_id: None,
            parent_optimizing_job_id: None,
            requested_clients: Vec::new(),
            requested_monitor_clients: Vec::new(),
            wait_for_clients: true,
            report_in_progress_stats: false,
            in_progress_report_interval_secs: 0,
            collection_interval_secs: 0,
            max_duration_secs: None,
            scheduled_start_time: now,
            scheduled_stop_time: None,
            assigned_clients: Vec::new(),
            assigned_monitor_clients: Vec::new(),
            created_at: now,
            actual_start_time: None,
            actual_stop_time: None,
            actual_duration_secs: None,
            log_messages: Vec::new(),
            stat_tracker_payload: None,
            version: 0,
        }
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.scheduled_start_time = start_time;
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<DependencyId>) -> Self {
        self.depends_on = deps;
        self
    }

    pub fn with_wait_for_clients(mut self, wait: bool) -> Self {
        self.wait_for_clients = wait;
        self
    }

    pub fn with_parent_optimizing_job(mut self, id: OptimizingJobId) -> Self {
        self.parent_optimizing_job_id = Some(id);
        self
    }

    pub fn with_threads_per_client(mut self, threads: u32) -> Self {
        self.threads_per_client = threads;
        self
    }

    pub fn with_max_duration_secs(mut self, duration: Option<u64>) -> Self {
        self.max_duration_secs = duration;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::admission("job name must not be empty"));
        }
        if self.client_requirement == 0 {
            return Err(Error::admission("job must require at least one client"));
        }
        for p in &self.parameters {
            p.validate()?;
        }
        Ok(())
    }

    /// True once every entry in `depends_on` is resolved, per the supplied
    /// lookup closure.
    pub fn dependencies_satisfied<F>(&self, resolved: F) -> bool
    where
        F: Fn(DependencyId) -> bool,
    {
        self.depends_on.iter().all(|id| resolved(*id))
    }

    /// True if the job's scheduled start time has arrived by `cutoff` (the
    /// dispatch loop's `now + startBuffer`, §4.1 step 1).
    pub fn is_time_eligible(&self, cutoff: DateTime<Utc>) -> bool {
        self.scheduled_start_time <= cutoff
    }

    pub fn transition(&mut self, to: JobState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(Error::InvalidStateTransition {
                job_id: self.id.to_string(),
                from: self.state,
                to,
            });
        }
        let now = Utc::now();
        match to {
            JobState::Running => self.actual_start_time = Some(now),
            JobState::Completed
            | JobState::StoppedDueToError
            | JobState::StoppedByShutdown
            | JobState::StoppedByUser
            | JobState::Cancelled => {
                self.actual_stop_time = Some(now);
                if let Some(start) = self.actual_start_time {
                    self.actual_duration_secs = Some((now - start).num_seconds());
                }
            }
            _ => {}
        }
        self.state = to;
        self.version += 1;
        Ok(())
    }

    pub fn assign_clients(&mut self, clients: Vec<ClientId>) {
        self.assigned_clients = clients;
    }

    pub fn assign_monitor_clients(&mut self, clients: Vec<ClientId>) {
        self.assigned_monitor_clients = clients;
    }

    pub fn push_log(&mut self, message: impl Into<String>) {
        self.log_messages.push(message.into());
    }
}
