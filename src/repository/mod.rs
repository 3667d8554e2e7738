//! Persistent repository surface (C5, §6.2): an abstract KV store the
//! scheduler uses both to persist every admitted entity and, on startup, to
//! recover the set of jobs that were not yet in a terminal state when the
//! process last stopped.

pub mod error;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::domain::job::{Job, JobState};
use crate::domain::job_group::JobGroup;
use crate::domain::optimizing_job::OptimizingJob;
use crate::id::{JobGroupId, JobId, OptimizingJobId};
use crate::repository::error::RepositoryResult;

#[async_trait]
pub trait Repository: Send + Sync {
    async fn put_job(&self, job: &Job) -> RepositoryResult<()>;
    async fn get_job(&self, id: JobId) -> RepositoryResult<Option<Job>>;
    async fn delete_job(&self, id: JobId) -> RepositoryResult<()>;
    async fn list_jobs(&self) -> RepositoryResult<Vec<Job>>;
    /// Jobs recoverable on restart: anything not yet in a terminal state.
    async fn list_recoverable_jobs(&self) -> RepositoryResult<Vec<Job>> {
        Ok(self
            .list_jobs()
            .await?
            .into_iter()
            .filter(|j| !j.state.is_terminal())
            .collect())
    }

    async fn put_optimizing_job(&self, job: &OptimizingJob) -> RepositoryResult<()>;
    async fn get_optimizing_job(&self, id: OptimizingJobId) -> RepositoryResult<Option<OptimizingJob>>;
    async fn delete_optimizing_job(&self, id: OptimizingJobId) -> RepositoryResult<()>;
    async fn list_optimizing_jobs(&self) -> RepositoryResult<Vec<OptimizingJob>>;

    async fn put_job_group(&self, group: &JobGroup) -> RepositoryResult<()>;
    async fn get_job_group(&self, id: JobGroupId) -> RepositoryResult<Option<JobGroup>>;
    async fn list_job_groups(&self) -> RepositoryResult<Vec<JobGroup>>;
}

/// Convenience filter matching the admin/operator `GET /jobs?state=` surface
/// in §6.3.
pub fn matches_state_filter(job: &Job, filter: Option<JobState>) -> bool {
    match filter {
        Some(state) => job.state == state,
        None => true,
    }
}
