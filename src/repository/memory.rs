use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::job::Job;
use crate::domain::job_group::JobGroup;
use crate::domain::optimizing_job::OptimizingJob;
use crate::id::{JobGroupId, JobId, OptimizingJobId};
use crate::repository::error::RepositoryResult;
use crate::repository::Repository;

/// In-memory repository for tests and for the `--no-persistence` debug mode.
#[derive(Default)]
pub struct InMemoryRepository {
    jobs: DashMap<JobId, Job>,
    optimizing_jobs: DashMap<OptimizingJobId, OptimizingJob>,
    job_groups: DashMap<JobGroupId, JobGroup>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn put_job(&self, job: &Job) -> RepositoryResult<()> {
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> RepositoryResult<Option<Job>> {
        Ok(self.jobs.get(&id).map(|r| r.clone()))
    }

    async fn delete_job(&self, id: JobId) -> RepositoryResult<()> {
        self.jobs.remove(&id);
        Ok(())
    }

    async fn list_jobs(&self) -> RepositoryResult<Vec<Job>> {
        Ok(self.jobs.iter().map(|r| r.value().clone()).collect())
    }

    async fn put_optimizing_job(&self, job: &OptimizingJob) -> RepositoryResult<()> {
        self.optimizing_jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_optimizing_job(&self, id: OptimizingJobId) -> RepositoryResult<Option<OptimizingJob>> {
        Ok(self.optimizing_jobs.get(&id).map(|r| r.clone()))
    }

    async fn delete_optimizing_job(&self, id: OptimizingJobId) -> RepositoryResult<()> {
        self.optimizing_jobs.remove(&id);
        Ok(())
    }

    async fn list_optimizing_jobs(&self) -> RepositoryResult<Vec<OptimizingJob>> {
        Ok(self.optimizing_jobs.iter().map(|r| r.value().clone()).collect())
    }

    async fn put_job_group(&self, group: &JobGroup) -> RepositoryResult<()> {
        self.job_groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn get_job_group(&self, id: JobGroupId) -> RepositoryResult<Option<JobGroup>> {
        Ok(self.job_groups.get(&id).map(|r| r.clone()))
    }

    async fn list_job_groups(&self) -> RepositoryResult<Vec<JobGroup>> {
        Ok(self.job_groups.iter().map(|r| r.value().clone()).collect())
    }
}
