use crate::domain::job::{Job, JobState};
use crate::error::Result;
use crate::repository::Repository;

/// Outcome of a startup recovery pass: jobs to re-admit to Pending, and jobs
/// that were `Running` when the process stopped and have now been
/// terminalized.
pub struct RecoverOutcome {
    pub pending: Vec<Job>,
    pub shutdown: Vec<Job>,
}

/// Loads every non-terminal job from the repository and reconciles it with
/// what a freshly started process can actually act on (§4.1 startup
/// recovery steps 1-3).
///
/// A job that was `Running` when the process stopped held clients that are
/// long gone by the time this process starts; there is no safe way to
/// resume it, so it is transitioned to the terminal `StoppedByShutdown`
/// state and persisted rather than silently re-admitted. Jobs that were
/// still `NotYetStarted` or `Disabled` are simply handed back for
/// re-admission to Pending.
pub async fn recover(repository: &dyn Repository) -> Result<RecoverOutcome> {
    let jobs = repository.list_recoverable_jobs().await?;
    let mut pending = Vec::new();
    let mut shutdown = Vec::new();

    for mut job in jobs {
        match job.state {
            JobState::Running => {
                job.assigned_clients.clear();
                job.assigned_monitor_clients.clear();
                job.push_log("Stopped by server shutdown.");
                job.transition(JobState::StoppedByShutdown)?;
                repository.put_job(&job).await?;
                shutdown.push(job);
            }
            JobState::NotYetStarted | JobState::Disabled => pending.push(job),
            _ => {}
        }
    }

    Ok(RecoverOutcome { pending, shutdown })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::InMemoryRepository;

    #[tokio::test]
    async fn running_job_is_terminalized_as_stopped_by_shutdown() {
        let repo = InMemoryRepository::new();
        let mut job = Job::new("probe", 1, Vec::new());
        job.transition(JobState::Running).unwrap();
        repo.put_job(&job).await.unwrap();
        let id = job.id;

        let outcome = recover(&repo).await.unwrap();
        assert!(outcome.pending.is_empty());
        assert_eq!(outcome.shutdown.len(), 1);
        assert_eq!(outcome.shutdown[0].state, JobState::StoppedByShutdown);
        assert!(outcome.shutdown[0].assigned_clients.is_empty());

        let persisted = repo.get_job(id).await.unwrap().unwrap();
        assert_eq!(persisted.state, JobState::StoppedByShutdown);
    }

    #[tokio::test]
    async fn not_yet_started_job_is_re_admitted_to_pending() {
        let repo = InMemoryRepository::new();
        let job = Job::new("probe", 1, Vec::new());
        repo.put_job(&job).await.unwrap();

        let outcome = recover(&repo).await.unwrap();
        assert_eq!(outcome.pending.len(), 1);
        assert_eq!(outcome.pending[0].state, JobState::NotYetStarted);
        assert!(outcome.shutdown.is_empty());
    }

    #[tokio::test]
    async fn disabled_job_is_re_admitted_to_pending_still_disabled() {
        let repo = InMemoryRepository::new();
        let mut job = Job::new("probe", 1, Vec::new());
        job.transition(JobState::Disabled).unwrap();
        repo.put_job(&job).await.unwrap();

        let outcome = recover(&repo).await.unwrap();
        assert_eq!(outcome.pending.len(), 1);
        assert_eq!(outcome.pending[0].state, JobState::Disabled);
    }

    #[tokio::test]
    async fn cancelled_job_is_excluded() {
        let repo = InMemoryRepository::new();
        let mut job = Job::new("probe", 1, Vec::new());
        job.transition(JobState::Cancelled).unwrap();
        repo.put_job(&job).await.unwrap();

        let outcome = recover(&repo).await.unwrap();
        assert!(outcome.pending.is_empty());
        assert!(outcome.shutdown.is_empty());
    }
}
