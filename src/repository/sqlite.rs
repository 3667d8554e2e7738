use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::domain::job::Job;
use crate::domain::job_group::JobGroup;
use crate::domain::optimizing_job::OptimizingJob;
use crate::id::{JobGroupId, JobId, OptimizingJobId};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::Repository;

const KIND_JOB: &str = "job";
const KIND_OPTIMIZING_JOB: &str = "optimizing_job";
const KIND_JOB_GROUP: &str = "job_group";

/// Opens the SQLite pool and runs pending migrations, creating the database
/// file if it doesn't already exist.
pub async fn create_pool(database_url: &str) -> RepositoryResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(sqlx::Error::from)?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn put(&self, kind: &str, id: &str, state: Option<&str>, bytes: &[u8]) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO kv_entities (kind, id, state, bytes, version, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, CURRENT_TIMESTAMP)
             ON CONFLICT(kind, id) DO UPDATE SET
                state = excluded.state,
                bytes = excluded.bytes,
                version = kv_entities.version + 1,
                updated_at = CURRENT_TIMESTAMP",
        )
        .bind(kind)
        .bind(id)
        .bind(state)
        .bind(bytes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, kind: &str, id: &str) -> RepositoryResult<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT bytes FROM kv_entities WHERE kind = ?1 AND id = ?2")
            .bind(kind)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(bytes,)| bytes))
    }

    async fn delete(&self, kind: &str, id: &str) -> RepositoryResult<()> {
        sqlx::query("DELETE FROM kv_entities WHERE kind = ?1 AND id = ?2")
            .bind(kind)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, kind: &str) -> RepositoryResult<Vec<Vec<u8>>> {
        let rows: Vec<(Vec<u8>,)> = sqlx::query_as("SELECT bytes FROM kv_entities WHERE kind = ?1")
            .bind(kind)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(bytes,)| bytes).collect())
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn put_job(&self, job: &Job) -> RepositoryResult<()> {
        let bytes = serde_json::to_vec(job)?;
        let state = serde_json::to_string(&job.state)?;
        self.put(KIND_JOB, &job.id.to_string(), Some(&state), &bytes).await
    }

    async fn get_job(&self, id: JobId) -> RepositoryResult<Option<Job>> {
        match self.get(KIND_JOB, &id.to_string()).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete_job(&self, id: JobId) -> RepositoryResult<()> {
        self.delete(KIND_JOB, &id.to_string()).await
    }

    async fn list_jobs(&self) -> RepositoryResult<Vec<Job>> {
        self.list(KIND_JOB)
            .await?
            .into_iter()
            .map(|bytes| serde_json::from_slice(&bytes).map_err(RepositoryError::from))
            .collect()
    }

    async fn put_optimizing_job(&self, job: &OptimizingJob) -> RepositoryResult<()> {
        let bytes = serde_json::to_vec(job)?;
        self.put(KIND_OPTIMIZING_JOB, &job.id.to_string(), None, &bytes).await
    }

    async fn get_optimizing_job(&self, id: OptimizingJobId) -> RepositoryResult<Option<OptimizingJob>> {
        match self.get(KIND_OPTIMIZING_JOB, &id.to_string()).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete_optimizing_job(&self, id: OptimizingJobId) -> RepositoryResult<()> {
        self.delete(KIND_OPTIMIZING_JOB, &id.to_string()).await
    }

    async fn list_optimizing_jobs(&self) -> RepositoryResult<Vec<OptimizingJob>> {
        self.list(KIND_OPTIMIZING_JOB)
            .await?
            .into_iter()
            .map(|bytes| serde_json::from_slice(&bytes).map_err(RepositoryError::from))
            .collect()
    }

    async fn put_job_group(&self, group: &JobGroup) -> RepositoryResult<()> {
        let bytes = serde_json::to_vec(group)?;
        self.put(KIND_JOB_GROUP, &group.id.to_string(), None, &bytes).await
    }

    async fn get_job_group(&self, id: JobGroupId) -> RepositoryResult<Option<JobGroup>> {
        match self.get(KIND_JOB_GROUP, &id.to_string()).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_job_groups(&self) -> RepositoryResult<Vec<JobGroup>> {
        self.list(KIND_JOB_GROUP)
            .await?
            .into_iter()
            .map(|bytes| serde_json::from_slice(&bytes).map_err(RepositoryError::from))
            .collect()
    }
}
