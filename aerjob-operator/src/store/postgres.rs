//! Postgres object store
//!
//! Jobs and workers live in two tables. Status writes are conditional on
//! `resource_version`, and the `workers.owner_name` foreign key cascades
//! job deletion to workers.

use aerjob_core::domain::job::{Job, JobSpec, JobStatus, Phase};
use aerjob_core::domain::worker::{OwnerRef, Worker, WorkerLaunch, WorkerPhase, WorkerSpec};
use aerjob_core::error::{ObjectKind, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::ObjectStore;

const JOB_COLUMNS: &str = "name, uid, resource_version, created_at, spec, phase, retries, \
                           worker_ref, start_time, completion_time, error_message";

const WORKER_COLUMNS: &str = "name, owner_name, owner_uid, spec, phase, created_at";

/// Object store backed by a Postgres pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn job_exists(&self, name: &str) -> StoreResult<bool> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM jobs WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(ObjectKind::Job, name, e))?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl ObjectStore for PgStore {
    async fn create_job(&self, job: Job) -> StoreResult<Job> {
        let sql = format!(
            r#"
            INSERT INTO jobs ({JOB_COLUMNS})
            VALUES ($1, $2, 1, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(&job.name)
            .bind(job.uid)
            .bind(job.created_at)
            .bind(Json(&job.spec))
            .bind(job.status.phase.as_str())
            .bind(to_i32(job.status.retries))
            .bind(job.status.worker_ref.as_deref())
            .bind(job.status.start_time)
            .bind(job.status.completion_time)
            .bind(job.status.error_message.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(ObjectKind::Job, &job.name, e))?;

        row.try_into()
    }

    async fn get_job(&self, name: &str) -> StoreResult<Job> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE name = $1");

        sqlx::query_as::<_, JobRow>(&sql)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(ObjectKind::Job, name, e))?
            .try_into()
    }

    async fn list_jobs(&self) -> StoreResult<Vec<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at ASC");

        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::transient(e.to_string()))?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn update_status(&self, job: &Job) -> StoreResult<Job> {
        let sql = format!(
            r#"
            UPDATE jobs
            SET phase = $1, retries = $2, worker_ref = $3, start_time = $4,
                completion_time = $5, error_message = $6,
                resource_version = resource_version + 1
            WHERE name = $7 AND uid = $8 AND resource_version = $9
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(job.status.phase.as_str())
            .bind(to_i32(job.status.retries))
            .bind(job.status.worker_ref.as_deref())
            .bind(job.status.start_time)
            .bind(job.status.completion_time)
            .bind(job.status.error_message.as_deref())
            .bind(&job.name)
            .bind(job.uid)
            .bind(to_i64(job.resource_version))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(ObjectKind::Job, &job.name, e))?;

        match row {
            Some(row) => row.try_into(),
            None if self.job_exists(&job.name).await? => {
                Err(StoreError::conflict(&job.name, job.resource_version))
            }
            None => Err(StoreError::not_found(ObjectKind::Job, &job.name)),
        }
    }

    async fn delete_job(&self, name: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM jobs WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(ObjectKind::Job, name, e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(ObjectKind::Job, name));
        }
        Ok(())
    }

    async fn create_worker(&self, launch: WorkerLaunch) -> StoreResult<Worker> {
        let worker = Worker::from_launch(launch);

        // Insert only while the owning incarnation still exists
        let sql = format!(
            r#"
            INSERT INTO workers ({WORKER_COLUMNS})
            SELECT $1, name, uid, $2, $3, $4 FROM jobs WHERE name = $5 AND uid = $6
            RETURNING {WORKER_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, WorkerRow>(&sql)
            .bind(&worker.name)
            .bind(Json(&worker.spec))
            .bind(worker.phase.as_str())
            .bind(worker.created_at)
            .bind(&worker.owner.name)
            .bind(worker.owner.uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(ObjectKind::Worker, &worker.name, e))?;

        match row {
            Some(row) => row.try_into(),
            None => Err(StoreError::not_found(ObjectKind::Job, &worker.owner.name)),
        }
    }

    async fn get_worker(&self, name: &str) -> StoreResult<Worker> {
        let sql = format!("SELECT {WORKER_COLUMNS} FROM workers WHERE name = $1");

        sqlx::query_as::<_, WorkerRow>(&sql)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(ObjectKind::Worker, name, e))?
            .try_into()
    }

    async fn list_workers(&self, owner: Option<&str>) -> StoreResult<Vec<Worker>> {
        let sql = format!(
            r#"
            SELECT {WORKER_COLUMNS} FROM workers
            WHERE $1::VARCHAR IS NULL OR owner_name = $1
            ORDER BY created_at ASC
            "#
        );

        let rows = sqlx::query_as::<_, WorkerRow>(&sql)
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::transient(e.to_string()))?;

        rows.into_iter().map(Worker::try_from).collect()
    }

    async fn update_worker_phase(&self, name: &str, phase: WorkerPhase) -> StoreResult<Worker> {
        let sql =
            format!("UPDATE workers SET phase = $1 WHERE name = $2 RETURNING {WORKER_COLUMNS}");

        sqlx::query_as::<_, WorkerRow>(&sql)
            .bind(phase.as_str())
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(ObjectKind::Worker, name, e))?
            .try_into()
    }

    async fn delete_worker(&self, name: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM workers WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(ObjectKind::Worker, name, e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(ObjectKind::Worker, name));
        }
        Ok(())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn map_sqlx_error(kind: ObjectKind, name: &str, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::RowNotFound => StoreError::not_found(kind, name),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::already_exists(kind, name)
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            StoreError::not_found(ObjectKind::Job, name)
        }
        _ => StoreError::transient(err.to_string()),
    }
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn corrupt(kind: ObjectKind, name: &str, detail: String) -> StoreError {
    StoreError::transient(format!("corrupt {} row {}: {}", kind, name, detail))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    name: String,
    uid: Uuid,
    resource_version: i64,
    created_at: DateTime<Utc>,
    spec: Json<JobSpec>,
    phase: String,
    retries: i32,
    worker_ref: Option<String>,
    start_time: Option<DateTime<Utc>>,
    completion_time: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let phase: Phase = row
            .phase
            .parse()
            .map_err(|e| corrupt(ObjectKind::Job, &row.name, e))?;

        Ok(Job {
            uid: row.uid,
            resource_version: u64::try_from(row.resource_version).unwrap_or_default(),
            created_at: row.created_at,
            spec: row.spec.0,
            status: JobStatus {
                phase,
                retries: u32::try_from(row.retries).unwrap_or_default(),
                worker_ref: row.worker_ref,
                start_time: row.start_time,
                completion_time: row.completion_time,
                error_message: row.error_message,
            },
            name: row.name,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WorkerRow {
    name: String,
    owner_name: String,
    owner_uid: Uuid,
    spec: Json<WorkerSpec>,
    phase: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<WorkerRow> for Worker {
    type Error = StoreError;

    fn try_from(row: WorkerRow) -> Result<Self, Self::Error> {
        let phase: WorkerPhase = row
            .phase
            .parse()
            .map_err(|e| corrupt(ObjectKind::Worker, &row.name, e))?;

        Ok(Worker {
            owner: OwnerRef {
                name: row.owner_name,
                uid: row.owner_uid,
            },
            spec: row.spec.0,
            phase,
            created_at: row.created_at,
            name: row.name,
        })
    }
}
