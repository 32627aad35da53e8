//! PostgreSQL job store.
//!
//! The durable production store. Claim and update are single conditional
//! UPDATE statements, so the compare-and-set guarantees hold across any
//! number of server and worker replicas sharing the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobbot_domain::error::{DomainError, Result};
use jobbot_domain::jobs::{Job, SearchSpec};
use jobbot_domain::store::JobStore;
use jobbot_shared::config::DatabaseConfig;
use jobbot_shared::{CorrelationId, JobId, JobState, WorkerId};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| DomainError::StoreUnavailable {
                message: "database url is not configured".to_string(),
            })?;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(url)
            .await
            .map_err(store_err)?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id UUID PRIMARY KEY,
                positions JSONB NOT NULL,
                locations JSONB NOT NULL,
                state TEXT NOT NULL,
                owner UUID,
                version BIGINT NOT NULL DEFAULT 0,
                applied INTEGER NOT NULL DEFAULT 0,
                pause_until TIMESTAMPTZ,
                error_message TEXT,
                correlation_id UUID NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state);")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_jobs_state_updated_at ON jobs(state, updated_at);",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }
}

fn store_err(e: sqlx::Error) -> DomainError {
    DomainError::StoreUnavailable {
        message: e.to_string(),
    }
}

fn map_row_to_job(row: PgRow) -> Result<Job> {
    let id: uuid::Uuid = row.get("id");
    let positions_json: serde_json::Value = row.get("positions");
    let locations_json: serde_json::Value = row.get("locations");
    let state_str: String = row.get("state");
    let owner: Option<uuid::Uuid> = row.get("owner");
    let version: i64 = row.get("version");
    let applied: i32 = row.get("applied");
    let pause_until: Option<DateTime<Utc>> = row.get("pause_until");
    let error_message: Option<String> = row.get("error_message");
    let correlation_id: uuid::Uuid = row.get("correlation_id");
    let created_at: DateTime<Utc> = row.get("created_at");
    let updated_at: DateTime<Utc> = row.get("updated_at");

    let positions: Vec<String> =
        serde_json::from_value(positions_json).map_err(|e| DomainError::StoreUnavailable {
            message: format!("Failed to deserialize positions: {}", e),
        })?;
    let locations: Vec<String> =
        serde_json::from_value(locations_json).map_err(|e| DomainError::StoreUnavailable {
            message: format!("Failed to deserialize locations: {}", e),
        })?;

    let state = JobState::from_str(&state_str).map_err(|e| DomainError::StoreUnavailable {
        message: format!("Corrupt state column: {}", e),
    })?;

    Ok(Job {
        id: JobId(id),
        spec: SearchSpec::new(positions, locations),
        state,
        owner: owner.map(WorkerId),
        version: version as u64,
        applied: applied as u32,
        pause_until,
        error_message,
        correlation_id: CorrelationId(correlation_id),
        created_at,
        updated_at,
    })
}

const SELECT_COLUMNS: &str = "id, positions, locations, state, owner, version, applied, \
     pause_until, error_message, correlation_id, created_at, updated_at";

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, positions, locations, state, owner, version, applied,
                              pause_until, error_message, correlation_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(job.id.0)
        .bind(serde_json::to_value(&job.spec.positions).unwrap_or_default())
        .bind(serde_json::to_value(&job.spec.locations).unwrap_or_default())
        .bind(job.state.to_string())
        .bind(job.owner.as_ref().map(|w| w.0))
        .bind(job.version as i64)
        .bind(job.applied as i32)
        .bind(job.pause_until)
        .bind(job.error_message.as_deref())
        .bind(job.correlation_id.0)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn find_by_id(&self, job_id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM jobs WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(job_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(map_row_to_job).transpose()
    }

    async fn find_by_state(&self, state: &JobState) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM jobs WHERE state = $1 ORDER BY created_at",
            SELECT_COLUMNS
        ))
        .bind(state.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter().map(map_row_to_job).collect()
    }

    async fn find_most_recent(&self) -> Result<Option<Job>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM jobs ORDER BY created_at DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(map_row_to_job).transpose()
    }

    async fn update(&self, job: &Job) -> Result<Job> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET state = $3, owner = $4, version = version + 1, applied = $5,
                pause_until = $6, error_message = $7, updated_at = $8
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            SELECT_COLUMNS
        ))
        .bind(job.id.0)
        .bind(job.version as i64)
        .bind(job.state.to_string())
        .bind(job.owner.as_ref().map(|w| w.0))
        .bind(job.applied as i32)
        .bind(job.pause_until)
        .bind(job.error_message.as_deref())
        .bind(job.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        match row {
            Some(row) => map_row_to_job(row),
            None => {
                // Distinguish a lost race from a missing record
                if self.find_by_id(&job.id).await?.is_some() {
                    Err(DomainError::VersionConflict {
                        job_id: job.id.clone(),
                    })
                } else {
                    Err(DomainError::JobNotFound {
                        job_id: job.id.clone(),
                    })
                }
            }
        }
    }

    async fn claim(&self, job_id: &JobId, worker: &WorkerId) -> Result<Job> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET state = $3, owner = $2, version = version + 1, updated_at = now()
            WHERE id = $1 AND state = $4 AND owner IS NULL
            RETURNING {}
            "#,
            SELECT_COLUMNS
        ))
        .bind(job_id.0)
        .bind(worker.0)
        .bind(JobState::Running.to_string())
        .bind(JobState::Pending.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        match row {
            Some(row) => map_row_to_job(row),
            None => Err(DomainError::ClaimLost {
                job_id: job_id.clone(),
            }),
        }
    }

    async fn find_stale_owned(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM jobs
            WHERE state IN ($1, $2) AND updated_at < $3
            ORDER BY updated_at
            LIMIT $4
            "#,
            SELECT_COLUMNS
        ))
        .bind(JobState::Running.to_string())
        .bind(JobState::Paused.to_string())
        .bind(older_than)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter().map(map_row_to_job).collect()
    }

    async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM jobs
            WHERE state = $1 AND updated_at < $2
            ORDER BY updated_at
            LIMIT $3
            "#,
            SELECT_COLUMNS
        ))
        .bind(JobState::Pending.to_string())
        .bind(older_than)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter().map(map_row_to_job).collect()
    }
}
