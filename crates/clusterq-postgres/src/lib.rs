//! PostgreSQL implementation of the ClusterQueue store.
//!
//! # Claim protocol
//!
//! Claiming rides on Postgres's single-row atomicity: a conditional
//! `UPDATE ... WHERE job_status = 'PENDING'` lets at most one processor move
//! a job out of PENDING, and a follow-up read-back of the assignment guards
//! against phantom success if a driver retry ever re-fired the update.
//!
//! # Database schema
//!
//! ```sql
//! CREATE TABLE nodes (
//!     node_hostname TEXT PRIMARY KEY,
//!     node_status TEXT NOT NULL,
//!     node_tags TEXT[],
//!     node_num_parallel_jobs INTEGER,
//!     node_last_seen TIMESTAMP NOT NULL
//! );
//!
//! CREATE TABLE processors (
//!     processor_id INT NOT NULL,
//!     processor_parent_node TEXT NOT NULL REFERENCES nodes(node_hostname),
//!     processor_status TEXT NOT NULL,
//!     processor_last_seen TIMESTAMP NOT NULL,
//!     PRIMARY KEY (processor_id, processor_parent_node)
//! );
//!
//! CREATE TABLE jobs (
//!     job_id BIGINT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
//!     job_payload TEXT NOT NULL,
//!     job_tags TEXT[],
//!     job_env_variables JSONB,
//!     job_status TEXT NOT NULL,
//!     job_last_updated TIMESTAMP NOT NULL,
//!     job_submission_time TIMESTAMP NOT NULL,
//!     job_assigned_node TEXT NOT NULL REFERENCES nodes(node_hostname),
//!     job_assigned_node_processor INT,
//!     job_result_metadata JSONB,
//!     job_metadata JSONB
//! );
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use clusterq_postgres::PgQueueStore;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://localhost/clusterq").await?;
//! let store = PgQueueStore::new(pool);
//! let jobs = store.pending_jobs(&["gpu".to_string()], 10).await?;
//! ```

pub mod schema;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use clusterq_core::model::{Job, JobStatus, Node, Processor, ResultMetadata};
use clusterq_core::store::QueueStore;

pub use schema::init_db;

const JOB_COLUMNS: &str = "job_id, job_payload, job_tags, job_env_variables, job_status, \
     job_last_updated, job_submission_time, job_assigned_node, \
     job_assigned_node_processor, job_result_metadata, job_metadata";

/// PostgreSQL store backend.
#[derive(Clone)]
pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn register_node(&self, node: &Node) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO nodes (
                node_hostname, node_status, node_last_seen,
                node_tags, node_num_parallel_jobs
            ) VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (node_hostname) DO UPDATE
            SET node_status = EXCLUDED.node_status,
                node_last_seen = EXCLUDED.node_last_seen,
                node_tags = EXCLUDED.node_tags,
                node_num_parallel_jobs = EXCLUDED.node_num_parallel_jobs
            "#,
        )
        .bind(&node.hostname)
        .bind(node.status.as_str())
        .bind(node.last_seen)
        .bind(&node.tags)
        .bind(node.num_parallel_jobs)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn touch_node(&self, hostname: &str) -> Result<()> {
        sqlx::query("UPDATE nodes SET node_last_seen = $1 WHERE node_hostname = $2")
            .bind(Utc::now().naive_utc())
            .bind(hostname)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Heartbeat: upsert the processor row and refresh the parent node's
    /// `last_seen` in the same transaction.
    async fn upsert_processor(&self, processor: &Processor) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO processors (
                processor_id, processor_parent_node,
                processor_status, processor_last_seen
            ) VALUES ($1, $2, $3, $4)
            ON CONFLICT (processor_id, processor_parent_node) DO UPDATE
            SET processor_status = EXCLUDED.processor_status,
                processor_last_seen = EXCLUDED.processor_last_seen
            "#,
        )
        .bind(processor.processor_id)
        .bind(&processor.parent_node)
        .bind(processor.status.to_string())
        .bind(processor.last_seen)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE nodes SET node_last_seen = $1 WHERE node_hostname = $2")
            .bind(processor.last_seen)
            .bind(&processor.parent_node)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Eligibility is evaluated in SQL so ineligible rows never leave the
    /// store: untagged jobs match any node, tagged jobs need the node to
    /// cover every tag (`&&` overlap plus `<@` containment).
    async fn pending_jobs(&self, node_tags: &[String], limit: i64) -> Result<Vec<Job>> {
        let limit = limit.max(1);

        let rows = if node_tags.is_empty() {
            sqlx::query(&format!(
                r#"
                SELECT {JOB_COLUMNS}
                FROM jobs
                WHERE job_status = 'PENDING'
                  AND job_tags IS NULL
                ORDER BY job_submission_time, job_id
                LIMIT $1
                "#,
            ))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                r#"
                SELECT {JOB_COLUMNS}
                FROM jobs
                WHERE job_status = 'PENDING'
                  AND (
                      job_tags IS NULL
                      OR (job_tags && $1 AND job_tags <@ $1)
                  )
                ORDER BY job_submission_time, job_id
                LIMIT $2
                "#,
            ))
            .bind(node_tags)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(job_from_row).collect()
    }

    async fn claim_job(&self, job_id: i64, hostname: &str, processor_id: i32) -> Result<bool> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET job_assigned_node = $1,
                job_assigned_node_processor = $2,
                job_status = 'CLAIMED',
                job_last_updated = $3
            WHERE job_id = $4 AND job_status = 'PENDING'
            "#,
        )
        .bind(hostname)
        .bind(processor_id)
        .bind(Utc::now().naive_utc())
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        // Read-back check: the claim stands only if the row carries our
        // assignment.
        let row = sqlx::query(
            r#"
            SELECT job_assigned_node, job_assigned_node_processor
            FROM jobs
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(false);
        };
        let assigned_node: String = row.try_get("job_assigned_node")?;
        let assigned_processor: Option<i32> = row.try_get("job_assigned_node_processor")?;

        Ok(assigned_node == hostname && assigned_processor == Some(processor_id))
    }

    async fn mark_running(&self, job_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET job_status = 'RUNNING',
                job_last_updated = $1
            WHERE job_id = $2
            "#,
        )
        .bind(Utc::now().naive_utc())
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Guarded by `job_status = 'RUNNING'`: a job the node-stop batch
    /// already moved to INTERRUPTED keeps that status, and the suppressed
    /// write is reported to the caller.
    async fn complete_job(&self, job_id: i64, result: &ResultMetadata) -> Result<bool> {
        let result_metadata =
            serde_json::to_value(result).context("failed to serialize result metadata")?;

        let outcome = sqlx::query(
            r#"
            UPDATE jobs
            SET job_status = 'COMPLETED',
                job_last_updated = $1,
                job_result_metadata = $2
            WHERE job_id = $3 AND job_status = 'RUNNING'
            "#,
        )
        .bind(Utc::now().naive_utc())
        .bind(result_metadata)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() > 0)
    }

    async fn update_job_status(&self, job_id: i64, status: JobStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET job_status = $1,
                job_last_updated = $2
            WHERE job_id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now().naive_utc())
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn submit_job(&self, job: &Job) -> Result<i64> {
        let env_variables = job
            .env_variables
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .context("failed to serialize env variables")?;
        let result_metadata = job
            .result_metadata
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .context("failed to serialize result metadata")?;
        let metadata = job
            .metadata
            .as_ref()
            .map(|m| serde_json::Value::Object(m.clone()));
        // Empty tag sets go in as NULL; an empty TEXT[] would never match
        // the eligibility predicate.
        let tags = job.tags.as_ref().filter(|t| !t.is_empty()).cloned();

        let row = sqlx::query(
            r#"
            INSERT INTO jobs (
                job_payload, job_env_variables, job_status,
                job_tags, job_last_updated, job_submission_time,
                job_assigned_node, job_assigned_node_processor,
                job_result_metadata, job_metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING job_id
            "#,
        )
        .bind(&job.payload)
        .bind(env_variables)
        .bind(job.status.as_str())
        .bind(tags)
        .bind(job.last_updated)
        .bind(job.submission_time)
        .bind(job.assigned_node.as_deref().unwrap_or(clusterq_core::UNASSIGNED_NODE))
        .bind(job.assigned_node_processor)
        .bind(result_metadata)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("job_id")?)
    }

    async fn fetch_job(&self, job_id: i64) -> Result<Option<Job>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    /// One transaction: the node goes to STOPPED and every RUNNING job it
    /// holds goes to INTERRUPTED. Children of still-living processors are
    /// not killed; their eventual COMPLETED write is suppressed by the
    /// RUNNING guard in [`complete_job`](Self::complete_job).
    async fn stop_node(&self, hostname: &str) -> Result<u64> {
        let now = Utc::now().naive_utc();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE nodes
            SET node_status = 'STOPPED',
                node_last_seen = $1
            WHERE node_hostname = $2
            "#,
        )
        .bind(now)
        .bind(hostname)
        .execute(&mut *tx)
        .await?;

        let interrupted = sqlx::query(
            r#"
            UPDATE jobs
            SET job_status = 'INTERRUPTED',
                job_last_updated = $1
            WHERE job_assigned_node = $2
              AND job_status = 'RUNNING'
            "#,
        )
        .bind(now)
        .bind(hostname)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(interrupted.rows_affected())
    }
}

fn job_from_row(row: &PgRow) -> Result<Job> {
    let status: String = row.try_get("job_status")?;
    let env_variables: Option<serde_json::Value> = row.try_get("job_env_variables")?;
    let result_metadata: Option<serde_json::Value> = row.try_get("job_result_metadata")?;
    let metadata: Option<serde_json::Value> = row.try_get("job_metadata")?;

    let last_updated: NaiveDateTime = row.try_get("job_last_updated")?;
    let submission_time: NaiveDateTime = row.try_get("job_submission_time")?;

    Ok(Job {
        job_id: Some(row.try_get("job_id")?),
        payload: row.try_get("job_payload")?,
        env_variables: env_variables
            .map(serde_json::from_value)
            .transpose()
            .context("malformed job_env_variables")?,
        tags: row.try_get("job_tags")?,
        status: status.parse()?,
        last_updated,
        submission_time,
        assigned_node: Some(row.try_get("job_assigned_node")?),
        assigned_node_processor: row.try_get("job_assigned_node_processor")?,
        result_metadata: result_metadata
            .map(serde_json::from_value)
            .transpose()
            .context("malformed job_result_metadata")?,
        metadata: metadata
            .map(|value| match value {
                serde_json::Value::Object(map) => Ok(map),
                other => Err(anyhow::anyhow!("job_metadata is not an object: {other}")),
            })
            .transpose()?,
    })
}
