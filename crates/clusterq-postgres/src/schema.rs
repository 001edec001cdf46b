//! Table layout and destructive (re)initialization.
//!
//! Three tables form a tree: jobs and processors both reference nodes. The
//! virtual `UNASSIGNED` node is pre-populated so `job_assigned_node` can be
//! non-null from the moment of submission.

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use tracing::warn;

use clusterq_core::model::{Node, NodeStatus};

const CREATE_NODES: &str = r#"
CREATE TABLE nodes (
    node_hostname TEXT PRIMARY KEY,
    node_status TEXT NOT NULL,
    node_tags TEXT[],
    node_num_parallel_jobs INTEGER,
    node_last_seen TIMESTAMP NOT NULL
)
"#;

const CREATE_PROCESSORS: &str = r#"
CREATE TABLE processors (
    processor_id INT NOT NULL,
    processor_parent_node TEXT NOT NULL REFERENCES nodes(node_hostname),
    processor_status TEXT NOT NULL,
    processor_last_seen TIMESTAMP NOT NULL,
    PRIMARY KEY (processor_id, processor_parent_node)
)
"#;

const CREATE_JOBS: &str = r#"
CREATE TABLE jobs (
    job_id BIGINT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
    job_payload TEXT NOT NULL,
    job_tags TEXT[],
    job_env_variables JSONB,
    job_status TEXT NOT NULL,
    job_last_updated TIMESTAMP NOT NULL,
    job_submission_time TIMESTAMP NOT NULL,
    job_assigned_node TEXT NOT NULL REFERENCES nodes(node_hostname),
    job_assigned_node_processor INT,
    job_result_metadata JSONB,
    job_metadata JSONB
)
"#;

/// Drop and recreate all three tables, then pre-populate the `UNASSIGNED`
/// virtual node. Destroys every job, node and processor row; callers gate
/// this behind explicit confirmation.
pub async fn init_db(pool: &PgPool) -> Result<()> {
    warn!("dropping and recreating all tables");

    let mut tx = pool.begin().await?;

    // Children first, parents last.
    sqlx::query("DROP TABLE IF EXISTS jobs").execute(&mut *tx).await?;
    sqlx::query("DROP TABLE IF EXISTS processors")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DROP TABLE IF EXISTS nodes").execute(&mut *tx).await?;

    sqlx::query(CREATE_NODES).execute(&mut *tx).await?;
    sqlx::query(CREATE_PROCESSORS).execute(&mut *tx).await?;
    sqlx::query(CREATE_JOBS).execute(&mut *tx).await?;

    let virtual_node = Node::virtual_unassigned(Utc::now().naive_utc());
    sqlx::query(
        r#"
        INSERT INTO nodes (node_hostname, node_status, node_last_seen, node_tags, node_num_parallel_jobs)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&virtual_node.hostname)
    .bind(NodeStatus::Unassigned.as_str())
    .bind(virtual_node.last_seen)
    .bind(&virtual_node.tags)
    .bind(virtual_node.num_parallel_jobs)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
