//! The store contract every backend implements.
//!
//! The durable store is the only shared mutable resource in the system:
//! workers hold no authoritative state between loop iterations, and all
//! cross-worker arbitration rides on the store's single-row conditional
//! update. `clusterq-postgres` is the production backend; `clusterq-testing`
//! ships an in-memory twin with identical observable semantics.

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{Job, JobStatus, Node, Processor, ResultMetadata};

/// Default batch size for [`QueueStore::pending_jobs`]. Implementations
/// clamp the requested limit to at least 1.
pub const DEFAULT_PENDING_LIMIT: i64 = 10;

/// Typed operations over the durable state store.
///
/// All methods are safe to call from any number of concurrent workers.
/// Claim arbitration: [`claim_job`](Self::claim_job) performs a conditional
/// update guarded by `status = 'PENDING'` and then reads the assignment
/// back, so at most one caller ever wins a given job.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Upsert a node row. Used at node startup (status `started`) and keyed
    /// by hostname, so re-registration after a restart updates in place.
    async fn register_node(&self, node: &Node) -> Result<()>;

    /// Refresh a node's `last_seen` without touching anything else.
    async fn touch_node(&self, hostname: &str) -> Result<()>;

    /// Upsert a processor row and refresh the parent node's `last_seen`.
    /// Fails if the parent node was never registered.
    async fn upsert_processor(&self, processor: &Processor) -> Result<()>;

    /// Up to `limit` PENDING jobs eligible for a node with `node_tags`,
    /// ordered by `(submission_time, job_id)` ascending. Eligibility is
    /// evaluated store-side so ineligible rows are never transported.
    async fn pending_jobs(&self, node_tags: &[String], limit: i64) -> Result<Vec<Job>>;

    /// Attempt the atomic PENDING → CLAIMED transition for
    /// `(job_id, hostname, processor_id)`. Returns `false` on a lost race;
    /// the caller must not execute the job and should poll again.
    async fn claim_job(&self, job_id: i64, hostname: &str, processor_id: i32) -> Result<bool>;

    /// CLAIMED → RUNNING, written immediately before the child is spawned.
    async fn mark_running(&self, job_id: i64) -> Result<()>;

    /// RUNNING → COMPLETED with result metadata, in one write guarded by
    /// `status = 'RUNNING'`. Returns `false` when the write was suppressed
    /// because the job had already left RUNNING (e.g. INTERRUPTED by a node
    /// stop); the terminal status then stands.
    async fn complete_job(&self, job_id: i64, result: &ResultMetadata) -> Result<bool>;

    /// Unconditional status write. Used by the processor loop's failure
    /// branch (FAILED) and by admin tooling.
    async fn update_job_status(&self, job_id: i64, status: JobStatus) -> Result<()>;

    /// Insert a PENDING job and return its generated id.
    async fn submit_job(&self, job: &Job) -> Result<i64>;

    /// Single-row read, mainly for admin tooling and tests.
    async fn fetch_job(&self, job_id: i64) -> Result<Option<Job>>;

    /// Orderly node stop, in one transaction: the node row goes to STOPPED
    /// and every RUNNING job assigned to it goes to INTERRUPTED. Returns the
    /// number of interrupted jobs.
    async fn stop_node(&self, hostname: &str) -> Result<u64>;
}
