//! # ClusterQueue
//!
//! A distributed job queue and compute-node runtime for a small cluster of
//! shared Unix hosts. Users submit shell-command jobs tagged with required
//! capabilities; compute nodes poll a shared Postgres store, atomically
//! claim eligible jobs, run them as child processes with captured output,
//! and persist status and timing.
//!
//! ## Architecture
//!
//! ```text
//! submit-job ──INSERT PENDING──►┌───────────────┐
//!                               │  durable store │◄──poll/claim──┐
//! compute-node ──register──────►└───────────────┘               │
//!     │                                                          │
//!     ├─► processor 0 ── poll → claim → run → report ────────────┤
//!     ├─► processor 1 ── poll → claim → run → report ────────────┤
//!     └─► processor N ── poll → claim → run → report ────────────┘
//! ```
//!
//! Processors never talk to each other: the store's conditional update is
//! the only arbiter. A claim is the atomic `PENDING → CLAIMED` transition
//! for one `(job, node, processor)` triple; losing the race is routine and
//! just means polling again.
//!
//! ## Key invariants
//!
//! 1. **At-most-one claim** - a job leaves PENDING exactly once, for exactly
//!    one processor.
//! 2. **Non-zero exit is still COMPLETED** - the child's exit code is data
//!    (`result_metadata.returncode`); FAILED means the executor itself broke.
//! 3. **Terminal states stand** - the COMPLETED write is guarded by
//!    `status = 'RUNNING'`, so a node stop that already marked the job
//!    INTERRUPTED wins over a late-finishing child.
//! 4. **Failures stay local** - a processor logs store errors and re-enters
//!    its loop; it never takes down its siblings.

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod model;
pub mod runtime;
pub mod snooze;
pub mod store;
pub mod tags;
pub mod worker;

// Re-export the domain records
pub use model::{
    Job, JobStatus, Node, NodeStatus, Processor, ProcessorStatus, ResultMetadata, UNASSIGNED_NODE,
};

// Re-export configuration types
pub use config::{Config, DatabaseConfig, OrchestrationConfig};

// Re-export error types
pub use error::{ConfigError, ExecutorError, ModelError};

// Re-export the store contract
pub use store::{QueueStore, DEFAULT_PENDING_LIMIT};

// Re-export the executor entry point
pub use executor::{execute_job, JobLogs};

// Re-export the worker loop and node runtime
pub use runtime::{local_hostname, ComputeNode};
pub use snooze::{snooze, snooze_interactive, SnoozeMode, SnoozeOutcome};
pub use worker::{run_processor, WorkerContext};

// Re-export commonly used external types
pub use async_trait::async_trait;
