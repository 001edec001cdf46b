//! Node lifecycle: register, run processors, stop.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::OrchestrationConfig;
use crate::model::{Node, NodeStatus};
use crate::snooze::SnoozeMode;
use crate::store::QueueStore;
use crate::worker::{run_processor, WorkerContext};

/// A compute node: one host running `num_parallel_jobs` processors against
/// a shared store.
pub struct ComputeNode<S> {
    store: Arc<S>,
    hostname: String,
    tags: Vec<String>,
    num_parallel_jobs: i32,
    snooze_seconds: u64,
    job_logs_root: PathBuf,
}

impl<S: QueueStore + 'static> ComputeNode<S> {
    pub fn new(
        store: Arc<S>,
        hostname: impl Into<String>,
        tags: Vec<String>,
        num_parallel_jobs: i32,
        orchestration: &OrchestrationConfig,
    ) -> Result<Self> {
        let hostname = hostname.into();
        // Validate through the record constructor before anything persists.
        Node::new(
            hostname.clone(),
            NodeStatus::Started,
            tags.clone(),
            num_parallel_jobs,
            Utc::now().naive_utc(),
        )?;

        Ok(Self {
            store,
            hostname,
            tags,
            num_parallel_jobs,
            snooze_seconds: orchestration.snooze_time_seconds,
            job_logs_root: orchestration.job_logs_root.clone(),
        })
    }

    /// Register this node (status `started`) and run processors until the
    /// queue drains in batch mode or an interrupt arrives. Either way the
    /// node finishes with the stop batch: node → STOPPED, its RUNNING jobs
    /// → INTERRUPTED.
    pub async fn run(self) -> Result<()> {
        let node = Node::new(
            self.hostname.clone(),
            NodeStatus::Started,
            self.tags.clone(),
            self.num_parallel_jobs,
            Utc::now().naive_utc(),
        )?;
        self.store
            .register_node(&node)
            .await
            .context("failed to register node")?;
        info!(
            hostname = %self.hostname,
            processors = self.num_parallel_jobs,
            tags = ?self.tags,
            "node registered; starting processors"
        );

        // A lone processor owns the terminal, so it handles Ctrl-C itself
        // during snoozes; with several, the node-level handler is the only
        // interrupt path.
        let snooze_mode = if self.num_parallel_jobs == 1 {
            SnoozeMode::Interactive
        } else {
            SnoozeMode::Cooperative
        };

        let shutdown = CancellationToken::new();
        let mut handles = Vec::with_capacity(self.num_parallel_jobs as usize);
        for processor_idx in 0..self.num_parallel_jobs {
            let ctx = WorkerContext {
                hostname: self.hostname.clone(),
                processor_idx,
                tags: self.tags.clone(),
                snooze_seconds: self.snooze_seconds,
                snooze_mode,
                job_logs_root: self.job_logs_root.clone(),
            };
            let store = Arc::clone(&self.store);
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move {
                run_processor(store.as_ref(), ctx, token).await;
            }));
        }

        tokio::select! {
            _ = join_all(handles) => {
                info!("all processors finished");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received; stopping node");
                shutdown.cancel();
            }
        }

        let interrupted = self
            .store
            .stop_node(&self.hostname)
            .await
            .context("failed to stop node")?;
        if interrupted > 0 {
            info!(interrupted, "running jobs marked INTERRUPTED");
        }
        info!(hostname = %self.hostname, "node stopped");
        Ok(())
    }
}

/// Hostname of this machine: the `hostname` command, falling back to the
/// `HOSTNAME` environment variable.
pub fn local_hostname() -> Result<String> {
    if let Ok(output) = Command::new("hostname").output() {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return Ok(name);
            }
        }
    }

    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.trim().is_empty())
        .context("could not determine hostname from `hostname` or $HOSTNAME")
}
