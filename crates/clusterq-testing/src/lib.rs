//! Testing utilities for ClusterQueue.
//!
//! [`MemoryStore`] implements [`QueueStore`] entirely in memory with the
//! same observable semantics as the Postgres backend: identical eligibility
//! predicate, identical conditional-update claim with read-back, identical
//! RUNNING guard on completion. Tests run the real worker loop and executor
//! against it without a database.
//!
//! The store additionally records every job status transition, so tests can
//! assert the exact path a job took through the state machine.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};

use clusterq_core::model::{
    Job, JobStatus, Node, NodeStatus, Processor, ResultMetadata, UNASSIGNED_NODE,
};
use clusterq_core::store::QueueStore;
use clusterq_core::tags::job_eligible;

#[derive(Default)]
struct Inner {
    next_job_id: i64,
    jobs: BTreeMap<i64, Job>,
    nodes: HashMap<String, Node>,
    processors: HashMap<(i32, String), Processor>,
    /// Status history per job, starting with PENDING at submission.
    transitions: Vec<(i64, JobStatus)>,
}

/// In-memory [`QueueStore`], pre-populated with the `UNASSIGNED` virtual
/// node exactly like a freshly initialized database.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut inner = Inner::default();
        let virtual_node = Node::virtual_unassigned(now());
        inner.nodes.insert(virtual_node.hostname.clone(), virtual_node);
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Snapshot of a node row.
    pub fn node(&self, hostname: &str) -> Option<Node> {
        self.inner.lock().unwrap().nodes.get(hostname).cloned()
    }

    /// Snapshot of a processor row.
    pub fn processor(&self, parent_node: &str, processor_id: i32) -> Option<Processor> {
        self.inner
            .lock()
            .unwrap()
            .processors
            .get(&(processor_id, parent_node.to_string()))
            .cloned()
    }

    /// The status sequence a job has moved through, submission first.
    pub fn transitions(&self, job_id: i64) -> Vec<JobStatus> {
        self.inner
            .lock()
            .unwrap()
            .transitions
            .iter()
            .filter(|(id, _)| *id == job_id)
            .map(|(_, status)| *status)
            .collect()
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

impl Inner {
    fn record(&mut self, job_id: i64, status: JobStatus) {
        self.transitions.push((job_id, status));
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn register_node(&self, node: &Node) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.nodes.insert(node.hostname.clone(), node.clone());
        Ok(())
    }

    async fn touch_node(&self, hostname: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(node) = inner.nodes.get_mut(hostname) {
            node.last_seen = now();
        }
        Ok(())
    }

    async fn upsert_processor(&self, processor: &Processor) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        // Same referential integrity the FK enforces in Postgres.
        if !inner.nodes.contains_key(&processor.parent_node) {
            bail!("parent node {} is not registered", processor.parent_node);
        }

        inner.processors.insert(
            (processor.processor_id, processor.parent_node.clone()),
            processor.clone(),
        );
        if let Some(node) = inner.nodes.get_mut(&processor.parent_node) {
            node.last_seen = processor.last_seen;
        }
        Ok(())
    }

    async fn pending_jobs(&self, node_tags: &[String], limit: i64) -> Result<Vec<Job>> {
        let limit = limit.max(1) as usize;
        let inner = self.inner.lock().unwrap();

        let mut eligible: Vec<&Job> = inner
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending)
            .filter(|job| job_eligible(node_tags, job.tags.as_deref()))
            .collect();
        eligible.sort_by_key(|job| (job.submission_time, job.job_id));

        Ok(eligible.into_iter().take(limit).cloned().collect())
    }

    async fn claim_job(&self, job_id: i64, hostname: &str, processor_id: i32) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();

        // Conditional update: only a PENDING row transitions.
        if let Some(job) = inner.jobs.get_mut(&job_id) {
            if job.status == JobStatus::Pending {
                job.assigned_node = Some(hostname.to_string());
                job.assigned_node_processor = Some(processor_id);
                job.status = JobStatus::Claimed;
                job.last_updated = now();
                inner.record(job_id, JobStatus::Claimed);
            }
        }

        // Read-back: the claim stands only if the row carries our assignment.
        let Some(job) = inner.jobs.get(&job_id) else {
            return Ok(false);
        };
        Ok(job.assigned_node.as_deref() == Some(hostname)
            && job.assigned_node_processor == Some(processor_id))
    }

    async fn mark_running(&self, job_id: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(&job_id) {
            job.status = JobStatus::Running;
            job.last_updated = now();
            inner.record(job_id, JobStatus::Running);
        }
        Ok(())
    }

    async fn complete_job(&self, job_id: i64, result: &ResultMetadata) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(job) = inner.jobs.get_mut(&job_id) else {
            return Ok(false);
        };
        if job.status != JobStatus::Running {
            return Ok(false);
        }

        job.status = JobStatus::Completed;
        job.result_metadata = Some(result.clone());
        job.last_updated = now();
        inner.record(job_id, JobStatus::Completed);
        Ok(true)
    }

    async fn update_job_status(&self, job_id: i64, status: JobStatus) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(&job_id) {
            job.status = status;
            job.last_updated = now();
            inner.record(job_id, status);
        }
        Ok(())
    }

    async fn submit_job(&self, job: &Job) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_job_id += 1;
        let job_id = inner.next_job_id;

        let mut stored = job.clone();
        stored.job_id = Some(job_id);
        stored.tags = stored.tags.take().filter(|t| !t.is_empty());
        if stored.assigned_node.is_none() {
            stored.assigned_node = Some(UNASSIGNED_NODE.to_string());
        }

        let status = stored.status;
        inner.jobs.insert(job_id, stored);
        inner.record(job_id, status);
        Ok(job_id)
    }

    async fn fetch_job(&self, job_id: i64) -> Result<Option<Job>> {
        Ok(self.inner.lock().unwrap().jobs.get(&job_id).cloned())
    }

    async fn stop_node(&self, hostname: &str) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let stopped_at = now();

        if let Some(node) = inner.nodes.get_mut(hostname) {
            node.status = NodeStatus::Stopped;
            node.last_seen = stopped_at;
        }

        let running: Vec<i64> = inner
            .jobs
            .values()
            .filter(|job| {
                job.status == JobStatus::Running && job.assigned_node.as_deref() == Some(hostname)
            })
            .filter_map(|job| job.job_id)
            .collect();

        for job_id in &running {
            if let Some(job) = inner.jobs.get_mut(job_id) {
                job.status = JobStatus::Interrupted;
                job.last_updated = stopped_at;
            }
            inner.record(*job_id, JobStatus::Interrupted);
        }

        Ok(running.len() as u64)
    }
}
