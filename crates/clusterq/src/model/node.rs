//! Node record: one host running one or more processors.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::error::ModelError;

/// Virtual node pre-populated at schema init. Unclaimed jobs reference it so
/// `job_assigned_node` can stay non-null.
pub const UNASSIGNED_NODE: &str = "UNASSIGNED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Started,
    Idle,
    Snoozing,
    Stopped,
    Unassigned,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Started => "started",
            NodeStatus::Idle => "idle",
            NodeStatus::Snoozing => "snoozing",
            NodeStatus::Stopped => "STOPPED",
            NodeStatus::Unassigned => "UNASSIGNED",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(NodeStatus::Started),
            "idle" => Ok(NodeStatus::Idle),
            "snoozing" => Ok(NodeStatus::Snoozing),
            "STOPPED" => Ok(NodeStatus::Stopped),
            "UNASSIGNED" => Ok(NodeStatus::Unassigned),
            other => Err(ModelError::UnknownNodeStatus(other.to_string())),
        }
    }
}

/// A compute host registered with the cluster, identified by hostname.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub hostname: String,
    pub status: NodeStatus,
    /// Capabilities this node provides.
    pub tags: Vec<String>,
    pub num_parallel_jobs: i32,
    pub last_seen: NaiveDateTime,
}

impl Node {
    pub fn new(
        hostname: impl Into<String>,
        status: NodeStatus,
        tags: Vec<String>,
        num_parallel_jobs: i32,
        last_seen: NaiveDateTime,
    ) -> Result<Self, ModelError> {
        let hostname = hostname.into();
        if hostname.trim().is_empty() {
            return Err(ModelError::EmptyHostname);
        }
        if num_parallel_jobs <= 0 {
            return Err(ModelError::InvalidParallelism(num_parallel_jobs));
        }

        Ok(Self {
            hostname,
            status,
            tags,
            num_parallel_jobs,
            last_seen,
        })
    }

    /// The pre-populated sentinel row for unclaimed jobs.
    pub fn virtual_unassigned(now: NaiveDateTime) -> Self {
        Self {
            hostname: UNASSIGNED_NODE.to_string(),
            status: NodeStatus::Unassigned,
            tags: vec!["virtual".to_string()],
            num_parallel_jobs: 1,
            last_seen: now,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.hostname, self.status)
    }
}
