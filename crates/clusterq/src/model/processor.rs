//! Processor record: one worker slot within a node.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::error::ModelError;

/// What a processor is doing right now. `Handling` carries the job id so the
/// row reads `handling <job_id>` in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorStatus {
    Polling,
    Snoozing,
    Idle,
    Handling(i64),
}

impl fmt::Display for ProcessorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorStatus::Polling => f.write_str("polling"),
            ProcessorStatus::Snoozing => f.write_str("snoozing"),
            ProcessorStatus::Idle => f.write_str("idle"),
            ProcessorStatus::Handling(job_id) => write!(f, "handling {job_id}"),
        }
    }
}

impl FromStr for ProcessorStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "polling" => Ok(ProcessorStatus::Polling),
            "snoozing" => Ok(ProcessorStatus::Snoozing),
            "idle" => Ok(ProcessorStatus::Idle),
            other => match other.strip_prefix("handling ") {
                Some(id) => id
                    .parse::<i64>()
                    .map(ProcessorStatus::Handling)
                    .map_err(|_| ModelError::UnknownProcessorStatus(other.to_string())),
                None => Err(ModelError::UnknownProcessorStatus(other.to_string())),
            },
        }
    }
}

/// One worker slot, keyed by `(processor_id, parent_node)`. The id is the
/// 0-based index within the node.
#[derive(Debug, Clone, PartialEq)]
pub struct Processor {
    pub processor_id: i32,
    pub parent_node: String,
    pub status: ProcessorStatus,
    pub last_seen: NaiveDateTime,
}

impl Processor {
    pub fn new(
        parent_node: impl Into<String>,
        processor_id: i32,
        status: ProcessorStatus,
        last_seen: NaiveDateTime,
    ) -> Result<Self, ModelError> {
        let parent_node = parent_node.into();
        if parent_node.trim().is_empty() {
            return Err(ModelError::EmptyHostname);
        }
        if processor_id < 0 {
            return Err(ModelError::InvalidProcessorIndex(processor_id));
        }

        Ok(Self {
            processor_id,
            parent_node,
            status,
            last_seen,
        })
    }
}

impl fmt::Display for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.processor_id, self.status)
    }
}
