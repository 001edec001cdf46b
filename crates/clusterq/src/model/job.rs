//! Job record and its status machine.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ModelError;
use crate::model::node::UNASSIGNED_NODE;

/// Lifecycle of a job.
///
/// A job moves through at most one `PENDING → CLAIMED → RUNNING →
/// (COMPLETED | FAILED)` chain, or is moved to `INTERRUPTED` when its node
/// is stopped while the job is RUNNING. Stored as TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Claimed,
    Running,
    Completed,
    Failed,
    Interrupted,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Claimed => "CLAIMED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Interrupted => "INTERRUPTED",
        }
    }

    /// Terminal states are never left by the core.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Interrupted
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "CLAIMED" => Ok(JobStatus::Claimed),
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            "INTERRUPTED" => Ok(JobStatus::Interrupted),
            other => Err(ModelError::UnknownJobStatus(other.to_string())),
        }
    }
}

/// Outcome of one payload execution, written with the COMPLETED status.
///
/// `returncode` is the child's exit code; a non-zero code still counts as
/// COMPLETED. FAILED is reserved for executor-level errors, which produce no
/// result metadata at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub returncode: i32,
    pub start_timestamp: NaiveDateTime,
    pub end_timestamp: NaiveDateTime,
    pub duration_s: f64,
}

/// A unit of work: an opaque shell command plus scheduling metadata.
#[derive(Debug, Clone)]
pub struct Job {
    /// Store-generated identity; `None` until submitted.
    pub job_id: Option<i64>,
    pub payload: String,
    /// Full replacement environment for the child, or `None` to inherit.
    pub env_variables: Option<HashMap<String, String>>,
    /// Required capabilities; `None` means the job runs anywhere.
    pub tags: Option<Vec<String>>,
    pub status: JobStatus,
    pub last_updated: NaiveDateTime,
    pub submission_time: NaiveDateTime,
    pub assigned_node: Option<String>,
    pub assigned_node_processor: Option<i32>,
    pub result_metadata: Option<ResultMetadata>,
    /// Free-form submitter metadata; `CWD` selects the working directory.
    pub metadata: Option<Map<String, Value>>,
}

impl Job {
    /// Build a PENDING job ready for submission.
    ///
    /// Rejects an empty payload. An empty tag list is normalized to `None`:
    /// both mean "runs anywhere", and only the `None` form matches the
    /// store's eligibility predicate.
    pub fn pending(
        payload: impl Into<String>,
        tags: Option<Vec<String>>,
        env_variables: Option<HashMap<String, String>>,
        metadata: Option<Map<String, Value>>,
        now: NaiveDateTime,
    ) -> Result<Self, ModelError> {
        let payload = payload.into();
        if payload.trim().is_empty() {
            return Err(ModelError::EmptyPayload);
        }

        let tags = tags.filter(|t| !t.is_empty());

        Ok(Self {
            job_id: None,
            payload,
            env_variables,
            tags,
            status: JobStatus::Pending,
            last_updated: now,
            submission_time: now,
            assigned_node: Some(UNASSIGNED_NODE.to_string()),
            assigned_node_processor: None,
            result_metadata: None,
            metadata,
        })
    }

    /// Working directory requested by the submitter, if any.
    pub fn cwd(&self) -> Option<PathBuf> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("CWD"))
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.payload, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            JobStatus::Pending,
            JobStatus::Claimed,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Interrupted,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(matches!(
            "DONE".parse::<JobStatus>(),
            Err(ModelError::UnknownJobStatus(_))
        ));
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Claimed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Interrupted.is_terminal());
    }

    #[test]
    fn pending_rejects_empty_payload() {
        assert!(matches!(
            Job::pending("  ", None, None, None, now()),
            Err(ModelError::EmptyPayload)
        ));
    }

    #[test]
    fn pending_normalizes_empty_tags() {
        let job = Job::pending("true", Some(vec![]), None, None, now()).unwrap();
        assert_eq!(job.tags, None);

        let job = Job::pending("true", Some(vec!["gpu".into()]), None, None, now()).unwrap();
        assert_eq!(job.tags, Some(vec!["gpu".to_string()]));
    }

    #[test]
    fn pending_defaults_to_unassigned() {
        let job = Job::pending("echo hi", None, None, None, now()).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.assigned_node.as_deref(), Some(UNASSIGNED_NODE));
        assert_eq!(job.assigned_node_processor, None);
        assert_eq!(job.submission_time, job.last_updated);
    }

    #[test]
    fn cwd_comes_from_metadata() {
        let mut meta = Map::new();
        meta.insert("CWD".to_string(), Value::String("/tmp/work".to_string()));
        let job = Job::pending("true", None, None, Some(meta), now()).unwrap();
        assert_eq!(job.cwd(), Some(PathBuf::from("/tmp/work")));

        let job = Job::pending("true", None, None, None, now()).unwrap();
        assert_eq!(job.cwd(), None);
    }

    #[test]
    fn result_metadata_serializes_with_expected_keys() {
        let ts = now();
        let result = ResultMetadata {
            returncode: 2,
            start_timestamp: ts,
            end_timestamp: ts,
            duration_s: 0.0,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["returncode"], 2);
        assert!(value.get("start_timestamp").is_some());
        assert!(value.get("end_timestamp").is_some());
        assert!(value.get("duration_s").is_some());

        let back: ResultMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }
}
