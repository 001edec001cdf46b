//! Error types shared across the crate.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Rejected record construction or status parsing.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("hostname must not be empty")]
    EmptyHostname,

    #[error("num_parallel_jobs must be positive, got {0}")]
    InvalidParallelism(i32),

    #[error("processor index must be non-negative, got {0}")]
    InvalidProcessorIndex(i32),

    #[error("job payload must not be empty")]
    EmptyPayload,

    #[error("unknown job status '{0}'")]
    UnknownJobStatus(String),

    #[error("unknown node status '{0}'")]
    UnknownNodeStatus(String),

    #[error("unknown processor status '{0}'")]
    UnknownProcessorStatus(String),
}

/// Configuration discovery and parsing failures. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no repository root found above {0} (expected an ancestor containing .git)")]
    RepoRootNotFound(PathBuf),

    #[error("config file not found at {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Failures in the job executor itself, as opposed to a payload that ran and
/// exited non-zero. The processor loop turns these into a FAILED job status.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("job has no id; only submitted jobs can be executed")]
    MissingJobId,

    #[error("failed to open job log {path}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn payload")]
    Spawn(#[source] io::Error),

    #[error("failed waiting for payload")]
    Wait(#[source] io::Error),
}
