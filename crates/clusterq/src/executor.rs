//! Runs a claimed job's payload as a child process.
//!
//! The payload is a shell command submitted by an operator, so it goes to
//! `sh -c` verbatim; escaping it would change its meaning. stdout and stderr
//! land in per-job log files under the configured logs root, with the stdout
//! file bracketed by human-readable banners.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::Utc;
use tokio::process::Command;
use tracing::debug;

use crate::error::ExecutorError;
use crate::model::{Job, ResultMetadata};

/// Per-job stdout/stderr file locations.
#[derive(Debug, Clone)]
pub struct JobLogs {
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl JobLogs {
    pub fn for_job(logs_root: &Path, job_id: i64) -> Self {
        Self {
            stdout: logs_root.join(format!("job_{job_id}_stdout.log")),
            stderr: logs_root.join(format!("job_{job_id}_stderr.log")),
        }
    }
}

/// Execute `job`'s payload and report how it went.
///
/// Never errors on a non-zero exit: the code is surfaced through
/// [`ResultMetadata::returncode`] and the job still counts as COMPLETED.
/// Errors only when the executor itself cannot do its work (log files,
/// spawn, wait); the processor loop turns those into a FAILED status.
pub async fn execute_job(job: &Job, logs_root: &Path) -> Result<ResultMetadata, ExecutorError> {
    let job_id = job.job_id.ok_or(ExecutorError::MissingJobId)?;

    std::fs::create_dir_all(logs_root).map_err(|source| ExecutorError::LogFile {
        path: logs_root.to_path_buf(),
        source,
    })?;

    let logs = JobLogs::for_job(logs_root, job_id);
    let mut stdout_log = open_log(&logs.stdout)?;
    let stderr_log = open_log(&logs.stderr)?;

    let start_timestamp = Utc::now().naive_utc();
    write_opening_banner(&mut stdout_log, job, job_id, start_timestamp)
        .map_err(|source| log_error(&logs.stdout, source))?;

    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(&job.payload)
        .stdin(Stdio::null())
        .stdout(Stdio::from(
            stdout_log
                .try_clone()
                .map_err(|source| log_error(&logs.stdout, source))?,
        ))
        .stderr(Stdio::from(
            stderr_log
                .try_clone()
                .map_err(|source| log_error(&logs.stderr, source))?,
        ));

    // Absent env means inherit; present env replaces wholesale, no merge.
    if let Some(env) = &job.env_variables {
        command.env_clear().envs(env);
    }
    if let Some(cwd) = job.cwd() {
        command.current_dir(cwd);
    }

    debug!(job_id, payload = %job.payload, stdout = %logs.stdout.display(), "spawning payload");

    let mut child = command.spawn().map_err(ExecutorError::Spawn)?;
    let status = child.wait().await.map_err(ExecutorError::Wait)?;

    let end_timestamp = Utc::now().naive_utc();
    let duration = end_timestamp - start_timestamp;
    let result = ResultMetadata {
        returncode: exit_code(status),
        start_timestamp,
        end_timestamp,
        duration_s: duration.num_milliseconds() as f64 / 1000.0,
    };

    write_closing_banner(&mut stdout_log, &result, end_timestamp)
        .map_err(|source| log_error(&logs.stdout, source))?;

    Ok(result)
}

fn open_log(path: &Path) -> Result<File, ExecutorError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|source| log_error(path, source))
}

fn log_error(path: &Path, source: std::io::Error) -> ExecutorError {
    ExecutorError::LogFile {
        path: path.to_path_buf(),
        source,
    }
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    // Mirror the convention of a negative code for signal deaths.
    status
        .code()
        .unwrap_or_else(|| -status.signal().unwrap_or(1))
}

fn write_opening_banner(
    log: &mut File,
    job: &Job,
    job_id: i64,
    start: chrono::NaiveDateTime,
) -> std::io::Result<()> {
    let tags = match &job.tags {
        Some(tags) => tags.join(", "),
        None => "none".to_string(),
    };
    let metadata = match &job.metadata {
        Some(map) => serde_json::Value::Object(map.clone()).to_string(),
        None => "none".to_string(),
    };

    writeln!(log, "{}", "-".repeat(80))?;
    writeln!(log, "Job ID: {job_id}")?;
    writeln!(log, "Job Payload: {}", job.payload)?;
    writeln!(log, "Job Tags: {tags}")?;
    writeln!(log, "Job Submission Time: {}", job.submission_time)?;
    writeln!(log, "Job Started at: {start}")?;
    writeln!(log, "Job Metadata: {metadata}")?;
    writeln!(log, "{}", "+".repeat(80))?;
    log.flush()
}

fn write_closing_banner(
    log: &mut File,
    result: &ResultMetadata,
    end: chrono::NaiveDateTime,
) -> std::io::Result<()> {
    let metadata = serde_json::to_string(result).unwrap_or_else(|_| "unserializable".to_string());

    writeln!(log, "{}", "+".repeat(80))?;
    writeln!(log, "Job Result Metadata: {metadata}")?;
    writeln!(log, "Job Completed at: {end}")?;
    writeln!(log, "{}", "-".repeat(80))?;
    log.flush()
}
