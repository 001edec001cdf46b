//! The per-processor loop: poll, claim, run, report.
//!
//! Each processor is identified by `(hostname, processor_idx)` and works one
//! job at a time. Processors coordinate only through the store; a lost claim
//! race is routine and simply means another processor got there first.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::executor::execute_job;
use crate::model::{Job, JobStatus, Processor, ProcessorStatus};
use crate::snooze::{snooze, snooze_interactive, SnoozeMode, SnoozeOutcome};
use crate::store::QueueStore;

/// Everything a processor needs to run, fixed at node startup.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub hostname: String,
    pub processor_idx: i32,
    pub tags: Vec<String>,
    pub snooze_seconds: u64,
    pub snooze_mode: SnoozeMode,
    pub job_logs_root: PathBuf,
}

enum LoopOutcome {
    Continue,
    Exit,
}

/// Run one processor until batch-mode drain or shutdown.
///
/// Store failures are local to this processor: they are logged and the loop
/// re-enters after a short backoff, leaving sibling processors untouched.
pub async fn run_processor<S: QueueStore + ?Sized>(
    store: &S,
    ctx: WorkerContext,
    shutdown: CancellationToken,
) {
    info!(
        hostname = %ctx.hostname,
        processor = ctx.processor_idx,
        tags = ?ctx.tags,
        "starting processor"
    );

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        match process_one(store, &ctx, &shutdown).await {
            Ok(LoopOutcome::Continue) => {}
            Ok(LoopOutcome::Exit) => break,
            Err(e) => {
                error!(processor = ctx.processor_idx, error = %e, "store operation failed");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            }
        }
    }

    info!(
        hostname = %ctx.hostname,
        processor = ctx.processor_idx,
        "processor stopped"
    );
}

async fn process_one<S: QueueStore + ?Sized>(
    store: &S,
    ctx: &WorkerContext,
    shutdown: &CancellationToken,
) -> Result<LoopOutcome> {
    heartbeat(store, ctx, ProcessorStatus::Polling).await?;

    let mut candidates = store.pending_jobs(&ctx.tags, 1).await?;
    let Some(job) = candidates.pop() else {
        heartbeat(store, ctx, ProcessorStatus::Snoozing).await?;
        let outcome = match ctx.snooze_mode {
            SnoozeMode::Cooperative => snooze(ctx.snooze_seconds, shutdown).await,
            SnoozeMode::Interactive => snooze_interactive(ctx.snooze_seconds).await,
        };
        heartbeat(store, ctx, ProcessorStatus::Idle).await?;

        return Ok(match outcome {
            SnoozeOutcome::Completed => LoopOutcome::Continue,
            SnoozeOutcome::ExitRequested | SnoozeOutcome::Interrupted => LoopOutcome::Exit,
        });
    };

    let job_id = job
        .job_id
        .context("store returned a pending job without an id")?;

    info!(job_id, payload = %job.payload, "attempting to claim job");
    if !store
        .claim_job(job_id, &ctx.hostname, ctx.processor_idx)
        .await?
    {
        info!(job_id, "lost claim race; polling again");
        return Ok(LoopOutcome::Continue);
    }
    info!(job_id, "claimed job");

    heartbeat(store, ctx, ProcessorStatus::Handling(job_id)).await?;
    store.mark_running(job_id).await?;

    handle_job(store, ctx, &job, job_id).await?;

    heartbeat(store, ctx, ProcessorStatus::Idle).await?;
    Ok(LoopOutcome::Continue)
}

async fn handle_job<S: QueueStore + ?Sized>(
    store: &S,
    ctx: &WorkerContext,
    job: &Job,
    job_id: i64,
) -> Result<()> {
    match execute_job(job, &ctx.job_logs_root).await {
        Ok(result) => {
            let landed = store.complete_job(job_id, &result).await?;
            if landed {
                info!(job_id, returncode = result.returncode, "job completed");
            } else {
                // Typically the node was stopped mid-run and the job is
                // already INTERRUPTED; that terminal status stands.
                warn!(job_id, "completion write suppressed; job is no longer RUNNING");
            }
        }
        Err(e) => {
            error!(job_id, error = %e, "executor failed; marking job FAILED");
            store.update_job_status(job_id, JobStatus::Failed).await?;
        }
    }
    Ok(())
}

async fn heartbeat<S: QueueStore + ?Sized>(
    store: &S,
    ctx: &WorkerContext,
    status: ProcessorStatus,
) -> Result<()> {
    let processor = Processor::new(
        ctx.hostname.clone(),
        ctx.processor_idx,
        status,
        Utc::now().naive_utc(),
    )?;
    store.upsert_processor(&processor).await
}
