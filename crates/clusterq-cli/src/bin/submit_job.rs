//! Submit a job: insert a PENDING row and print its id.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::Parser;
use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::info;

use clusterq_core::model::Job;
use clusterq_core::store::QueueStore;
use clusterq_core::Config;
use clusterq_postgres::PgQueueStore;

#[derive(Parser)]
#[command(name = "submit-job")]
#[command(about = "Submit a shell-command job to the cluster")]
struct Args {
    /// The shell command to run, passed to `sh -c` verbatim.
    payload: String,

    /// Capabilities the job requires, comma separated.
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Environment for the child as KEY=VALUE, repeatable. When given, the
    /// child sees exactly these variables and nothing else.
    #[arg(long = "env", value_parser = parse_key_value)]
    env: Vec<(String, String)>,

    /// Working directory for the child (stored as metadata CWD).
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Extra metadata as KEY=VALUE, repeatable.
    #[arg(long = "meta", value_parser = parse_key_value)]
    metadata: Vec<(String, String)>,
}

fn parse_key_value(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(anyhow!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    clusterq_core::logging::init(&config, "submit_job")?;

    let tags = (!args.tags.is_empty()).then(|| args.tags.clone());
    let env = (!args.env.is_empty()).then(|| args.env.iter().cloned().collect::<HashMap<_, _>>());

    let mut metadata = Map::new();
    for (key, value) in &args.metadata {
        metadata.insert(key.clone(), Value::String(value.clone()));
    }
    if let Some(cwd) = &args.cwd {
        metadata.insert(
            "CWD".to_string(),
            Value::String(cwd.to_string_lossy().into_owned()),
        );
    }
    let metadata = (!metadata.is_empty()).then_some(metadata);

    let job = Job::pending(args.payload, tags, env, metadata, Utc::now().naive_utc())?;

    let pool = PgPool::connect(&config.database.url())
        .await
        .context("failed to connect to database")?;
    let store = PgQueueStore::new(pool);

    let job_id = store.submit_job(&job).await?;
    info!(job_id, payload = %job.payload, "job submitted");
    println!("{job_id}");

    Ok(())
}
