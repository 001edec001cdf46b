//! Start a compute node: register this host and process jobs until the
//! queue drains (batch mode) or an interrupt arrives.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::PgPool;
use tracing::info;

use clusterq_core::{local_hostname, ComputeNode, Config};
use clusterq_postgres::PgQueueStore;

#[derive(Parser)]
#[command(name = "compute-node")]
#[command(about = "Register this host with the cluster and start processing jobs")]
struct Args {
    /// Number of processors (parallel jobs) this node runs.
    #[arg(long = "num_parallel_jobs", default_value_t = 4)]
    num_parallel_jobs: i32,

    /// Capabilities this node provides, comma separated.
    #[arg(long, default_value = "cpu", value_delimiter = ',')]
    tags: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    clusterq_core::logging::init(&config, "compute_node")?;

    let hostname = local_hostname()?;
    info!(hostname = %hostname, tags = ?args.tags, "starting compute node");

    let pool = PgPool::connect(&config.database.url())
        .await
        .context("failed to connect to database")?;
    let store = Arc::new(PgQueueStore::new(pool));

    let node = ComputeNode::new(
        store,
        hostname,
        args.tags,
        args.num_parallel_jobs,
        &config.orchestration,
    )?;
    node.run().await?;

    info!("done");
    Ok(())
}
