//! Drop and recreate the cluster tables. Destructive: wipes every job,
//! node and processor row, then re-seeds the UNASSIGNED virtual node.

use anyhow::{bail, Context, Result};
use clap::Parser;
use dialoguer::Confirm;
use sqlx::PgPool;
use tracing::info;

use clusterq_core::Config;
use clusterq_postgres::init_db;

#[derive(Parser)]
#[command(name = "init-db")]
#[command(about = "Drop and recreate all cluster tables (destructive)")]
struct Args {
    /// Skip the interactive confirmation.
    #[arg(long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    clusterq_core::logging::init(&config, "init_db")?;

    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "This drops and recreates all tables in '{}'. Continue?",
                config.database.dbname
            ))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        if !confirmed {
            bail!("aborted; nothing was changed");
        }
    }

    let pool = PgPool::connect(&config.database.url())
        .await
        .context("failed to connect to database")?;
    init_db(&pool).await?;

    info!("database initialized");
    Ok(())
}
