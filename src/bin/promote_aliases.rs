// src/bin/promote_aliases.rs
//
// Folds externally-approved review queue entries into the alias mapping
// store. Safe to run repeatedly or concurrently; each entry is claimed and
// upserted in one transaction, and promotion is idempotent.
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use recon_lib::review::promote_approved;
use recon_lib::utils::db_connect::connect;
use recon_lib::utils::env::load_env;

#[derive(Parser, Debug)]
#[command(name = "promote_aliases")]
struct Cli {}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    Cli::parse();

    let pool = connect().await.context("Failed to connect to database")?;

    info!("Starting alias promotion pass");
    let stats = promote_approved(&pool).await?;
    println!(
        "Alias promotion finished: promoted={} already_promoted={} errors={}",
        stats.promoted_count, stats.already_promoted, stats.errors
    );
    Ok(())
}
