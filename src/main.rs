use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use log::info;
use recon_lib::matching::{run_reconciliation_pipeline, PipelineArgs};
use recon_lib::utils::db_connect::connect;
use recon_lib::utils::env::load_env;

/// Runs one order/shipment reconciliation pass and reports the summary.
#[derive(Parser, Debug)]
#[command(name = "reconcile")]
struct Cli {
    /// Reconcile a single customer; all customers when omitted.
    #[arg(long)]
    customer: Option<String>,

    /// Point-in-time snapshot date (YYYY-MM-DD), defaults to today.
    #[arg(long)]
    as_of: Option<NaiveDate>,

    /// Run the full pipeline but skip all writes.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();

    let cli = Cli::parse();
    let as_of = cli.as_of.unwrap_or_else(|| Utc::now().date_naive());
    info!(
        "Starting order reconciliation (customer={:?}, as_of={}, dry_run={})",
        cli.customer, as_of, cli.dry_run
    );

    let pool = connect().await.context("Failed to connect to database")?;

    let summary = run_reconciliation_pipeline(
        &pool,
        PipelineArgs {
            customer_id: cli.customer,
            as_of,
            dry_run: cli.dry_run,
        },
        None,
    )
    .await
    .context("Reconciliation run failed")?;

    println!(
        "Run {} finished: {} shipments -> EXACT_OK={} EXACT_QTY_MISMATCH={} HI_CONF={} LOW_CONF={} NO_MATCH={} (malformed shipments={}, review entries={})",
        summary.run_id,
        summary.total_shipments,
        summary.exact_ok,
        summary.exact_qty_mismatch,
        summary.hi_conf,
        summary.low_conf,
        summary.no_match,
        summary.malformed_shipments,
        summary.review_entries_created
    );
    Ok(())
}
