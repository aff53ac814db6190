// src/matching/mod.rs
//
// The layered matching pipeline. `reconcile_block` and `run_reconciliation`
// are pure and synchronous so every invariant is testable without a database;
// `run_reconciliation_pipeline` is the async driver that loads inputs from
// Postgres, fans blocks out across workers, and persists the outputs.
pub mod blocking;
pub mod classify;
pub mod consolidate;
pub mod exact;
pub mod fuzzy;
pub mod resolve;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::canonicalize::AliasSnapshot;
use crate::config::{ConfigResolver, MatchingConfig};
use crate::db;
use crate::escalation::ResidualScorer;
use crate::models::core::{OrderRecord, ReviewQueueEntry, ShipmentRecord};
use crate::models::matching::{CandidatePair, MatchFlag, MatchResultRecord};
use crate::models::stats::{BlockStats, RunSummary};
use crate::review;
use crate::utils::constants::SUGGESTION_BAND;
use crate::utils::db_connect::PgPool;

use blocking::{block_by_customer, CustomerBlock};
use classify::classify_pair;
use consolidate::consolidate_shipments;
use exact::run_layer0;
use fuzzy::{score_attributes, score_block};
use resolve::resolve_duplicates;

/// Everything one customer block produced: per-shipment results, queued
/// suggestions, and tallies for the run summary.
#[derive(Debug, Default)]
pub struct BlockOutcome {
    pub results: Vec<MatchResultRecord>,
    pub queue_entries: Vec<ReviewQueueEntry>,
    pub stats: BlockStats,
}

impl BlockOutcome {
    fn count_flag(&mut self, flag: MatchFlag, members: usize) {
        match flag {
            MatchFlag::ExactOk => self.stats.exact_ok += members,
            MatchFlag::ExactQtyMismatch => self.stats.exact_qty_mismatch += members,
            MatchFlag::HiConf => self.stats.hi_conf += members,
            MatchFlag::LowConf => self.stats.low_conf += members,
            MatchFlag::NoMatch => self.stats.no_match += members,
        }
    }
}

/// Runs Layer 0, consolidation, Layer 1, classification, duplicate
/// resolution, and finalization for one customer block. Records must already
/// be canonicalized.
pub fn reconcile_block(
    block: &CustomerBlock,
    cfg: &MatchingConfig,
    snapshot: &AliasSnapshot,
    escalation: Option<&dyn ResidualScorer>,
    run_id: &str,
) -> Result<BlockOutcome> {
    let mut outcome = BlockOutcome::default();
    outcome.stats.shipments = block.shipments.len();
    outcome.stats.orders = block.orders.len();

    // Layer 0: exact composite-key join.
    let layer0 = run_layer0(&block.orders, &block.shipments, cfg);
    debug!(
        "[{}] Layer 0: {} matched, {} shipments and {} orders remain",
        block.customer_id,
        layer0.matched.len(),
        layer0.unmatched_shipment_idxs.len(),
        layer0.unmatched_order_idxs.len()
    );
    for m in &layer0.matched {
        outcome.count_flag(m.flag, 1);
        outcome.results.push(MatchResultRecord {
            shipment_id: block.shipments[m.shipment_idx].shipment_id.clone(),
            order_id: Some(block.orders[m.order_idx].order_id.clone()),
            customer_id: block.customer_id.clone(),
            match_flag: m.flag,
            score: 1.0,
            layer: 0,
            run_id: run_id.to_string(),
            score_detail: None,
        });
    }

    // Split-shipment consolidation over the leftovers.
    let groups = consolidate_shipments(&block.shipments, &layer0.unmatched_shipment_idxs);

    // Layer 1: weighted fuzzy scoring, then classification and 1:1 resolution.
    let pairs = score_block(&groups, &block.orders, &layer0.unmatched_order_idxs, cfg);
    let classified: Vec<(CandidatePair, MatchFlag)> = pairs
        .iter()
        .map(|p| (p.clone(), classify_pair(p, cfg)))
        .collect();
    let mut assignments = resolve_duplicates(classified, &groups, &block.orders);

    let mut assigned_groups: HashSet<usize> = assignments.iter().map(|a| a.group_idx).collect();
    let mut assigned_orders: HashSet<usize> = assignments.iter().map(|a| a.order_idx).collect();

    // Optional escalation over the residue. Proposals are rebuilt as ordinary
    // candidate pairs (style similarity recomputed from the records) and go
    // through the same classifier and resolver.
    if let Some(scorer) = escalation {
        let residual_order_idxs: Vec<usize> = layer0
            .unmatched_order_idxs
            .iter()
            .copied()
            .filter(|idx| !assigned_orders.contains(idx))
            .collect();
        let residual_group_idxs: Vec<usize> = (0..groups.len())
            .filter(|idx| !assigned_groups.contains(idx))
            .collect();

        if !residual_order_idxs.is_empty() && !residual_group_idxs.is_empty() {
            let residual_orders: Vec<OrderRecord> = residual_order_idxs
                .iter()
                .map(|&i| block.orders[i].clone())
                .collect();
            let residual_shipments: Vec<ShipmentRecord> = residual_group_idxs
                .iter()
                .flat_map(|&g| groups[g].member_idxs.iter().map(|&i| block.shipments[i].clone()))
                .collect();

            let shipment_to_group: HashMap<&str, usize> = residual_group_idxs
                .iter()
                .flat_map(|&g| groups[g].member_ids.iter().map(move |id| (id.as_str(), g)))
                .collect();
            let order_id_to_idx: HashMap<&str, usize> = residual_order_idxs
                .iter()
                .map(|&i| (block.orders[i].order_id.as_str(), i))
                .collect();

            let proposals = scorer
                .score_residuals(&residual_orders, &residual_shipments)
                .context("Residual scorer failed")?;
            debug!(
                "[{}] Escalation returned {} proposed links",
                block.customer_id,
                proposals.len()
            );

            let mut escalated: Vec<(CandidatePair, MatchFlag)> = Vec::new();
            for link in proposals {
                let Some(&group_idx) = shipment_to_group.get(link.shipment_id.as_str()) else {
                    warn!(
                        "[{}] Escalation proposed unknown or already-matched shipment '{}'; ignored",
                        block.customer_id, link.shipment_id
                    );
                    continue;
                };
                let Some(&order_idx) = order_id_to_idx.get(link.order_id.as_str()) else {
                    warn!(
                        "[{}] Escalation proposed unknown or already-matched order '{}'; ignored",
                        block.customer_id, link.order_id
                    );
                    continue;
                };
                let scores = score_attributes(&groups[group_idx], &block.orders[order_idx], cfg);
                let pair = CandidatePair {
                    group_idx,
                    order_idx,
                    aggregate: link.confidence.clamp(0.0, 1.0),
                    style_exact: scores.style_exact(),
                    scores,
                };
                let flag = classify_pair(&pair, cfg);
                escalated.push((pair, flag));
            }
            for assignment in resolve_duplicates(escalated, &groups, &block.orders) {
                assigned_groups.insert(assignment.group_idx);
                assigned_orders.insert(assignment.order_idx);
                assignments.push(assignment);
            }
        }
    }

    // Finalize assigned groups: one row per member shipment, all sharing the
    // group's order, flag, and aggregate score.
    for assignment in &assignments {
        let group = &groups[assignment.group_idx];
        let order = &block.orders[assignment.order_idx];
        let detail = serde_json::to_value(assignment.pair.scores).ok();
        outcome.count_flag(assignment.flag, group.member_idxs.len());
        for &member_idx in &group.member_idxs {
            outcome.results.push(MatchResultRecord {
                shipment_id: block.shipments[member_idx].shipment_id.clone(),
                order_id: Some(order.order_id.clone()),
                customer_id: block.customer_id.clone(),
                match_flag: assignment.flag,
                score: assignment.pair.aggregate,
                layer: 1,
                run_id: run_id.to_string(),
                score_detail: detail.clone(),
            });
        }

        match assignment.flag {
            MatchFlag::LowConf => {
                if let Some(entry) = review::build_suggestion(
                    &assignment.pair,
                    group,
                    order,
                    &block.shipments,
                    cfg,
                    run_id,
                ) {
                    outcome.queue_entries.push(entry);
                }
            }
            MatchFlag::HiConf if cfg.record_hi_conf_audit => {
                if let Some(entry) = review::build_hi_conf_audit(
                    &assignment.pair,
                    group,
                    order,
                    &block.shipments,
                    snapshot,
                    run_id,
                ) {
                    outcome.queue_entries.push(entry);
                }
            }
            _ => {}
        }
    }

    // Finalize unassigned groups as NO_MATCH, keeping the best losing pair
    // around for score reporting and near-threshold suggestions.
    let mut best_pair_per_group: HashMap<usize, &CandidatePair> = HashMap::new();
    for pair in &pairs {
        best_pair_per_group
            .entry(pair.group_idx)
            .and_modify(|best| {
                if pair.aggregate > best.aggregate {
                    *best = pair;
                }
            })
            .or_insert(pair);
    }

    for (group_idx, group) in groups.iter().enumerate() {
        if assigned_groups.contains(&group_idx) {
            continue;
        }
        let best = best_pair_per_group.get(&group_idx);
        let (score, detail) = match best {
            Some(pair) => (pair.aggregate, serde_json::to_value(pair.scores).ok()),
            None => (0.0, None),
        };
        outcome.count_flag(MatchFlag::NoMatch, group.member_idxs.len());
        for &member_idx in &group.member_idxs {
            outcome.results.push(MatchResultRecord {
                shipment_id: block.shipments[member_idx].shipment_id.clone(),
                order_id: None,
                customer_id: block.customer_id.clone(),
                match_flag: MatchFlag::NoMatch,
                score,
                layer: 1,
                run_id: run_id.to_string(),
                score_detail: detail.clone(),
            });
        }

        // A near-threshold loser still carries a plausible alias suggestion.
        if let Some(pair) = best {
            if pair.aggregate >= cfg.low_threshold - SUGGESTION_BAND {
                if let Some(entry) = review::build_suggestion(
                    pair,
                    group,
                    &block.orders[pair.order_idx],
                    &block.shipments,
                    cfg,
                    run_id,
                ) {
                    outcome.queue_entries.push(entry);
                }
            }
        }
    }

    Ok(outcome)
}

/// The complete outcome of one reconciliation run.
#[derive(Debug)]
pub struct RunOutcome {
    pub results: Vec<MatchResultRecord>,
    pub queue_entries: Vec<ReviewQueueEntry>,
    pub summary: RunSummary,
}

/// Run inputs after exclusion and canonicalization.
struct PreparedInputs {
    orders: Vec<OrderRecord>,
    shipments: Vec<ShipmentRecord>,
    malformed_orders: usize,
    malformed_shipments: usize,
}

/// Shared run prep: exclude and count malformed rows, then canonicalize
/// everything that survives. Both run drivers go through here so their
/// semantics cannot drift.
fn prepare_inputs(
    orders: Vec<OrderRecord>,
    shipments: Vec<ShipmentRecord>,
    snapshot: &AliasSnapshot,
) -> PreparedInputs {
    // Malformed rows are excluded and counted, never silently dropped into
    // the matcher.
    let (orders, malformed_orders): (Vec<_>, Vec<_>) =
        orders.into_iter().partition(|o| o.is_well_formed());
    let (shipments, malformed_shipments): (Vec<_>, Vec<_>) =
        shipments.into_iter().partition(|s| s.is_well_formed());
    for order in &malformed_orders {
        warn!(
            "Excluding malformed order '{}' (customer '{}') from matching",
            order.order_id, order.customer_id
        );
    }
    for shipment in &malformed_shipments {
        warn!(
            "Excluding malformed shipment '{}' (customer '{}') from matching",
            shipment.shipment_id, shipment.customer_id
        );
    }

    PreparedInputs {
        orders: orders
            .into_iter()
            .map(|o| snapshot.canonicalize_order(o))
            .collect(),
        shipments: shipments
            .into_iter()
            .map(|s| snapshot.canonicalize_shipment(s))
            .collect(),
        malformed_orders: malformed_orders.len(),
        malformed_shipments: malformed_shipments.len(),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_summary(
    run_id: &str,
    run_timestamp: NaiveDateTime,
    total_orders: usize,
    total_shipments: usize,
    malformed_orders: usize,
    malformed_shipments: usize,
    stats: &BlockStats,
    review_entries_created: usize,
    matching_time: f64,
) -> RunSummary {
    RunSummary {
        run_id: run_id.to_string(),
        run_timestamp,
        total_shipments,
        total_orders,
        exact_ok: stats.exact_ok,
        exact_qty_mismatch: stats.exact_qty_mismatch,
        hi_conf: stats.hi_conf,
        low_conf: stats.low_conf,
        no_match: stats.no_match,
        malformed_shipments,
        malformed_orders,
        review_entries_created,
        matching_time,
    }
}

/// Pure, single-threaded run driver: canonicalize, block, reconcile each
/// block, merge, and verify the totals invariant. This is the function the
/// property tests exercise.
pub fn run_reconciliation(
    orders: Vec<OrderRecord>,
    shipments: Vec<ShipmentRecord>,
    snapshot: &AliasSnapshot,
    resolver: &ConfigResolver,
    escalation: Option<&dyn ResidualScorer>,
    run_id: &str,
) -> Result<RunOutcome> {
    let start = Instant::now();
    let run_timestamp = Utc::now().naive_utc();

    let prepared = prepare_inputs(orders, shipments, snapshot);
    let (malformed_orders, malformed_shipments) =
        (prepared.malformed_orders, prepared.malformed_shipments);
    let total_orders = prepared.orders.len();
    let total_shipments = prepared.shipments.len();
    let blocks = block_by_customer(prepared.orders, prepared.shipments);
    info!(
        "Run {}: {} orders, {} shipments across {} customer blocks",
        run_id,
        total_orders,
        total_shipments,
        blocks.len()
    );

    let mut results = Vec::with_capacity(total_shipments);
    let mut queue_entries = Vec::new();
    let mut stats = BlockStats::default();
    for block in &blocks {
        let cfg = resolver.for_customer(&block.customer_id);
        let outcome = reconcile_block(block, &cfg, snapshot, escalation, run_id)?;
        stats.merge(&outcome.stats);
        results.extend(outcome.results);
        queue_entries.extend(outcome.queue_entries);
    }

    let summary = build_summary(
        run_id,
        run_timestamp,
        total_orders,
        total_shipments,
        malformed_orders,
        malformed_shipments,
        &stats,
        queue_entries.len(),
        start.elapsed().as_secs_f64(),
    );
    summary.verify_totals(results.len())?;

    Ok(RunOutcome {
        results,
        queue_entries,
        summary,
    })
}

#[derive(Debug, Clone)]
pub struct PipelineArgs {
    pub customer_id: Option<String>,
    pub as_of: chrono::NaiveDate,
    pub dry_run: bool,
}

/// Async pipeline driver: loads the alias snapshot, per-customer config, and
/// records from Postgres, reconciles blocks in parallel on blocking workers,
/// and persists results and review queue entries. Results are only committed
/// after the totals invariant holds. An escalation scorer, when supplied, is
/// shared across the block workers.
pub async fn run_reconciliation_pipeline(
    pool: &PgPool,
    args: PipelineArgs,
    escalation: Option<Arc<dyn ResidualScorer>>,
) -> Result<RunSummary> {
    let start = Instant::now();
    let run_id = Uuid::new_v4().to_string();
    let run_timestamp = Utc::now().naive_utc();
    info!(
        "Starting reconciliation run {} (customer={:?}, as_of={})",
        run_id, args.customer_id, args.as_of
    );

    let snapshot_rows = db::fetch_alias_snapshot(pool).await?;
    let snapshot = Arc::new(AliasSnapshot::build(snapshot_rows)?);

    let overrides = db::fetch_customer_overrides(pool).await?;
    let resolver = ConfigResolver::new(MatchingConfig::from_env(), overrides)?;

    let orders = db::fetch_orders(pool, args.customer_id.as_deref(), args.as_of).await?;
    let shipments = db::fetch_shipments(pool, args.customer_id.as_deref(), args.as_of).await?;
    info!(
        "Loaded {} orders and {} shipments",
        orders.len(),
        shipments.len()
    );

    if !args.dry_run {
        db::create_run_record(pool, &run_id, run_timestamp, args.customer_id.as_deref()).await?;
    }

    let prepared = prepare_inputs(orders, shipments, &snapshot);
    let (malformed_orders, malformed_shipments) =
        (prepared.malformed_orders, prepared.malformed_shipments);
    let total_orders = prepared.orders.len();
    let total_shipments = prepared.shipments.len();
    let blocks = block_by_customer(prepared.orders, prepared.shipments);

    let block_pb = ProgressBar::new(blocks.len() as u64);
    block_pb.set_style(
        ProgressStyle::default_bar()
            .template("  [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} Reconciling customer blocks...")
            .unwrap()
            .progress_chars("█▉▊▋▌▍▎▏  "),
    );

    // Blocks share no mutable state, so they fan out onto blocking workers,
    // a CPU's worth at a time.
    let mut results = Vec::with_capacity(total_shipments);
    let mut queue_entries = Vec::new();
    let mut stats = BlockStats::default();
    let worker_count = num_cpus::get().max(1);

    for chunk in blocks.chunks(worker_count) {
        let mut handles = Vec::with_capacity(chunk.len());
        for block in chunk {
            let block = block.clone();
            let cfg = resolver.for_customer(&block.customer_id);
            let snapshot = Arc::clone(&snapshot);
            let scorer = escalation.clone();
            let run_id = run_id.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                reconcile_block(&block, &cfg, &snapshot, scorer.as_deref(), &run_id)
            }));
        }
        for joined in futures::future::join_all(handles).await {
            let outcome = joined.context("Block reconciliation task panicked")??;
            stats.merge(&outcome.stats);
            results.extend(outcome.results);
            queue_entries.extend(outcome.queue_entries);
            block_pb.inc(1);
        }
    }
    block_pb.finish_with_message("Customer blocks reconciled");

    let summary = build_summary(
        &run_id,
        run_timestamp,
        total_orders,
        total_shipments,
        malformed_orders,
        malformed_shipments,
        &stats,
        queue_entries.len(),
        start.elapsed().as_secs_f64(),
    );
    // An invariant violation here is an engine bug; refuse to persist.
    summary.verify_totals(results.len())?;

    if args.dry_run {
        info!("Dry run: skipping persistence of {} results", results.len());
    } else {
        db::batch_insert_match_results(pool, &results).await?;
        db::batch_insert_review_queue_entries(pool, &queue_entries).await?;
        db::finalize_run_record(pool, &summary).await?;
    }

    info!(
        "Run {} complete in {:.2}s: {} EXACT_OK, {} EXACT_QTY_MISMATCH, {} HI_CONF, {} LOW_CONF, {} NO_MATCH ({} review entries)",
        run_id,
        summary.matching_time,
        summary.exact_ok,
        summary.exact_qty_mismatch,
        summary.hi_conf,
        summary.low_conf,
        summary.no_match,
        summary.review_entries_created
    );
    Ok(summary)
}
