// src/models/stats.rs
use anyhow::{bail, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Per-run outcome totals. `verify_totals` is the engine-bug tripwire: every
/// well-formed shipment must land in exactly one bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub run_timestamp: NaiveDateTime,
    pub total_shipments: usize,
    pub total_orders: usize,
    pub exact_ok: usize,
    pub exact_qty_mismatch: usize,
    pub hi_conf: usize,
    pub low_conf: usize,
    pub no_match: usize,
    pub malformed_shipments: usize,
    pub malformed_orders: usize,
    pub review_entries_created: usize,
    pub matching_time: f64,
}

impl RunSummary {
    pub fn flag_total(&self) -> usize {
        self.exact_ok + self.exact_qty_mismatch + self.hi_conf + self.low_conf + self.no_match
    }

    pub fn verify_totals(&self, result_rows: usize) -> Result<()> {
        if self.total_shipments != result_rows {
            bail!(
                "Totals invariant violated: {} shipments in, {} result rows out",
                self.total_shipments,
                result_rows
            );
        }
        if self.flag_total() != self.total_shipments {
            bail!(
                "Totals invariant violated: flag counts sum to {} but {} shipments were processed",
                self.flag_total(),
                self.total_shipments
            );
        }
        Ok(())
    }
}

/// Outcome counts for a single customer block, merged into the RunSummary by
/// the pipeline driver.
#[derive(Debug, Clone, Default)]
pub struct BlockStats {
    pub shipments: usize,
    pub orders: usize,
    pub exact_ok: usize,
    pub exact_qty_mismatch: usize,
    pub hi_conf: usize,
    pub low_conf: usize,
    pub no_match: usize,
}

impl BlockStats {
    pub fn merge(&mut self, other: &BlockStats) {
        self.shipments += other.shipments;
        self.orders += other.orders;
        self.exact_ok += other.exact_ok;
        self.exact_qty_mismatch += other.exact_qty_mismatch;
        self.hi_conf += other.hi_conf;
        self.low_conf += other.low_conf;
        self.no_match += other.no_match;
    }
}

/// What one promotion transaction did with a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionOutcome {
    Promoted,
    AlreadyPromoted,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromotionStats {
    pub promoted_count: usize,
    pub already_promoted: usize,
    pub errors: usize,
}

impl PromotionStats {
    /// A failed transaction leaves its entry unclaimed, so an error here means
    /// "will be retried next pass", never "lost".
    pub fn record(&mut self, result: &Result<PromotionOutcome>) {
        match result {
            Ok(PromotionOutcome::Promoted) => self.promoted_count += 1,
            Ok(PromotionOutcome::AlreadyPromoted) => self.already_promoted += 1,
            Err(_) => self.errors += 1,
        }
    }
}
