// src/matching/resolve.rs
//
// Duplicate-match resolution: collapse the candidate score table into a 1:1
// shipment-group <-> order assignment, best score first.
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::core::OrderRecord;
use crate::models::matching::{CandidatePair, ConsolidatedShipment, MatchFlag};

#[derive(Debug, Clone)]
pub struct Assignment {
    pub group_idx: usize,
    pub order_idx: usize,
    pub flag: MatchFlag,
    pub pair: CandidatePair,
}

/// Greedy assignment over HI_CONF/LOW_CONF pairs.
///
/// Sort order is the documented deterministic tie-break: aggregate score
/// descending, then smallest member shipment id ascending, then order id
/// ascending. Once a group or order is claimed it is never reused; skipped
/// pairs simply lose.
pub fn resolve_duplicates(
    mut candidates: Vec<(CandidatePair, MatchFlag)>,
    groups: &[ConsolidatedShipment],
    orders: &[OrderRecord],
) -> Vec<Assignment> {
    candidates.retain(|(_, flag)| matches!(flag, MatchFlag::HiConf | MatchFlag::LowConf));
    candidates.sort_by(|(a, _), (b, _)| {
        b.aggregate
            .partial_cmp(&a.aggregate)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                groups[a.group_idx]
                    .representative_id()
                    .cmp(groups[b.group_idx].representative_id())
            })
            .then_with(|| orders[a.order_idx].order_id.cmp(&orders[b.order_idx].order_id))
    });

    let mut assigned_groups: HashSet<usize> = HashSet::new();
    let mut assigned_orders: HashSet<usize> = HashSet::new();
    let mut assignments = Vec::new();

    for (pair, flag) in candidates {
        if assigned_groups.contains(&pair.group_idx) || assigned_orders.contains(&pair.order_idx) {
            continue;
        }
        assigned_groups.insert(pair.group_idx);
        assigned_orders.insert(pair.order_idx);
        assignments.push(Assignment {
            group_idx: pair.group_idx,
            order_idx: pair.order_idx,
            flag,
            pair,
        });
    }

    assignments
}
