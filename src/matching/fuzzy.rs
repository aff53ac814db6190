// src/matching/fuzzy.rs
//
// Layer 1: weighted fuzzy scoring of consolidated shipment groups against
// unmatched orders within a block.
use strsim::jaro_winkler;

use crate::config::MatchingConfig;
use crate::models::core::OrderRecord;
use crate::models::matching::{AttributeScores, CandidatePair, ConsolidatedShipment};

/// Jaro-Winkler over canonicalized values. Two empty values are identical;
/// one-sided emptiness means no evidence, not partial similarity.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => jaro_winkler(a, b),
    }
}

/// Tolerance-bounded quantity similarity: 1.0 at equality, falling linearly
/// to 0.0 at the edge of `tolerance_pct * qty_order`, clamped.
pub fn quantity_similarity(qty_ship: i64, qty_order: i64, tolerance_pct: f64) -> f64 {
    if qty_order == 0 {
        return if qty_ship == 0 { 1.0 } else { 0.0 };
    }
    let variance = (qty_ship - qty_order).abs() as f64;
    let bound = tolerance_pct * qty_order as f64;
    if bound <= 0.0 {
        return if variance == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - (variance / bound).min(1.0)).clamp(0.0, 1.0)
}

pub fn score_attributes(
    group: &ConsolidatedShipment,
    order: &OrderRecord,
    cfg: &MatchingConfig,
) -> AttributeScores {
    AttributeScores {
        style: text_similarity(&group.norm.style, &order.norm.style),
        color: text_similarity(&group.norm.color, &order.norm.color),
        po: text_similarity(&group.norm.po, &order.norm.po),
        delivery_method: text_similarity(&group.norm.delivery_method, &order.norm.delivery_method),
        quantity: quantity_similarity(group.qty, order.qty, cfg.qty_tolerance_pct),
    }
}

/// Weighted mean of the per-attribute scores.
pub fn aggregate(scores: &AttributeScores, cfg: &MatchingConfig) -> f64 {
    let w = &cfg.weights;
    let weighted = scores.style * w.style
        + scores.po * w.po
        + scores.color * w.color
        + scores.delivery_method * w.delivery_method
        + scores.quantity * w.quantity;
    weighted / w.sum()
}

pub fn score_pair(
    group_idx: usize,
    order_idx: usize,
    group: &ConsolidatedShipment,
    order: &OrderRecord,
    cfg: &MatchingConfig,
) -> CandidatePair {
    let scores = score_attributes(group, order, cfg);
    CandidatePair {
        group_idx,
        order_idx,
        aggregate: aggregate(&scores, cfg),
        style_exact: scores.style_exact(),
        scores,
    }
}

/// Scores every group against every unmatched order in the block. Customer
/// blocks are small enough for the quadratic pass; blocking already bounded
/// the cost.
pub fn score_block(
    groups: &[ConsolidatedShipment],
    orders: &[OrderRecord],
    unmatched_order_idxs: &[usize],
    cfg: &MatchingConfig,
) -> Vec<CandidatePair> {
    let mut pairs = Vec::with_capacity(groups.len() * unmatched_order_idxs.len());
    for (group_idx, group) in groups.iter().enumerate() {
        for &order_idx in unmatched_order_idxs {
            pairs.push(score_pair(group_idx, order_idx, group, &orders[order_idx], cfg));
        }
    }
    pairs
}
