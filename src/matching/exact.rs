// src/matching/exact.rs
//
// Layer 0: exact join on the full canonicalized composite key. A join
// consumes both sides regardless of quantity; only the flag differs.
use std::collections::HashMap;

use crate::config::MatchingConfig;
use crate::models::core::{OrderRecord, ShipmentRecord};
use crate::models::matching::MatchFlag;

/// Composite join key for Layer 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExactKey {
    pub style: String,
    pub color: String,
    pub po: String,
    pub alt_po: String,
    pub delivery_method: String,
}

impl ExactKey {
    pub fn of_order(order: &OrderRecord) -> Self {
        Self {
            style: order.norm.style.clone(),
            color: order.norm.color.clone(),
            po: order.norm.po.clone(),
            alt_po: order.norm.alt_po.clone(),
            delivery_method: order.norm.delivery_method.clone(),
        }
    }

    pub fn of_shipment(shipment: &ShipmentRecord) -> Self {
        Self {
            style: shipment.norm.style.clone(),
            color: shipment.norm.color.clone(),
            po: shipment.norm.po.clone(),
            alt_po: shipment.norm.alt_po.clone(),
            delivery_method: shipment.norm.delivery_method.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExactMatch {
    pub shipment_idx: usize,
    pub order_idx: usize,
    pub flag: MatchFlag,
}

#[derive(Debug, Default)]
pub struct Layer0Outcome {
    pub matched: Vec<ExactMatch>,
    pub unmatched_shipment_idxs: Vec<usize>,
    pub unmatched_order_idxs: Vec<usize>,
}

pub fn qty_within_tolerance(qty_ship: i64, qty_order: i64, tolerance_pct: f64) -> bool {
    let variance = (qty_ship - qty_order).abs() as f64;
    variance <= tolerance_pct * qty_order as f64
}

/// Joins shipments to orders on the exact composite key within one block.
///
/// Only unambiguous 1:1 key collisions are consumed here. Keys shared by
/// several shipments (split shipments whose identifying attributes all agree)
/// or several orders are deferred so the consolidator can sum quantities
/// before any classification happens.
pub fn run_layer0(
    orders: &[OrderRecord],
    shipments: &[ShipmentRecord],
    cfg: &MatchingConfig,
) -> Layer0Outcome {
    let mut orders_by_key: HashMap<ExactKey, Vec<usize>> = HashMap::new();
    for (idx, order) in orders.iter().enumerate() {
        orders_by_key.entry(ExactKey::of_order(order)).or_default().push(idx);
    }
    let mut shipments_by_key: HashMap<ExactKey, Vec<usize>> = HashMap::new();
    for (idx, shipment) in shipments.iter().enumerate() {
        shipments_by_key
            .entry(ExactKey::of_shipment(shipment))
            .or_default()
            .push(idx);
    }

    let mut outcome = Layer0Outcome::default();
    let mut consumed_orders = vec![false; orders.len()];
    let mut consumed_shipments = vec![false; shipments.len()];

    for (key, ship_idxs) in &shipments_by_key {
        let Some(order_idxs) = orders_by_key.get(key) else {
            continue;
        };
        if ship_idxs.len() != 1 || order_idxs.len() != 1 {
            // Split shipments or duplicate orders on one key; deferred to
            // consolidation / Layer 1.
            continue;
        }
        let (ship_idx, order_idx) = (ship_idxs[0], order_idxs[0]);
        let flag = if qty_within_tolerance(
            shipments[ship_idx].qty,
            orders[order_idx].qty,
            cfg.qty_tolerance_pct,
        ) {
            MatchFlag::ExactOk
        } else {
            MatchFlag::ExactQtyMismatch
        };
        outcome.matched.push(ExactMatch {
            shipment_idx: ship_idx,
            order_idx,
            flag,
        });
        consumed_shipments[ship_idx] = true;
        consumed_orders[order_idx] = true;
    }

    outcome.unmatched_shipment_idxs = (0..shipments.len())
        .filter(|i| !consumed_shipments[*i])
        .collect();
    outcome.unmatched_order_idxs = (0..orders.len()).filter(|i| !consumed_orders[*i]).collect();
    // HashMap iteration above is unordered; sort for a stable result order.
    outcome
        .matched
        .sort_by_key(|m| (m.shipment_idx, m.order_idx));
    outcome
}
