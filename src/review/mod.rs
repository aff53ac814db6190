// src/review/mod.rs
//
// Review queue writing and alias promotion: the learning half of the loop.
// The pipeline writes Pending suggestions; humans approve or reject them
// elsewhere; promotion folds Approved rows into the alias store for the next
// run. A run never observes its own writes.
use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use uuid::Uuid;

use crate::canonicalize::AliasSnapshot;
use crate::config::MatchingConfig;
use crate::db;
use crate::models::core::{AliasMapping, AttributeType, OrderRecord, ReviewQueueEntry, ReviewStatus, ShipmentRecord};
use crate::models::matching::{CandidatePair, ConsolidatedShipment};
use crate::models::stats::PromotionStats;
use crate::utils::db_connect::PgPool;

/// Picks which attribute to suggest an alias for: the highest-weighted
/// attribute whose similarity fell short of identity. Quantity is not an
/// alias-able attribute, so a pure quantity miss yields no suggestion.
pub fn suggestion_attribute(pair: &CandidatePair, cfg: &MatchingConfig) -> Option<AttributeType> {
    let w = &cfg.weights;
    let mut candidates = [
        (AttributeType::Style, w.style, pair.scores.style),
        (AttributeType::Po, w.po, pair.scores.po),
        (AttributeType::Color, w.color, pair.scores.color),
        (
            AttributeType::DeliveryMethod,
            w.delivery_method,
            pair.scores.delivery_method,
        ),
    ];
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    candidates
        .iter()
        .find(|(_, _, sim)| *sim < 1.0)
        .map(|(attr, _, _)| *attr)
}

/// Builds the queue entry that would have made this pair exact: map the
/// shipment's raw value for the chosen attribute to the order's canonical
/// value. Returns None when no text attribute differs.
pub fn build_suggestion(
    pair: &CandidatePair,
    group: &ConsolidatedShipment,
    order: &OrderRecord,
    shipments: &[ShipmentRecord],
    cfg: &MatchingConfig,
    run_id: &str,
) -> Option<ReviewQueueEntry> {
    let attr = suggestion_attribute(pair, cfg)?;
    let representative = &shipments[group.member_idxs[0]];
    let raw_value = representative.raw_value(attr).to_string();
    let suggested = order.norm.value(attr).to_string();
    if raw_value.trim().is_empty() || suggested.is_empty() {
        return None;
    }
    Some(ReviewQueueEntry {
        id: Uuid::new_v4().to_string(),
        customer_id: group.customer_id.clone(),
        attr_type: attr,
        raw_value,
        suggested_canon_value: suggested,
        confidence: pair.aggregate,
        status: ReviewStatus::Pending,
        shipment_id: representative.shipment_id.clone(),
        order_id: Some(order.order_id.clone()),
        run_id: run_id.to_string(),
        suggested_ts: Utc::now().naive_utc(),
        approved_by: None,
        approved_ts: None,
        promoted_at: None,
    })
}

/// Audit entry for a HI_CONF match that leaned on an existing alias mapping,
/// recorded for reinforcement when the config asks for it.
pub fn build_hi_conf_audit(
    pair: &CandidatePair,
    group: &ConsolidatedShipment,
    order: &OrderRecord,
    shipments: &[ShipmentRecord],
    snapshot: &AliasSnapshot,
    run_id: &str,
) -> Option<ReviewQueueEntry> {
    let representative = &shipments[group.member_idxs[0]];
    let attrs = [
        AttributeType::Style,
        AttributeType::Color,
        AttributeType::Po,
        AttributeType::AltPo,
        AttributeType::DeliveryMethod,
    ];
    let attr = attrs.iter().copied().find(|attr| {
        snapshot.used_alias(&group.customer_id, *attr, representative.raw_value(*attr))
    })?;
    Some(ReviewQueueEntry {
        id: Uuid::new_v4().to_string(),
        customer_id: group.customer_id.clone(),
        attr_type: attr,
        raw_value: representative.raw_value(attr).to_string(),
        suggested_canon_value: representative.norm.value(attr).to_string(),
        confidence: pair.aggregate,
        status: ReviewStatus::Pending,
        shipment_id: representative.shipment_id.clone(),
        order_id: Some(order.order_id.clone()),
        run_id: run_id.to_string(),
        suggested_ts: Utc::now().naive_utc(),
        approved_by: None,
        approved_ts: None,
        promoted_at: None,
    })
}

/// The alias mapping a queue entry promotes into. Customer-scoped: approvals
/// are specific to the customer whose data produced the suggestion.
pub fn alias_from_entry(entry: &ReviewQueueEntry) -> AliasMapping {
    AliasMapping {
        customer_id: Some(entry.customer_id.clone()),
        attr_type: entry.attr_type,
        raw_value: entry.raw_value.clone(),
        canon_value: entry.suggested_canon_value.clone(),
        confidence: entry.confidence,
        approved_by: entry.approved_by.clone(),
        approved_ts: entry.approved_ts,
    }
}

/// Promotes every externally-approved, not-yet-promoted queue entry into the
/// alias store. Each entry is claimed and upserted in one transaction: a lost
/// claim race no-ops, and a failed upsert rolls the claim back so the entry
/// stays eligible for the next pass. Running this twice has the same effect
/// as running it once.
pub async fn promote_approved(pool: &PgPool) -> Result<PromotionStats> {
    let entries = db::fetch_approved_unpromoted(pool)
        .await
        .context("Failed to fetch approved review queue entries")?;
    info!("Alias promotion: {} approved entries pending", entries.len());

    let mut stats = PromotionStats::default();
    for entry in entries {
        let result = db::promote_entry(pool, &entry, &alias_from_entry(&entry)).await;
        if let Err(e) = &result {
            warn!(
                "Failed to promote queue entry {}, left for the next pass: {}",
                entry.id, e
            );
        }
        stats.record(&result);
    }

    info!(
        "Alias promotion complete: {} promoted, {} already promoted, {} errors",
        stats.promoted_count, stats.already_promoted, stats.errors
    );
    Ok(stats)
}
