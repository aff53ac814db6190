// src/db.rs - all SQL for the reconciliation engine lives here.
//
// The matching core never touches a connection; these functions load inputs
// once at run start and persist outputs once at run end.
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use postgres_types::ToSql;
use tokio_postgres::Row;

use crate::config::CustomerOverride;
use crate::models::core::{
    AliasMapping, AttributeType, NormalizedAttrs, OrderRecord, ReviewQueueEntry, ReviewStatus,
    ShipmentRecord,
};
use crate::models::matching::MatchResultRecord;
use crate::models::stats::{PromotionOutcome, RunSummary};
use crate::utils::constants::BATCH_DB_OPS_SIZE;
use crate::utils::db_connect::PgPool;

fn order_from_row(row: &Row) -> OrderRecord {
    OrderRecord {
        customer_id: row.get("customer_id"),
        order_id: row.get("order_id"),
        style_raw: row.get::<_, Option<String>>("style").unwrap_or_default(),
        color_raw: row.get::<_, Option<String>>("color").unwrap_or_default(),
        po_raw: row.get::<_, Option<String>>("po").unwrap_or_default(),
        alt_po_raw: row.get::<_, Option<String>>("alt_po").unwrap_or_default(),
        delivery_method_raw: row
            .get::<_, Option<String>>("delivery_method")
            .unwrap_or_default(),
        qty: row.get::<_, Option<i64>>("qty").unwrap_or(-1),
        norm: NormalizedAttrs::default(),
    }
}

fn shipment_from_row(row: &Row) -> ShipmentRecord {
    ShipmentRecord {
        customer_id: row.get("customer_id"),
        shipment_id: row.get("shipment_id"),
        style_raw: row.get::<_, Option<String>>("style").unwrap_or_default(),
        color_raw: row.get::<_, Option<String>>("color").unwrap_or_default(),
        po_raw: row.get::<_, Option<String>>("po").unwrap_or_default(),
        alt_po_raw: row.get::<_, Option<String>>("alt_po").unwrap_or_default(),
        delivery_method_raw: row
            .get::<_, Option<String>>("delivery_method")
            .unwrap_or_default(),
        qty: row.get::<_, Option<i64>>("qty").unwrap_or(-1),
        norm: NormalizedAttrs::default(),
    }
}

pub async fn fetch_orders(
    pool: &PgPool,
    customer_id: Option<&str>,
    as_of: NaiveDate,
) -> Result<Vec<OrderRecord>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for fetch_orders")?;
    let rows = conn
        .query(
            "SELECT customer_id, order_id, style, color, po, alt_po, delivery_method, qty
             FROM matching.orders
             WHERE as_of_date = $2 AND ($1::text IS NULL OR customer_id = $1)",
            &[&customer_id, &as_of],
        )
        .await
        .context("Failed to query orders")?;
    Ok(rows.iter().map(order_from_row).collect())
}

pub async fn fetch_shipments(
    pool: &PgPool,
    customer_id: Option<&str>,
    as_of: NaiveDate,
) -> Result<Vec<ShipmentRecord>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for fetch_shipments")?;
    let rows = conn
        .query(
            "SELECT customer_id, shipment_id, style, color, po, alt_po, delivery_method, qty
             FROM matching.shipments
             WHERE as_of_date = $2 AND ($1::text IS NULL OR customer_id = $1)",
            &[&customer_id, &as_of],
        )
        .await
        .context("Failed to query shipments")?;
    Ok(rows.iter().map(shipment_from_row).collect())
}

/// Reads the whole active alias table once. The caller builds the immutable
/// per-run snapshot from this; nothing re-reads mid-run.
pub async fn fetch_alias_snapshot(pool: &PgPool) -> Result<Vec<AliasMapping>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for fetch_alias_snapshot")?;
    let rows = conn
        .query(
            "SELECT customer_id, attr_type, raw_value, canon_value, confidence, approved_by, approved_ts
             FROM matching.alias_mapping
             WHERE active",
            &[],
        )
        .await
        .context("Failed to query alias mappings")?;

    let mut mappings = Vec::with_capacity(rows.len());
    for row in &rows {
        let attr_str: String = row.get("attr_type");
        mappings.push(AliasMapping {
            customer_id: row.get("customer_id"),
            // Unknown attr_type in the store is a configuration error, fatal
            // at load, never per-record.
            attr_type: AttributeType::from_str(&attr_str)?,
            raw_value: row.get("raw_value"),
            canon_value: row.get("canon_value"),
            confidence: row.get("confidence"),
            approved_by: row.get("approved_by"),
            approved_ts: row.get("approved_ts"),
        });
    }
    debug!("Fetched {} active alias mappings", mappings.len());
    Ok(mappings)
}

pub async fn fetch_customer_overrides(pool: &PgPool) -> Result<Vec<CustomerOverride>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for fetch_customer_overrides")?;
    let rows = conn
        .query(
            "SELECT customer_id, qty_tolerance_pct, hi_threshold, low_threshold,
                    style_weight, po_weight, color_weight, delivery_weight, quantity_weight
             FROM matching.customer_config",
            &[],
        )
        .await
        .context("Failed to query customer config overrides")?;
    Ok(rows
        .iter()
        .map(|row| CustomerOverride {
            customer_id: row.get("customer_id"),
            qty_tolerance_pct: row.get("qty_tolerance_pct"),
            hi_threshold: row.get("hi_threshold"),
            low_threshold: row.get("low_threshold"),
            style_weight: row.get("style_weight"),
            po_weight: row.get("po_weight"),
            color_weight: row.get("color_weight"),
            delivery_weight: row.get("delivery_weight"),
            quantity_weight: row.get("quantity_weight"),
        })
        .collect())
}

pub async fn create_run_record(
    pool: &PgPool,
    run_id: &str,
    run_timestamp: NaiveDateTime,
    customer_id: Option<&str>,
) -> Result<()> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for create_run_record")?;
    conn.execute(
        "INSERT INTO matching.run (id, run_timestamp, customer_scope, completed)
         VALUES ($1, $2, $3, FALSE)",
        &[&run_id, &run_timestamp, &customer_id],
    )
    .await
    .context("Failed to insert run record")?;
    info!("Created run record {}", run_id);
    Ok(())
}

/// Marks the run complete and stores its summary counts. Partial results from
/// an interrupted run stay attached to an incomplete run row and are never
/// treated as final.
pub async fn finalize_run_record(pool: &PgPool, summary: &RunSummary) -> Result<()> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for finalize_run_record")?;
    conn.execute(
        "UPDATE matching.run
         SET completed = TRUE,
             total_shipments = $2, total_orders = $3,
             exact_ok = $4, exact_qty_mismatch = $5, hi_conf = $6, low_conf = $7, no_match = $8,
             malformed_shipments = $9, malformed_orders = $10,
             review_entries_created = $11, matching_time = $12
         WHERE id = $1",
        &[
            &summary.run_id,
            &(summary.total_shipments as i64),
            &(summary.total_orders as i64),
            &(summary.exact_ok as i64),
            &(summary.exact_qty_mismatch as i64),
            &(summary.hi_conf as i64),
            &(summary.low_conf as i64),
            &(summary.no_match as i64),
            &(summary.malformed_shipments as i64),
            &(summary.malformed_orders as i64),
            &(summary.review_entries_created as i64),
            &summary.matching_time,
        ],
    )
    .await
    .context("Failed to finalize run record")?;
    Ok(())
}

pub async fn batch_insert_match_results(
    pool: &PgPool,
    results: &[MatchResultRecord],
) -> Result<()> {
    if results.is_empty() {
        return Ok(());
    }
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for batch_insert_match_results")?;

    for chunk in results.chunks(BATCH_DB_OPS_SIZE) {
        let mut sql = String::from(
            "INSERT INTO matching.match_results
             (shipment_id, order_id, customer_id, match_flag, score, layer, run_id, score_detail)
             VALUES ",
        );
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * 8);
        let flags: Vec<&'static str> = chunk.iter().map(|r| r.match_flag.as_str()).collect();
        for (i, result) in chunk.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let base = i * 8;
            sql.push_str(&format!(
                "(${}, ${}, ${}, ${}, ${}, ${}, ${}, ${})",
                base + 1,
                base + 2,
                base + 3,
                base + 4,
                base + 5,
                base + 6,
                base + 7,
                base + 8
            ));
            params.push(&result.shipment_id);
            params.push(&result.order_id);
            params.push(&result.customer_id);
            params.push(&flags[i]);
            params.push(&result.score);
            params.push(&result.layer);
            params.push(&result.run_id);
            params.push(&result.score_detail);
        }
        conn.execute(sql.as_str(), &params)
            .await
            .context("Failed to batch insert match results")?;
    }
    debug!("Inserted {} match result rows", results.len());
    Ok(())
}

pub async fn batch_insert_review_queue_entries(
    pool: &PgPool,
    entries: &[ReviewQueueEntry],
) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for batch_insert_review_queue_entries")?;

    for chunk in entries.chunks(BATCH_DB_OPS_SIZE) {
        let mut sql = String::from(
            "INSERT INTO matching.review_queue
             (id, customer_id, attr_type, raw_value, suggested_canon_value, confidence,
              status, shipment_id, order_id, run_id, suggested_ts)
             VALUES ",
        );
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * 11);
        let attrs: Vec<&'static str> = chunk.iter().map(|e| e.attr_type.as_str()).collect();
        let statuses: Vec<&'static str> = chunk.iter().map(|e| e.status.as_str()).collect();
        for (i, entry) in chunk.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let base = i * 11;
            sql.push_str(&format!(
                "(${}, ${}, ${}, ${}, ${}, ${}, ${}, ${}, ${}, ${}, ${})",
                base + 1,
                base + 2,
                base + 3,
                base + 4,
                base + 5,
                base + 6,
                base + 7,
                base + 8,
                base + 9,
                base + 10,
                base + 11
            ));
            params.push(&entry.id);
            params.push(&entry.customer_id);
            params.push(&attrs[i]);
            params.push(&entry.raw_value);
            params.push(&entry.suggested_canon_value);
            params.push(&entry.confidence);
            params.push(&statuses[i]);
            params.push(&entry.shipment_id);
            params.push(&entry.order_id);
            params.push(&entry.run_id);
            params.push(&entry.suggested_ts);
        }
        conn.execute(sql.as_str(), &params)
            .await
            .context("Failed to batch insert review queue entries")?;
    }
    debug!("Inserted {} review queue entries", entries.len());
    Ok(())
}

/// Entries approved by a reviewer that promotion has not consumed yet.
pub async fn fetch_approved_unpromoted(pool: &PgPool) -> Result<Vec<ReviewQueueEntry>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for fetch_approved_unpromoted")?;
    let rows = conn
        .query(
            "SELECT id, customer_id, attr_type, raw_value, suggested_canon_value, confidence,
                    status, shipment_id, order_id, run_id, suggested_ts,
                    approved_by, approved_ts, promoted_at
             FROM matching.review_queue
             WHERE status = 'APPROVED' AND promoted_at IS NULL
             ORDER BY suggested_ts ASC",
            &[],
        )
        .await
        .context("Failed to query approved review queue entries")?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in &rows {
        let attr_str: String = row.get("attr_type");
        let status_str: String = row.get("status");
        entries.push(ReviewQueueEntry {
            id: row.get("id"),
            customer_id: row.get("customer_id"),
            attr_type: AttributeType::from_str(&attr_str)?,
            raw_value: row.get("raw_value"),
            suggested_canon_value: row.get("suggested_canon_value"),
            confidence: row.get("confidence"),
            status: ReviewStatus::from_str(&status_str)?,
            shipment_id: row.get("shipment_id"),
            order_id: row.get("order_id"),
            run_id: row.get("run_id"),
            suggested_ts: row.get("suggested_ts"),
            approved_by: row.get("approved_by"),
            approved_ts: row.get("approved_ts"),
            promoted_at: row.get("promoted_at"),
        });
    }
    Ok(entries)
}

/// Promotes one approved queue entry inside a single transaction: the UPDATE
/// that stamps promoted_at claims the entry, the alias upsert follows, and
/// both commit together. A failed upsert rolls the claim back, so the entry
/// stays visible to the next promotion pass. Zero rows claimed means another
/// promoter got there first and the whole transaction no-ops.
pub async fn promote_entry(
    pool: &PgPool,
    entry: &ReviewQueueEntry,
    alias: &AliasMapping,
) -> Result<PromotionOutcome> {
    let mut conn = pool
        .get()
        .await
        .context("Failed to get DB connection for promote_entry")?;
    let tx = conn
        .transaction()
        .await
        .context("Failed to open promotion transaction")?;

    let affected = tx
        .execute(
            "UPDATE matching.review_queue
             SET promoted_at = CURRENT_TIMESTAMP
             WHERE id = $1 AND status = 'APPROVED' AND promoted_at IS NULL",
            &[&entry.id],
        )
        .await
        .context("Failed to claim review queue entry")?;
    if affected == 0 {
        return Ok(PromotionOutcome::AlreadyPromoted);
    }

    // ON CONFLICT keeps the upsert idempotent under repeated promotion of
    // equivalent entries.
    tx.execute(
        "INSERT INTO matching.alias_mapping
         (customer_id, attr_type, raw_value, canon_value, confidence, approved_by, approved_ts, active)
         VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE)
         ON CONFLICT (customer_id, attr_type, raw_value)
         DO UPDATE SET canon_value = EXCLUDED.canon_value,
                       confidence = EXCLUDED.confidence,
                       approved_by = EXCLUDED.approved_by,
                       approved_ts = EXCLUDED.approved_ts,
                       active = TRUE",
        &[
            &alias.customer_id,
            &alias.attr_type.as_str(),
            &alias.raw_value,
            &alias.canon_value,
            &alias.confidence,
            &alias.approved_by,
            &alias.approved_ts,
        ],
    )
    .await
    .context("Failed to upsert alias mapping")?;

    tx.commit()
        .await
        .context("Failed to commit promotion transaction")?;
    Ok(PromotionOutcome::Promoted)
}
