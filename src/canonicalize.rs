// src/canonicalize.rs
//
// Alias-table canonicalization. The snapshot is built once per run from the
// alias store and never mutated mid-run; promotion only affects the next run.
use anyhow::{bail, Result};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::models::core::{AliasMapping, AttributeType, NormalizedAttrs, OrderRecord, ShipmentRecord};

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("invalid whitespace regex"));

/// Fallback normalization for values with no alias mapping: trim, uppercase,
/// collapse internal whitespace.
pub fn normalize_value(raw: &str) -> String {
    WHITESPACE_RE.replace_all(raw.trim(), " ").to_uppercase()
}

type AliasKey = (Option<String>, AttributeType, String);

/// Immutable per-run view of the alias table. Lookup is two-tier:
/// customer-specific first, then global, then `normalize_value` passthrough.
#[derive(Debug, Clone)]
pub struct AliasSnapshot {
    mappings: HashMap<AliasKey, String>,
}

impl AliasSnapshot {
    pub fn empty() -> Self {
        Self {
            mappings: HashMap::new(),
        }
    }

    /// Builds the snapshot, refusing to start on an ambiguous alias: two
    /// active canonical targets for one (customer, attr, raw) key would make
    /// run results depend on load order.
    pub fn build(rows: Vec<AliasMapping>) -> Result<Self> {
        let mut mappings: HashMap<AliasKey, String> = HashMap::new();
        for row in rows {
            let raw_key = normalize_value(&row.raw_value);
            let canon = normalize_value(&row.canon_value);
            let key = (row.customer_id.clone(), row.attr_type, raw_key);
            if let Some(existing) = mappings.get(&key) {
                if *existing != canon {
                    bail!(
                        "Ambiguous alias for (customer={:?}, attr={}, raw='{}'): '{}' vs '{}'",
                        key.0,
                        key.1.as_str(),
                        key.2,
                        existing,
                        canon
                    );
                }
                debug!(
                    "Duplicate identical alias row for (customer={:?}, attr={}, raw='{}')",
                    key.0,
                    key.1.as_str(),
                    key.2
                );
                continue;
            }
            mappings.insert(key, canon);
        }
        info!("Alias snapshot loaded: {} active mappings", mappings.len());
        Ok(Self { mappings })
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Canonicalizes one attribute value for one customer.
    pub fn canonicalize(&self, customer_id: &str, attr: AttributeType, raw: &str) -> String {
        let normalized = normalize_value(raw);
        let customer_key = (Some(customer_id.to_string()), attr, normalized.clone());
        if let Some(canon) = self.mappings.get(&customer_key) {
            return canon.clone();
        }
        let global_key = (None, attr, normalized.clone());
        if let Some(canon) = self.mappings.get(&global_key) {
            return canon.clone();
        }
        normalized
    }

    /// True when the canonical form came from an alias row rather than the
    /// normalization fallback. Used for HI_CONF audit entries.
    pub fn used_alias(&self, customer_id: &str, attr: AttributeType, raw: &str) -> bool {
        let normalized = normalize_value(raw);
        self.mappings
            .contains_key(&(Some(customer_id.to_string()), attr, normalized.clone()))
            || self.mappings.contains_key(&(None, attr, normalized))
    }

    fn normalized_attrs(
        &self,
        customer_id: &str,
        style: &str,
        color: &str,
        po: &str,
        alt_po: &str,
        delivery: &str,
    ) -> NormalizedAttrs {
        NormalizedAttrs {
            style: self.canonicalize(customer_id, AttributeType::Style, style),
            color: self.canonicalize(customer_id, AttributeType::Color, color),
            po: self.canonicalize(customer_id, AttributeType::Po, po),
            alt_po: self.canonicalize(customer_id, AttributeType::AltPo, alt_po),
            delivery_method: self.canonicalize(customer_id, AttributeType::DeliveryMethod, delivery),
        }
    }

    pub fn canonicalize_order(&self, mut order: OrderRecord) -> OrderRecord {
        order.norm = self.normalized_attrs(
            &order.customer_id,
            &order.style_raw,
            &order.color_raw,
            &order.po_raw,
            &order.alt_po_raw,
            &order.delivery_method_raw,
        );
        order
    }

    pub fn canonicalize_shipment(&self, mut shipment: ShipmentRecord) -> ShipmentRecord {
        shipment.norm = self.normalized_attrs(
            &shipment.customer_id,
            &shipment.style_raw,
            &shipment.color_raw,
            &shipment.po_raw,
            &shipment.alt_po_raw,
            &shipment.delivery_method_raw,
        );
        shipment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias(
        customer: Option<&str>,
        attr: AttributeType,
        raw: &str,
        canon: &str,
    ) -> AliasMapping {
        AliasMapping {
            customer_id: customer.map(|s| s.to_string()),
            attr_type: attr,
            raw_value: raw.to_string(),
            canon_value: canon.to_string(),
            confidence: 1.0,
            approved_by: Some("tester".to_string()),
            approved_ts: None,
        }
    }

    #[test]
    fn test_normalize_value() {
        assert_eq!(normalize_value("  navy   blue "), "NAVY BLUE");
        assert_eq!(normalize_value("Ground\t Freight"), "GROUND FREIGHT");
        assert_eq!(normalize_value(""), "");
    }

    #[test]
    fn test_customer_mapping_beats_global() {
        let snapshot = AliasSnapshot::build(vec![
            alias(None, AttributeType::Color, "NVY", "NAVY"),
            alias(Some("C1"), AttributeType::Color, "NVY", "NAVY BLUE"),
        ])
        .unwrap();
        assert_eq!(snapshot.canonicalize("C1", AttributeType::Color, "nvy"), "NAVY BLUE");
        assert_eq!(snapshot.canonicalize("C2", AttributeType::Color, "nvy"), "NAVY");
    }

    #[test]
    fn test_unmapped_value_passes_through_normalized() {
        let snapshot = AliasSnapshot::empty();
        assert_eq!(
            snapshot.canonicalize("C1", AttributeType::Style, " ab-12 x "),
            "AB-12 X"
        );
    }

    #[test]
    fn test_ambiguous_alias_is_fatal() {
        let result = AliasSnapshot::build(vec![
            alias(Some("C1"), AttributeType::Style, "S1-V2", "S1"),
            alias(Some("C1"), AttributeType::Style, "S1-V2", "S1X"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_identical_alias_is_tolerated() {
        let snapshot = AliasSnapshot::build(vec![
            alias(Some("C1"), AttributeType::Style, "S1-V2", "S1"),
            alias(Some("C1"), AttributeType::Style, "s1-v2 ", "s1"),
        ])
        .unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_used_alias_flags_only_mapped_values() {
        let snapshot =
            AliasSnapshot::build(vec![alias(None, AttributeType::Po, "PO-1", "PO1")]).unwrap();
        assert!(snapshot.used_alias("C1", AttributeType::Po, "po-1"));
        assert!(!snapshot.used_alias("C1", AttributeType::Po, "PO9"));
    }
}
