// src/models/core.rs
use anyhow::{bail, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The attribute vocabularies the canonicalizer manages. Anything else in the
/// alias store is a configuration error, not bad row data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    Style,
    Color,
    Po,
    AltPo,
    DeliveryMethod,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::Style => "style",
            AttributeType::Color => "color",
            AttributeType::Po => "po",
            AttributeType::AltPo => "alt_po",
            AttributeType::DeliveryMethod => "delivery_method",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "style" => Ok(AttributeType::Style),
            "color" => Ok(AttributeType::Color),
            "po" => Ok(AttributeType::Po),
            "alt_po" => Ok(AttributeType::AltPo),
            "delivery_method" => Ok(AttributeType::DeliveryMethod),
            other => bail!("Unknown attribute type in alias store: '{}'", other),
        }
    }
}

/// Canonicalized attribute values, populated by the canonicalizer before any
/// matching layer runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedAttrs {
    pub style: String,
    pub color: String,
    pub po: String,
    pub alt_po: String,
    pub delivery_method: String,
}

#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub customer_id: String,
    pub order_id: String,
    pub style_raw: String,
    pub color_raw: String,
    pub po_raw: String,
    pub alt_po_raw: String,
    pub delivery_method_raw: String,
    pub qty: i64,
    pub norm: NormalizedAttrs,
}

#[derive(Debug, Clone)]
pub struct ShipmentRecord {
    pub customer_id: String,
    pub shipment_id: String,
    pub style_raw: String,
    pub color_raw: String,
    pub po_raw: String,
    pub alt_po_raw: String,
    pub delivery_method_raw: String,
    pub qty: i64,
    pub norm: NormalizedAttrs,
}

impl OrderRecord {
    /// A row missing its identifying fields can never be matched; it is
    /// excluded up front and counted, not failed.
    pub fn is_well_formed(&self) -> bool {
        !self.customer_id.trim().is_empty()
            && !self.order_id.trim().is_empty()
            && !self.style_raw.trim().is_empty()
            && !self.po_raw.trim().is_empty()
            && self.qty >= 0
    }
}

impl ShipmentRecord {
    pub fn is_well_formed(&self) -> bool {
        !self.customer_id.trim().is_empty()
            && !self.shipment_id.trim().is_empty()
            && !self.style_raw.trim().is_empty()
            && !self.po_raw.trim().is_empty()
            && self.qty >= 0
    }

    pub fn raw_value(&self, attr: AttributeType) -> &str {
        match attr {
            AttributeType::Style => &self.style_raw,
            AttributeType::Color => &self.color_raw,
            AttributeType::Po => &self.po_raw,
            AttributeType::AltPo => &self.alt_po_raw,
            AttributeType::DeliveryMethod => &self.delivery_method_raw,
        }
    }
}

impl NormalizedAttrs {
    pub fn value(&self, attr: AttributeType) -> &str {
        match attr {
            AttributeType::Style => &self.style,
            AttributeType::Color => &self.color,
            AttributeType::Po => &self.po,
            AttributeType::AltPo => &self.alt_po,
            AttributeType::DeliveryMethod => &self.delivery_method,
        }
    }
}

/// One approved raw-value -> canonical-value mapping. `customer_id = None`
/// is the global fallback tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasMapping {
    pub customer_id: Option<String>,
    pub attr_type: AttributeType,
    pub raw_value: String,
    pub canon_value: String,
    pub confidence: f64,
    pub approved_by: Option<String>,
    pub approved_ts: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "PENDING",
            ReviewStatus::Approved => "APPROVED",
            ReviewStatus::Rejected => "REJECTED",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(ReviewStatus::Pending),
            "APPROVED" => Ok(ReviewStatus::Approved),
            "REJECTED" => Ok(ReviewStatus::Rejected),
            other => bail!("Unknown review status: '{}'", other),
        }
    }
}

/// A suggested canonical mapping awaiting human adjudication. Approval is set
/// externally; this engine only creates Pending rows and promotes Approved
/// ones.
#[derive(Debug, Clone)]
pub struct ReviewQueueEntry {
    pub id: String,
    pub customer_id: String,
    pub attr_type: AttributeType,
    pub raw_value: String,
    pub suggested_canon_value: String,
    pub confidence: f64,
    pub status: ReviewStatus,
    pub shipment_id: String,
    pub order_id: Option<String>,
    pub run_id: String,
    pub suggested_ts: NaiveDateTime,
    pub approved_by: Option<String>,
    pub approved_ts: Option<NaiveDateTime>,
    pub promoted_at: Option<NaiveDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_type_round_trip() {
        for attr in [
            AttributeType::Style,
            AttributeType::Color,
            AttributeType::Po,
            AttributeType::AltPo,
            AttributeType::DeliveryMethod,
        ] {
            assert_eq!(AttributeType::from_str(attr.as_str()).unwrap(), attr);
        }
        assert!(AttributeType::from_str("colour").is_err());
    }

    #[test]
    fn test_malformed_rows_detected() {
        let mut shipment = ShipmentRecord {
            customer_id: "C1".to_string(),
            shipment_id: "SH1".to_string(),
            style_raw: "S1".to_string(),
            color_raw: "RED".to_string(),
            po_raw: "PO1".to_string(),
            alt_po_raw: String::new(),
            delivery_method_raw: "GROUND".to_string(),
            qty: 10,
            norm: NormalizedAttrs::default(),
        };
        assert!(shipment.is_well_formed());
        shipment.po_raw = "  ".to_string();
        assert!(!shipment.is_well_formed());
    }
}
