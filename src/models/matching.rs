// src/models/matching.rs
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Discrete outcome bucket for one shipment in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchFlag {
    ExactOk,
    ExactQtyMismatch,
    HiConf,
    LowConf,
    NoMatch,
}

impl MatchFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchFlag::ExactOk => "EXACT_OK",
            MatchFlag::ExactQtyMismatch => "EXACT_QTY_MISMATCH",
            MatchFlag::HiConf => "HI_CONF",
            MatchFlag::LowConf => "LOW_CONF",
            MatchFlag::NoMatch => "NO_MATCH",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "EXACT_OK" => Ok(MatchFlag::ExactOk),
            "EXACT_QTY_MISMATCH" => Ok(MatchFlag::ExactQtyMismatch),
            "HI_CONF" => Ok(MatchFlag::HiConf),
            "LOW_CONF" => Ok(MatchFlag::LowConf),
            "NO_MATCH" => Ok(MatchFlag::NoMatch),
            other => bail!("Unknown match flag: '{}'", other),
        }
    }
}

/// Per-attribute similarity breakdown for one candidate pair. Persisted as
/// JSON alongside the winning result so reviewers can see what drove a score.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AttributeScores {
    pub style: f64,
    pub color: f64,
    pub po: f64,
    pub delivery_method: f64,
    pub quantity: f64,
}

impl AttributeScores {
    pub fn style_exact(&self) -> bool {
        self.style >= 1.0
    }
}

/// Transient scoring artifact: one consolidated shipment group against one
/// order. Indices refer into the block's group/order vectors. Never persisted.
#[derive(Debug, Clone)]
pub struct CandidatePair {
    pub group_idx: usize,
    pub order_idx: usize,
    pub scores: AttributeScores,
    pub aggregate: f64,
    pub style_exact: bool,
}

/// One row per shipment per run. `order_id` is None only for NoMatch.
#[derive(Debug, Clone)]
pub struct MatchResultRecord {
    pub shipment_id: String,
    pub order_id: Option<String>,
    pub customer_id: String,
    pub match_flag: MatchFlag,
    pub score: f64,
    pub layer: i16,
    pub run_id: String,
    pub score_detail: Option<serde_json::Value>,
}

/// A group of still-unmatched shipments sharing (customer, style, color, po),
/// compared to orders as one unit so split shipments sum before the quantity
/// check. Member ids are kept sorted for deterministic tie-breaks.
#[derive(Debug, Clone)]
pub struct ConsolidatedShipment {
    pub customer_id: String,
    pub member_ids: Vec<String>,
    pub member_idxs: Vec<usize>,
    pub qty: i64,
    pub norm: crate::models::core::NormalizedAttrs,
}

impl ConsolidatedShipment {
    /// Smallest member shipment id, used as the deterministic representative
    /// for tie-breaks and raw-value suggestions.
    pub fn representative_id(&self) -> &str {
        &self.member_ids[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_flag_round_trip() {
        for flag in [
            MatchFlag::ExactOk,
            MatchFlag::ExactQtyMismatch,
            MatchFlag::HiConf,
            MatchFlag::LowConf,
            MatchFlag::NoMatch,
        ] {
            assert_eq!(MatchFlag::from_str(flag.as_str()).unwrap(), flag);
        }
    }
}
