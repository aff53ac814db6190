// src/escalation.rs
//
// Optional external scorer for residual NO_MATCH records. Proposals re-enter
// the classifier/resolver exactly like Layer 1 pairs; nothing here bypasses
// the style cap or the 1:1 invariant.
use anyhow::Result;

use crate::models::core::{OrderRecord, ShipmentRecord};

/// A link proposed by an external scorer (an LLM or any other oracle).
/// Confidence is taken as the pair's aggregate score; the style-identity cap
/// is still computed from the records themselves, never trusted from the
/// scorer.
#[derive(Debug, Clone)]
pub struct ProposedLink {
    pub shipment_id: String,
    pub order_id: String,
    pub confidence: f64,
}

pub trait ResidualScorer: Send + Sync {
    fn score_residuals(
        &self,
        orders: &[OrderRecord],
        shipments: &[ShipmentRecord],
    ) -> Result<Vec<ProposedLink>>;
}
