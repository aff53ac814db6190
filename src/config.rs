// src/config.rs
use anyhow::{bail, Result};
use log::info;
use std::collections::HashMap;
use std::env;

use crate::utils::constants::{
    DEFAULT_COLOR_WEIGHT, DEFAULT_DELIVERY_WEIGHT, DEFAULT_HI_THRESHOLD, DEFAULT_LOW_THRESHOLD,
    DEFAULT_PO_WEIGHT, DEFAULT_QTY_TOLERANCE_PCT, DEFAULT_QUANTITY_WEIGHT, DEFAULT_STYLE_WEIGHT,
};

/// Relative weights for the Layer 1 aggregate score. Normalized by their sum
/// at aggregation time, so they need not add up to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeWeights {
    pub style: f64,
    pub po: f64,
    pub color: f64,
    pub delivery_method: f64,
    pub quantity: f64,
}

impl Default for AttributeWeights {
    fn default() -> Self {
        Self {
            style: DEFAULT_STYLE_WEIGHT,
            po: DEFAULT_PO_WEIGHT,
            color: DEFAULT_COLOR_WEIGHT,
            delivery_method: DEFAULT_DELIVERY_WEIGHT,
            quantity: DEFAULT_QUANTITY_WEIGHT,
        }
    }
}

impl AttributeWeights {
    pub fn sum(&self) -> f64 {
        self.style + self.po + self.color + self.delivery_method + self.quantity
    }
}

/// Matching policy for one run of one customer block: thresholds, quantity
/// tolerance, attribute weights, and review-queue behavior. Resolved once at
/// run start and never re-read mid-run.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
    pub qty_tolerance_pct: f64,
    pub hi_threshold: f64,
    pub low_threshold: f64,
    pub weights: AttributeWeights,
    /// Also queue an audit entry for HI_CONF matches that leaned on an alias.
    pub record_hi_conf_audit: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            qty_tolerance_pct: DEFAULT_QTY_TOLERANCE_PCT,
            hi_threshold: DEFAULT_HI_THRESHOLD,
            low_threshold: DEFAULT_LOW_THRESHOLD,
            weights: AttributeWeights::default(),
            record_hi_conf_audit: false,
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

impl MatchingConfig {
    pub fn from_env() -> Self {
        let cfg = Self {
            qty_tolerance_pct: env_f64("RECON_QTY_TOLERANCE_PCT", DEFAULT_QTY_TOLERANCE_PCT),
            hi_threshold: env_f64("RECON_HI_THRESHOLD", DEFAULT_HI_THRESHOLD),
            low_threshold: env_f64("RECON_LOW_THRESHOLD", DEFAULT_LOW_THRESHOLD),
            weights: AttributeWeights {
                style: env_f64("RECON_WEIGHT_STYLE", DEFAULT_STYLE_WEIGHT),
                po: env_f64("RECON_WEIGHT_PO", DEFAULT_PO_WEIGHT),
                color: env_f64("RECON_WEIGHT_COLOR", DEFAULT_COLOR_WEIGHT),
                delivery_method: env_f64("RECON_WEIGHT_DELIVERY", DEFAULT_DELIVERY_WEIGHT),
                quantity: env_f64("RECON_WEIGHT_QUANTITY", DEFAULT_QUANTITY_WEIGHT),
            },
            record_hi_conf_audit: env::var("RECON_RECORD_HI_CONF_AUDIT")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        };
        info!(
            "Matching config: hi={}, low={}, qty_tol={}, weights(style={}, po={}, color={}, delivery={}, qty={})",
            cfg.hi_threshold,
            cfg.low_threshold,
            cfg.qty_tolerance_pct,
            cfg.weights.style,
            cfg.weights.po,
            cfg.weights.color,
            cfg.weights.delivery_method,
            cfg.weights.quantity
        );
        cfg
    }

    /// Fatal at startup: bad thresholds or weights break the determinism
    /// contract and must never reach the matching layers.
    pub fn validate(&self) -> Result<()> {
        if !(0.0 < self.low_threshold && self.low_threshold < self.hi_threshold && self.hi_threshold <= 1.0)
        {
            bail!(
                "Invalid thresholds: low={} hi={} (need 0 < low < hi <= 1)",
                self.low_threshold,
                self.hi_threshold
            );
        }
        if self.qty_tolerance_pct < 0.0 {
            bail!("Quantity tolerance must be non-negative, got {}", self.qty_tolerance_pct);
        }
        let w = &self.weights;
        for (name, value) in [
            ("style", w.style),
            ("po", w.po),
            ("color", w.color),
            ("delivery_method", w.delivery_method),
            ("quantity", w.quantity),
        ] {
            if value < 0.0 {
                bail!("Attribute weight '{}' must be non-negative, got {}", name, value);
            }
        }
        if w.sum() <= 0.0 {
            bail!("Attribute weights sum to zero");
        }
        // Style identity is the anchor of the whole scheme. A configuration
        // where any other attribute outweighs it is a mistake, not a tuning.
        if w.style <= w.po
            || w.style <= w.color
            || w.style <= w.delivery_method
            || w.style <= w.quantity
        {
            bail!("Style weight must strictly dominate all other attribute weights");
        }
        Ok(())
    }

    pub fn apply_override(&self, ov: &CustomerOverride) -> MatchingConfig {
        let mut cfg = self.clone();
        if let Some(v) = ov.qty_tolerance_pct {
            cfg.qty_tolerance_pct = v;
        }
        if let Some(v) = ov.hi_threshold {
            cfg.hi_threshold = v;
        }
        if let Some(v) = ov.low_threshold {
            cfg.low_threshold = v;
        }
        if let Some(v) = ov.style_weight {
            cfg.weights.style = v;
        }
        if let Some(v) = ov.po_weight {
            cfg.weights.po = v;
        }
        if let Some(v) = ov.color_weight {
            cfg.weights.color = v;
        }
        if let Some(v) = ov.delivery_weight {
            cfg.weights.delivery_method = v;
        }
        if let Some(v) = ov.quantity_weight {
            cfg.weights.quantity = v;
        }
        cfg
    }
}

/// Per-customer tuning row from matching.customer_config. Absent fields fall
/// back to the global defaults.
#[derive(Debug, Clone, Default)]
pub struct CustomerOverride {
    pub customer_id: String,
    pub qty_tolerance_pct: Option<f64>,
    pub hi_threshold: Option<f64>,
    pub low_threshold: Option<f64>,
    pub style_weight: Option<f64>,
    pub po_weight: Option<f64>,
    pub color_weight: Option<f64>,
    pub delivery_weight: Option<f64>,
    pub quantity_weight: Option<f64>,
}

/// Resolves the effective config for each customer once at run start.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    base: MatchingConfig,
    overrides: HashMap<String, CustomerOverride>,
}

impl ConfigResolver {
    pub fn new(base: MatchingConfig, overrides: Vec<CustomerOverride>) -> Result<Self> {
        base.validate()?;
        let mut map = HashMap::new();
        for ov in overrides {
            let resolved = base.apply_override(&ov);
            resolved.validate().map_err(|e| {
                anyhow::anyhow!("Invalid override for customer '{}': {}", ov.customer_id, e)
            })?;
            map.insert(ov.customer_id.clone(), ov);
        }
        Ok(Self { base, overrides: map })
    }

    pub fn for_customer(&self, customer_id: &str) -> MatchingConfig {
        match self.overrides.get(customer_id) {
            Some(ov) => self.base.apply_override(ov),
            None => self.base.clone(),
        }
    }

    pub fn base(&self) -> &MatchingConfig {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(MatchingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_style_weight_must_dominate() {
        let mut cfg = MatchingConfig::default();
        cfg.weights.po = cfg.weights.style;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_threshold_ordering_enforced() {
        let mut cfg = MatchingConfig::default();
        cfg.low_threshold = 0.9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_customer_override_resolution() {
        let ov = CustomerOverride {
            customer_id: "C9".to_string(),
            hi_threshold: Some(0.9),
            ..Default::default()
        };
        let resolver = ConfigResolver::new(MatchingConfig::default(), vec![ov]).unwrap();
        assert_eq!(resolver.for_customer("C9").hi_threshold, 0.9);
        assert_eq!(
            resolver.for_customer("other").hi_threshold,
            MatchingConfig::default().hi_threshold
        );
    }

    #[test]
    fn test_invalid_override_rejected_at_startup() {
        let ov = CustomerOverride {
            customer_id: "C9".to_string(),
            low_threshold: Some(0.95),
            ..Default::default()
        };
        assert!(ConfigResolver::new(MatchingConfig::default(), vec![ov]).is_err());
    }
}
