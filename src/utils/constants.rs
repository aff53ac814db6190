// src/utils/constants.rs

/// Default score at or above which a Layer 1 match is accepted without review.
pub const DEFAULT_HI_THRESHOLD: f64 = 0.85;

/// Default score at or above which a Layer 1 match is queued for review
/// rather than discarded.
pub const DEFAULT_LOW_THRESHOLD: f64 = 0.60;

/// Default quantity tolerance: shipped quantity may deviate from ordered
/// quantity by this fraction and still classify EXACT_OK.
pub const DEFAULT_QTY_TOLERANCE_PCT: f64 = 0.05;

/// Default attribute weights. Style must dominate; the classifier additionally
/// enforces the hard style-identity cap independent of these.
pub const DEFAULT_STYLE_WEIGHT: f64 = 0.40;
pub const DEFAULT_PO_WEIGHT: f64 = 0.25;
pub const DEFAULT_COLOR_WEIGHT: f64 = 0.15;
pub const DEFAULT_DELIVERY_WEIGHT: f64 = 0.10;
pub const DEFAULT_QUANTITY_WEIGHT: f64 = 0.10;

/// NO_MATCH pairs scoring within this band below the low threshold still get
/// a review queue suggestion; anything further out is noise.
pub const SUGGESTION_BAND: f64 = 0.10;

/// Row chunk size for batched INSERTs.
pub const BATCH_DB_OPS_SIZE: usize = 500;
