// src/matching/classify.rs
//
// Threshold classification. Ties are inclusive on the lower bound: a score of
// exactly hi_threshold is HI_CONF, exactly low_threshold is LOW_CONF. This is
// a documented contract, not an accident of float comparison.
use crate::config::MatchingConfig;
use crate::models::matching::{CandidatePair, MatchFlag};

pub fn classify(score: f64, cfg: &MatchingConfig) -> MatchFlag {
    if score >= cfg.hi_threshold {
        MatchFlag::HiConf
    } else if score >= cfg.low_threshold {
        MatchFlag::LowConf
    } else {
        MatchFlag::NoMatch
    }
}

/// Classification with the hard style rule applied: a pair whose styles are
/// not canonically identical can never exceed LOW_CONF, whatever its
/// aggregate score. Style identity is a business rule, not a fuzzy dimension.
pub fn classify_pair(pair: &CandidatePair, cfg: &MatchingConfig) -> MatchFlag {
    let flag = classify(pair.aggregate, cfg);
    if flag == MatchFlag::HiConf && !pair.style_exact {
        MatchFlag::LowConf
    } else {
        flag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::matching::AttributeScores;

    fn pair(aggregate: f64, style_exact: bool) -> CandidatePair {
        CandidatePair {
            group_idx: 0,
            order_idx: 0,
            scores: AttributeScores::default(),
            aggregate,
            style_exact,
        }
    }

    #[test]
    fn test_boundary_scores() {
        let cfg = MatchingConfig::default();
        assert_eq!(classify(0.85, &cfg), MatchFlag::HiConf);
        assert_eq!(classify(0.60, &cfg), MatchFlag::LowConf);
        assert_eq!(classify(0.599999, &cfg), MatchFlag::NoMatch);
        assert_eq!(classify(0.849999, &cfg), MatchFlag::LowConf);
    }

    #[test]
    fn test_style_cap_downgrades_hi_conf() {
        let cfg = MatchingConfig::default();
        assert_eq!(classify_pair(&pair(0.95, false), &cfg), MatchFlag::LowConf);
        assert_eq!(classify_pair(&pair(0.95, true), &cfg), MatchFlag::HiConf);
    }

    #[test]
    fn test_style_cap_leaves_no_match_alone() {
        let cfg = MatchingConfig::default();
        assert_eq!(classify_pair(&pair(0.3, false), &cfg), MatchFlag::NoMatch);
        assert_eq!(classify_pair(&pair(0.7, false), &cfg), MatchFlag::LowConf);
    }
}
