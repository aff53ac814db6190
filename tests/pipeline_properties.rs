// tests/pipeline_properties.rs
//
// End-to-end properties of the pure reconciliation pipeline: totals, 1:1
// assignment, the style cap, split-shipment consolidation, and the alias
// learning round-trip. No database involved.
use std::collections::HashSet;
use std::sync::Arc;

use recon_lib::canonicalize::AliasSnapshot;
use recon_lib::config::{ConfigResolver, MatchingConfig};
use recon_lib::escalation::{ProposedLink, ResidualScorer};
use recon_lib::matching::run_reconciliation;
use recon_lib::models::core::{NormalizedAttrs, OrderRecord, ShipmentRecord};
use recon_lib::models::matching::MatchFlag;
use recon_lib::review::alias_from_entry;

fn order(customer: &str, id: &str, style: &str, color: &str, po: &str, qty: i64) -> OrderRecord {
    OrderRecord {
        customer_id: customer.to_string(),
        order_id: id.to_string(),
        style_raw: style.to_string(),
        color_raw: color.to_string(),
        po_raw: po.to_string(),
        alt_po_raw: String::new(),
        delivery_method_raw: "GROUND".to_string(),
        qty,
        norm: NormalizedAttrs::default(),
    }
}

fn shipment(customer: &str, id: &str, style: &str, color: &str, po: &str, qty: i64) -> ShipmentRecord {
    ShipmentRecord {
        customer_id: customer.to_string(),
        shipment_id: id.to_string(),
        style_raw: style.to_string(),
        color_raw: color.to_string(),
        po_raw: po.to_string(),
        alt_po_raw: String::new(),
        delivery_method_raw: "GROUND".to_string(),
        qty,
        norm: NormalizedAttrs::default(),
    }
}

fn default_resolver() -> ConfigResolver {
    ConfigResolver::new(MatchingConfig::default(), vec![]).unwrap()
}

#[test]
fn exact_match_scenario_classifies_exact_ok_on_layer_0() {
    let outcome = run_reconciliation(
        vec![order("C1", "O1", "S1", "RED", "PO1", 100)],
        vec![shipment("C1", "SH1", "S1", "RED", "PO1", 100)],
        &AliasSnapshot::empty(),
        &default_resolver(),
        None,
        "run-exact",
    )
    .unwrap();

    assert_eq!(outcome.results.len(), 1);
    let result = &outcome.results[0];
    assert_eq!(result.match_flag, MatchFlag::ExactOk);
    assert_eq!(result.order_id.as_deref(), Some("O1"));
    assert_eq!(result.layer, 0);
    assert_eq!(outcome.summary.exact_ok, 1);
}

#[test]
fn every_shipment_lands_in_exactly_one_result_row() {
    let orders = vec![
        order("C1", "O1", "S1", "RED", "PO1", 100),
        order("C1", "O2", "S2", "BLUE", "PO2", 50),
        order("C2", "O3", "S9", "GREEN", "PO9", 10),
    ];
    let shipments = vec![
        shipment("C1", "SH1", "S1", "RED", "PO1", 100),
        shipment("C1", "SH2", "S2-X", "BLUE", "PO2", 50),
        shipment("C1", "SH3", "ZZZ", "PURPLE", "QQQ", 5),
        shipment("C2", "SH4", "S9", "GREEN", "PO9", 10),
        shipment("C3", "SH5", "S5", "BLACK", "PO5", 7),
    ];
    let outcome = run_reconciliation(
        orders,
        shipments,
        &AliasSnapshot::empty(),
        &default_resolver(),
        None,
        "run-totals",
    )
    .unwrap();

    assert_eq!(outcome.results.len(), 5);
    assert_eq!(outcome.summary.flag_total(), 5);
    let ids: HashSet<_> = outcome.results.iter().map(|r| r.shipment_id.clone()).collect();
    assert_eq!(ids.len(), 5);
    // A shipment for a customer with no orders still gets a NO_MATCH row.
    let orphan = outcome.results.iter().find(|r| r.shipment_id == "SH5").unwrap();
    assert_eq!(orphan.match_flag, MatchFlag::NoMatch);
    assert!(orphan.order_id.is_none());
}

#[test]
fn no_order_is_assigned_twice() {
    // Two near-identical shipments contest one order; only one may win.
    let orders = vec![order("C1", "O1", "S1", "RED", "PO1", 100)];
    let shipments = vec![
        shipment("C1", "SH1", "S1", "RED", "PO1", 101),
        shipment("C1", "SH2", "S1", "REDD", "PO1", 102),
    ];
    let outcome = run_reconciliation(
        orders,
        shipments,
        &AliasSnapshot::empty(),
        &default_resolver(),
        None,
        "run-dup",
    )
    .unwrap();

    assert_eq!(outcome.results.len(), 2);
    let assigned: Vec<_> = outcome
        .results
        .iter()
        .filter_map(|r| r.order_id.clone())
        .collect();
    let unique: HashSet<_> = assigned.iter().cloned().collect();
    assert_eq!(assigned.len(), unique.len());
    assert!(outcome
        .results
        .iter()
        .any(|r| r.order_id.is_none() && r.match_flag == MatchFlag::NoMatch));
}

#[test]
fn layer_1_hi_conf_requires_exact_style() {
    // Everything matches except a style suffix: the aggregate would clear the
    // high threshold, but the classification must cap at LOW_CONF.
    let orders = vec![order("C1", "O1", "S1", "RED", "PO1", 100)];
    let shipments = vec![shipment("C1", "SH1", "S1-V2", "RED", "PO1", 100)];
    let outcome = run_reconciliation(
        orders,
        shipments,
        &AliasSnapshot::empty(),
        &default_resolver(),
        None,
        "run-stylecap",
    )
    .unwrap();

    let result = &outcome.results[0];
    assert_eq!(result.layer, 1);
    assert_eq!(result.match_flag, MatchFlag::LowConf);
    assert!(result.score >= 0.85, "aggregate {} should clear hi threshold", result.score);
}

#[test]
fn split_shipments_consolidate_and_share_the_outcome() {
    // One order of 156, five partial shipments summing to 253. The group sum
    // drives a single shared classification across all five members.
    let orders = vec![order("C1", "O1", "S1", "RED", "PO1", 156)];
    let shipments = vec![
        shipment("C1", "SH1", "S1", "RED", "PO1", 38),
        shipment("C1", "SH2", "S1", "RED", "PO1", 82),
        shipment("C1", "SH3", "S1", "RED", "PO1", 78),
        shipment("C1", "SH4", "S1", "RED", "PO1", 14),
        shipment("C1", "SH5", "S1", "RED", "PO1", 41),
    ];
    let outcome = run_reconciliation(
        orders,
        shipments,
        &AliasSnapshot::empty(),
        &default_resolver(),
        None,
        "run-split",
    )
    .unwrap();

    assert_eq!(outcome.results.len(), 5);
    let flags: HashSet<_> = outcome.results.iter().map(|r| r.match_flag).collect();
    assert_eq!(flags.len(), 1, "all members share one flag");
    let order_ids: HashSet<_> = outcome.results.iter().map(|r| r.order_id.clone()).collect();
    assert_eq!(order_ids.len(), 1, "all members share one order");
    assert_eq!(order_ids.into_iter().next().unwrap().as_deref(), Some("O1"));
    // 253 vs 156 is far outside tolerance, so quantity contributes nothing,
    // but the identifying attributes are exact: HI_CONF on layer 1.
    for result in &outcome.results {
        assert_eq!(result.layer, 1);
        assert_eq!(result.match_flag, MatchFlag::HiConf);
    }
}

#[test]
fn approved_suggestion_makes_next_run_exact() {
    // Round trip: style drift yields LOW_CONF plus a suggested alias; after
    // approval the next run's snapshot turns the same pair into EXACT_OK.
    let orders = vec![order("C1", "O1", "S1", "RED", "PO1", 100)];
    let shipments = vec![shipment("C1", "SH1", "S1-V2", "RED", "PO1", 100)];

    let first = run_reconciliation(
        orders.clone(),
        shipments.clone(),
        &AliasSnapshot::empty(),
        &default_resolver(),
        None,
        "run-learn-1",
    )
    .unwrap();
    assert_eq!(first.results[0].match_flag, MatchFlag::LowConf);
    assert_eq!(first.queue_entries.len(), 1);
    let entry = &first.queue_entries[0];
    assert_eq!(entry.raw_value, "S1-V2");
    assert_eq!(entry.suggested_canon_value, "S1");

    let snapshot = AliasSnapshot::build(vec![alias_from_entry(entry)]).unwrap();
    let second = run_reconciliation(
        orders,
        shipments,
        &snapshot,
        &default_resolver(),
        None,
        "run-learn-2",
    )
    .unwrap();
    assert_eq!(second.results[0].match_flag, MatchFlag::ExactOk);
    assert_eq!(second.results[0].layer, 0);
    assert!(second.queue_entries.is_empty());
}

#[test]
fn promoting_the_same_suggestion_twice_changes_nothing() {
    let orders = vec![order("C1", "O1", "S1", "RED", "PO1", 100)];
    let shipments = vec![shipment("C1", "SH1", "S1-V2", "RED", "PO1", 100)];
    let first = run_reconciliation(
        orders,
        shipments,
        &AliasSnapshot::empty(),
        &default_resolver(),
        None,
        "run-idem",
    )
    .unwrap();
    let alias = alias_from_entry(&first.queue_entries[0]);

    // Double promotion produces two identical alias rows; the snapshot treats
    // them as one active mapping rather than an ambiguity.
    let snapshot = AliasSnapshot::build(vec![alias.clone(), alias]).unwrap();
    assert_eq!(snapshot.len(), 1);
}

struct OracleScorer {
    links: Vec<ProposedLink>,
}

impl ResidualScorer for OracleScorer {
    fn score_residuals(
        &self,
        _orders: &[OrderRecord],
        _shipments: &[ShipmentRecord],
    ) -> anyhow::Result<Vec<ProposedLink>> {
        Ok(self.links.clone())
    }
}

#[test]
fn escalation_proposals_reenter_classifier_and_resolver() {
    // The pair is textually hopeless for Layer 1 on PO and color, but an
    // external scorer vouches for it. Style still differs, so even a 0.99
    // confidence caps at LOW_CONF.
    let orders = vec![order("C1", "O1", "S1", "RED", "PO1", 100)];
    let shipments = vec![shipment("C1", "SH1", "XTZR", "YELLOW", "77", 100)];
    let scorer = OracleScorer {
        links: vec![ProposedLink {
            shipment_id: "SH1".to_string(),
            order_id: "O1".to_string(),
            confidence: 0.99,
        }],
    };

    let outcome = run_reconciliation(
        orders,
        shipments,
        &AliasSnapshot::empty(),
        &default_resolver(),
        Some(&scorer),
        "run-esc",
    )
    .unwrap();

    let result = &outcome.results[0];
    assert_eq!(result.order_id.as_deref(), Some("O1"));
    assert_eq!(result.match_flag, MatchFlag::LowConf);
}

#[test]
fn shared_escalation_scorer_serves_multiple_runs() {
    // One scorer behind an Arc, handed to consecutive runs the way the async
    // pipeline hands it to its block workers.
    let scorer: Option<Arc<dyn ResidualScorer>> = Some(Arc::new(OracleScorer {
        links: vec![ProposedLink {
            shipment_id: "SH1".to_string(),
            order_id: "O1".to_string(),
            confidence: 0.99,
        }],
    }));

    for run_id in ["run-shared-1", "run-shared-2"] {
        let outcome = run_reconciliation(
            vec![order("C1", "O1", "S1", "RED", "PO1", 100)],
            vec![shipment("C1", "SH1", "XTZR", "YELLOW", "77", 100)],
            &AliasSnapshot::empty(),
            &default_resolver(),
            scorer.as_deref(),
            run_id,
        )
        .unwrap();
        assert_eq!(outcome.results[0].order_id.as_deref(), Some("O1"));
        assert_eq!(outcome.results[0].match_flag, MatchFlag::LowConf);
    }
}

#[test]
fn malformed_rows_are_counted_not_dropped_silently() {
    let orders = vec![order("C1", "O1", "S1", "RED", "PO1", 100)];
    let shipments = vec![
        shipment("C1", "SH1", "S1", "RED", "PO1", 100),
        shipment("C1", "SH2", "", "RED", "PO1", 10), // missing style
    ];
    let outcome = run_reconciliation(
        orders,
        shipments,
        &AliasSnapshot::empty(),
        &default_resolver(),
        None,
        "run-malformed",
    )
    .unwrap();

    assert_eq!(outcome.summary.malformed_shipments, 1);
    assert_eq!(outcome.summary.total_shipments, 1);
    assert_eq!(outcome.results.len(), 1);
}
