// src/matching/consolidate.rs
//
// Split-shipment consolidation: still-unmatched shipments sharing
// (customer, style, color, po) are summed into one synthetic shipment before
// quantity comparison. Results are still written per member shipment.
use std::collections::BTreeMap;

use crate::models::core::ShipmentRecord;
use crate::models::matching::ConsolidatedShipment;

/// Groups the given unmatched shipment indices. Every index lands in exactly
/// one group; member ids are sorted so the representative is deterministic.
pub fn consolidate_shipments(
    shipments: &[ShipmentRecord],
    unmatched_idxs: &[usize],
) -> Vec<ConsolidatedShipment> {
    let mut groups: BTreeMap<(String, String, String), Vec<usize>> = BTreeMap::new();
    for &idx in unmatched_idxs {
        let s = &shipments[idx];
        groups
            .entry((s.norm.style.clone(), s.norm.color.clone(), s.norm.po.clone()))
            .or_default()
            .push(idx);
    }

    groups
        .into_values()
        .map(|mut member_idxs| {
            member_idxs.sort_by(|a, b| shipments[*a].shipment_id.cmp(&shipments[*b].shipment_id));
            let qty = member_idxs.iter().map(|&i| shipments[i].qty).sum();
            let member_ids = member_idxs
                .iter()
                .map(|&i| shipments[i].shipment_id.clone())
                .collect();
            // Representative (smallest shipment id) supplies the attributes
            // that are not part of the group key, e.g. delivery method.
            let rep = member_idxs[0];
            ConsolidatedShipment {
                customer_id: shipments[rep].customer_id.clone(),
                member_ids,
                member_idxs,
                qty,
                norm: shipments[rep].norm.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::NormalizedAttrs;

    fn shipment(id: &str, style: &str, color: &str, po: &str, qty: i64) -> ShipmentRecord {
        ShipmentRecord {
            customer_id: "C1".to_string(),
            shipment_id: id.to_string(),
            style_raw: style.to_string(),
            color_raw: color.to_string(),
            po_raw: po.to_string(),
            alt_po_raw: String::new(),
            delivery_method_raw: "GROUND".to_string(),
            qty,
            norm: NormalizedAttrs {
                style: style.to_string(),
                color: color.to_string(),
                po: po.to_string(),
                alt_po: String::new(),
                delivery_method: "GROUND".to_string(),
            },
        }
    }

    #[test]
    fn test_partial_shipments_sum() {
        let shipments = vec![
            shipment("SH1", "S1", "RED", "PO1", 38),
            shipment("SH2", "S1", "RED", "PO1", 82),
            shipment("SH3", "S1", "RED", "PO1", 78),
            shipment("SH4", "S1", "RED", "PO1", 14),
            shipment("SH5", "S1", "RED", "PO1", 41),
        ];
        let groups = consolidate_shipments(&shipments, &[0, 1, 2, 3, 4]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].qty, 253);
        assert_eq!(groups[0].member_ids.len(), 5);
        assert_eq!(groups[0].representative_id(), "SH1");
    }

    #[test]
    fn test_different_keys_stay_separate() {
        let shipments = vec![
            shipment("SH1", "S1", "RED", "PO1", 10),
            shipment("SH2", "S1", "BLUE", "PO1", 20),
            shipment("SH3", "S2", "RED", "PO1", 30),
        ];
        let groups = consolidate_shipments(&shipments, &[0, 1, 2]);
        assert_eq!(groups.len(), 3);
        let total_members: usize = groups.iter().map(|g| g.member_ids.len()).sum();
        assert_eq!(total_members, 3);
    }

    #[test]
    fn test_only_unmatched_indices_participate() {
        let shipments = vec![
            shipment("SH1", "S1", "RED", "PO1", 10),
            shipment("SH2", "S1", "RED", "PO1", 20),
        ];
        let groups = consolidate_shipments(&shipments, &[1]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].member_ids, vec!["SH2".to_string()]);
        assert_eq!(groups[0].qty, 20);
    }
}
