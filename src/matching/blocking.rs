// src/matching/blocking.rs
//
// Customer-level blocking. Blocks are the unit of parallelism and the hard
// comparison boundary: no pair ever crosses a customer_id.
use std::collections::BTreeMap;

use crate::models::core::{OrderRecord, ShipmentRecord};

/// All records for one customer. Either side may be empty; an order-less
/// block still produces NO_MATCH rows for its shipments.
#[derive(Debug, Clone)]
pub struct CustomerBlock {
    pub customer_id: String,
    pub orders: Vec<OrderRecord>,
    pub shipments: Vec<ShipmentRecord>,
}

/// Partitions canonicalized records by customer. BTreeMap keeps block order
/// deterministic regardless of input order.
pub fn block_by_customer(
    orders: Vec<OrderRecord>,
    shipments: Vec<ShipmentRecord>,
) -> Vec<CustomerBlock> {
    let mut blocks: BTreeMap<String, CustomerBlock> = BTreeMap::new();

    for order in orders {
        blocks
            .entry(order.customer_id.clone())
            .or_insert_with(|| CustomerBlock {
                customer_id: order.customer_id.clone(),
                orders: Vec::new(),
                shipments: Vec::new(),
            })
            .orders
            .push(order);
    }
    for shipment in shipments {
        blocks
            .entry(shipment.customer_id.clone())
            .or_insert_with(|| CustomerBlock {
                customer_id: shipment.customer_id.clone(),
                orders: Vec::new(),
                shipments: Vec::new(),
            })
            .shipments
            .push(shipment);
    }

    blocks.into_values().collect()
}
