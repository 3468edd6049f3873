use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::order::{OrderStatus, UserId};

/// One observed status transition of an order. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub id: i64,
    pub user_id: UserId,
    /// `mexc_order_id` of the order; not a foreign key, so history outlives the order row.
    pub order_id: String,
    pub status: OrderStatus,
    pub executed_quantity: Decimal,
    pub cummulative_quote_qty: Decimal,
    pub update_time: DateTime<Utc>,
    /// Exchange payload the transition was derived from.
    pub raw_data: serde_json::Value,
}
