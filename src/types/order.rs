use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type UserId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl FromStr for OrderSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(format!("unknown order side {other:?}")),
        }
    }
}

/// Exchange order type. Unknown values round-trip through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderType {
    #[default]
    Limit,
    Market,
    LimitMaker,
    ImmediateOrCancel,
    FillOrKill,
    Other(String),
}

impl OrderType {
    pub fn as_str(&self) -> &str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
            OrderType::LimitMaker => "LIMIT_MAKER",
            OrderType::ImmediateOrCancel => "IMMEDIATE_OR_CANCEL",
            OrderType::FillOrKill => "FILL_OR_KILL",
            OrderType::Other(s) => s,
        }
    }
}

impl From<String> for OrderType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "LIMIT" => OrderType::Limit,
            "MARKET" => OrderType::Market,
            "LIMIT_MAKER" => OrderType::LimitMaker,
            "IMMEDIATE_OR_CANCEL" => OrderType::ImmediateOrCancel,
            "FILL_OR_KILL" => OrderType::FillOrKill,
            _ => OrderType::Other(s),
        }
    }
}

impl From<OrderType> for String {
    fn from(t: OrderType) -> Self {
        t.as_str().to_string()
    }
}

/// Order status as reported by the exchange. Open-ended: unknown values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    #[default]
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PartiallyCanceled,
    Rejected,
    Expired,
    Other(String),
}

impl OrderStatus {
    pub const OPEN: [OrderStatus; 2] = [OrderStatus::New, OrderStatus::PartiallyFilled];

    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::PartiallyCanceled => "PARTIALLY_CANCELED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Other(s) => s,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::PartiallyFilled)
    }
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" => OrderStatus::Canceled,
            "PARTIALLY_CANCELED" => OrderStatus::PartiallyCanceled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            _ => OrderStatus::Other(s),
        }
    }
}

impl From<&str> for OrderStatus {
    fn from(s: &str) -> Self {
        OrderStatus::from(s.to_string())
    }
}

impl From<OrderStatus> for String {
    fn from(s: OrderStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An exchange order. `mexc_order_id` is the natural key; `id` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub internal_id: i64,
    pub user_id: UserId,
    pub mexc_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub price: Decimal,
    pub quantity: Decimal,
    pub quote_order_qty: Option<Decimal>,
    pub executed_quantity: Decimal,
    pub cummulative_quote_qty: Decimal,
    pub client_order_id: Option<String>,
    pub transact_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Optional predicates for `get_user_orders`. Empty strings and zero limits are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub symbol: Option<String>,
    pub status: Option<OrderStatus>,
    /// Inclusive lower bound on `transact_time`.
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `transact_time`.
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl OrderFilter {
    pub fn symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }
}
