#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use trade_ledger::memory::MemoryStorage;
use trade_ledger::types::order::{Order, OrderSide, OrderStatus, OrderType, UserId};
use trade_ledger::types::trade::Trade;

/// A clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
    pub fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn store_with_clock() -> (MemoryStorage, ManualClock) {
    let clock = ManualClock(Arc::new(Mutex::new(t0())));
    let source = clock.clone();
    let store = MemoryStorage::with_clock(Arc::new(move || source.now()));
    (store, clock)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn order(user_id: UserId, mexc_order_id: &str, symbol: &str, transact_time: DateTime<Utc>) -> Order {
    Order {
        id: 0,
        internal_id: mexc_order_id.bytes().fold(0i64, |acc, b| acc.wrapping_mul(31).wrapping_add(i64::from(b))),
        user_id,
        mexc_order_id: mexc_order_id.to_string(),
        symbol: symbol.to_string(),
        side: OrderSide::Buy,
        order_type: OrderType::Limit,
        status: OrderStatus::New,
        price: dec!(50000.5),
        quantity: dec!(0.002),
        quote_order_qty: None,
        executed_quantity: dec!(0),
        cummulative_quote_qty: dec!(0),
        client_order_id: Some(format!("cli-{mexc_order_id}")),
        transact_time,
        created_at: t0(),
        updated_at: t0(),
    }
}

pub fn trade(user_id: UserId, mexc_trade_id: &str, symbol: &str, trade_time: DateTime<Utc>) -> Trade {
    Trade {
        id: 0,
        user_id,
        mexc_trade_id: mexc_trade_id.to_string(),
        order_id: "O1".to_string(),
        symbol: symbol.to_string(),
        price: dec!(3000.25),
        quantity: dec!(0.5),
        quote_quantity: dec!(1500.125),
        commission: dec!(0.0005),
        commission_asset: "ETH".to_string(),
        trade_time,
        is_buyer: true,
        is_maker: false,
        created_at: DateTime::<Utc>::UNIX_EPOCH,
    }
}
