//! Order repository and audit log tests against the in-memory store.

mod common;

use chrono::Duration;
use common::{order, store_with_clock, t0};
use rust_decimal_macros::dec;
use serde_json::json;
use trade_ledger::error::ErrorKind;
use trade_ledger::store::{OrderStore, OrderUpdateStore};
use trade_ledger::types::order::{OrderFilter, OrderStatus};
use trade_ledger::types::order_update::OrderUpdate;

fn ids(orders: &[trade_ledger::types::order::Order]) -> Vec<&str> {
    orders.iter().map(|o| o.mexc_order_id.as_str()).collect()
}

fn update(order_id: &str, status: OrderStatus, seconds: i64) -> OrderUpdate {
    OrderUpdate {
        id: 0,
        user_id: 1,
        order_id: order_id.to_string(),
        status: status.clone(),
        executed_quantity: dec!(0),
        cummulative_quote_qty: dec!(0),
        update_time: t0() + Duration::seconds(seconds),
        raw_data: json!({ "i": order_id, "X": status.as_str() }),
    }
}

#[tokio::test]
async fn create_then_get_round_trips_fields() {
    let (store, clock) = store_with_clock();
    clock.advance(Duration::seconds(2));
    let o = order(1, "C02__1", "BTCUSDT", t0());
    store.create_order(&o).await.unwrap();

    let got = store.get_order_by_id("C02__1").await.unwrap();
    assert!(got.id > 0);
    assert_eq!(got.created_at, t0() + Duration::seconds(2));
    assert_eq!(got.price, dec!(50000.5));
    assert_eq!(got.client_order_id.as_deref(), Some("cli-C02__1"));
    assert_eq!(got.status, OrderStatus::New);
}

#[tokio::test]
async fn duplicate_exchange_id_is_rejected() {
    let (store, _) = store_with_clock();
    let o = order(1, "dup", "BTCUSDT", t0());
    store.create_order(&o).await.unwrap();

    let err = store.create_order(&o).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateKey);
    assert!(err.is_duplicate_key());
}

#[tokio::test]
async fn mutations_on_missing_order_are_not_found() {
    let (store, _) = store_with_clock();

    let err = store
        .update_order_status("ghost", &OrderStatus::Filled)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "order ghost not found");

    let err = store.delete_order_by_id("ghost").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(store.get_order_by_id("ghost").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn delete_removes_the_row_once() {
    let (store, _) = store_with_clock();
    store.create_order(&order(1, "D1", "ETHUSDT", t0())).await.unwrap();

    store.delete_order_by_id("D1").await.unwrap();
    assert!(store.get_order_by_id("D1").await.unwrap_err().is_not_found());
    assert!(store.delete_order_by_id("D1").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn status_update_refreshes_updated_at() {
    let (store, clock) = store_with_clock();
    store.create_order(&order(1, "S1", "BTCUSDT", t0())).await.unwrap();

    clock.advance(Duration::seconds(10));
    store
        .update_order_status("S1", &OrderStatus::PartiallyFilled)
        .await
        .unwrap();

    let got = store.get_order_by_id("S1").await.unwrap();
    assert_eq!(got.status, OrderStatus::PartiallyFilled);
    assert_eq!(got.created_at, t0());
    assert_eq!(got.updated_at, t0() + Duration::seconds(10));
}

#[tokio::test]
async fn equal_timestamps_order_by_id_descending() {
    let (store, _) = store_with_clock();
    for id in ["A", "B", "C"] {
        store.create_order(&order(1, id, "BTCUSDT", t0())).await.unwrap();
    }

    let listed = store.get_user_orders(1, None).await.unwrap();
    assert_eq!(ids(&listed), ["C", "B", "A"]);
    assert!(listed.windows(2).all(|w| w[0].id > w[1].id));
}

#[tokio::test]
async fn filters_compose() {
    let (store, clock) = store_with_clock();
    for (n, symbol) in ["BTCUSDT", "ETHUSDT", "BTCUSDT", "BTCUSDT", "BTCUSDT"].iter().enumerate() {
        clock.advance(Duration::seconds(1));
        let o = order(1, &format!("F{n}"), symbol, t0() + Duration::minutes(n as i64));
        store.create_order(&o).await.unwrap();
    }
    store.create_order(&order(2, "other", "BTCUSDT", t0())).await.unwrap();
    store.update_order_status("F3", &OrderStatus::Filled).await.unwrap();

    let btc = store
        .get_user_orders(1, Some(&OrderFilter::symbol("BTCUSDT").with_limit(10)))
        .await
        .unwrap();
    assert_eq!(ids(&btc), ["F4", "F3", "F2", "F0"]);

    let filled = store
        .get_user_orders(1, Some(&OrderFilter::default().with_status(OrderStatus::Filled)))
        .await
        .unwrap();
    assert_eq!(ids(&filled), ["F3"]);

    let window = OrderFilter::symbol("BTCUSDT").between(t0() + Duration::minutes(1), t0() + Duration::minutes(3));
    let ranged = store.get_user_orders(1, Some(&window)).await.unwrap();
    assert_eq!(ids(&ranged), ["F3", "F2"]);

    let paged = store
        .get_user_orders(1, Some(&OrderFilter::symbol("BTCUSDT").with_limit(2).with_offset(1)))
        .await
        .unwrap();
    assert_eq!(ids(&paged), ["F3", "F2"]);

    // Empty symbol and zero limit are ignored.
    let loose = OrderFilter {
        symbol: Some(String::new()),
        limit: Some(0),
        ..Default::default()
    };
    assert_eq!(store.get_user_orders(1, Some(&loose)).await.unwrap().len(), 5);

    assert!(store
        .get_user_orders(1, Some(&OrderFilter::symbol("SOLUSDT")))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn open_orders_are_new_or_partially_filled() {
    let (store, _) = store_with_clock();
    for (id, symbol) in [("N1", "BTCUSDT"), ("P1", "ETHUSDT"), ("F1", "BTCUSDT"), ("C1", "BTCUSDT")] {
        store.create_order(&order(1, id, symbol, t0())).await.unwrap();
    }
    store.update_order_status("P1", &OrderStatus::PartiallyFilled).await.unwrap();
    store.update_order_status("F1", &OrderStatus::Filled).await.unwrap();
    store.update_order_status("C1", &OrderStatus::Canceled).await.unwrap();

    let open = store.get_open_orders(1, None).await.unwrap();
    assert_eq!(ids(&open), ["P1", "N1"]);

    let btc = store.get_open_orders(1, Some("BTCUSDT")).await.unwrap();
    assert_eq!(ids(&btc), ["N1"]);
    assert!(store.get_open_orders(2, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn audit_trail_survives_status_change_and_delete() {
    let (store, _) = store_with_clock();
    store.create_order(&order(1, "O1", "BTCUSDT", t0())).await.unwrap();
    store.append_order_update(&update("O1", OrderStatus::New, 0)).await.unwrap();
    store.append_order_update(&update("O1", OrderStatus::Filled, 1)).await.unwrap();
    store.update_order_status("O1", &OrderStatus::Filled).await.unwrap();

    let history = store.get_order_updates(1, "O1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, OrderStatus::Filled);
    assert_eq!(history[1].status, OrderStatus::New);
    assert_eq!(history[1].raw_data["X"], "NEW");

    store.delete_order_by_id("O1").await.unwrap();
    assert_eq!(store.get_order_updates(1, "O1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn audit_allows_repeats_and_is_scoped_to_user() {
    let (store, _) = store_with_clock();
    let same = update("R1", OrderStatus::New, 5);
    store.append_order_update(&same).await.unwrap();
    store.append_order_update(&same).await.unwrap();

    let history = store.get_order_updates(1, "R1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].id > history[1].id);
    assert!(store.get_order_updates(2, "R1").await.unwrap().is_empty());
    assert!(store.get_order_updates(1, "nope").await.unwrap().is_empty());
}
