//! Balance ledger tests: upsert-if-changed, atomic reconciliation, zero pruning.

mod common;

use chrono::Duration;
use common::{init_tracing, store_with_clock, t0};
use rust_decimal_macros::dec;
use trade_ledger::error::ErrorKind;
use trade_ledger::store::BalanceStore;
use trade_ledger::types::balance::UserBalance;

#[tokio::test]
async fn update_balance_inserts_then_skips_identical_values() {
    init_tracing();
    let (store, clock) = store_with_clock();

    let mut usdt = UserBalance::new(1, "USDT", dec!(100.5), dec!(0));
    assert!(store.update_balance(&mut usdt).await.unwrap());
    assert!(usdt.id > 0);
    assert_eq!(usdt.updated_at, t0());

    clock.advance(Duration::seconds(30));
    let mut again = UserBalance::new(1, "USDT", dec!(100.50), dec!(0.000));
    assert!(!store.update_balance(&mut again).await.unwrap());

    let stored = store.get_balance(1, "USDT").await.unwrap();
    assert_eq!(stored.updated_at, t0());
    assert_eq!(stored.id, usdt.id);
}

#[tokio::test]
async fn update_balance_overwrites_changed_values() {
    let (store, clock) = store_with_clock();
    let mut btc = UserBalance::new(1, "BTC", dec!(1), dec!(0));
    store.update_balance(&mut btc).await.unwrap();

    clock.advance(Duration::seconds(5));
    let mut moved = UserBalance::new(1, "BTC", dec!(0.75), dec!(0.25));
    assert!(store.update_balance(&mut moved).await.unwrap());
    assert_eq!(moved.id, btc.id);

    let stored = store.get_balance(1, "BTC").await.unwrap();
    assert_eq!(stored.free, dec!(0.75));
    assert_eq!(stored.locked, dec!(0.25));
    assert_eq!(stored.updated_at, t0() + Duration::seconds(5));
}

#[tokio::test]
async fn get_balance_missing_is_not_found() {
    let (store, _) = store_with_clock();
    let err = store.get_balance(1, "BTC").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("1/BTC"));
}

#[tokio::test]
async fn user_balances_are_sorted_by_asset_and_scoped_to_user() {
    let (store, _) = store_with_clock();
    for (user, asset) in [(1, "USDT"), (1, "BTC"), (2, "AAA"), (1, "ETH")] {
        let mut b = UserBalance::new(user, asset, dec!(1), dec!(0));
        store.update_balance(&mut b).await.unwrap();
    }

    let assets: Vec<String> = store
        .get_user_balances(1)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.asset)
        .collect();
    assert_eq!(assets, ["BTC", "ETH", "USDT"]);
    assert!(store.get_user_balances(3).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let (store, clock) = store_with_clock();
    let mut dust = UserBalance::new(1, "DOGE", dec!(0), dec!(0));
    store.update_balance(&mut dust).await.unwrap();

    clock.advance(Duration::minutes(1));
    store.update_user_balances(1, &mut Vec::<UserBalance>::new()).await.unwrap();

    // Nothing pruned either.
    assert_eq!(store.get_user_balances(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn batch_shares_one_timestamp_and_stamps_user() {
    let (store, clock) = store_with_clock();
    clock.advance(Duration::milliseconds(1500));

    let mut batch = vec![
        UserBalance::new(0, "BTC", dec!(0.1), dec!(0)),
        UserBalance::new(0, "ETH", dec!(2), dec!(1)),
        UserBalance::new(0, "USDT", dec!(250), dec!(0)),
    ];
    store.update_user_balances(9, &mut batch).await.unwrap();

    let expected = t0() + Duration::milliseconds(1500);
    for entry in &batch {
        assert_eq!(entry.user_id, 9);
        assert!(entry.id > 0);
        assert_eq!(entry.updated_at, expected);
    }
    let stored = store.get_user_balances(9).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|b| b.updated_at == expected));
}

#[tokio::test]
async fn repeated_batch_keeps_values_and_refreshes_timestamps() {
    let (store, clock) = store_with_clock();
    let batch = || {
        vec![
            UserBalance::new(1, "BTC", dec!(0.5), dec!(0)),
            UserBalance::new(1, "USDT", dec!(10), dec!(5)),
        ]
    };
    store.update_user_balances(1, &mut batch()).await.unwrap();
    let first = store.get_user_balances(1).await.unwrap();

    clock.advance(Duration::minutes(5));
    store.update_user_balances(1, &mut batch()).await.unwrap();
    let second = store.get_user_balances(1).await.unwrap();

    assert_eq!(second.len(), first.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!((a.id, &a.asset, a.free, a.locked), (b.id, &b.asset, b.free, b.locked));
        assert_eq!(b.updated_at, t0() + Duration::minutes(5));
    }
}

#[tokio::test]
async fn unchanged_batch_rows_still_get_the_batch_timestamp() {
    let (store, clock) = store_with_clock();
    let mut seed = vec![
        UserBalance::new(1, "BTC", dec!(1), dec!(0)),
        UserBalance::new(1, "XRP", dec!(0), dec!(0)),
    ];
    store.update_user_balances(1, &mut seed).await.unwrap();

    clock.advance(Duration::minutes(1));
    let mut batch = vec![
        UserBalance::new(1, "XRP", dec!(0), dec!(0)),
        UserBalance::new(1, "BTC", dec!(2), dec!(0)),
    ];
    store.update_user_balances(1, &mut batch).await.unwrap();

    let batch_time = t0() + Duration::minutes(1);
    assert!(batch.iter().all(|b| b.updated_at == batch_time && b.id > 0));
    assert_eq!(batch[0].id, seed[1].id);

    let stored = store.get_user_balances(1).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|b| b.updated_at == batch_time));
}

#[tokio::test]
async fn failed_batch_leaves_every_row_untouched() {
    let (store, clock) = store_with_clock();
    let mut seed = vec![
        UserBalance::new(1, "BTC", dec!(1), dec!(0)),
        UserBalance::new(1, "USDT", dec!(100), dec!(0)),
    ];
    store.update_user_balances(1, &mut seed).await.unwrap();
    let mut stale = UserBalance::new(1, "DOGE", dec!(0), dec!(0));
    store.update_balance(&mut stale).await.unwrap();
    let before = store.get_user_balances(1).await.unwrap();

    clock.advance(Duration::minutes(1));
    store.fail_writes_for_asset("ETH");
    let mut batch = vec![
        UserBalance::new(1, "BTC", dec!(2), dec!(0)),
        UserBalance::new(1, "ETH", dec!(3), dec!(0)),
        UserBalance::new(1, "USDT", dec!(0), dec!(0)),
    ];
    let err = store.update_user_balances(1, &mut batch).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    assert!(err.to_string().contains("ETH"));

    // BTC was written before the failure and DOGE was eligible for pruning; neither is visible.
    assert_eq!(store.get_user_balances(1).await.unwrap(), before);

    store.clear_failures();
    store.update_user_balances(1, &mut batch).await.unwrap();
    let after = store.get_user_balances(1).await.unwrap();
    let assets: Vec<&str> = after.iter().map(|b| b.asset.as_str()).collect();
    assert_eq!(assets, ["BTC", "ETH", "USDT"]);
}

#[tokio::test]
async fn pruning_removes_only_stale_zero_rows_outside_the_batch() {
    let (store, clock) = store_with_clock();
    let mut seed = vec![
        UserBalance::new(1, "BTC", dec!(1), dec!(0)),
        UserBalance::new(1, "DOGE", dec!(0), dec!(0)),
        UserBalance::new(1, "ETH", dec!(4), dec!(0)),
        UserBalance::new(1, "XRP", dec!(0), dec!(0)),
    ];
    store.update_user_balances(1, &mut seed).await.unwrap();
    let mut other_user = UserBalance::new(2, "DOGE", dec!(0), dec!(0));
    store.update_balance(&mut other_user).await.unwrap();

    clock.advance(Duration::minutes(1));
    // BTC drains to zero in this pass; XRP is reported again as zero; DOGE and ETH are absent.
    let mut batch = vec![
        UserBalance::new(1, "BTC", dec!(0), dec!(0)),
        UserBalance::new(1, "XRP", dec!(0), dec!(0)),
    ];
    store.update_user_balances(1, &mut batch).await.unwrap();

    let stored = store.get_user_balances(1).await.unwrap();
    let assets: Vec<&str> = stored.iter().map(|b| b.asset.as_str()).collect();
    assert_eq!(assets, ["BTC", "ETH", "XRP"]);

    let batch_time = t0() + Duration::minutes(1);
    let btc = &stored[0];
    assert!(btc.is_zero());
    assert_eq!(btc.updated_at, batch_time);
    assert_eq!(stored[2].updated_at, batch_time);
    assert!(batch.iter().all(|b| b.updated_at == batch_time));

    // Pruning is per user.
    assert!(store.get_balance(2, "DOGE").await.is_ok());
}

#[tokio::test]
async fn zero_row_written_at_the_batch_instant_is_kept() {
    let (store, _) = store_with_clock();
    let mut zero = UserBalance::new(1, "SOL", dec!(0), dec!(0));
    store.update_balance(&mut zero).await.unwrap();

    // The clock has not moved, so SOL is not strictly older than the batch.
    let mut batch = vec![UserBalance::new(1, "BTC", dec!(1), dec!(0))];
    store.update_user_balances(1, &mut batch).await.unwrap();

    assert!(store.get_balance(1, "SOL").await.is_ok());
}
