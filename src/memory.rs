//! In-memory store with the same semantics as the Postgres adapter.
//!
//! Suitable for tests and for running the engine without a database. Each operation takes one
//! lock, so reconciliation passes are atomic with respect to readers.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use tracing::debug;

use crate::error::{Entity, StoreError};
use crate::persistence::filter::ListFilter;
use crate::store::{BalanceStore, OrderStore, OrderUpdateStore, StoreResult, TradeStore};
use crate::types::balance::UserBalance;
use crate::types::order::{Order, OrderFilter, OrderStatus, UserId};
use crate::types::order_update::OrderUpdate;
use crate::types::trade::{Trade, TradeFilter};

/// Source of "now" for store-assigned timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Default)]
struct State {
    last_id: i64,
    orders: HashMap<String, Order>,
    updates: Vec<OrderUpdate>,
    trades: HashMap<String, Trade>,
    balances: BTreeMap<(UserId, String), UserBalance>,
    failing_assets: HashSet<String>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

pub struct MemoryStorage {
    state: Mutex<State>,
    clock: Clock,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    /// Use a custom clock, e.g. a pinned one so timestamps collide deterministically.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
        }
    }

    /// Make every balance write for `asset` fail with `StoreUnavailable`.
    pub fn fail_writes_for_asset(&self, asset: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_assets.insert(asset.into());
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_assets.clear();
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)().trunc_subsecs(6)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::unavailable("memory store", "state lock poisoned"))
    }
}

fn matches_filter(filter: &ListFilter, symbol: &str, status: Option<&str>, time: DateTime<Utc>) -> bool {
    if let Some(s) = filter.symbol.as_deref().filter(|s| !s.is_empty()) {
        if s != symbol {
            return false;
        }
    }
    if let Some(s) = filter.status.as_deref().filter(|s| !s.is_empty()) {
        if Some(s) != status {
            return false;
        }
    }
    filter.start_time.is_none_or(|start| time >= start) && filter.end_time.is_none_or(|end| time <= end)
}

fn paginate<T>(rows: Vec<T>, filter: &ListFilter) -> Vec<T> {
    let offset = filter.offset.unwrap_or(0) as usize;
    let limit = filter.limit.filter(|n| *n > 0).map_or(usize::MAX, |n| n as usize);
    rows.into_iter().skip(offset).take(limit).collect()
}

/// Upsert against the balance map. Returns the written id, or `None` when `only_if_changed` is
/// set and the stored values already match.
fn upsert_balance(
    state: &mut State,
    balances: &mut BTreeMap<(UserId, String), UserBalance>,
    balance: &UserBalance,
    now: DateTime<Utc>,
    only_if_changed: bool,
) -> StoreResult<Option<i64>> {
    if state.failing_assets.contains(&balance.asset) {
        return Err(StoreError::unavailable(
            format!("upsert balance {}/{}", balance.user_id, balance.asset),
            "injected write failure",
        ));
    }
    let key = (balance.user_id, balance.asset.clone());
    match balances.get_mut(&key) {
        Some(stored) if only_if_changed && stored.free == balance.free && stored.locked == balance.locked => {
            Ok(None)
        }
        Some(stored) => {
            stored.free = balance.free;
            stored.locked = balance.locked;
            stored.updated_at = now;
            Ok(Some(stored.id))
        }
        None => {
            let id = state.next_id();
            balances.insert(
                key,
                UserBalance {
                    id,
                    updated_at: now,
                    ..balance.clone()
                },
            );
            Ok(Some(id))
        }
    }
}

#[async_trait]
impl OrderStore for MemoryStorage {
    async fn create_order(&self, order: &Order) -> StoreResult<()> {
        let now = self.now();
        let mut state = self.lock()?;
        let taken = state.orders.contains_key(&order.mexc_order_id)
            || state.orders.values().any(|o| o.internal_id == order.internal_id);
        if taken {
            return Err(StoreError::duplicate(Entity::Order, &order.mexc_order_id));
        }
        let id = state.next_id();
        state.orders.insert(
            order.mexc_order_id.clone(),
            Order {
                id,
                created_at: now,
                updated_at: now,
                ..order.clone()
            },
        );
        debug!(mexc_order_id = %order.mexc_order_id, user_id = order.user_id, "order created");
        Ok(())
    }

    async fn get_order_by_id(&self, mexc_order_id: &str) -> StoreResult<Order> {
        self.lock()?
            .orders
            .get(mexc_order_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(Entity::Order, mexc_order_id))
    }

    async fn update_order_status(&self, mexc_order_id: &str, status: &OrderStatus) -> StoreResult<()> {
        let now = self.now();
        let mut state = self.lock()?;
        let order = state
            .orders
            .get_mut(mexc_order_id)
            .ok_or_else(|| StoreError::not_found(Entity::Order, mexc_order_id))?;
        order.status = status.clone();
        order.updated_at = now;
        Ok(())
    }

    async fn delete_order_by_id(&self, mexc_order_id: &str) -> StoreResult<()> {
        self.lock()?
            .orders
            .remove(mexc_order_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(Entity::Order, mexc_order_id))
    }

    async fn get_user_orders(
        &self,
        user_id: UserId,
        filter: Option<&OrderFilter>,
    ) -> StoreResult<Vec<Order>> {
        let filter = filter.map(ListFilter::from).unwrap_or_default();
        let state = self.lock()?;
        let mut rows: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .filter(|o| matches_filter(&filter, &o.symbol, Some(o.status.as_str()), o.transact_time))
            .cloned()
            .collect();
        rows.sort_by_key(|o| Reverse((o.created_at, o.id)));
        Ok(paginate(rows, &filter))
    }

    async fn get_open_orders(&self, user_id: UserId, symbol: Option<&str>) -> StoreResult<Vec<Order>> {
        let symbol = symbol.filter(|s| !s.is_empty());
        let state = self.lock()?;
        let mut rows: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id && o.status.is_open())
            .filter(|o| symbol.is_none_or(|s| o.symbol == s))
            .cloned()
            .collect();
        rows.sort_by_key(|o| Reverse((o.created_at, o.id)));
        Ok(rows)
    }
}

#[async_trait]
impl OrderUpdateStore for MemoryStorage {
    async fn append_order_update(&self, update: &OrderUpdate) -> StoreResult<()> {
        let mut state = self.lock()?;
        let id = state.next_id();
        state.updates.push(OrderUpdate {
            id,
            ..update.clone()
        });
        Ok(())
    }

    async fn get_order_updates(&self, user_id: UserId, order_id: &str) -> StoreResult<Vec<OrderUpdate>> {
        let state = self.lock()?;
        let mut rows: Vec<OrderUpdate> = state
            .updates
            .iter()
            .filter(|u| u.user_id == user_id && u.order_id == order_id)
            .cloned()
            .collect();
        rows.sort_by_key(|u| Reverse((u.update_time, u.id)));
        Ok(rows)
    }
}

#[async_trait]
impl TradeStore for MemoryStorage {
    async fn create_trade(&self, trade: &mut Trade) -> StoreResult<()> {
        let now = self.now();
        let mut state = self.lock()?;
        if state.trades.contains_key(&trade.mexc_trade_id) {
            return Err(StoreError::duplicate(Entity::Trade, &trade.mexc_trade_id));
        }
        trade.id = state.next_id();
        trade.created_at = now;
        state.trades.insert(trade.mexc_trade_id.clone(), trade.clone());
        Ok(())
    }

    async fn get_trade_by_id(&self, mexc_trade_id: &str) -> StoreResult<Trade> {
        self.lock()?
            .trades
            .get(mexc_trade_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(Entity::Trade, mexc_trade_id))
    }

    async fn get_user_trades(
        &self,
        user_id: UserId,
        filter: Option<&TradeFilter>,
    ) -> StoreResult<Vec<Trade>> {
        let filter = filter.map(ListFilter::from).unwrap_or_default();
        let state = self.lock()?;
        let mut rows: Vec<Trade> = state
            .trades
            .values()
            .filter(|t| t.user_id == user_id)
            .filter(|t| matches_filter(&filter, &t.symbol, None, t.trade_time))
            .cloned()
            .collect();
        rows.sort_by_key(|t| Reverse((t.trade_time, t.id)));
        Ok(paginate(rows, &filter))
    }
}

#[async_trait]
impl BalanceStore for MemoryStorage {
    async fn get_balance(&self, user_id: UserId, asset: &str) -> StoreResult<UserBalance> {
        self.lock()?
            .balances
            .get(&(user_id, asset.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(Entity::Balance, format!("{user_id}/{asset}")))
    }

    async fn get_user_balances(&self, user_id: UserId) -> StoreResult<Vec<UserBalance>> {
        // BTreeMap keys already order by (user, asset).
        Ok(self
            .lock()?
            .balances
            .range((user_id, String::new())..)
            .take_while(|((uid, _), _)| *uid == user_id)
            .map(|(_, b)| b.clone())
            .collect())
    }

    async fn update_balance(&self, balance: &mut UserBalance) -> StoreResult<bool> {
        let now = self.now();
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let mut balances = std::mem::take(&mut state.balances);
        let result = upsert_balance(state, &mut balances, balance, now, true);
        state.balances = balances;

        let applied = match result? {
            Some(id) => {
                balance.id = id;
                balance.updated_at = now;
                true
            }
            None => false,
        };
        debug!(user_id = balance.user_id, asset = %balance.asset, applied, "balance upsert");
        Ok(applied)
    }

    async fn update_user_balances(&self, user_id: UserId, batch: &mut [UserBalance]) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let batch_time = self.now();
        let mut guard = self.lock()?;
        let state = &mut *guard;

        // Work on a copy; it replaces the committed map only if every step succeeds.
        let mut working = state.balances.clone();
        for balance in batch.iter_mut() {
            balance.user_id = user_id;
            if let Some(id) = upsert_balance(state, &mut working, balance, batch_time, false)? {
                balance.id = id;
            }
            balance.updated_at = batch_time;
        }

        let before = working.len();
        working.retain(|(uid, _), b| !(*uid == user_id && b.is_zero() && b.updated_at < batch_time));
        let pruned = before - working.len();

        state.balances = working;
        debug!(user_id, assets = batch.len(), pruned, "balances reconciled");
        Ok(())
    }
}
