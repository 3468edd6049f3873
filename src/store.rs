//! Capability traits exposed to the trading engine, and backend selection.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};

use crate::config::{Backend, StoreConfig};
use crate::error::StoreError;
use crate::memory::MemoryStorage;
use crate::persistence::PgStorage;
use crate::types::balance::UserBalance;
use crate::types::order::{Order, OrderFilter, OrderStatus, UserId};
use crate::types::order_update::OrderUpdate;
use crate::types::trade::{Trade, TradeFilter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Order lifecycle. Mutations detect absence from the affected-row count, never a prior read.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order. `DuplicateKey` if `mexc_order_id` is taken.
    async fn create_order(&self, order: &Order) -> StoreResult<()>;

    async fn get_order_by_id(&self, mexc_order_id: &str) -> StoreResult<Order>;

    /// Overwrite the status and refresh `updated_at`. `NotFound` if no row matched.
    async fn update_order_status(&self, mexc_order_id: &str, status: &OrderStatus) -> StoreResult<()>;

    /// Hard delete. `NotFound` if no row matched.
    async fn delete_order_by_id(&self, mexc_order_id: &str) -> StoreResult<()>;

    /// Orders of a user, newest `created_at` first. `None` lists everything.
    async fn get_user_orders(
        &self,
        user_id: UserId,
        filter: Option<&OrderFilter>,
    ) -> StoreResult<Vec<Order>>;

    /// Orders in NEW or PARTIALLY_FILLED, optionally for one symbol.
    async fn get_open_orders(&self, user_id: UserId, symbol: Option<&str>) -> StoreResult<Vec<Order>>;
}

/// Append-only history of order status transitions.
#[async_trait]
pub trait OrderUpdateStore: Send + Sync {
    async fn append_order_update(&self, update: &OrderUpdate) -> StoreResult<()>;

    /// History of one order for one user, newest `update_time` first, then highest id.
    async fn get_order_updates(&self, user_id: UserId, order_id: &str) -> StoreResult<Vec<OrderUpdate>>;
}

/// Executed trades. No update or delete.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Insert a trade and fill in its store-assigned `id` and `created_at`.
    async fn create_trade(&self, trade: &mut Trade) -> StoreResult<()>;

    async fn get_trade_by_id(&self, mexc_trade_id: &str) -> StoreResult<Trade>;

    /// Trades of a user, newest `trade_time` first.
    async fn get_user_trades(
        &self,
        user_id: UserId,
        filter: Option<&TradeFilter>,
    ) -> StoreResult<Vec<Trade>>;
}

/// The balance ledger. The only writer of balance rows.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn get_balance(&self, user_id: UserId, asset: &str) -> StoreResult<UserBalance>;

    /// All balances of a user, by asset ascending.
    async fn get_user_balances(&self, user_id: UserId) -> StoreResult<Vec<UserBalance>>;

    /// Insert, or overwrite only if free or locked differ from the stored row.
    ///
    /// Returns `true` when a write happened; `balance.id` and `balance.updated_at` are then set.
    /// Returns `false`, without error, when the stored values were already identical.
    async fn update_balance(&self, balance: &mut UserBalance) -> StoreResult<bool>;

    /// Reconcile a set of assets for one user atomically.
    ///
    /// Every entry is upserted-if-changed with one shared timestamp, then rows of the user that
    /// are zero on both sides, older than that timestamp and absent from the batch are pruned.
    /// Any failure rolls the whole pass back.
    async fn update_user_balances(&self, user_id: UserId, batch: &mut [UserBalance]) -> StoreResult<()>;
}

/// Everything the trading engine needs from the store.
pub trait Storage: OrderStore + OrderUpdateStore + TradeStore + BalanceStore {}

impl<T> Storage for T where T: OrderStore + OrderUpdateStore + TradeStore + BalanceStore {}

/// Build the backend named in the config.
pub async fn open(config: &StoreConfig) -> StoreResult<Arc<dyn Storage>> {
    match config.backend {
        Backend::Postgres => Ok(Arc::new(PgStorage::connect(config).await?)),
        Backend::Memory => Ok(Arc::new(MemoryStorage::new())),
    }
}

/// Timestamp shared by every row of one reconciliation pass, at `TIMESTAMPTZ` resolution.
pub(crate) fn batch_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
