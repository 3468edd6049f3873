//! PostgreSQL adapter: pool, migrations, and access for orders, order updates, trades, balances.

mod balances;
pub mod filter;
mod order_updates;
mod orders;
mod pool;
mod trades;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::QueryAs;
use sqlx::{FromRow, Postgres};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::store::{BalanceStore, OrderStore, OrderUpdateStore, StoreResult, TradeStore};
use crate::types::balance::UserBalance;
use crate::types::order::{Order, OrderFilter, OrderStatus, UserId};
use crate::types::order_update::OrderUpdate;
use crate::types::trade::{Trade, TradeFilter};
use filter::QueryArg;

pub use pool::{create_pool, create_pool_and_migrate, run_migrations};
pub use sqlx::PgPool;

/// Bind composed positional arguments in order.
fn bind_args<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    args: &'q [QueryArg],
) -> QueryAs<'q, Postgres, O, PgArguments>
where
    O: for<'r> FromRow<'r, PgRow>,
{
    for arg in args {
        query = match arg {
            QueryArg::Int(v) => query.bind(*v),
            QueryArg::Text(s) => query.bind(s.as_str()),
            QueryArg::Time(t) => query.bind(*t),
        };
    }
    query
}

/// All four stores over one shared pool.
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Connect with the given config and apply migrations.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let pool = create_pool_and_migrate(config)
            .await
            .map_err(|e| StoreError::unavailable("connect", e))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool (schema assumed present).
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::unavailable("ping", e))?;
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl OrderStore for PgStorage {
    async fn create_order(&self, order: &Order) -> StoreResult<()> {
        orders::insert_order(&self.pool, order).await
    }

    async fn get_order_by_id(&self, mexc_order_id: &str) -> StoreResult<Order> {
        orders::get_order_by_id(&self.pool, mexc_order_id).await
    }

    async fn update_order_status(&self, mexc_order_id: &str, status: &OrderStatus) -> StoreResult<()> {
        orders::update_order_status(&self.pool, mexc_order_id, status).await
    }

    async fn delete_order_by_id(&self, mexc_order_id: &str) -> StoreResult<()> {
        orders::delete_order(&self.pool, mexc_order_id).await
    }

    async fn get_user_orders(
        &self,
        user_id: UserId,
        filter: Option<&OrderFilter>,
    ) -> StoreResult<Vec<Order>> {
        orders::list_user_orders(&self.pool, user_id, filter).await
    }

    async fn get_open_orders(&self, user_id: UserId, symbol: Option<&str>) -> StoreResult<Vec<Order>> {
        orders::list_open_orders(&self.pool, user_id, symbol).await
    }
}

#[async_trait]
impl OrderUpdateStore for PgStorage {
    async fn append_order_update(&self, update: &OrderUpdate) -> StoreResult<()> {
        order_updates::insert_order_update(&self.pool, update).await
    }

    async fn get_order_updates(&self, user_id: UserId, order_id: &str) -> StoreResult<Vec<OrderUpdate>> {
        order_updates::list_order_updates(&self.pool, user_id, order_id).await
    }
}

#[async_trait]
impl TradeStore for PgStorage {
    async fn create_trade(&self, trade: &mut Trade) -> StoreResult<()> {
        trades::insert_trade(&self.pool, trade).await
    }

    async fn get_trade_by_id(&self, mexc_trade_id: &str) -> StoreResult<Trade> {
        trades::get_trade_by_id(&self.pool, mexc_trade_id).await
    }

    async fn get_user_trades(
        &self,
        user_id: UserId,
        filter: Option<&TradeFilter>,
    ) -> StoreResult<Vec<Trade>> {
        trades::list_trades_for_user(&self.pool, user_id, filter).await
    }
}

#[async_trait]
impl BalanceStore for PgStorage {
    async fn get_balance(&self, user_id: UserId, asset: &str) -> StoreResult<UserBalance> {
        balances::get_balance(&self.pool, user_id, asset).await
    }

    async fn get_user_balances(&self, user_id: UserId) -> StoreResult<Vec<UserBalance>> {
        balances::list_balances_for_user(&self.pool, user_id).await
    }

    async fn update_balance(&self, balance: &mut UserBalance) -> StoreResult<bool> {
        balances::update_balance(&self.pool, balance).await
    }

    async fn update_user_balances(&self, user_id: UserId, batch: &mut [UserBalance]) -> StoreResult<()> {
        balances::reconcile_user_balances(&self.pool, user_id, batch).await
    }
}
