//! Balance ledger: conditional single-asset upserts and atomic multi-asset reconciliation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, FromRow, PgConnection, PgPool, Postgres};
use tracing::{debug, warn};

use crate::error::{Entity, StoreError};
use crate::store::batch_timestamp;
use crate::types::balance::UserBalance;
use crate::types::order::UserId;

/// Insert, or overwrite only when a value changed. Yields the id only if a row was written.
const UPSERT_IF_CHANGED: &str = "INSERT INTO user_balances (user_id, asset, free, locked, updated_at) \
     VALUES ($1, $2, $3, $4, $5) \
     ON CONFLICT (user_id, asset) DO UPDATE SET \
         free = EXCLUDED.free, locked = EXCLUDED.locked, updated_at = EXCLUDED.updated_at \
     WHERE user_balances.free <> EXCLUDED.free OR user_balances.locked <> EXCLUDED.locked \
     RETURNING id";

/// Reconciliation write: every reported asset is stamped with the batch time.
const UPSERT_STAMPED: &str = "INSERT INTO user_balances (user_id, asset, free, locked, updated_at) \
     VALUES ($1, $2, $3, $4, $5) \
     ON CONFLICT (user_id, asset) DO UPDATE SET \
         free = EXCLUDED.free, locked = EXCLUDED.locked, updated_at = EXCLUDED.updated_at \
     RETURNING id";

/// Drained rows this pass did not touch.
const PRUNE_STALE_ZEROS: &str = "DELETE FROM user_balances \
     WHERE user_id = $1 AND free = 0 AND locked = 0 AND updated_at < $2";

#[derive(Debug, FromRow)]
pub struct BalanceRow {
    pub id: i64,
    pub user_id: i64,
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl From<BalanceRow> for UserBalance {
    fn from(row: BalanceRow) -> Self {
        UserBalance {
            id: row.id,
            user_id: row.user_id,
            asset: row.asset,
            free: row.free,
            locked: row.locked,
            updated_at: row.updated_at,
        }
    }
}

fn balance_key(user_id: UserId, asset: &str) -> String {
    format!("{user_id}/{asset}")
}

pub async fn get_balance(pool: &PgPool, user_id: UserId, asset: &str) -> Result<UserBalance, StoreError> {
    sqlx::query_as::<_, BalanceRow>(
        "SELECT id, user_id, asset, free, locked, updated_at FROM user_balances WHERE user_id = $1 AND asset = $2",
    )
    .bind(user_id)
    .bind(asset)
    .fetch_optional(pool)
    .await
    .map_err(|e| StoreError::from_sqlx("get_balance", Entity::Balance, balance_key(user_id, asset), e))?
    .map(UserBalance::from)
    .ok_or_else(|| StoreError::not_found(Entity::Balance, balance_key(user_id, asset)))
}

pub async fn list_balances_for_user(pool: &PgPool, user_id: UserId) -> Result<Vec<UserBalance>, StoreError> {
    let rows = sqlx::query_as::<_, BalanceRow>(
        "SELECT id, user_id, asset, free, locked, updated_at FROM user_balances WHERE user_id = $1 ORDER BY asset",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| StoreError::from_sqlx("get_user_balances", Entity::Balance, format!("user {user_id}"), e))?;
    Ok(rows.into_iter().map(UserBalance::from).collect())
}

/// Run the conditional upsert. `Ok(None)` means the stored row already matched.
async fn upsert_if_changed<'e, E>(
    executor: E,
    balance: &UserBalance,
    updated_at: DateTime<Utc>,
) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar::<_, i64>(UPSERT_IF_CHANGED)
        .bind(balance.user_id)
        .bind(&balance.asset)
        .bind(balance.free)
        .bind(balance.locked)
        .bind(updated_at)
        .fetch_optional(executor)
        .await
}

/// Single-asset upsert-if-changed. Returns whether a write happened.
pub async fn update_balance(pool: &PgPool, balance: &mut UserBalance) -> Result<bool, StoreError> {
    let now = batch_timestamp();
    let written = upsert_if_changed(pool, balance, now).await.map_err(|e| {
        StoreError::from_sqlx(
            "update_balance",
            Entity::Balance,
            balance_key(balance.user_id, &balance.asset),
            e,
        )
    })?;

    let applied = match written {
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

/// Reconcile all given assets of one user in a single transaction.
pub async fn reconcile_user_balances(
    pool: &PgPool,
    user_id: UserId,
    balances: &mut [UserBalance],
) -> Result<(), StoreError> {
    if balances.is_empty() {
        return Ok(());
    }
    let user_key = format!("user {user_id}");

    let mut tx = pool.begin().await.map_err(|e| {
        StoreError::unavailable(format!("update_user_balances({user_key}): begin transaction"), e)
    })?;
    let batch_time = batch_timestamp();

    match apply_batch(&mut *tx, user_id, balances, batch_time).await {
        Ok(pruned) => {
            tx.commit().await.map_err(|e| {
                StoreError::unavailable(format!("update_user_balances({user_key}): commit"), e)
            })?;
            debug!(user_id, assets = balances.len(), pruned, "balances reconciled");
            Ok(())
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(user_id, error = %rollback_err, "rollback of balance reconciliation failed");
            }
            Err(err)
        }
    }
}

async fn apply_batch(
    conn: &mut PgConnection,
    user_id: UserId,
    balances: &mut [UserBalance],
    batch_time: DateTime<Utc>,
) -> Result<u64, StoreError> {
    for balance in balances.iter_mut() {
        balance.user_id = user_id;
        let id = sqlx::query_scalar::<_, i64>(UPSERT_STAMPED)
            .bind(user_id)
            .bind(&balance.asset)
            .bind(balance.free)
            .bind(balance.locked)
            .bind(batch_time)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| {
                StoreError::from_sqlx(
                    format!("update_user_balances(user {user_id}): upsert {}", balance.asset),
                    Entity::Balance,
                    balance_key(user_id, &balance.asset),
                    e,
                )
            })?;
        balance.id = id;
        balance.updated_at = batch_time;
    }

    let pruned = sqlx::query(PRUNE_STALE_ZEROS)
        .bind(user_id)
        .bind(batch_time)
        .execute(conn)
        .await
        .map_err(|e| StoreError::unavailable(format!("update_user_balances(user {user_id}): prune zero balances"), e))?
        .rows_affected();
    Ok(pruned)
}
