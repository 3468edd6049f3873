//! Order audit log: append a transition, read one order's history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::debug;

use crate::error::{Entity, StoreError};
use crate::types::order::{OrderStatus, UserId};
use crate::types::order_update::OrderUpdate;

#[derive(Debug, FromRow)]
struct OrderUpdateRow {
    id: i64,
    user_id: i64,
    order_id: String,
    status: String,
    executed_quantity: Decimal,
    cummulative_quote_qty: Decimal,
    update_time: DateTime<Utc>,
    raw_data: Json<serde_json::Value>,
}

impl From<OrderUpdateRow> for OrderUpdate {
    fn from(row: OrderUpdateRow) -> Self {
        OrderUpdate {
            id: row.id,
            user_id: row.user_id,
            order_id: row.order_id,
            status: OrderStatus::from(row.status),
            executed_quantity: row.executed_quantity,
            cummulative_quote_qty: row.cummulative_quote_qty,
            update_time: row.update_time,
            raw_data: row.raw_data.0,
        }
    }
}

/// Pure insert; repeated transitions are legal.
pub async fn insert_order_update(pool: &PgPool, update: &OrderUpdate) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO order_updates (user_id, order_id, status, executed_quantity, cummulative_quote_qty, update_time, raw_data) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(update.user_id)
    .bind(&update.order_id)
    .bind(update.status.as_str())
    .bind(update.executed_quantity)
    .bind(update.cummulative_quote_qty)
    .bind(update.update_time)
    .bind(Json(&update.raw_data))
    .execute(pool)
    .await
    .map_err(|e| StoreError::from_sqlx("append_order_update", Entity::OrderUpdate, &update.order_id, e))?;

    debug!(order_id = %update.order_id, status = %update.status, "order update appended");
    Ok(())
}

pub async fn list_order_updates(
    pool: &PgPool,
    user_id: UserId,
    order_id: &str,
) -> Result<Vec<OrderUpdate>, StoreError> {
    let rows = sqlx::query_as::<_, OrderUpdateRow>(
        "SELECT id, user_id, order_id, status, executed_quantity, cummulative_quote_qty, update_time, raw_data \
         FROM order_updates WHERE user_id = $1 AND order_id = $2 ORDER BY update_time DESC, id DESC",
    )
    .bind(user_id)
    .bind(order_id)
    .fetch_all(pool)
    .await
    .map_err(|e| StoreError::from_sqlx("get_order_updates", Entity::OrderUpdate, order_id, e))?;
    Ok(rows.into_iter().map(OrderUpdate::from).collect())
}
