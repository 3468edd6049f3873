//! Order persistence: insert, point lookup, status update, delete, filtered and open listings.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::debug;

use super::bind_args;
use super::filter::{ListFilter, ListShape, build_list_query};
use crate::error::{Entity, StoreError};
use crate::types::order::{Order, OrderFilter, OrderSide, OrderStatus, OrderType, UserId};

const ORDER_COLUMNS: &str = "SELECT id, internal_id, user_id, mexc_order_id, symbol, side, type, status, \
     price, quantity, quote_order_qty, executed_quantity, cummulative_quote_qty, client_order_id, \
     transact_time, created_at, updated_at FROM orders";

const ORDER_LIST: ListShape = ListShape {
    select: ORDER_COLUMNS,
    time_column: "transact_time",
    sort_column: "created_at",
};

#[derive(Debug, FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub internal_id: i64,
    pub user_id: i64,
    pub mexc_order_id: String,
    pub symbol: String,
    pub side: String,
    #[sqlx(rename = "type")]
    pub order_type: String,
    pub status: String,
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

/// Convert a row back to an `Order`. Only the side has a closed domain.
pub fn order_row_to_order(row: OrderRow) -> Result<Order, StoreError> {
    let side: OrderSide = row
        .side
        .parse()
        .map_err(|reason: String| StoreError::malformed(format!("order {}", row.mexc_order_id), reason))?;
    Ok(Order {
        id: row.id,
        internal_id: row.internal_id,
        user_id: row.user_id,
        mexc_order_id: row.mexc_order_id,
        symbol: row.symbol,
        side,
        order_type: OrderType::from(row.order_type),
        status: OrderStatus::from(row.status),
        price: row.price,
        quantity: row.quantity,
        quote_order_qty: row.quote_order_qty,
        executed_quantity: row.executed_quantity,
        cummulative_quote_qty: row.cummulative_quote_qty,
        client_order_id: row.client_order_id,
        transact_time: row.transact_time,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn rows_to_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError> {
    rows.into_iter().map(order_row_to_order).collect()
}

/// Insert an order. `created_at`/`updated_at` are assigned by the database.
pub async fn insert_order(pool: &PgPool, order: &Order) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO orders (internal_id, user_id, mexc_order_id, symbol, side, type, status, \
         price, quantity, quote_order_qty, executed_quantity, cummulative_quote_qty, client_order_id, transact_time) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(order.internal_id)
    .bind(order.user_id)
    .bind(&order.mexc_order_id)
    .bind(&order.symbol)
    .bind(order.side.as_str())
    .bind(order.order_type.as_str())
    .bind(order.status.as_str())
    .bind(order.price)
    .bind(order.quantity)
    .bind(order.quote_order_qty)
    .bind(order.executed_quantity)
    .bind(order.cummulative_quote_qty)
    .bind(order.client_order_id.as_deref())
    .bind(order.transact_time)
    .execute(pool)
    .await
    .map_err(|e| StoreError::from_sqlx("create_order", Entity::Order, &order.mexc_order_id, e))?;

    debug!(mexc_order_id = %order.mexc_order_id, user_id = order.user_id, "order created");
    Ok(())
}

/// Get a single order by its exchange id.
pub async fn get_order_by_id(pool: &PgPool, mexc_order_id: &str) -> Result<Order, StoreError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!("{ORDER_COLUMNS} WHERE mexc_order_id = $1"))
        .bind(mexc_order_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| StoreError::from_sqlx("get_order_by_id", Entity::Order, mexc_order_id, e))?
        .ok_or_else(|| StoreError::not_found(Entity::Order, mexc_order_id))?;
    order_row_to_order(row)
}

/// Overwrite the status. The affected-row count decides existence.
pub async fn update_order_status(
    pool: &PgPool,
    mexc_order_id: &str,
    status: &OrderStatus,
) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE orders SET status = $1, updated_at = NOW() WHERE mexc_order_id = $2")
        .bind(status.as_str())
        .bind(mexc_order_id)
        .execute(pool)
        .await
        .map_err(|e| StoreError::from_sqlx("update_order_status", Entity::Order, mexc_order_id, e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(Entity::Order, mexc_order_id));
    }
    debug!(mexc_order_id, status = %status, "order status updated");
    Ok(())
}

pub async fn delete_order(pool: &PgPool, mexc_order_id: &str) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM orders WHERE mexc_order_id = $1")
        .bind(mexc_order_id)
        .execute(pool)
        .await
        .map_err(|e| StoreError::from_sqlx("delete_order_by_id", Entity::Order, mexc_order_id, e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(Entity::Order, mexc_order_id));
    }
    debug!(mexc_order_id, "order deleted");
    Ok(())
}

/// List a user's orders through the predicate builder.
pub async fn list_user_orders(
    pool: &PgPool,
    user_id: UserId,
    filter: Option<&OrderFilter>,
) -> Result<Vec<Order>, StoreError> {
    let filter = filter.map(ListFilter::from).unwrap_or_default();
    let query = build_list_query(&ORDER_LIST, user_id, &filter);
    let rows = bind_args(sqlx::query_as::<_, OrderRow>(&query.sql), &query.args)
        .fetch_all(pool)
        .await
        .map_err(|e| StoreError::from_sqlx("get_user_orders", Entity::Order, format!("user {user_id}"), e))?;
    rows_to_orders(rows)
}

/// List open orders (NEW or PARTIALLY_FILLED) for a user, optionally for one symbol.
pub async fn list_open_orders(
    pool: &PgPool,
    user_id: UserId,
    symbol: Option<&str>,
) -> Result<Vec<Order>, StoreError> {
    let open = OrderStatus::OPEN.map(|s| s.as_str().to_string());
    let mut sql = format!("{ORDER_COLUMNS} WHERE user_id = $1 AND status = ANY($2)");
    let symbol = symbol.filter(|s| !s.is_empty());
    if symbol.is_some() {
        sql.push_str(" AND symbol = $3");
    }
    sql.push_str(" ORDER BY created_at DESC, id DESC");

    let mut query = sqlx::query_as::<_, OrderRow>(&sql).bind(user_id).bind(&open[..]);
    if let Some(symbol) = symbol {
        query = query.bind(symbol);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .map_err(|e| StoreError::from_sqlx("get_open_orders", Entity::Order, format!("user {user_id}"), e))?;
    rows_to_orders(rows)
}
