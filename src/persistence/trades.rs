//! Trade persistence: insert on fill, point lookup, filtered history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::debug;

use super::bind_args;
use super::filter::{ListFilter, ListShape, build_list_query};
use crate::error::{Entity, StoreError};
use crate::types::order::UserId;
use crate::types::trade::{Trade, TradeFilter};

const TRADE_COLUMNS: &str = "SELECT id, user_id, mexc_trade_id, order_id, symbol, price, quantity, \
     quote_quantity, commission, commission_asset, trade_time, is_buyer, is_maker, created_at FROM trades";

// History is ordered by execution time, not by insertion time.
const TRADE_LIST: ListShape = ListShape {
    select: TRADE_COLUMNS,
    time_column: "trade_time",
    sort_column: "trade_time",
};

#[derive(Debug, FromRow)]
pub struct TradeRow {
    pub id: i64,
    pub user_id: i64,
    pub mexc_trade_id: String,
    pub order_id: String,
    pub symbol: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub quote_quantity: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
    pub trade_time: DateTime<Utc>,
    pub is_buyer: bool,
    pub is_maker: bool,
    pub created_at: DateTime<Utc>,
}

fn trade_row_to_trade(row: TradeRow) -> Trade {
    Trade {
        id: row.id,
        user_id: row.user_id,
        mexc_trade_id: row.mexc_trade_id,
        order_id: row.order_id,
        symbol: row.symbol,
        price: row.price,
        quantity: row.quantity,
        quote_quantity: row.quote_quantity,
        commission: row.commission,
        commission_asset: row.commission_asset,
        trade_time: row.trade_time,
        is_buyer: row.is_buyer,
        is_maker: row.is_maker,
        created_at: row.created_at,
    }
}

/// Insert a single trade and write back the store-assigned id and creation time.
pub async fn insert_trade(pool: &PgPool, trade: &mut Trade) -> Result<(), StoreError> {
    let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
        "INSERT INTO trades (user_id, mexc_trade_id, order_id, symbol, price, quantity, \
         quote_quantity, commission, commission_asset, trade_time, is_buyer, is_maker) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING id, created_at",
    )
    .bind(trade.user_id)
    .bind(&trade.mexc_trade_id)
    .bind(&trade.order_id)
    .bind(&trade.symbol)
    .bind(trade.price)
    .bind(trade.quantity)
    .bind(trade.quote_quantity)
    .bind(trade.commission)
    .bind(&trade.commission_asset)
    .bind(trade.trade_time)
    .bind(trade.is_buyer)
    .bind(trade.is_maker)
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::from_sqlx("create_trade", Entity::Trade, &trade.mexc_trade_id, e))?;

    trade.id = id;
    trade.created_at = created_at;
    debug!(mexc_trade_id = %trade.mexc_trade_id, order_id = %trade.order_id, "trade recorded");
    Ok(())
}

pub async fn get_trade_by_id(pool: &PgPool, mexc_trade_id: &str) -> Result<Trade, StoreError> {
    sqlx::query_as::<_, TradeRow>(&format!("{TRADE_COLUMNS} WHERE mexc_trade_id = $1"))
        .bind(mexc_trade_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| StoreError::from_sqlx("get_trade_by_id", Entity::Trade, mexc_trade_id, e))?
        .map(trade_row_to_trade)
        .ok_or_else(|| StoreError::not_found(Entity::Trade, mexc_trade_id))
}

/// List a user's trades through the predicate builder.
pub async fn list_trades_for_user(
    pool: &PgPool,
    user_id: UserId,
    filter: Option<&TradeFilter>,
) -> Result<Vec<Trade>, StoreError> {
    let filter = filter.map(ListFilter::from).unwrap_or_default();
    let query = build_list_query(&TRADE_LIST, user_id, &filter);
    let rows = bind_args(sqlx::query_as::<_, TradeRow>(&query.sql), &query.args)
        .fetch_all(pool)
        .await
        .map_err(|e| StoreError::from_sqlx("get_user_trades", Entity::Trade, format!("user {user_id}"), e))?;
    Ok(rows.into_iter().map(trade_row_to_trade).collect())
}
