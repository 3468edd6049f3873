//! Composes optional filter predicates into one parameterized query.
//!
//! The owner id is always `$1`; each further predicate takes the next index in the order it is
//! appended. Rows are ordered by the given sort column descending, then by `id` descending, and
//! `LIMIT`/`OFFSET` come last.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::types::order::{OrderFilter, UserId};
use crate::types::trade::TradeFilter;

/// A positional argument of a composed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryArg {
    Int(i64),
    Text(String),
    Time(DateTime<Utc>),
}

/// Table-specific columns the builder needs.
#[derive(Debug, Clone, Copy)]
pub struct ListShape {
    /// `SELECT ... FROM table`, without a `WHERE` clause.
    pub select: &'static str,
    /// Column the start/end bounds apply to.
    pub time_column: &'static str,
    /// Primary sort key (descending); `id DESC` breaks ties.
    pub sort_column: &'static str,
}

/// Filter fields shared by order and trade listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub symbol: Option<String>,
    pub status: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl From<&OrderFilter> for ListFilter {
    fn from(f: &OrderFilter) -> Self {
        Self {
            symbol: f.symbol.clone(),
            status: f.status.as_ref().map(|s| s.as_str().to_string()),
            start_time: f.start_time,
            end_time: f.end_time,
            limit: f.limit,
            offset: f.offset,
        }
    }
}

impl From<&TradeFilter> for ListFilter {
    fn from(f: &TradeFilter) -> Self {
        Self {
            symbol: f.symbol.clone(),
            status: None,
            start_time: f.start_time,
            end_time: f.end_time,
            limit: f.limit,
            offset: f.offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    pub sql: String,
    pub args: Vec<QueryArg>,
}

struct Builder {
    sql: String,
    args: Vec<QueryArg>,
}

impl Builder {
    fn new(select: &str, user_id: UserId) -> Self {
        Self {
            sql: format!("{select} WHERE user_id = $1"),
            args: vec![QueryArg::Int(user_id)],
        }
    }

    /// Append `prefix` followed by the next positional placeholder.
    fn push(&mut self, prefix: &str, arg: QueryArg) {
        self.args.push(arg);
        let _ = write!(self.sql, "{prefix}${}", self.args.len());
    }

    fn and_eq(&mut self, column: &str, value: Option<&str>) {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            self.push(&format!(" AND {column} = "), QueryArg::Text(v.to_string()));
        }
    }

    fn and_cmp(&mut self, column: &str, op: &str, value: Option<DateTime<Utc>>) {
        if let Some(t) = value {
            self.push(&format!(" AND {column} {op} "), QueryArg::Time(t));
        }
    }

    fn keyword(&mut self, keyword: &str, value: Option<u32>) {
        if let Some(n) = value.filter(|n| *n > 0) {
            self.push(&format!(" {keyword} "), QueryArg::Int(i64::from(n)));
        }
    }
}

/// Build the listing query for one owner.
pub fn build_list_query(shape: &ListShape, user_id: UserId, filter: &ListFilter) -> BuiltQuery {
    let mut b = Builder::new(shape.select, user_id);
    b.and_eq("symbol", filter.symbol.as_deref());
    b.and_eq("status", filter.status.as_deref());
    b.and_cmp(shape.time_column, ">=", filter.start_time);
    b.and_cmp(shape.time_column, "<=", filter.end_time);
    let _ = write!(b.sql, " ORDER BY {} DESC, id DESC", shape.sort_column);
    b.keyword("LIMIT", filter.limit);
    b.keyword("OFFSET", filter.offset);
    BuiltQuery {
        sql: b.sql,
        args: b.args,
    }
}
