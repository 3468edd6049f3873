//! Persistence core for a spot trading bot: orders, their audit trail, trades, and the
//! per-user balance ledger, behind async capability traits.

pub mod config;
pub mod error;
pub mod memory;
pub mod persistence;
pub mod store;
pub mod types;

pub use config::{Backend, StoreConfig};
pub use error::{Entity, ErrorKind, StoreError};
pub use memory::MemoryStorage;
pub use persistence::PgStorage;
pub use store::{BalanceStore, OrderStore, OrderUpdateStore, Storage, StoreResult, TradeStore, open};
