pub mod balance;
pub mod order;
pub mod order_update;
pub mod trade;
