use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::order::UserId;

/// Balance per (user, asset). Free and locked are expected to be non-negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalance {
    pub id: i64,
    pub user_id: UserId,
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl UserBalance {
    /// A balance ready to be written; `id` and `updated_at` are filled in by the ledger.
    pub fn new(user_id: UserId, asset: impl Into<String>, free: Decimal, locked: Decimal) -> Self {
        Self {
            id: 0,
            user_id,
            asset: asset.into(),
            free,
            locked,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.free.is_zero() && self.locked.is_zero()
    }
}
