//! Store error taxonomy and classification of driver errors.

use std::fmt;

use thiserror::Error;

/// Boxed source for infrastructure failures, so non-sqlx backends can report them too.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Entity kinds named in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Order,
    OrderUpdate,
    Trade,
    Balance,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Order => "order",
            Entity::OrderUpdate => "order update",
            Entity::Trade => "trade",
            Entity::Balance => "balance",
        })
    }
}

/// Coarse error kind, for callers that branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    DuplicateKey,
    StoreUnavailable,
    Rejected,
    Malformed,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity absent on read, or zero rows affected by a targeted mutation.
    #[error("{entity} {key} not found")]
    NotFound { entity: Entity, key: String },

    /// Uniqueness violation on insert.
    #[error("{entity} {key} already exists")]
    DuplicateKey { entity: Entity, key: String },

    /// Transport, connection or transaction failure. Never retried here.
    #[error("{context}: {source}")]
    StoreUnavailable {
        context: String,
        #[source]
        source: BoxError,
    },

    /// The database refused the values themselves: a foreign key, check, not-null or data-range
    /// violation. Retrying the same write fails the same way.
    #[error("{entity} {key} rejected: {reason}")]
    Rejected {
        entity: Entity,
        key: String,
        reason: String,
    },

    /// A row could not be mapped back to its entity.
    #[error("{context}: malformed row: {reason}")]
    Malformed { context: String, reason: String },
}

impl StoreError {
    pub fn not_found(entity: Entity, key: impl fmt::Display) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn duplicate(entity: Entity, key: impl fmt::Display) -> Self {
        StoreError::DuplicateKey {
            entity,
            key: key.to_string(),
        }
    }

    pub fn unavailable(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StoreError::StoreUnavailable {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn rejected(entity: Entity, key: impl fmt::Display, reason: impl Into<String>) -> Self {
        StoreError::Rejected {
            entity,
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn malformed(context: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Malformed {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Classify a driver error. `entity`/`key` identify the natural key the operation targeted.
    pub fn from_sqlx(
        context: impl Into<String>,
        entity: Entity,
        key: impl fmt::Display,
        err: sqlx::Error,
    ) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found(entity, key),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => Self::duplicate(entity, key),
            // SQLSTATE classes 22 (data exception) and 23 (integrity constraint violation).
            sqlx::Error::Database(ref db)
                if db.code().is_some_and(|c| c.starts_with("22") || c.starts_with("23")) =>
            {
                Self::rejected(entity, key, db.message())
            }
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::Decode(_) => Self::malformed(context, err.to_string()),
            other => Self::unavailable(context, other),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            StoreError::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            StoreError::Rejected { .. } => ErrorKind::Rejected,
            StoreError::Malformed { .. } => ErrorKind::Malformed,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_duplicate_key(&self) -> bool {
        self.kind() == ErrorKind::DuplicateKey
    }
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
