use domain::DomainError;
use thiserror::Error;

/// Name of the uniqueness constraint on an order's payment session.
pub const ORDER_SESSION_CONSTRAINT: &str = "unique_order_payment_session";

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A write was rejected by a uniqueness constraint.
    #[error("Conflict on constraint {constraint}")]
    Conflict { constraint: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value no longer satisfies domain rules.
    #[error("Invalid stored value: {0}")]
    Decode(#[from] DomainError),

    /// The store refused the operation (injected in tests).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns true if this is the duplicate-order-for-session conflict.
    pub fn is_duplicate_order(&self) -> bool {
        matches!(self, StoreError::Conflict { constraint } if constraint == ORDER_SESSION_CONSTRAINT)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
