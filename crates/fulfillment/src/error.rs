//! Fulfillment error types.

use domain::DomainError;
use inventory::InventoryError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during checkout and order completion.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A write lost to a concurrent writer and could not be recovered.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Input was rejected before anything was changed.
    #[error("Invalid input: {0}")]
    Invalid(#[from] DomainError),

    /// An external collaborator failed or timed out.
    #[error("Upstream {service} error: {reason}")]
    Upstream { service: &'static str, reason: String },

    /// A persistence failure; the operation can be retried.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for FulfillmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => FulfillmentError::NotFound { entity, id },
            StoreError::Conflict { constraint } => FulfillmentError::Conflict(constraint),
            other => FulfillmentError::Store(other),
        }
    }
}

impl From<InventoryError> for FulfillmentError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Store(e) => e.into(),
        }
    }
}

impl FulfillmentError {
    pub(crate) fn upstream(service: &'static str, reason: impl Into<String>) -> Self {
        FulfillmentError::Upstream {
            service,
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_keep_their_class() {
        let not_found: FulfillmentError = StoreError::NotFound {
            entity: "cart",
            id: "x".into(),
        }
        .into();
        assert!(matches!(not_found, FulfillmentError::NotFound { entity: "cart", .. }));

        let conflict: FulfillmentError = StoreError::Conflict {
            constraint: "c".into(),
        }
        .into();
        assert!(matches!(conflict, FulfillmentError::Conflict(_)));

        let other: FulfillmentError = StoreError::Unavailable("down".into()).into();
        assert!(matches!(other, FulfillmentError::Store(_)));
    }
}
