//! Inventory error types.

use thiserror::Error;

/// Errors that can occur while aggregating inventory.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
