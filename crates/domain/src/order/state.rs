//! Order fulfillment status.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Fulfillment status of a finalized order.
///
/// State transitions:
/// ```text
/// Paid ──► Shipped ──► Completed
/// ```
/// Orders are created already `Paid`; there is no unpaid order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentStatus {
    #[default]
    Paid,
    Shipped,
    Completed,
}

impl FulfillmentStatus {
    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Paid => "PAID",
            FulfillmentStatus::Shipped => "SHIPPED",
            FulfillmentStatus::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FulfillmentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAID" => Ok(FulfillmentStatus::Paid),
            "SHIPPED" => Ok(FulfillmentStatus::Shipped),
            "COMPLETED" => Ok(FulfillmentStatus::Completed),
            other => Err(DomainError::UnknownStatus {
                kind: "fulfillment",
                value: other.to_string(),
            }),
        }
    }
}
