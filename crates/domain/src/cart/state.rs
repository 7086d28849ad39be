//! Cart status state machine.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of a cart in its lifecycle.
///
/// State transitions:
/// ```text
/// Open ──┬──► Abandoned ──► Completed
///        └──────────────────► Completed
/// ```
/// `Completed` always wins over `Abandoned`: a payment that lands after the
/// sweep has aged a cart out still completes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartStatus {
    /// Cart is live; submissions overwrite its contents.
    #[default]
    Open,

    /// Cart sat idle past the sweep threshold.
    Abandoned,

    /// Cart was paid for (terminal state).
    Completed,
}

impl CartStatus {
    /// Returns true if a new submission may overwrite the cart.
    pub fn can_update(&self) -> bool {
        matches!(self, CartStatus::Open)
    }

    /// Returns true if the sweep may age the cart out.
    pub fn can_abandon(&self) -> bool {
        matches!(self, CartStatus::Open)
    }

    /// Returns true if an order may claim the cart.
    pub fn can_complete(&self) -> bool {
        matches!(self, CartStatus::Open | CartStatus::Abandoned)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CartStatus::Completed)
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Open => "OPEN",
            CartStatus::Abandoned => "ABANDONED",
            CartStatus::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CartStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(CartStatus::Open),
            "ABANDONED" => Ok(CartStatus::Abandoned),
            "COMPLETED" => Ok(CartStatus::Completed),
            other => Err(DomainError::UnknownStatus {
                kind: "cart",
                value: other.to_string(),
            }),
        }
    }
}
