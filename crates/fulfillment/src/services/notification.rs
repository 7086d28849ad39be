//! Notification service trait, message templates and in-memory implementation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{CartId, OrderId};
use domain::{Email, LineItem, Money, SessionRef};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{FulfillmentError, Result};

/// A templated message. Rendering is the notifier's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum Notification {
    /// Reminder for an abandoned cart.
    CartRecovery {
        cart_id: CartId,
        recovery_link: String,
        items: Vec<LineItem>,
        subtotal: Money,
    },
    /// Receipt for a completed order.
    Receipt {
        order_id: OrderId,
        session_ref: SessionRef,
        items: Vec<LineItem>,
        discount: Money,
        total: Money,
    },
}

impl Notification {
    /// Template name, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::CartRecovery { .. } => "cart_recovery",
            Notification::Receipt { .. } => "receipt",
        }
    }

    /// Key identifying this message; a notifier may use it to drop repeats.
    pub fn idempotency_key(&self) -> String {
        match self {
            Notification::CartRecovery { cart_id, .. } => format!("cart-recovery:{cart_id}"),
            Notification::Receipt { session_ref, .. } => format!("receipt:{session_ref}"),
        }
    }
}

/// Sends templated messages to an address.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &Email, notification: Notification) -> Result<()>;
}

/// Sends a notification without letting its failure escape.
///
/// The send is bounded by `timeout`. A failure or timeout is logged with a
/// distinct reason and counted; the return value says whether it was sent.
pub async fn send_best_effort<N: Notifier + ?Sized>(
    notifier: &N,
    to: &Email,
    notification: Notification,
    timeout: Duration,
) -> bool {
    let kind = notification.kind();
    let key = notification.idempotency_key();

    let reason = match tokio::time::timeout(timeout, notifier.send(to, notification)).await {
        Ok(Ok(())) => return true,
        Ok(Err(e)) => {
            tracing::warn!(kind, key = %key, error = %e, reason = "send_failed", "notification failed");
            "send_failed"
        }
        Err(_) => {
            tracing::warn!(kind, key = %key, timeout_ms = timeout.as_millis() as u64, reason = "timeout", "notification failed");
            "timeout"
        }
    };
    metrics::counter!("notifications_failed_total", "kind" => kind, "reason" => reason).increment(1);
    false
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<(Email, Notification)>,
    failing: HashSet<Email>,
    delay: Option<Duration>,
}

/// In-memory notifier for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send to `email` fail.
    pub async fn fail_for(&self, email: Email) {
        self.state.write().await.failing.insert(email);
    }

    /// Delays every send, for exercising timeouts.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().await.delay = delay;
    }

    /// Returns every message delivered so far.
    pub async fn sent(&self) -> Vec<(Email, Notification)> {
        self.state.read().await.sent.clone()
    }

    /// Returns the number of delivered messages of a template kind.
    pub async fn count_of(&self, kind: &str) -> usize {
        self.state.read().await.sent.iter().filter(|(_, n)| n.kind() == kind).count()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, to: &Email, notification: Notification) -> Result<()> {
        let delay = self.state.read().await.delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        if state.failing.contains(to) {
            return Err(FulfillmentError::upstream("notification", format!("mailbox {to} rejected")));
        }
        state.sent.push((to.clone(), notification));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recovery() -> Notification {
        Notification::CartRecovery {
            cart_id: CartId::new(),
            recovery_link: "https://shop/checkout/recover/x".into(),
            items: vec![],
            subtotal: Money::zero(),
        }
    }

    #[tokio::test]
    async fn test_delivered_messages_are_recorded() {
        let notifier = InMemoryNotifier::new();
        let to = Email::parse("a@b.co").unwrap();
        assert!(send_best_effort(&notifier, &to, recovery(), Duration::from_secs(1)).await);
        assert_eq!(notifier.count_of("cart_recovery").await, 1);
        assert_eq!(notifier.sent().await[0].0, to);
    }

    #[tokio::test]
    async fn test_failure_is_contained() {
        let notifier = InMemoryNotifier::new();
        let to = Email::parse("bounce@b.co").unwrap();
        notifier.fail_for(to.clone()).await;
        assert!(!send_best_effort(&notifier, &to, recovery(), Duration::from_secs(1)).await);
        assert!(notifier.sent().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_contained() {
        let notifier = InMemoryNotifier::new();
        notifier.set_delay(Some(Duration::from_secs(10))).await;
        let to = Email::parse("slow@b.co").unwrap();
        assert!(!send_best_effort(&notifier, &to, recovery(), Duration::from_millis(100)).await);
    }

    #[test]
    fn test_idempotency_key_is_per_cart() {
        let cart_id = CartId::new();
        let n = Notification::CartRecovery {
            cart_id,
            recovery_link: String::new(),
            items: vec![],
            subtotal: Money::zero(),
        };
        assert_eq!(n.idempotency_key(), format!("cart-recovery:{cart_id}"));
        assert_eq!(n.kind(), "cart_recovery");
    }
}
