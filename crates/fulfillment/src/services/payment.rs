//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{Email, LineItem, SessionRef, ShippingSnapshot, VoucherCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{FulfillmentError, Result};

/// Payment state of a checkout session as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
}

/// A provider checkout session.
///
/// The provider keeps its own copy of what was bought; it is used when no
/// matching cart can be found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub session_ref: SessionRef,
    pub status: PaymentStatus,
    pub customer_email: Option<Email>,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub shipping: Option<ShippingSnapshot>,
    #[serde(default)]
    pub voucher_code: Option<VoucherCode>,
}

impl PaymentSession {
    /// Returns true if the provider reports the session as paid.
    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }
}

/// Source of truth for whether a session has been paid.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Fetches a session from the provider. `None` if the provider does not know it.
    async fn retrieve_session(&self, session_ref: &SessionRef) -> Result<Option<PaymentSession>>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    sessions: HashMap<SessionRef, PaymentSession>,
    queries: usize,
    fail_on_retrieve: bool,
    delay: Option<Duration>,
}

/// In-memory payment gateway for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a session.
    pub async fn put_session(&self, session: PaymentSession) {
        self.state
            .write()
            .await
            .sessions
            .insert(session.session_ref.clone(), session);
    }

    /// Marks a known session as paid.
    pub async fn mark_paid(&self, session_ref: &SessionRef) {
        if let Some(session) = self.state.write().await.sessions.get_mut(session_ref) {
            session.status = PaymentStatus::Paid;
        }
    }

    /// Configures the gateway to fail every retrieval.
    pub async fn set_fail_on_retrieve(&self, fail: bool) {
        self.state.write().await.fail_on_retrieve = fail;
    }

    /// Delays every retrieval, for exercising timeouts.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().await.delay = delay;
    }

    /// Returns the number of retrievals made.
    pub async fn query_count(&self) -> usize {
        self.state.read().await.queries
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn retrieve_session(&self, session_ref: &SessionRef) -> Result<Option<PaymentSession>> {
        let delay = {
            let mut state = self.state.write().await;
            state.queries += 1;
            if state.fail_on_retrieve {
                return Err(FulfillmentError::upstream("payment", "provider unavailable"));
            }
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state.read().await.sessions.get(session_ref).cloned())
    }
}
