//! Verification of signed payment-provider events.
//!
//! The provider signs each delivery with a shared secret. The header has
//! the form `t=<unix seconds>,v1=<hex hmac-sha256>` and the signed payload
//! is `"{t}.{body}"`. Deliveries outside the timestamp tolerance are
//! rejected so a captured request cannot be replayed later.

use chrono::{DateTime, Utc};
use domain::SessionRef;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "Payment-Signature";

/// Event type that triggers order completion.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Maximum accepted age (either direction) of a signature timestamp.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Why a delivery was rejected.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Missing {SIGNATURE_HEADER} header")]
    MissingHeader,

    #[error("Malformed signature header")]
    MalformedHeader,

    #[error("Signature timestamp outside tolerance ({age_secs}s)")]
    StaleTimestamp { age_secs: i64 },

    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Invalid signing secret")]
    InvalidSecret,

    #[error("Invalid event payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEventData {
    #[serde(default)]
    pub session_ref: Option<SessionRef>,
}

/// A verified provider event.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PaymentEventData,
}

impl PaymentEvent {
    /// The session to complete, if this is a completed-checkout event.
    pub fn completed_session(&self) -> Option<&SessionRef> {
        if self.event_type == CHECKOUT_COMPLETED {
            self.data.session_ref.as_ref()
        } else {
            None
        }
    }
}

/// Checks provider signatures with a shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance_secs(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> Result<HmacSha256, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|_| WebhookError::InvalidSecret)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac)
    }

    /// Produces a header value for `body` signed at `timestamp`.
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> Result<String, WebhookError> {
        let t = timestamp.to_string();
        let signature = hex::encode(self.mac(&t, body)?.finalize().into_bytes());
        Ok(format!("t={t},v1={signature}"))
    }

    /// Verifies a delivery and parses its event. Nothing is trusted until
    /// this returns `Ok`.
    pub fn verify(
        &self,
        header: Option<&str>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<PaymentEvent, WebhookError> {
        let header = header.ok_or(WebhookError::MissingHeader)?;

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedHeader);
        }

        let signed_at: i64 = timestamp.parse().map_err(|_| WebhookError::MalformedHeader)?;
        let age_secs = now.timestamp().saturating_sub(signed_at);
        if age_secs.abs() > self.tolerance_secs {
            return Err(WebhookError::StaleTimestamp { age_secs });
        }

        let matched = signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .ok()
                .zip(self.mac(timestamp, body).ok())
                .is_some_and(|(bytes, mac)| mac.verify_slice(&bytes).is_ok())
        });
        if !matched {
            return Err(WebhookError::SignatureMismatch);
        }

        Ok(serde_json::from_slice(body)?)
    }
}

/// Compares a presented shared secret with the expected one in constant time.
///
/// Both sides are reduced to fixed-length HMAC tags first, so neither the
/// content nor the length of `expected` leaks through timing.
pub fn tokens_match(presented: &str, expected: &str) -> bool {
    const LABEL: &[u8] = b"shared-token";
    let tag = |token: &str| {
        HmacSha256::new_from_slice(token.as_bytes()).map(|mac| mac.chain_update(LABEL).finalize().into_bytes())
    };
    match (HmacSha256::new_from_slice(expected.as_bytes()), tag(presented)) {
        (Ok(mac), Ok(presented)) => mac.chain_update(LABEL).verify_slice(&presented).is_ok(),
        _ => false,
    }
}
