//! Signed payment-provider events.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use chrono::Utc;
use fulfillment::webhook::SIGNATURE_HEADER;
use fulfillment::{Completion, SessionState, WebhookError};
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_state: Option<SessionState>,
}

/// POST /webhooks/payment — verify an event and complete the order it
/// confirms. Unverifiable deliveries are rejected before anything is read
/// from the body.
#[tracing::instrument(skip_all)]
pub async fn payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let Some(verifier) = state.webhook.as_ref() else {
        metrics::counter!("webhooks_rejected_total", "reason" => "unconfigured").increment(1);
        return Err(ApiError::Unauthorized("payment webhooks are not configured".to_string()));
    };

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let event = verifier.verify(signature, &body, Utc::now()).map_err(|e| {
        let reason = match e {
            WebhookError::InvalidPayload(_) => "payload",
            _ => "signature",
        };
        tracing::warn!(error = %e, reason, "payment event rejected");
        metrics::counter!("webhooks_rejected_total", "reason" => reason).increment(1);
        ApiError::from(e)
    })?;

    let Some(session_ref) = event.completed_session() else {
        tracing::debug!(event_type = %event.event_type, "payment event ignored");
        return Ok(Json(WebhookResponse {
            received: true,
            session_state: None,
        }));
    };

    let completion: Completion = state.pipeline.complete_order(session_ref).await?;
    Ok(Json(WebhookResponse {
        received: true,
        session_state: Some(completion.state()),
    }))
}
