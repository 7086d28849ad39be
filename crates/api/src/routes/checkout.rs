//! Cart submission, recovery lookup and the abandoned-cart sweep trigger.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use common::CartId;
use domain::Cart;
use fulfillment::{CheckoutSubmission, SweepReport, tokens_match};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct CheckoutRecordedResponse {
    pub cart_id: CartId,
    pub created: bool,
}

#[derive(Deserialize)]
pub struct SweepQuery {
    /// Overrides the configured idle threshold for this run.
    pub idle_threshold_secs: Option<u64>,
}

/// POST /checkout — record a cart submission.
#[tracing::instrument(skip(state, payload))]
pub async fn record(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CheckoutSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<CheckoutRecordedResponse>), ApiError> {
    let Json(submission) = payload?;
    let upsert = state.checkout.record_checkout(submission).await?;
    Ok((
        StatusCode::CREATED,
        Json(CheckoutRecordedResponse {
            cart_id: upsert.cart_id,
            created: upsert.created,
        }),
    ))
}

/// GET /checkout/{cart_id} — the cart a recovery link points at.
pub async fn get(State(state): State<Arc<AppState>>, Path(cart_id): Path<Uuid>) -> Result<Json<Cart>, ApiError> {
    let cart = state.checkout.get_cart(CartId::from_uuid(cart_id)).await?;
    Ok(Json(cart))
}

/// POST /checkout/sweep — abandon idle carts and send recovery notifications.
#[tracing::instrument(skip(state, headers, query))]
pub async fn sweep(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<SweepQuery>, QueryRejection>,
) -> Result<Json<SweepReport>, ApiError> {
    authorize_sweep(state.sweep_secret.as_deref(), &headers)?;
    let Query(query) = query?;

    let threshold = query.idle_threshold_secs.map(Duration::from_secs);
    let report = state.checkout.sweep_abandoned(threshold).await?;
    Ok(Json(report))
}

fn authorize_sweep(secret: Option<&str>, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(secret) = secret else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if tokens_match(token, secret) => Ok(()),
        _ => Err(ApiError::Unauthorized("invalid sweep credentials".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_open_sweep_needs_no_header() {
        assert!(authorize_sweep(None, &HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_bearer_must_match() {
        let mut headers = HeaderMap::new();
        assert!(authorize_sweep(Some("s3cret"), &headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"));
        assert!(authorize_sweep(Some("s3cret"), &headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("s3cret"));
        assert!(authorize_sweep(Some("s3cret"), &headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cre"));
        assert!(authorize_sweep(Some("s3cret"), &headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert!(authorize_sweep(Some("s3cret"), &headers).is_ok());
    }
}
