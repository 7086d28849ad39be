//! Voucher validation for the storefront.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use chrono::Utc;
use domain::LineItem;
use fulfillment::VoucherCheck;
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateVoucherRequest {
    pub code: String,
    /// Cart lines to preview the discount against.
    #[serde(default)]
    pub items: Option<Vec<LineItem>>,
}

/// POST /vouchers/validate — engine verdict, plus the cart-level
/// application when items are supplied.
pub async fn validate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ValidateVoucherRequest>, JsonRejection>,
) -> Result<Json<VoucherCheck>, ApiError> {
    let Json(request) = payload?;
    let check = state
        .vouchers
        .validate(&request.code, request.items.as_deref(), Utc::now())
        .await?;
    Ok(Json(check))
}
