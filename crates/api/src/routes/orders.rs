//! Order confirmation polling.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::SessionRef;
use fulfillment::Completion;

use crate::AppState;
use crate::error::ApiError;

/// GET /orders/confirm/{session_ref} — complete (or replay) the order for a
/// session. Returns `{"status":"pending"}` until the provider reports it paid.
#[tracing::instrument(skip(state))]
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    Path(session_ref): Path<String>,
) -> Result<Json<Completion>, ApiError> {
    let session_ref = SessionRef::parse(&session_ref).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let completion = state.pipeline.complete_order(&session_ref).await?;
    Ok(Json(completion))
}
