//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fulfillment::{FulfillmentError, WebhookError};
use inventory::InventoryError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or invalid input; nothing was changed.
    #[error("{0}")]
    BadRequest(String),
    /// Missing or wrong credentials, or an unverifiable signature.
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// A payment or notification provider failed; the caller may retry.
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "request failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        match err {
            FulfillmentError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            FulfillmentError::Conflict(_) => ApiError::Conflict(err.to_string()),
            FulfillmentError::Invalid(_) => ApiError::BadRequest(err.to_string()),
            FulfillmentError::Upstream { .. } => ApiError::Upstream(err.to_string()),
            FulfillmentError::Store(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::InvalidPayload(_) => ApiError::BadRequest(err.to_string()),
            _ => ApiError::Unauthorized(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use domain::DomainError;
    use store::StoreError;

    use super::*;

    #[test]
    fn test_fulfillment_errors_map_to_status() {
        let cases = [
            (
                FulfillmentError::NotFound {
                    entity: "cart",
                    id: "x".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (FulfillmentError::Conflict("c".into()), StatusCode::CONFLICT),
            (FulfillmentError::Invalid(DomainError::EmptyCart), StatusCode::BAD_REQUEST),
            (
                FulfillmentError::Upstream {
                    service: "payment",
                    reason: "down".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                FulfillmentError::Store(StoreError::Unavailable("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_webhook_errors() {
        assert_eq!(ApiError::from(WebhookError::SignatureMismatch).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(WebhookError::MissingHeader).status(), StatusCode::UNAUTHORIZED);
        let payload = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(
            ApiError::from(WebhookError::InvalidPayload(payload)).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
