use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::TransactionError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

/// Error body shape shared by every non-2xx response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Not Found",
    "message": "Requirement 550e8400-e29b-41d4-a716-446655440000 not found",
    "details": null,
    "timestamp": "2025-08-25T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    #[schema(example = "Not Found")]
    pub error: String,
    /// Human-readable error description
    #[schema(example = "Requirement 550e8400-e29b-41d4-a716-446655440000 not found")]
    pub message: String,
    /// Additional error details (validation field errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    #[schema(example = "2025-08-25T10:30:00.000Z")]
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Recalculation already running")]
    RecalculationBusy,

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<validator::ValidationError> for ServiceError {
    fn from(err: validator::ValidationError) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<TransactionError<ServiceError>> for ServiceError {
    fn from(err: TransactionError<ServiceError>) -> Self {
        match err {
            TransactionError::Connection(db) => ServiceError::DatabaseError(db),
            TransactionError::Transaction(inner) => inner,
        }
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_)
            | Self::InvariantViolation(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) | Self::ConcurrentModification(_) | Self::RecalculationBusy => {
                StatusCode::CONFLICT
            }
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message suitable for HTTP responses. Internal faults return generic
    /// text to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InvariantViolation(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => "Internal server error".to_string(),
            Self::ConcurrentModification(id) => {
                format!("Concurrent modification for ID {}", id)
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::ConcurrentModification(Uuid::nil()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::RecalculationBusy.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::UpstreamUnavailable("inventory".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::InvariantViolation("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::ServiceUnavailable("shutting down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::InvariantViolation("negative to_order".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::InternalError("poisoned lock".into()).response_message(),
            "Internal server error"
        );

        assert_eq!(
            ServiceError::NotFound("Requirement not found".into()).response_message(),
            "Not found: Requirement not found"
        );
        assert_eq!(
            ServiceError::ValidationError("empty requirement set".into()).response_message(),
            "Validation error: empty requirement set"
        );
        assert_eq!(
            ServiceError::RecalculationBusy.response_message(),
            "Recalculation already running"
        );
    }

    #[tokio::test]
    async fn into_response_serializes_error_body() {
        let response = ServiceError::Conflict("already linked to an open order".into())
            .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.error, "Conflict");
        assert!(payload.message.contains("already linked"));
        assert!(!payload.timestamp.is_empty());
    }

    #[test]
    fn transaction_error_unwraps_to_inner_service_error() {
        let err: ServiceError =
            TransactionError::Transaction(ServiceError::ValidationError("bad".into())).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
