use crate::config::AppConfig;
use crate::errors::ServiceError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use validator::Validate;

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// Standard no content response
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input.validate().map_err(ServiceError::from)
}

/// Pagination resolved against the configured bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: u64,
    pub limit: u64,
}

/// Clamps requested pagination to the configured window. Pages are
/// one-based; a missing or zero limit falls back to the configured default.
pub fn resolve_page(page: Option<u64>, limit: Option<u64>, config: &AppConfig) -> PageParams {
    let max = (config.api_max_page_size as u64).max(1);
    let default = (config.api_default_page_size as u64).clamp(1, max);

    let limit = match limit {
        None | Some(0) => default,
        Some(requested) => requested.min(max),
    };

    PageParams {
        page: page.unwrap_or(1).max(1),
        limit,
    }
}
