//! Shared HTTP plumbing: response envelope, error mapping, extractors

pub mod validated_json;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::domain::DomainError;

pub use validated_json::ValidatedJson;

/// Standard API response envelope
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Error half of every JSON handler result
pub type ApiError<T> = (StatusCode, Json<ApiResponse<T>>);

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError<T>>;

/// HTTP status for a domain error
pub fn status_for(err: &DomainError) -> StatusCode {
    match err {
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::SlotUnavailable(_)
        | DomainError::AlreadyConfirmed(_)
        | DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::Expired(_) | DomainError::NoLongerValid { .. } => StatusCode::GONE,
        DomainError::Provider(_) => StatusCode::BAD_GATEWAY,
        DomainError::InvalidSignature => StatusCode::UNAUTHORIZED,
        DomainError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Convert a domain error into the error envelope.
///
/// Storage details never leave the process; they are logged instead.
pub fn api_error<T: Serialize>(err: DomainError) -> ApiError<T> {
    let status = status_for(&err);
    let message = match &err {
        DomainError::Storage(detail) => {
            error!(error = %detail, "Storage failure while serving request");
            "Storage temporarily unavailable".to_string()
        }
        DomainError::Provider(detail) => {
            warn!(error = %detail, "Payment provider call failed");
            err.to_string()
        }
        _ => err.to_string(),
    };
    (status, Json(ApiResponse::error(message)))
}
