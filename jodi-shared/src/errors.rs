use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Profile and preference errors
/// - E2xxx: Matching errors
/// - E3xxx: Distribution errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    ServiceUnavailable,
    BadRequest,
    Unimplemented,

    // Profile / preference (E1xxx)
    ProfileNotFound,
    DuplicateProfile,
    ProfileDeactivated,
    PreferenceNotFound,
    InvalidAgeBounds,
    CasteNotFound,
    CityNotFound,
    StateNotFound,
    CountryNotFound,

    // Matching (E2xxx)
    PageSizeExceeded,
    PairingNotFound,
    DuplicatePairing,

    // Distribution (E3xxx)
    DeliveryFailed,
    QueueUnavailable,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::Forbidden => "E0005",
            Self::ServiceUnavailable => "E0006",
            Self::BadRequest => "E0007",
            Self::Unimplemented => "E0008",

            // Profile / preference
            Self::ProfileNotFound => "E1001",
            Self::DuplicateProfile => "E1002",
            Self::ProfileDeactivated => "E1003",
            Self::PreferenceNotFound => "E1004",
            Self::InvalidAgeBounds => "E1005",
            Self::CasteNotFound => "E1006",
            Self::CityNotFound => "E1007",
            Self::StateNotFound => "E1008",
            Self::CountryNotFound => "E1009",

            // Matching
            Self::PageSizeExceeded => "E2001",
            Self::PairingNotFound => "E2002",
            Self::DuplicatePairing => "E2003",

            // Distribution
            Self::DeliveryFailed => "E3001",
            Self::QueueUnavailable => "E3002",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable | Self::QueueUnavailable | Self::DeliveryFailed => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::ValidationError | Self::BadRequest | Self::InvalidAgeBounds
            | Self::PageSizeExceeded => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::ProfileNotFound | Self::PreferenceNotFound
            | Self::CasteNotFound | Self::CityNotFound | Self::StateNotFound
            | Self::CountryNotFound | Self::PairingNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::ProfileDeactivated => StatusCode::FORBIDDEN,
            Self::DuplicateProfile | Self::DuplicatePairing => StatusCode::CONFLICT,
            Self::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unimplemented, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                match err {
                    diesel::result::Error::NotFound => (
                        StatusCode::NOT_FOUND,
                        ApiErrorResponse::new("E0003", "resource not found"),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiErrorResponse::new("E0001", "database error"),
                    ),
                }
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse::new("E0002", msg),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_codes_map_to_409() {
        assert_eq!(ErrorCode::DuplicateProfile.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::DuplicatePairing.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn unimplemented_maps_to_501() {
        assert_eq!(ErrorCode::Unimplemented.status_code(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(ErrorCode::Unimplemented.code(), "E0008");
    }

    #[test]
    fn page_size_exceeded_is_a_client_error() {
        assert_eq!(ErrorCode::PageSizeExceeded.status_code(), StatusCode::BAD_REQUEST);
    }
}
