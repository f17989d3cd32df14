use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Request-level error taxonomy. Handlers return these and the
/// [`IntoResponse`] impl below is the only place they become status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    InvalidInput(String),

    #[error("not enough data (have {available}, need {required})")]
    InsufficientData { required: usize, available: usize },

    #[error("internal server error")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidValue(message) => Self::InvalidInput(message),
            other => Self::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidInput(_) | Self::InsufficientData { .. } => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if let Self::Internal(source) = &self {
            // Log the real cause; the response body stays generic.
            tracing::error!(error = %source, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_invalid_value_maps_to_invalid_input() {
        let err = ApiError::from(StoreError::InvalidValue("threshold must be finite".into()));
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[test]
    fn store_db_error_maps_to_internal() {
        let err = ApiError::from(StoreError::Db("disk I/O error".into()));
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn internal_message_does_not_leak_source() {
        let err = ApiError::Internal(anyhow::anyhow!("table readings is locked"));
        assert_eq!(err.to_string(), "internal server error");
    }
}
