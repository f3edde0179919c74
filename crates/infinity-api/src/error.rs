use infinity_core::CoreError;
use thiserror::Error;

/// Failures surfaced to API clients. The display text is the client-facing message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Conflict(_) => ApiError::Conflict(err.to_string()),
            CoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            CoreError::InvalidPolicy { .. } => ApiError::Forbidden(err.to_string()),
            // Worker and capability failures are returned verbatim.
            CoreError::Exec(_) | CoreError::Capabilities(_) => {
                ApiError::InvalidRequest(err.to_string())
            }
            CoreError::ShuttingDown => ApiError::Unavailable(err.to_string()),
            CoreError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(feature = "http")]
impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use axum::{Json, http::StatusCode};

        let status = match &self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(%status, error = %self, "request rejected");
        }
        (status, Json(serde_json::json!({ "message": self.to_string() }))).into_response()
    }
}
