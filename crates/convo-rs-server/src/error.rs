use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use convo_rs_memory::MemoryError;
use log::{error, warn};
use serde_json::json;

/// Error returned by HTTP handlers, rendered as `{"error": {"code", "message"}}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.status.as_u16(),
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<MemoryError> for ApiError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::Validation(message) => Self::bad_request(message),
            MemoryError::Timeout(_) => {
                warn!("memory operation timed out: {err}");
                Self::gateway_timeout(err.to_string())
            }
            other => {
                error!("memory operation failed: {other}");
                Self::internal(other.to_string())
            }
        }
    }
}
