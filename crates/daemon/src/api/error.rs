//! `ApiError` pairs an HTTP status with an `anyhow::Error`, letting handlers
//! return `Result<Json<T>, ApiError>` and bubble storage- and
//! validation-kind failures to their proper status codes.

use axum::http::StatusCode;
use config_store::ConfigError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: anyhow::Error,
}

impl ApiError {
    pub fn new(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, anyhow::anyhow!(message.into()))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, anyhow::anyhow!(message.into()))
    }
}

impl From<ConfigError> for ApiError {
    fn from(error: ConfigError) -> Self {
        let status = match &error {
            ConfigError::NotFound(_) => StatusCode::NOT_FOUND,
            // Storage failures surface with their message preserved.
            ConfigError::Validation(_) | ConfigError::Reserved { .. } | ConfigError::Storage(_) => {
                StatusCode::BAD_REQUEST
            }
            ConfigError::Callback(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, error.into())
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let message = format!("{:#}", self.error);
        (
            self.status,
            axum::Json(serde_json::json!({"message": message})),
        )
            .into_response()
    }
}
