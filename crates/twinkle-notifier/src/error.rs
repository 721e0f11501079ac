use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use twinkle_store::StoreError;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for NotifierError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            NotifierError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            NotifierError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            NotifierError::Store(e) => {
                tracing::error!(error = %e, "store failure while handling request");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
