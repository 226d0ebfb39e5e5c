use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("Unsupported media type: {0}")]
  UnsupportedMediaType(String),

  #[error("File too large (max {max} bytes)")]
  PayloadTooLarge { max: usize },

  #[error("Invalid request: {0}")]
  BadRequest(String),

  #[error("Extraction unavailable: {0}")]
  Unavailable(String),

  #[error("Vision api error: {0}")]
  Upstream(anyhow::Error),

  #[error("Internal error: {0}")]
  Internal(String),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::UnsupportedMediaType(_) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, self.to_string()),
      ApiError::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
      ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
      ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
      ApiError::Upstream(err) => {
        error!("Unable to transcribe document: {:#}", err);
        (
          StatusCode::BAD_GATEWAY,
          "Unable to read the document".to_string(),
        )
      }
      ApiError::Internal(message) => {
        error!("{}", message);
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          "Internal server error".to_string(),
        )
      }
    };

    (status, Json(serde_json::json!({ "error": message }))).into_response()
  }
}
