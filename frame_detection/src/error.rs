use crate::{detection::ErrorBody, model_service::InferenceError};
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid frame")]
    InvalidFrame,
    #[error("Missing file field")]
    MissingFile,
    #[error("Upload failed: {0}")]
    Upload(#[from] MultipartError),
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("Metrics unavailable: {0}")]
    Metrics(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidFrame => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::MissingFile => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            ApiError::Upload(e) => (e.status(), e.body_text()),
            ApiError::Inference(e) => {
                tracing::error!("Inference failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Inference failed".to_string(),
                )
            }
            ApiError::Metrics(e) => {
                tracing::error!("Failed to render metrics: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Metrics unavailable".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
