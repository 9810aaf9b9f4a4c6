use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::encoder::EncoderError;

/// Failures of the embedding route.
///
/// Every variant surfaces as `500 Internal Server Error` with a plain-text
/// message; the variants only matter for logs.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("invalid image: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error("inference task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("embed failed: {self}");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
