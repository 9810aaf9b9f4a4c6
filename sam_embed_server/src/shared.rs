use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::encoder::{Device, Embedding};

/// Response body of `POST /`.
///
/// Serializes as a one-element JSON array holding the base64 encoding of the
/// embedding's little-endian f32 bytes in C order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[schema(example = json!(["AACAPwAAAEA="]))]
pub struct EmbeddingResponse(pub Vec<String>);

impl EmbeddingResponse {
    /// The single base64 string carried by the response, if any.
    pub fn encoded(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }
}

impl From<&Embedding> for EmbeddingResponse {
    fn from(embedding: &Embedding) -> Self {
        Self(vec![embedding.to_base64()])
    }
}

/// Service status payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always "ok" once the server is accepting requests.
    #[schema(example = "ok")]
    pub status: String,
    /// File name of the loaded encoder.
    #[schema(example = "sam_vit_h_4b8939_encoder.onnx")]
    pub model: String,
    /// Execution device the encoder actually runs on.
    #[schema(example = "cpu")]
    pub device: Device,
    /// Embedding tensor shape, known after the first successful inference.
    #[schema(example = json!([1, 256, 64, 64]))]
    pub embedding_shape: Option<Vec<usize>>,
}
