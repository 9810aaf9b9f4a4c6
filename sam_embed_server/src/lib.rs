//! HTTP server returning Segment Anything image embeddings.
//!
//! `POST /` takes a raw encoded image and answers with a one-element JSON
//! array holding the base64 of the encoder output's little-endian f32 bytes.

pub mod app;
pub mod config;
pub mod decode;
pub mod encoder;
pub mod error;
pub mod preprocess;
pub mod shared;

pub use app::{router, AppState};
pub use config::Config;
pub use encoder::{Device, Embedding, EncoderError, ImageEncoder, ModelInfo, OnnxImageEncoder};
