//! Segment Anything image encoder.
//!
//! The encoder is a read-only handle shared by every request: `embed` takes
//! the image as an argument and returns the embedding, nothing about the
//! previous call is retained.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use image::RgbImage;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::preprocess::{self, PreprocessError};

/// Execution device for the encoder session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    /// CUDA, falling back to CPU when the provider cannot be registered.
    Cuda,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda => f.write_str("cuda"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum EncoderError {
    #[error("preprocess error: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("invalid input tensor: {0}")]
    Input(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("invalid output tensor: {0}")]
    Output(String),
    #[error("embedding shape {shape:?} holds {expected} values, got {actual}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("encoder session lock poisoned")]
    Poisoned,
}

/// Dense f32 embedding tensor in C order.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Embedding {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, EncoderError> {
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(EncoderError::ShapeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw little-endian bytes, 4 per element.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() * 4);
        for v in &self.data {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub fn to_base64(&self) -> String {
        B64.encode(self.to_le_bytes())
    }
}

/// What a loaded encoder reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub model: String,
    pub device: Device,
    pub embedding_shape: Option<Vec<usize>>,
}

/// Maps a decoded RGB image to its embedding.
///
/// Implementations are shared across requests behind an `Arc` and must not
/// carry per-image state between calls.
pub trait ImageEncoder: Send + Sync {
    fn embed(&self, image: &RgbImage) -> Result<Embedding, EncoderError>;

    fn describe(&self) -> ModelInfo;
}

/// SAM image encoder exported to ONNX, run through ONNX Runtime.
///
/// Expects a single `[1, 3, 1024, 1024]` f32 input (see [`preprocess`]) and
/// reads the first output as the embedding.
pub struct OnnxImageEncoder {
    // ort needs exclusive access to run a session.
    session: Mutex<Session>,
    input_name: String,
    model_name: String,
    device: Device,
    embedding_shape: OnceLock<Vec<usize>>,
}

impl fmt::Debug for OnnxImageEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxImageEncoder")
            .field("model_name", &self.model_name)
            .field("input_name", &self.input_name)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl OnnxImageEncoder {
    /// Loads the encoder from disk.
    ///
    /// `Device::Cuda` falls back to the CPU provider with a warning when CUDA
    /// cannot be registered; [`ImageEncoder::describe`] reports the device
    /// actually in use.
    pub fn load(model_path: impl AsRef<Path>, device: Device, intra_threads: usize) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            anyhow::bail!("encoder model not found: {}", model_path.display());
        }

        let (session, device) = match device {
            Device::Cuda => match build_session(model_path, Device::Cuda, intra_threads) {
                Ok(session) => (session, Device::Cuda),
                Err(e) => {
                    warn!("CUDA execution provider unavailable: {e:#}");
                    warn!("falling back to CPU execution provider");
                    (build_session(model_path, Device::Cpu, intra_threads)?, Device::Cpu)
                }
            },
            Device::Cpu => (build_session(model_path, Device::Cpu, intra_threads)?, Device::Cpu),
        };

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .context("encoder model declares no inputs")?;
        if session.outputs.is_empty() {
            anyhow::bail!("encoder model declares no outputs");
        }

        let model_name = model_name(model_path);
        info!(model = %model_name, input = %input_name, %device, intra_threads, "encoder loaded");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            model_name,
            device,
            embedding_shape: OnceLock::new(),
        })
    }
}

impl ImageEncoder for OnnxImageEncoder {
    fn embed(&self, image: &RgbImage) -> Result<Embedding, EncoderError> {
        let input = preprocess::to_model_input(image)?;
        let tensor = Tensor::from_array(input).map_err(|e| EncoderError::Input(e.to_string()))?;

        let embedding = {
            let mut session = self.session.lock().map_err(|_| EncoderError::Poisoned)?;
            let outputs = session
                .run(ort::inputs![self.input_name.as_str() => tensor])
                .map_err(|e| EncoderError::Inference(e.to_string()))?;
            let view = outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| EncoderError::Output(e.to_string()))?;
            Embedding::new(view.shape().to_vec(), view.iter().copied().collect())?
        };

        let known = self.embedding_shape.get_or_init(|| embedding.shape().to_vec());
        if known.as_slice() != embedding.shape() {
            warn!(expected = ?known, actual = ?embedding.shape(), "embedding shape changed between calls");
        }
        Ok(embedding)
    }

    fn describe(&self) -> ModelInfo {
        ModelInfo {
            model: self.model_name.clone(),
            device: self.device,
            embedding_shape: self.embedding_shape.get().cloned(),
        }
    }
}

fn build_session(path: &Path, device: Device, intra_threads: usize) -> Result<Session> {
    let provider = match device {
        Device::Cuda => CUDAExecutionProvider::default().build().error_on_failure(),
        Device::Cpu => CPUExecutionProvider::default().build(),
    };
    let session = Session::builder()
        .context("failed to create session builder")?
        .with_execution_providers([provider])
        .with_context(|| format!("failed to register {device} execution provider"))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("failed to set optimization level")?
        .with_intra_threads(intra_threads.max(1))
        .context("failed to set intra threads")?
        .with_memory_pattern(true)
        .context("failed to enable memory pattern")?
        .commit_from_file(path)
        .with_context(|| format!("failed to load encoder from {}", path.display()))?;
    Ok(session)
}

fn model_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_rejects_mismatched_shape() {
        let err = Embedding::new(vec![1, 2, 3], vec![0.0; 5]).unwrap_err();
        match err {
            EncoderError::ShapeMismatch { expected, actual, .. } => {
                assert_eq!(expected, 6);
                assert_eq!(actual, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn embedding_bytes_are_little_endian_f32() {
        let embedding = Embedding::new(vec![2], vec![1.0, -2.5]).unwrap();
        let bytes = embedding.to_le_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &[0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(&bytes[4..], &(-2.5f32).to_le_bytes());
    }

    #[test]
    fn base64_matches_raw_bytes() {
        let embedding = Embedding::new(vec![1, 2], vec![1.0, 2.0]).unwrap();
        assert_eq!(embedding.to_base64(), "AACAPwAAAEA=");
        let decoded = B64.decode(embedding.to_base64()).unwrap();
        assert_eq!(decoded, embedding.to_le_bytes());
    }

    #[test]
    fn sam_vit_embedding_size() {
        let embedding = Embedding::new(vec![1, 256, 64, 64], vec![0.0; 256 * 64 * 64]).unwrap();
        assert_eq!(embedding.to_le_bytes().len(), 4 * 1_048_576);
    }

    #[test]
    fn load_missing_model_fails() {
        let err = OnnxImageEncoder::load("does/not/exist.onnx", Device::Cpu, 1).unwrap_err();
        assert!(err.to_string().contains("encoder model not found"));
    }

    #[test]
    fn model_name_is_file_name() {
        assert_eq!(model_name(Path::new("models/sam_vit_b.onnx")), "sam_vit_b.onnx");
    }

    #[test]
    fn device_display_matches_serde() {
        assert_eq!(Device::Cuda.to_string(), "cuda");
        assert_eq!(serde_json::to_string(&Device::Cpu).unwrap(), "\"cpu\"");
    }
}
