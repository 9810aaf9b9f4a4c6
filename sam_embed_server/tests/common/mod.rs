#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{DynamicImage, ImageFormat, RgbImage};
use sam_embed_server::{Device, Embedding, EncoderError, ImageEncoder, ModelInfo};

pub const POOLED_SHAPE: [usize; 4] = [1, 3, 2, 2];

/// Deterministic stand-in for the ONNX encoder: per-channel mean of each
/// image quadrant, laid out as `[1, 3, 2, 2]`.
#[derive(Default)]
pub struct QuadrantMeanEncoder {
    pub calls: AtomicUsize,
}

impl ImageEncoder for QuadrantMeanEncoder {
    fn embed(&self, image: &RgbImage) -> Result<Embedding, EncoderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (w, h) = image.dimensions();
        let mut sums = [0f64; 12];
        let mut counts = [0u64; 4];
        for (x, y, p) in image.enumerate_pixels() {
            let q = (usize::from(y >= h / 2) * 2) + usize::from(x >= w / 2);
            counts[q] += 1;
            for c in 0..3 {
                sums[c * 4 + q] += p[c] as f64;
            }
        }
        let data = (0..12)
            .map(|i| (sums[i] / counts[i % 4].max(1) as f64) as f32)
            .collect();
        Embedding::new(POOLED_SHAPE.to_vec(), data)
    }

    fn describe(&self) -> ModelInfo {
        ModelInfo {
            model: "quadrant-mean".to_string(),
            device: Device::Cpu,
            embedding_shape: Some(POOLED_SHAPE.to_vec()),
        }
    }
}

/// Encoder whose inference always fails.
pub struct FailingEncoder;

impl ImageEncoder for FailingEncoder {
    fn embed(&self, _image: &RgbImage) -> Result<Embedding, EncoderError> {
        Err(EncoderError::Inference("device unavailable".to_string()))
    }

    fn describe(&self) -> ModelInfo {
        ModelInfo {
            model: "failing".to_string(),
            device: Device::Cuda,
            embedding_shape: None,
        }
    }
}

pub fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), format)
        .expect("encode test image");
    out
}

/// Horizontal red gradient over a blue field.
pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, _| {
        image::Rgb([(x * 255 / width.max(1)) as u8, 0, 200])
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
}

/// Uniform image of one colour.
pub fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, image::Rgb(rgb));
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
}

/// Pseudo-random pixels; PNG compresses these poorly.
pub fn noise_png(width: u32, height: u32) -> Vec<u8> {
    let mut state: u32 = 0x9e37_79b9;
    let img = RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        };
        image::Rgb([next(), next(), next()])
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
}
