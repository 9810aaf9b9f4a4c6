//! SAM encoder input preparation: resize longest side, normalize, pad.

use image::{imageops::FilterType, RgbImage};
use ndarray::Array4;

/// Side length of the square encoder input.
pub const TARGET_LENGTH: u32 = 1024;

/// Per-channel pixel mean on the 0..255 scale (RGB).
pub const PIXEL_MEAN: [f32; 3] = [123.675, 116.28, 103.53];

/// Per-channel pixel std on the 0..255 scale (RGB).
pub const PIXEL_STD: [f32; 3] = [58.395, 57.12, 57.375];

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

/// Dimensions after scaling so the longest side equals [`TARGET_LENGTH`].
///
/// Rounds half up and never returns a zero side.
pub fn resized_dims(width: u32, height: u32) -> (u32, u32) {
    let scale = TARGET_LENGTH as f64 / width.max(height) as f64;
    let w = (width as f64 * scale + 0.5).floor() as u32;
    let h = (height as f64 * scale + 0.5).floor() as u32;
    (w.clamp(1, TARGET_LENGTH), h.clamp(1, TARGET_LENGTH))
}

/// Builds the `[1, 3, 1024, 1024]` NCHW tensor the encoder consumes.
///
/// The resized image sits in the top-left corner; everything right of and
/// below it is zero, which is padding applied after normalization.
pub fn to_model_input(img: &RgbImage) -> Result<Array4<f32>, PreprocessError> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessError::EmptyImage { width, height });
    }

    let (w, h) = resized_dims(width, height);
    let resized = image::imageops::resize(img, w, h, FilterType::Triangle);

    let side = TARGET_LENGTH as usize;
    let mut arr: Array4<f32> = Array4::zeros((1, 3, side, side));
    for (x, y, p) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            arr[[0, c, y, x]] = (p[c] as f32 - PIXEL_MEAN[c]) / PIXEL_STD[c];
        }
    }
    Ok(arr)
}
