use image::{ImageError, RgbImage};

/// Decodes an encoded image of any supported format into 8-bit RGB.
///
/// Alpha is dropped; grayscale and palette images are expanded to three
/// channels. The format is guessed from the content, not from any header.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, ImageError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}
