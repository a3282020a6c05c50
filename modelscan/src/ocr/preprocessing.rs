use std::path::Path;

use image::imageops::FilterType;
use image::{GrayImage, ImageError, ImageReader};

use crate::error::Result;

/// Load an image as 8-bit grayscale, shrinking it so the long edge is at most
/// `max_long_edge`.
///
/// Format is sniffed from content rather than trusted from the extension;
/// downloaded product photos are frequently mislabelled.
pub fn load_and_scale(path: &Path, max_long_edge: u32) -> Result<GrayImage> {
    let img = ImageReader::open(path)
        .map_err(ImageError::IoError)?
        .with_guessed_format()
        .map_err(ImageError::IoError)?
        .decode()?;

    let gray = img.to_luma8();
    drop(img);

    Ok(resize_if_needed(gray, max_long_edge))
}

/// Downscale so the longer side equals `max_long_edge`, keeping aspect ratio.
///
/// Uses Lanczos3 for high-quality downscaling. Images already within the
/// limit are returned untouched.
fn resize_if_needed(gray: GrayImage, max_long_edge: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let long_edge = width.max(height);

    if long_edge <= max_long_edge || max_long_edge == 0 {
        return gray;
    }

    let scale = |side: u32| -> u32 {
        let scaled = (side as f64 * max_long_edge as f64 / long_edge as f64).round() as u32;
        scaled.clamp(1, max_long_edge)
    };

    let (new_width, new_height) = if width >= height {
        (max_long_edge, scale(height))
    } else {
        (scale(width), max_long_edge)
    };

    image::imageops::resize(&gray, new_width, new_height, FilterType::Lanczos3)
}
