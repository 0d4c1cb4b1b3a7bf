//! I/O helpers for grayscale slice planes and JSON.
//!
//! - `load_gray_plane`: read an 8/16-bit grayscale image into an `ImageF32`
//!   holding raw intensities.
//! - `save_gray16`: write raw intensities to a 16-bit grayscale PNG.
//! - `save_grayscale_f32`: write an `ImageF32` to an 8-bit PNG, normalised
//!   by its max value (debug views).
//! - `write_json_file` / `read_json_file`: pretty JSON on disk.
use super::{ImageF32, ImageView};
use crate::error::{Result, SegmentationError};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Load a slice image from disk without rescaling its intensities.
pub fn load_gray_plane(path: &Path) -> Result<ImageF32> {
    let img = image::open(path).map_err(|e| {
        SegmentationError::Image(format!("Failed to open {}: {e}", path.display()))
    })?;
    let (w, h) = (img.width() as usize, img.height() as usize);
    let data: Vec<f32> = match img {
        DynamicImage::ImageLuma8(buf) => buf.into_raw().into_iter().map(f32::from).collect(),
        DynamicImage::ImageLuma16(buf) => buf.into_raw().into_iter().map(f32::from).collect(),
        other => other
            .into_luma16()
            .into_raw()
            .into_iter()
            .map(f32::from)
            .collect(),
    };
    ImageF32::from_vec(w, h, data).ok_or_else(|| {
        SegmentationError::Image(format!("Decoded buffer size mismatch for {}", path.display()))
    })
}

/// Save raw intensities to a 16-bit grayscale PNG, clamping to [0, 65535].
pub fn save_gray16(image: &ImageF32, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut raw = Vec::with_capacity(image.w * image.h);
    for row in image.rows() {
        raw.extend(row.iter().map(|&v| v.round().clamp(0.0, 65535.0) as u16));
    }
    let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(image.w as u32, image.h as u32, raw)
            .ok_or_else(|| SegmentationError::Image("Failed to create image buffer".into()))?;
    buffer.save(path).map_err(|e| {
        SegmentationError::Image(format!("Failed to save {}: {e}", path.display()))
    })
}

/// Save a float image to an 8-bit PNG, scaling its max value to 255.
pub fn save_grayscale_f32(image: &ImageF32, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let max = image.max_value();
    let scale = if max > 0.0 { 255.0 / max } else { 0.0 };
    let mut out = GrayImage::new(image.w as u32, image.h as u32);
    for (y, row) in image.rows().enumerate() {
        for (x, &px) in row.iter().enumerate() {
            let v = (px * scale).clamp(0.0, 255.0);
            out.put_pixel(x as u32, y as u32, Luma([v as u8]));
        }
    }
    out.save(path)
        .map_err(|e| SegmentationError::Image(format!("Failed to save {}: {e}", path.display())))
}

/// Serialize a value as pretty JSON to `path`, creating parent directories.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Read and deserialize a JSON document.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|e| {
        SegmentationError::Metadata(format!("Failed to parse {}: {e}", path.display()))
    })
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
