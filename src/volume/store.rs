//! Slice plane storage backends.
//!
//! A store only knows how to decode one plane by index. Caching, pinning and
//! bounds policy live in [`Volume`](super::Volume).
use super::{SlicePlane, VolumeMetadata};
use crate::error::{Result, SegmentationError};
use crate::image::io::{load_gray_plane, save_gray16};
use crate::image::ImageViewMut;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Source of decoded slice planes.
pub trait SliceStore: Send + Sync {
    fn load_slice(&self, index: usize) -> Result<SlicePlane>;
}

/// Directory of one image per slice named by zero-padded index
/// (`000.tif`, `001.tif`, ... for a 3-digit slice count).
#[derive(Clone, Debug)]
pub struct DirectorySliceStore {
    dir: PathBuf,
    digits: usize,
}

const SLICE_EXTENSIONS: [&str; 3] = ["tif", "tiff", "png"];

impl DirectorySliceStore {
    pub fn new(dir: impl Into<PathBuf>, slice_count: usize) -> Self {
        Self {
            dir: dir.into(),
            digits: slice_count.to_string().len(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stem(&self, index: usize) -> String {
        format!("{:0width$}", index, width = self.digits)
    }

    /// Path of an existing slice file, or the PNG path it would be saved to.
    pub fn slice_path(&self, index: usize) -> PathBuf {
        let stem = self.stem(index);
        SLICE_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{stem}.{ext}")))
            .find(|p| p.is_file())
            .unwrap_or_else(|| self.dir.join(format!("{stem}.png")))
    }

    /// Write a plane as a 16-bit PNG. Used by ingestion tools and tests.
    pub fn save_slice(&self, index: usize, plane: &SlicePlane) -> Result<()> {
        let path = self.dir.join(format!("{}.png", self.stem(index)));
        save_gray16(plane, &path)
    }
}

impl SliceStore for DirectorySliceStore {
    fn load_slice(&self, index: usize) -> Result<SlicePlane> {
        let path = self.slice_path(index);
        if !path.is_file() {
            return Err(SegmentationError::Image(format!(
                "Missing slice {index}: {}",
                path.display()
            )));
        }
        load_gray_plane(&path)
    }
}

/// In-memory planes, mainly for synthetic volumes and tests.
#[derive(Debug, Default)]
pub struct MemorySliceStore {
    planes: Vec<SlicePlane>,
    loads: AtomicUsize,
}

impl MemorySliceStore {
    pub fn new(planes: Vec<SlicePlane>) -> Self {
        Self {
            planes,
            loads: AtomicUsize::new(0),
        }
    }

    /// Build `slices` planes of `width × height` from a voxel function.
    pub fn from_fn<F>(width: usize, height: usize, slices: usize, f: F) -> Self
    where
        F: Fn(usize, usize, usize) -> f32,
    {
        let planes = (0..slices)
            .map(|z| {
                let mut plane = SlicePlane::new(width, height);
                for y in 0..height {
                    for (x, v) in plane.row_mut(y).iter_mut().enumerate() {
                        *v = f(x, y, z);
                    }
                }
                plane
            })
            .collect();
        Self::new(planes)
    }

    /// Metadata describing the stored planes.
    pub fn metadata(&self) -> VolumeMetadata {
        let (width, height) = self
            .planes
            .first()
            .map(|p| (p.w, p.h))
            .unwrap_or((0, 0));
        VolumeMetadata::new(width, height, self.planes.len())
    }

    /// Number of `load_slice` calls served so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

impl SliceStore for MemorySliceStore {
    fn load_slice(&self, index: usize) -> Result<SlicePlane> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        self.planes
            .get(index)
            .cloned()
            .ok_or(SegmentationError::IndexOutOfRange {
                index: index as i64,
                len: self.planes.len(),
            })
    }
}
