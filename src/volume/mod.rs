//! Out-of-core scalar volume access.
//!
//! A volume is a stack of 2D slice planes indexed by z. Planes are decoded on
//! demand from a [`SliceStore`] and kept in a byte-budgeted [`SliceCache`].
//! Real-valued queries are answered by trilinear interpolation of the eight
//! bounding voxels; queries outside `[0, w-1] × [0, h-1] × [0, slices-1]`
//! return [`NO_DATA`].
//!
//! The propagation engine only talks to the [`ScalarVolume`] trait so that
//! other backends (in-memory test volumes, compressed stores) can be swapped
//! in without touching it.

pub mod cache;
pub mod size;
pub mod store;

use crate::error::{Result, SegmentationError};
use crate::image::io::{read_json_file, write_json_file};
use crate::image::ImageF32;
use crate::types::{Point3, VolumeDims};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub use cache::{CacheStats, SliceCache, SlicePin, DEFAULT_CACHE_BUDGET};
pub use size::{bytes_to_memory_size, parse_memory_size};
pub use store::{DirectorySliceStore, MemorySliceStore, SliceStore};

/// A decoded slice plane: raw intensities in row-major order.
pub type SlicePlane = ImageF32;

/// Value returned by [`ScalarVolume::sample`] outside the volume.
pub const NO_DATA: f64 = 0.0;

/// Name of the metadata file inside a volume directory.
pub const METADATA_FILE: &str = "meta.json";

/// Random-access, interpolated view of a 3D scan.
pub trait ScalarVolume: Send + Sync {
    fn dims(&self) -> VolumeDims;

    /// Trilinearly interpolated intensity at a voxel-space position.
    fn sample(&self, x: f64, y: f64, z: f64) -> f64;

    /// Decoded plane for slice `index`.
    fn get_slice(&self, index: usize) -> Result<Arc<SlicePlane>>;

    /// Adjust the cache ceiling in bytes, evicting when over it.
    fn set_cache_budget(&self, bytes: usize);

    /// Physical size of one voxel edge.
    fn voxel_size(&self) -> f64 {
        1.0
    }

    /// Largest intensity the scan can hold, used to normalise gradients.
    fn max_intensity(&self) -> Option<f64> {
        None
    }

    #[inline]
    fn sample_at(&self, p: &Point3) -> f64 {
        self.sample(p.x, p.y, p.z)
    }

    #[inline]
    fn contains(&self, p: &Point3) -> bool {
        self.dims().contains(p)
    }

    /// Exact stored value at an integer voxel.
    fn voxel(&self, x: usize, y: usize, z: usize) -> Result<f64> {
        let dims = self.dims();
        if x >= dims.width {
            return Err(SegmentationError::IndexOutOfRange {
                index: x as i64,
                len: dims.width,
            });
        }
        if y >= dims.height {
            return Err(SegmentationError::IndexOutOfRange {
                index: y as i64,
                len: dims.height,
            });
        }
        Ok(f64::from(self.get_slice(z)?.get(x, y)))
    }
}

/// Scan metadata stored as `meta.json` next to the slices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeMetadata {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub slices: usize,
    #[serde(rename = "voxelsize", default = "default_voxel_size")]
    pub voxel_size: f64,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
}

fn default_voxel_size() -> f64 {
    1.0
}

impl VolumeMetadata {
    pub fn new(width: usize, height: usize, slices: usize) -> Self {
        Self {
            uuid: String::new(),
            name: String::new(),
            width,
            height,
            slices,
            voxel_size: 1.0,
            min: 0.0,
            max: 0.0,
        }
    }

    pub fn with_voxel_size(mut self, voxel_size: f64) -> Self {
        self.voxel_size = voxel_size;
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn dims(&self) -> VolumeDims {
        VolumeDims::new(self.width, self.height, self.slices)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        read_json_file(&dir.join(METADATA_FILE))
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        write_json_file(&dir.join(METADATA_FILE), self)
    }
}

/// Cached volume over an arbitrary slice store.
pub struct Volume<S: SliceStore = Box<dyn SliceStore>> {
    meta: VolumeMetadata,
    store: S,
    cache: SliceCache,
}

impl SliceStore for Box<dyn SliceStore> {
    fn load_slice(&self, index: usize) -> Result<SlicePlane> {
        (**self).load_slice(index)
    }
}

impl Volume<DirectorySliceStore> {
    /// Open a volume directory containing `meta.json` and slice images.
    pub fn open(dir: &Path) -> Result<Self> {
        let meta = VolumeMetadata::load(dir)?;
        let store = DirectorySliceStore::new(dir, meta.slices);
        debug!(
            "Volume::open {} ({}x{}x{}, voxel {})",
            dir.display(),
            meta.width,
            meta.height,
            meta.slices,
            meta.voxel_size
        );
        Ok(Self::from_store(meta, store))
    }
}

impl<S: SliceStore> Volume<S> {
    pub fn from_store(meta: VolumeMetadata, store: S) -> Self {
        Self {
            meta,
            store,
            cache: SliceCache::default(),
        }
    }

    pub fn with_cache_budget(self, bytes: usize) -> Self {
        self.cache.set_budget(bytes);
        self
    }

    pub fn metadata(&self) -> &VolumeMetadata {
        &self.meta
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &SliceCache {
        &self.cache
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.meta.slices {
            return Err(SegmentationError::IndexOutOfRange {
                index: index as i64,
                len: self.meta.slices,
            });
        }
        Ok(())
    }

    fn load_checked(&self, index: usize) -> Result<SlicePlane> {
        let plane = self.store.load_slice(index)?;
        if plane.w != self.meta.width || plane.h != self.meta.height {
            return Err(SegmentationError::Image(format!(
                "slice {index} is {}x{}, expected {}x{}",
                plane.w, plane.h, self.meta.width, self.meta.height
            )));
        }
        Ok(plane)
    }

    /// Scoped read access to slice `index` for the duration of a sample.
    pub fn pin_slice(&self, index: usize) -> Result<SlicePin<'_>> {
        self.check_index(index)?;
        self.cache.pin(index, || self.load_checked(index))
    }

    fn interpolate(&self, x: f64, y: f64, z: f64) -> Result<f64> {
        let (x0, dx, x1) = split(x, self.meta.width);
        let (y0, dy, y1) = split(y, self.meta.height);
        let (z0, dz, z1) = split(z, self.meta.slices);

        let lower = self.pin_slice(z0)?;
        let upper = if z1 != z0 {
            Some(self.pin_slice(z1)?)
        } else {
            None
        };
        let lower_plane: &SlicePlane = &lower;
        let upper_plane: &SlicePlane = upper.as_deref().unwrap_or(lower_plane);

        let bilinear = |plane: &SlicePlane| {
            let c00 = f64::from(plane.get(x0, y0));
            let c10 = f64::from(plane.get(x1, y0));
            let c01 = f64::from(plane.get(x0, y1));
            let c11 = f64::from(plane.get(x1, y1));
            let c0 = c00 * (1.0 - dx) + c10 * dx;
            let c1 = c01 * (1.0 - dx) + c11 * dx;
            c0 * (1.0 - dy) + c1 * dy
        };
        let c0 = bilinear(lower_plane);
        let c1 = bilinear(upper_plane);
        Ok(c0 * (1.0 - dz) + c1 * dz)
    }
}

/// Integer base, fractional weight and clamped upper neighbour along an axis.
#[inline]
fn split(v: f64, len: usize) -> (usize, f64, usize) {
    let base = v.floor();
    let i0 = base as usize;
    let i1 = (i0 + 1).min(len.saturating_sub(1));
    (i0, v - base, i1)
}

impl<S: SliceStore> ScalarVolume for Volume<S> {
    fn dims(&self) -> VolumeDims {
        self.meta.dims()
    }

    fn sample(&self, x: f64, y: f64, z: f64) -> f64 {
        if !self.meta.dims().contains_xyz(x, y, z) {
            return NO_DATA;
        }
        match self.interpolate(x, y, z) {
            Ok(v) => v,
            Err(err) => {
                warn!("Volume::sample ({x:.2}, {y:.2}, {z:.2}) failed: {err}");
                NO_DATA
            }
        }
    }

    fn get_slice(&self, index: usize) -> Result<Arc<SlicePlane>> {
        self.check_index(index)?;
        self.cache.get_or_load(index, || self.load_checked(index))
    }

    fn set_cache_budget(&self, bytes: usize) {
        self.cache.set_budget(bytes);
    }

    fn voxel_size(&self) -> f64 {
        self.meta.voxel_size
    }

    fn max_intensity(&self) -> Option<f64> {
        (self.meta.max > self.meta.min).then_some(self.meta.max)
    }
}

impl<V: ScalarVolume + ?Sized> ScalarVolume for Arc<V> {
    fn dims(&self) -> VolumeDims {
        (**self).dims()
    }
    fn sample(&self, x: f64, y: f64, z: f64) -> f64 {
        (**self).sample(x, y, z)
    }
    fn get_slice(&self, index: usize) -> Result<Arc<SlicePlane>> {
        (**self).get_slice(index)
    }
    fn set_cache_budget(&self, bytes: usize) {
        (**self).set_cache_budget(bytes)
    }
    fn voxel_size(&self) -> f64 {
        (**self).voxel_size()
    }
    fn max_intensity(&self) -> Option<f64> {
        (**self).max_intensity()
    }
}
