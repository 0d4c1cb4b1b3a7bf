use std::path::PathBuf;
use volume_segmentation::types::{Chain, Point3};
use volume_segmentation::volume::{MemorySliceStore, Volume};

pub const PEAK: f32 = 1000.0;

/// Gaussian cross-section with unit spacing.
pub fn bump(d: f32) -> f32 {
    PEAK * (-(d * d) / 4.0).exp()
}

/// Bright sheet on the plane `y = y0`, constant in x and z.
pub fn flat_sheet(width: usize, height: usize, slices: usize, y0: f32) -> Volume<MemorySliceStore> {
    let store = MemorySliceStore::from_fn(width, height, slices, |_, y, _| bump(y as f32 - y0));
    Volume::from_store(store.metadata(), store)
}

/// Sheet on `y = y0 + z`: moves one voxel in y per slice.
pub fn drifting_sheet(
    width: usize,
    height: usize,
    slices: usize,
    y0: f32,
) -> Volume<MemorySliceStore> {
    let store = MemorySliceStore::from_fn(width, height, slices, |_, y, z| {
        bump(y as f32 - y0 - z as f32)
    });
    Volume::from_store(store.metadata(), store)
}

/// Sheet on `y = y0` that only exists for `x < x_end`.
pub fn truncated_sheet(
    width: usize,
    height: usize,
    slices: usize,
    y0: f32,
    x_end: usize,
) -> Volume<MemorySliceStore> {
    let store = MemorySliceStore::from_fn(width, height, slices, |x, y, _| {
        if x < x_end {
            bump(y as f32 - y0)
        } else {
            0.0
        }
    });
    Volume::from_store(store.metadata(), store)
}

pub fn empty_volume(width: usize, height: usize, slices: usize) -> Volume<MemorySliceStore> {
    let store = MemorySliceStore::from_fn(width, height, slices, |_, _, _| 0.0);
    Volume::from_store(store.metadata(), store)
}

/// `n` particles along x starting at `x0` with `spacing`.
pub fn line_chain(n: usize, x0: f64, spacing: f64, y: f64, z: f64) -> Chain {
    (0..n)
        .map(|i| Point3::new(x0 + spacing * i as f64, y, z))
        .collect()
}

/// Fresh scratch directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("volseg_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}
