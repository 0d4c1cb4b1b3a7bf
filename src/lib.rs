#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod error;
pub mod pointset;
pub mod segmentation;
pub mod types;
pub mod volume;

// Building blocks used by the engine; public for tools and experiments.
pub mod config;
pub mod diagnostics;
pub mod image;
pub mod profile;
pub mod reslice;
pub mod structure;

// --- High-level re-exports -------------------------------------------------

pub use crate::error::{Result, SegmentationError};
pub use crate::pointset::OrderedPointSet;
pub use crate::segmentation::{
    PropagationEngine, PropagationOptions, PropagationOutcome, RunStatus,
};
pub use crate::types::{Chain, Point3};
pub use crate::volume::{ScalarVolume, Volume};

pub use crate::diagnostics::PropagationReport;

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::atomic::AtomicBool;
/// use volume_segmentation::prelude::*;
///
/// # fn main() -> volume_segmentation::Result<()> {
/// let volume = Volume::open(Path::new("scan"))?;
/// let seed: Vec<Point3> = (0..8)
///     .map(|i| Point3::new(100.0 + 4.0 * i as f64, 250.0, 40.0))
///     .collect();
///
/// let engine = PropagationEngine::new(PropagationOptions::default().with_chain_width(seed.len()))?;
/// let outcome = engine.propagate(&volume, &seed, 40, 60, &AtomicBool::new(false))?;
/// println!("rows={} sentinels={}", outcome.points.height(), outcome.sentinel_count);
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::types::{Chain, Point3};
    pub use crate::volume::{ScalarVolume, Volume};
    pub use crate::{OrderedPointSet, PropagationEngine, PropagationOptions, RunStatus};
}
