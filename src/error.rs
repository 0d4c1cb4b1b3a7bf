//! Error types shared by the volume reader and the propagation engine.
//!
//! Structural failures (bad options, width mismatch, missing seed data) abort
//! a run before any stepping happens. Per-particle failures are reported in
//! the run diagnostics and never surface through [`Result`].

/// Result type alias
pub type Result<T> = std::result::Result<T, SegmentationError>;

#[derive(Debug, thiserror::Error)]
pub enum SegmentationError {
    /// Explicit slice fetch or voxel lookup outside the volume.
    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: i64, len: usize },

    /// Seed chain does not have the declared width.
    #[error("starting chain length does not match expected chain length: expected {expected}, actual {actual}")]
    ChainWidthMismatch { expected: usize, actual: usize },

    /// Nothing to propagate beyond the seed.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A particle found no valid next position.
    #[error("no candidate found for particle {particle}")]
    NoCandidateFound { particle: usize },

    /// Cache residency exceeded its budget. Indicates a defect.
    #[error("slice cache over budget: {resident} > {budget} bytes")]
    CacheOverBudget { resident: usize, budget: usize },

    #[error("target index {target} is not after start index {start}")]
    TargetNotAfterStart { start: i64, target: i64 },

    /// A valid seed particle does not lie on the start slice.
    #[error("seed particle {particle} is at z={z}, expected start slice {start}")]
    SeedOffStartSlice { particle: usize, z: f64, start: i64 },

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(String),

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("worker error: {0}")]
    Worker(String),
}

impl From<image::ImageError> for SegmentationError {
    fn from(e: image::ImageError) -> Self {
        SegmentationError::Image(e.to_string())
    }
}

impl From<serde_json::Error> for SegmentationError {
    fn from(e: serde_json::Error) -> Self {
        SegmentationError::Metadata(e.to_string())
    }
}
