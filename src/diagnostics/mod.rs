//! Run diagnostics returned by the propagation engine.
//!
//! Reports are plain serde structs so the binaries can dump them next to the
//! output point set.

pub mod propagation;
pub mod timing;

pub use propagation::{PropagationReport, StepReport};
pub use timing::{StageTiming, TimingBreakdown};
