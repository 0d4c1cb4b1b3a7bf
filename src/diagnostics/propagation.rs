use super::timing::TimingBreakdown;
use serde::Serialize;

/// Per-step summary of a propagation run.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    /// Zero-based step number.
    pub index: usize,
    /// Z level the step committed.
    pub z: i64,
    pub resolved: usize,
    pub sentinels: usize,
    /// Particles that lost their position during this step.
    pub new_sentinels: usize,
    pub candidate_count: usize,
    /// Particles whose normal came from the chain secant rather than the
    /// structure tensor.
    pub secant_normals: usize,
    /// Jacobi rounds executed (fewer than configured when a round changed
    /// nothing).
    pub rounds: usize,
    /// Chain energy summed over particles after the last round.
    pub energy: f64,
    pub elapsed_ms: f64,
}

/// Diagnostics returned alongside the propagated points.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationReport {
    pub timings: TimingBreakdown,
    pub steps: Vec<StepReport>,
}

impl PropagationReport {
    pub fn total_rounds(&self) -> usize {
        self.steps.iter().map(|s| s.rounds).sum()
    }

    pub fn last_step(&self) -> Option<&StepReport> {
        self.steps.last()
    }
}
