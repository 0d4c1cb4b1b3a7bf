use serde::{Deserialize, Serialize};

/// Wall-clock time spent in one labelled stage of a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    pub label: String,
    pub elapsed_ms: f64,
}

impl StageTiming {
    pub fn new(label: impl Into<String>, elapsed_ms: f64) -> Self {
        Self {
            label: label.into(),
            elapsed_ms,
        }
    }
}

/// Aggregated timing trace for a propagation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingBreakdown {
    pub total_ms: f64,
    pub stages: Vec<StageTiming>,
}

impl TimingBreakdown {
    pub fn with_total(total_ms: f64) -> Self {
        Self {
            total_ms,
            stages: Vec::new(),
        }
    }

    pub fn push(&mut self, label: impl Into<String>, elapsed_ms: f64) {
        self.stages.push(StageTiming::new(label, elapsed_ms));
    }

    /// Sum of all stages carrying `label`.
    pub fn total_for(&self, label: &str) -> f64 {
        self.stages
            .iter()
            .filter(|s| s.label == label)
            .map(|s| s.elapsed_ms)
            .sum()
    }

    /// Fold repeated labels into one entry each, keeping first-seen order.
    pub fn merged(&self) -> TimingBreakdown {
        let mut out = TimingBreakdown::with_total(self.total_ms);
        for stage in &self.stages {
            match out.stages.iter_mut().find(|s| s.label == stage.label) {
                Some(existing) => existing.elapsed_ms += stage.elapsed_ms,
                None => out.stages.push(stage.clone()),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_folds_repeated_labels() {
        let mut t = TimingBreakdown::with_total(10.0);
        t.push("candidates", 2.0);
        t.push("optimize", 1.0);
        t.push("candidates", 3.0);
        let m = t.merged();
        assert_eq!(m.stages.len(), 2);
        assert_eq!(m.stages[0].label, "candidates");
        assert_eq!(m.total_for("candidates"), 5.0);
        assert_eq!(t.total_for("optimize"), 1.0);
    }
}
