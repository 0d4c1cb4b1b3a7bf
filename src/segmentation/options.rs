use crate::error::{Result, SegmentationError};
use serde::{Deserialize, Serialize};

/// How the in-plane normal of a particle is estimated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalEstimation {
    /// Dominant structure-tensor eigenvector projected to XY, falling back to
    /// the chain secant where the tensor is degenerate.
    #[default]
    StructureTensor,
    /// Perpendicular of the local chain secant only.
    Secant,
}

/// Controls whether per-particle work runs sequentially or with Rayon.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelOptions {
    enabled: bool,
    min_particles_for_parallel: usize,
}

impl ParallelOptions {
    pub fn new(enabled: bool, min_particles_for_parallel: usize) -> Self {
        Self {
            enabled,
            min_particles_for_parallel: min_particles_for_parallel.max(1),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            min_particles_for_parallel: usize::MAX,
        }
    }

    /// True when parallel evaluation should be used for `particle_count`.
    pub fn should_parallelize(&self, particle_count: usize) -> bool {
        cfg!(feature = "parallel")
            && self.enabled
            && particle_count >= self.min_particles_for_parallel
    }

    pub fn with_min_particles(mut self, min_particles: usize) -> Self {
        self.min_particles_for_parallel = min_particles.max(1);
        self
    }
}

impl Default for ParallelOptions {
    fn default() -> Self {
        Self {
            enabled: cfg!(feature = "parallel"),
            min_particles_for_parallel: 64,
        }
    }
}

/// Parameters of a propagation run.
///
/// Energy weights:
/// - `alpha` scales the internal (shape-preservation) energy, split between
///   first-order (`k1`) and second-order (`k2`) differences.
/// - `beta` scales the tension term (deviation from the previous spacing).
/// - `delta` scales the curvature term (`1 - cos θ` at interior nodes).
/// - `distance_weight_factor` penalises drifting away from the straight
///   continuation of the particle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationOptions {
    /// Declared number of particles in the chain.
    pub chain_width: usize,
    /// Slices advanced per step.
    pub step_size: usize,
    /// Jacobi rounds per step.
    pub optimization_iterations: usize,
    pub alpha: f64,
    pub k1: f64,
    pub k2: f64,
    pub beta: f64,
    pub delta: f64,
    pub distance_weight_factor: f64,
    /// Also offer the straight continuation as a candidate.
    pub consider_previous: bool,
    /// Side length of the square reslice sampled around each particle.
    pub reslice_size: usize,
    /// Rows past the reslice centre used as the intensity profile.
    /// Defaults to `step_size`. In-plane offsets found at this depth are
    /// scaled by `step_size / lookahead_depth` before the particle moves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookahead_depth: Option<usize>,
    pub max_candidates: usize,
    pub normal_estimation: NormalEstimation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure_tensor_radius: Option<usize>,
    /// Physical sheet thickness, in the volume's voxel-size units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material_thickness: Option<f64>,
    pub parallel: ParallelOptions,
}

impl Default for PropagationOptions {
    fn default() -> Self {
        Self {
            chain_width: 0,
            step_size: 1,
            optimization_iterations: 15,
            alpha: 1.0 / 3.0,
            k1: 0.5,
            k2: 0.5,
            beta: 1.0 / 3.0,
            delta: 1.0 / 3.0,
            distance_weight_factor: 50.0,
            consider_previous: false,
            reslice_size: 32,
            lookahead_depth: None,
            max_candidates: 4,
            normal_estimation: NormalEstimation::default(),
            structure_tensor_radius: None,
            material_thickness: None,
            parallel: ParallelOptions::default(),
        }
    }
}

impl PropagationOptions {
    pub fn with_chain_width(mut self, chain_width: usize) -> Self {
        self.chain_width = chain_width;
        self
    }

    /// All energy weights set to zero: every particle keeps its closest
    /// candidate.
    pub fn without_energy(mut self) -> Self {
        self.alpha = 0.0;
        self.beta = 0.0;
        self.delta = 0.0;
        self.distance_weight_factor = 0.0;
        self
    }

    pub fn effective_lookahead(&self) -> usize {
        self.lookahead_depth.unwrap_or(self.step_size)
    }

    /// Structure tensor neighbourhood radius for a volume with `voxel_size`.
    pub fn tensor_radius(&self, voxel_size: f64) -> usize {
        match (self.structure_tensor_radius, self.material_thickness) {
            (Some(r), _) => r.max(1),
            (None, Some(t)) => crate::structure::default_radius(t, voxel_size),
            (None, None) => 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let weights = [
            ("alpha", self.alpha),
            ("k1", self.k1),
            ("k2", self.k2),
            ("beta", self.beta),
            ("delta", self.delta),
            ("distance_weight_factor", self.distance_weight_factor),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if self.step_size == 0 {
            return Err(invalid("step_size must be > 0".into()));
        }
        if self.chain_width == 0 {
            return Err(invalid("chain_width must be > 0".into()));
        }
        if self.reslice_size < 3 {
            return Err(invalid(format!(
                "reslice_size must be >= 3, got {}",
                self.reslice_size
            )));
        }
        if self.max_candidates == 0 {
            return Err(invalid("max_candidates must be > 0".into()));
        }
        if self.lookahead_depth == Some(0) {
            return Err(invalid("lookahead_depth must be > 0".into()));
        }
        if let Some(t) = self.material_thickness {
            if !t.is_finite() || t <= 0.0 {
                return Err(invalid(format!(
                    "material_thickness must be positive, got {t}"
                )));
            }
        }
        Ok(())
    }
}

fn invalid(msg: String) -> SegmentationError {
    SegmentationError::InvalidOptions(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let o = PropagationOptions::default();
        assert_eq!(o.optimization_iterations, 15);
        assert_eq!(o.reslice_size, 32);
        assert_eq!(o.max_candidates, 4);
        assert!((o.alpha - 1.0 / 3.0).abs() < 1e-15);
        assert_eq!(o.distance_weight_factor, 50.0);
        assert!(!o.consider_previous);
        assert_eq!(o.effective_lookahead(), 1);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let ok = PropagationOptions::default().with_chain_width(4);
        assert!(ok.validate().is_ok());
        assert!(PropagationOptions::default().validate().is_err());

        let mut o = ok.clone();
        o.beta = -1.0;
        assert!(matches!(
            o.validate(),
            Err(SegmentationError::InvalidOptions(_))
        ));
        let mut o = ok.clone();
        o.k1 = f64::NAN;
        assert!(o.validate().is_err());
        let mut o = ok.clone();
        o.step_size = 0;
        assert!(o.validate().is_err());
        let mut o = ok.clone();
        o.reslice_size = 2;
        assert!(o.validate().is_err());
        let mut o = ok.clone();
        o.lookahead_depth = Some(0);
        assert!(o.validate().is_err());
        let mut o = ok;
        o.max_candidates = 0;
        assert!(o.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let o: PropagationOptions =
            serde_json::from_str(r#"{"chain_width": 7, "normal_estimation": "secant"}"#).unwrap();
        assert_eq!(o.chain_width, 7);
        assert_eq!(o.normal_estimation, NormalEstimation::Secant);
        assert_eq!(o.optimization_iterations, 15);
    }

    #[test]
    fn tensor_radius_prefers_explicit_value() {
        let mut o = PropagationOptions::default();
        assert_eq!(o.tensor_radius(1.0), 1);
        o.material_thickness = Some(8.0);
        assert_eq!(o.tensor_radius(2.0), 2);
        o.structure_tensor_radius = Some(3);
        assert_eq!(o.tensor_radius(2.0), 3);
    }

    #[test]
    fn parallel_threshold() {
        let p = ParallelOptions::new(true, 10);
        assert_eq!(p.should_parallelize(20), cfg!(feature = "parallel"));
        assert!(!p.should_parallelize(5));
        assert!(!ParallelOptions::disabled().should_parallelize(1000));
    }
}
