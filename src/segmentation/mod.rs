//! Slice-by-slice chain propagation.
//!
//! Starting from a seed chain at `start_z`, each step advances every particle
//! by `step_size` slices:
//! 1. sample a reslice around the particle and collect candidate positions
//!    from the intensity maxima of its look-ahead row;
//! 2. seed every particle with its closest candidate;
//! 3. run Jacobi rounds where each particle picks the candidate with the
//!    lowest local energy against the previous round's chain;
//! 4. commit the chain as a new row of the output grid.
//!
//! Particles that run out of candidates become sentinels and stay that way,
//! so the output keeps a constant width.

pub mod candidates;
pub mod energy;
pub mod options;
pub mod worker;

use crate::diagnostics::{PropagationReport, StepReport, TimingBreakdown};
use crate::error::{Result, SegmentationError};
use crate::pointset::OrderedPointSet;
use crate::types::{is_sentinel, to_sentinel, Chain, Point3};
use crate::volume::ScalarVolume;
use candidates::{generate_candidates, NormalSource, ParticleCandidates};
use energy::{EnergyModel, EnergyWeights};
use log::{debug, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// How far a seed particle may sit from the start slice.
const SLICE_TOLERANCE: f64 = 1e-6;

pub use options::{NormalEstimation, ParallelOptions, PropagationOptions};
pub use worker::{spawn_propagation, PropagationHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every step up to the target was taken.
    Completed,
    /// The cancellation flag was raised between two steps.
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct PropagationOutcome {
    /// Seed row followed by one row per executed step.
    pub points: OrderedPointSet,
    pub status: RunStatus,
    pub steps: usize,
    /// Sentinels in the last committed row.
    pub sentinel_count: usize,
    pub report: PropagationReport,
}

impl PropagationOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// The chain the run ended on.
    pub fn final_chain(&self) -> Chain {
        let h = self.points.height();
        if h == 0 {
            return Vec::new();
        }
        self.points.row(h - 1).to_vec()
    }
}

/// Number of steps needed to go from `start_z` to at least `target_z`.
pub fn step_count(start_z: i64, target_z: i64, step_size: usize) -> usize {
    if target_z <= start_z || step_size == 0 {
        return 0;
    }
    ((target_z - start_z) as usize).div_ceil(step_size)
}

/// Chain propagation driver with validated options.
#[derive(Clone, Debug)]
pub struct PropagationEngine {
    options: PropagationOptions,
}

impl PropagationEngine {
    pub fn new(options: PropagationOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &PropagationOptions {
        &self.options
    }

    /// Propagate `seed` from `start_z` until `target_z` is reached or
    /// `cancel` is raised.
    pub fn propagate<V: ScalarVolume + ?Sized>(
        &self,
        volume: &V,
        seed: &[Point3],
        start_z: i64,
        target_z: i64,
        cancel: &AtomicBool,
    ) -> Result<PropagationOutcome> {
        let opts = &self.options;
        opts.validate()?;
        if target_z <= start_z {
            return Err(SegmentationError::TargetNotAfterStart {
                start: start_z,
                target: target_z,
            });
        }
        if seed.len() != opts.chain_width {
            return Err(SegmentationError::ChainWidthMismatch {
                expected: opts.chain_width,
                actual: seed.len(),
            });
        }
        let valid = seed.iter().filter(|p| !is_sentinel(p)).count();
        if valid < 2 {
            return Err(SegmentationError::InsufficientData(format!(
                "seed chain has {valid} valid particle(s), need at least 2"
            )));
        }
        if let Some((particle, p)) = seed
            .iter()
            .enumerate()
            .find(|(_, p)| !is_sentinel(p) && (p.z - start_z as f64).abs() > SLICE_TOLERANCE)
        {
            return Err(SegmentationError::SeedOffStartSlice {
                particle,
                z: p.z,
                start: start_z,
            });
        }

        let t_run = Instant::now();
        let total_steps = step_count(start_z, target_z, opts.step_size);
        let radius = opts.tensor_radius(volume.voxel_size());
        debug!(
            "PropagationEngine::propagate width={} z={}..{} steps={} tensor_radius={}",
            opts.chain_width, start_z, target_z, total_steps, radius
        );

        let mut points = OrderedPointSet::new(opts.chain_width);
        points.push_row(seed.to_vec())?;
        let mut report = PropagationReport::default();
        let mut chain: Chain = seed.to_vec();
        let mut current_z = start_z;
        let mut status = RunStatus::Completed;
        let mut steps = 0usize;

        for index in 0..total_steps {
            if cancel.load(Ordering::Relaxed) {
                debug!("PropagationEngine::propagate cancelled after {steps} step(s)");
                status = RunStatus::Cancelled;
                break;
            }
            current_z += opts.step_size as i64;
            let (next, step_report) =
                self.step(volume, &chain, index, current_z, radius, &mut report.timings)?;
            debug!(
                "step {} z={} resolved={} sentinels={} rounds={} energy={:.4}",
                index,
                current_z,
                step_report.resolved,
                step_report.sentinels,
                step_report.rounds,
                step_report.energy
            );
            report.steps.push(step_report);
            points.push_row(next.clone())?;
            chain = next;
            steps += 1;
        }

        report.timings.total_ms = t_run.elapsed().as_secs_f64() * 1000.0;
        report.timings = report.timings.merged();
        let sentinel_count = chain.iter().filter(|p| is_sentinel(p)).count();
        Ok(PropagationOutcome {
            points,
            status,
            steps,
            sentinel_count,
            report,
        })
    }

    fn step<V: ScalarVolume + ?Sized>(
        &self,
        volume: &V,
        chain: &[Point3],
        index: usize,
        z: i64,
        radius: usize,
        timings: &mut TimingBreakdown,
    ) -> Result<(Chain, StepReport)> {
        let opts = &self.options;
        let t_step = Instant::now();
        let n = chain.len();

        let t0 = Instant::now();
        let candidates: Vec<Option<ParticleCandidates>> =
            map_particles(&opts.parallel, n, |i| {
                if is_sentinel(&chain[i]) {
                    Ok(None)
                } else {
                    generate_candidates(volume, chain, i, opts, radius).map(Some)
                }
            })
            .into_iter()
            .collect::<Result<_>>()?;
        timings.push("candidates", t0.elapsed().as_secs_f64() * 1000.0);

        let mut snapshot: Chain = Vec::with_capacity(n);
        let mut new_sentinels = 0usize;
        for (i, c) in candidates.iter().enumerate() {
            match c.as_ref().and_then(|c| c.positions.first()) {
                Some(first) => snapshot.push(*first),
                None => {
                    if !is_sentinel(&chain[i]) {
                        warn!("{}", SegmentationError::NoCandidateFound { particle: i });
                        new_sentinels += 1;
                    }
                    snapshot.push(to_sentinel(&chain[i]));
                }
            }
        }

        let t0 = Instant::now();
        let model = EnergyModel::new(
            EnergyWeights::from(opts),
            chain,
            opts.step_size as f64,
        );
        let mut rounds = 0usize;
        for _ in 0..opts.optimization_iterations {
            let frozen = &snapshot;
            let next: Chain = map_particles(&opts.parallel, n, |i| {
                match candidates[i].as_ref() {
                    Some(c) if !c.positions.is_empty() => model
                        .select(frozen, i, &c.positions)
                        .map_or(frozen[i], |(k, _)| c.positions[k]),
                    _ => frozen[i],
                }
            });
            rounds += 1;
            let changed = next.iter().zip(frozen).filter(|(a, b)| a != b).count();
            snapshot = next;
            if changed == 0 {
                break;
            }
        }
        timings.push("optimize", t0.elapsed().as_secs_f64() * 1000.0);

        let energy: f64 = (0..n)
            .filter(|&i| !is_sentinel(&snapshot[i]))
            .map(|i| model.evaluate(&snapshot, i, &snapshot[i]).total())
            .sum();
        let sentinels = snapshot.iter().filter(|p| is_sentinel(p)).count();
        let report = StepReport {
            index,
            z,
            resolved: n - sentinels,
            sentinels,
            new_sentinels,
            candidate_count: candidates
                .iter()
                .flatten()
                .map(|c| c.positions.len())
                .sum(),
            secant_normals: candidates
                .iter()
                .flatten()
                .filter(|c| c.normal_source != NormalSource::StructureTensor)
                .count(),
            rounds,
            energy,
            elapsed_ms: t_step.elapsed().as_secs_f64() * 1000.0,
        };
        Ok((snapshot, report))
    }
}

/// Evaluate `f` for every particle index, with Rayon when enabled.
fn map_particles<T, F>(parallel: &ParallelOptions, n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if parallel.should_parallelize(n) {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            return (0..n).into_par_iter().map(f).collect();
        }
    }
    (0..n).map(f).collect()
}
