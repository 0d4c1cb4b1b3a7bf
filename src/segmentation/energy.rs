//! Local chain energy used to choose between candidate positions.
//!
//! Only the terms that involve the particle being moved are evaluated, so the
//! cost of one evaluation does not depend on the chain width. Neighbours are
//! read from a frozen snapshot; terms touching a sentinel are skipped.
use super::options::PropagationOptions;
use crate::types::{is_sentinel, z_axis, Point3};

const EPS: f64 = 1e-9;

/// Energy weights copied out of [`PropagationOptions`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnergyWeights {
    pub alpha: f64,
    pub k1: f64,
    pub k2: f64,
    pub beta: f64,
    pub delta: f64,
    pub distance_weight_factor: f64,
    /// Normalisation length for the distance term (half the reslice size).
    pub half_window: f64,
}

impl From<&PropagationOptions> for EnergyWeights {
    fn from(o: &PropagationOptions) -> Self {
        Self {
            alpha: o.alpha,
            k1: o.k1,
            k2: o.k2,
            beta: o.beta,
            delta: o.delta,
            distance_weight_factor: o.distance_weight_factor,
            half_window: (o.reslice_size as f64 * 0.5).max(1.0),
        }
    }
}

/// Individual energy terms, already weighted.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EnergyTerms {
    pub internal: f64,
    pub tension: f64,
    pub curvature: f64,
    pub distance: f64,
}

impl EnergyTerms {
    pub fn total(&self) -> f64 {
        self.internal + self.tension + self.curvature + self.distance
    }
}

/// Fixed inputs of one step: the committed previous row and its spacing.
pub struct EnergyModel<'a> {
    weights: EnergyWeights,
    previous: &'a [Point3],
    mean_spacing: f64,
    step: f64,
}

impl<'a> EnergyModel<'a> {
    pub fn new(weights: EnergyWeights, previous: &'a [Point3], step: f64) -> Self {
        let mean_spacing = mean_spacing(previous)
            .filter(|s| *s > EPS)
            .unwrap_or(1.0);
        Self {
            weights,
            previous,
            mean_spacing,
            step,
        }
    }

    pub fn mean_spacing(&self) -> f64 {
        self.mean_spacing
    }

    /// Weighted energy of moving particle `index` to `candidate` while every
    /// other particle stays where `snapshot` has it.
    pub fn evaluate(&self, snapshot: &[Point3], index: usize, candidate: &Point3) -> EnergyTerms {
        let w = &self.weights;
        let n = snapshot.len();
        let at = |j: usize| -> Option<Point3> {
            if j == index {
                Some(*candidate)
            } else {
                snapshot.get(j).filter(|p| !is_sentinel(p)).copied()
            }
        };
        let prev_at = |j: usize| self.previous.get(j).filter(|p| !is_sentinel(p)).copied();
        let l = self.mean_spacing;

        let mut first = 0.0;
        let mut tension = 0.0;
        for j in index.saturating_sub(1)..=index {
            if j + 1 >= n {
                continue;
            }
            let (Some(a), Some(b)) = (at(j), at(j + 1)) else {
                continue;
            };
            let d = b - a;
            tension += ((d.norm() - l) / l).powi(2);
            if let (Some(qa), Some(qb)) = (prev_at(j), prev_at(j + 1)) {
                first += (d - (qb - qa)).norm_squared();
            }
        }

        let mut second = 0.0;
        let mut curvature = 0.0;
        for j in index.saturating_sub(1)..=index + 1 {
            if j == 0 || j + 1 >= n {
                continue;
            }
            let (Some(a), Some(b), Some(c)) = (at(j - 1), at(j), at(j + 1)) else {
                continue;
            };
            second += (a - b * 2.0 + c).norm_squared();
            let (u, v) = (b - a, c - b);
            let (nu, nv) = (u.norm(), v.norm());
            if nu > EPS && nv > EPS {
                curvature += 1.0 - (u.dot(&v) / (nu * nv)).clamp(-1.0, 1.0);
            }
        }

        let distance = match prev_at(index) {
            Some(q) => {
                let straight = q + z_axis() * self.step;
                ((candidate - straight).norm() / w.half_window).powi(2)
            }
            None => 0.0,
        };

        EnergyTerms {
            internal: w.alpha * (w.k1 * first + w.k2 * second) / (l * l),
            tension: w.beta * tension,
            curvature: w.delta * curvature,
            distance: w.distance_weight_factor * distance,
        }
    }

    /// Index of the lowest-energy candidate. Ties keep the earlier one.
    pub fn select(
        &self,
        snapshot: &[Point3],
        index: usize,
        candidates: &[Point3],
    ) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (k, c) in candidates.iter().enumerate() {
            let e = self.evaluate(snapshot, index, c).total();
            match best {
                Some((_, be)) if e >= be => {}
                _ => best = Some((k, e)),
            }
        }
        best
    }
}

/// Mean distance between consecutive non-sentinel particles.
pub fn mean_spacing(chain: &[Point3]) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for pair in chain.windows(2) {
        if is_sentinel(&pair[0]) || is_sentinel(&pair[1]) {
            continue;
        }
        sum += (pair[1] - pair[0]).norm();
        count += 1;
    }
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::to_sentinel;

    fn weights() -> EnergyWeights {
        EnergyWeights::from(&PropagationOptions::default())
    }

    fn line(z: f64) -> Vec<Point3> {
        (0..5).map(|i| Point3::new(4.0 + 2.0 * i as f64, 10.0, z)).collect()
    }

    #[test]
    fn straight_continuation_costs_nothing() {
        let prev = line(3.0);
        let next = line(4.0);
        let model = EnergyModel::new(weights(), &prev, 1.0);
        assert!((model.mean_spacing() - 2.0).abs() < 1e-12);
        let e = model.evaluate(&next, 2, &next[2]);
        assert!(e.total().abs() < 1e-12, "{e:?}");
    }

    #[test]
    fn displacement_raises_every_shape_term() {
        let prev = line(3.0);
        let next = line(4.0);
        let model = EnergyModel::new(weights(), &prev, 1.0);
        let moved = next[2] + Point3::new(0.0, 3.0, 0.0);
        let e = model.evaluate(&next, 2, &moved);
        assert!(e.internal > 0.0);
        assert!(e.tension > 0.0);
        assert!(e.curvature > 0.0);
        assert!(e.distance > 0.0);
    }

    #[test]
    fn sentinel_neighbours_are_skipped() {
        let prev = line(3.0);
        let mut next = line(4.0);
        next[1] = to_sentinel(&next[1]);
        next[3] = to_sentinel(&next[3]);
        let model = EnergyModel::new(weights(), &prev, 1.0);
        let moved = next[2] + Point3::new(0.0, 3.0, 0.0);
        let e = model.evaluate(&next, 2, &moved);
        assert_eq!(e.internal, 0.0);
        assert_eq!(e.tension, 0.0);
        assert_eq!(e.curvature, 0.0);
        assert!(e.distance > 0.0);
    }

    #[test]
    fn select_prefers_lower_energy_and_keeps_first_on_ties() {
        let prev = line(3.0);
        let next = line(4.0);
        let model = EnergyModel::new(weights(), &prev, 1.0);
        let far = next[2] + Point3::new(0.0, 5.0, 0.0);
        let (k, _) = model.select(&next, 2, &[far, next[2]]).unwrap();
        assert_eq!(k, 1);

        let flat = EnergyModel::new(
            EnergyWeights::from(&PropagationOptions::default().without_energy()),
            &prev,
            1.0,
        );
        let (k, e) = flat.select(&next, 2, &[far, next[2]]).unwrap();
        assert_eq!((k, e), (0, 0.0));
        assert!(flat.select(&next, 2, &[]).is_none());
    }

    #[test]
    fn spacing_ignores_sentinels() {
        let mut c = line(0.0);
        c[4] = to_sentinel(&c[4]);
        assert_eq!(mean_spacing(&c), Some(2.0));
        assert_eq!(mean_spacing(&c[..1]), None);
    }
}
