//! Candidate positions for a single particle.
//!
//! A square reslice is sampled around the particle with its x axis on the
//! in-plane normal and its y axis on +Z. The row `lookahead` slices ahead is
//! normalised and searched for intensity maxima; each maximum maps back to a
//! position one step further along Z, with its in-plane offset scaled by
//! `step / lookahead`.
use super::options::{NormalEstimation, PropagationOptions};
use crate::error::Result;
use crate::profile::{find_maxima, normalize_profile, rank_by_proximity};
use crate::reslice::{reslice_centered, Reslice};
use crate::structure::{eigen_pairs, structure_tensor};
use crate::types::{is_sentinel, z_axis, Point3};
use crate::volume::ScalarVolume;
use serde::Serialize;

const EPS: f64 = 1e-9;
/// Below this XY length the projected tensor normal is mostly along Z and
/// says little about the in-plane direction.
const MIN_PROJECTED_NORM: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalSource {
    StructureTensor,
    Secant,
    /// Neither estimate was usable; the X axis was used.
    Fallback,
}

#[derive(Clone, Debug)]
pub struct ParticleCandidates {
    /// Ordered closest-to-centre first.
    pub positions: Vec<Point3>,
    pub normal: Point3,
    pub normal_source: NormalSource,
}

/// Perpendicular (in XY) of the secant through the nearest valid neighbours.
pub fn secant_normal(chain: &[Point3], index: usize) -> Option<Point3> {
    let here = chain.get(index)?;
    let before = chain[..index].iter().rev().find(|p| !is_sentinel(p));
    let after = chain[index + 1..].iter().find(|p| !is_sentinel(p));
    let a = before.unwrap_or(here);
    let b = after.unwrap_or(here);
    let t = Point3::new(b.x - a.x, b.y - a.y, 0.0);
    if t.norm() < EPS {
        return None;
    }
    Some(Point3::new(-t.y, t.x, 0.0).normalize())
}

/// Dominant structure-tensor eigenvector at `p`, projected to XY.
pub fn tensor_normal<V: ScalarVolume + ?Sized>(
    volume: &V,
    p: &Point3,
    radius: usize,
) -> Option<Point3> {
    let tensor = structure_tensor(volume, p.x, p.y, p.z, radius);
    let dominant = eigen_pairs(&tensor)[0];
    if !(dominant.value > EPS) {
        return None;
    }
    let v = dominant.vector;
    // Rounding noise would push particles on an axis-aligned border outside.
    let snap = |c: f64| if c.abs() < EPS { 0.0 } else { c };
    let projected = Point3::new(snap(v.x), snap(v.y), 0.0);
    let len = projected.norm();
    (len >= MIN_PROJECTED_NORM).then(|| projected / len)
}

/// In-plane normal for particle `index` and where it came from.
///
/// The tensor normal is sign-aligned with the secant normal when both exist
/// so that neighbouring reslices share an orientation.
pub fn estimate_normal<V: ScalarVolume + ?Sized>(
    volume: &V,
    chain: &[Point3],
    index: usize,
    mode: NormalEstimation,
    radius: usize,
) -> (Point3, NormalSource) {
    let secant = secant_normal(chain, index);
    if mode == NormalEstimation::StructureTensor {
        if let Some(mut n) = tensor_normal(volume, &chain[index], radius) {
            let reference = secant.unwrap_or_else(Point3::x);
            if n.dot(&reference) < 0.0 {
                n = -n;
            }
            return (n, NormalSource::StructureTensor);
        }
    }
    match secant {
        Some(n) => (n, NormalSource::Secant),
        None => (Point3::x(), NormalSource::Fallback),
    }
}

/// Reslice around `particle` with `x_axis = normal` and `y_axis = +Z`.
pub fn particle_reslice<V: ScalarVolume + ?Sized>(
    volume: &V,
    particle: &Point3,
    normal: &Point3,
    size: usize,
) -> Result<Reslice> {
    reslice_centered(volume, particle, normal, &z_axis(), size, size)
}

/// Candidate next positions for particle `index` of `chain`.
pub fn generate_candidates<V: ScalarVolume + ?Sized>(
    volume: &V,
    chain: &[Point3],
    index: usize,
    options: &PropagationOptions,
    radius: usize,
) -> Result<ParticleCandidates> {
    let particle = chain[index];
    let (normal, normal_source) =
        estimate_normal(volume, chain, index, options.normal_estimation, radius);
    let reslice = particle_reslice(volume, &particle, &normal, options.reslice_size)?;
    let (cx, cy) = reslice.center();
    let row = (cy + options.effective_lookahead()).min(reslice.height() - 1);
    let depth = row - cy;
    let offset_scale = if depth == 0 {
        1.0
    } else {
        options.step_size as f64 / depth as f64
    };

    let profile = normalize_profile(reslice.row(row));
    let mut maxima = find_maxima(&profile, options.max_candidates);
    rank_by_proximity(&mut maxima, cx);

    let advance = z_axis() * options.step_size as f64;
    let dims = volume.dims();
    let mut positions: Vec<Point3> = maxima
        .iter()
        .map(|m| particle + normal * ((m.index as f64 - cx as f64) * offset_scale) + advance)
        .filter(|c| dims.contains(c))
        .collect();
    if options.consider_previous {
        let straight = particle + advance;
        if dims.contains(&straight) {
            positions.push(straight);
        }
    }
    Ok(ParticleCandidates {
        positions,
        normal,
        normal_source,
    })
}
