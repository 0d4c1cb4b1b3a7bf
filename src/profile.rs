//! Peak picking on 1D intensity profiles.
//!
//! A profile is one row of a reslice. Candidate positions for a particle are
//! the local maxima of that row, found from sign changes of the discrete first
//! difference.
use serde::Serialize;
use std::cmp::Ordering;

/// Local maximum of a profile.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Maximum {
    pub index: usize,
    pub value: f64,
}

/// The `n` highest local maxima of `profile`.
///
/// A maximum is a rise followed by a fall; a flat top reports its first
/// index. The end points are never maxima. Results are ordered by value
/// (descending) and then by index (ascending).
pub fn find_maxima(profile: &[f32], n: usize) -> Vec<Maximum> {
    if n == 0 || profile.len() < 3 {
        return Vec::new();
    }
    let mut maxima = Vec::new();
    let mut rising_from: Option<usize> = None;
    let mut plateau_start = 0usize;
    for i in 1..profile.len() {
        let diff = profile[i] - profile[i - 1];
        if !diff.is_finite() {
            rising_from = None;
            continue;
        }
        if diff > 0.0 {
            rising_from = Some(i);
            plateau_start = i;
        } else if diff < 0.0 {
            if rising_from.is_some() {
                maxima.push(Maximum {
                    index: plateau_start,
                    value: f64::from(profile[plateau_start]),
                });
            }
            rising_from = None;
        }
    }
    maxima.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });
    maxima.truncate(n);
    maxima
}

/// Reorder candidates by `|index - reference|`, closest first.
///
/// Equal distances keep the brighter candidate first, then the smaller index.
pub fn rank_by_proximity(candidates: &mut [Maximum], reference: usize) {
    candidates.sort_by(|a, b| {
        a.index
            .abs_diff(reference)
            .cmp(&b.index.abs_diff(reference))
            .then(b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal))
            .then(a.index.cmp(&b.index))
    });
}

/// Scale a profile to [0, 1] by its maximum. Non-positive profiles become 0.
pub fn normalize_profile(profile: &[f32]) -> Vec<f32> {
    let max = profile
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0f32, f32::max);
    if max <= 0.0 {
        return vec![0.0; profile.len()];
    }
    profile.iter().map(|v| (v / max).max(0.0)).collect()
}
