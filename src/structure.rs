//! Local structure tensor estimation.
//!
//! The tensor is the Gaussian-weighted average of gradient outer products
//! `∇I ∇Iᵀ` over a cubic neighbourhood. On a sheet-like structure its dominant
//! eigenvector points across the sheet (the surface normal) and the two
//! smaller ones span the sheet.
use crate::types::Point3;
use crate::volume::ScalarVolume;
use nalgebra::{Matrix3, SymmetricEigen};

/// Eigenvalue with its unit eigenvector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EigenPair {
    pub value: f64,
    pub vector: Point3,
}

/// Separable-free isotropic Gaussian weights over `(2r+1)^3`, summing to 1.
///
/// Indexed as `((z + r) * side + (y + r)) * side + (x + r)`.
pub fn gaussian_field(radius: usize) -> Vec<f64> {
    let r = radius as i64;
    let side = 2 * radius + 1;
    let mut field = Vec::with_capacity(side * side * side);
    for z in -r..=r {
        for y in -r..=r {
            for x in -r..=r {
                field.push((-((x * x + y * y + z * z) as f64)).exp());
            }
        }
    }
    let sum: f64 = field.iter().sum();
    for w in &mut field {
        *w /= sum;
    }
    field
}

/// Finite-difference gradient at a real-valued position.
///
/// Central inside the volume. The stencil is clamped to `[0, dim - 1]` on
/// every axis, so the difference becomes one-sided at the border instead of
/// reading the no-data value from outside.
pub fn gradient_at<V: ScalarVolume + ?Sized>(volume: &V, p: &Point3, scale: f64) -> Point3 {
    let dims = volume.dims();
    let extents = [dims.width, dims.height, dims.slices];
    let mut g = Point3::zeros();
    for (axis, len) in extents.into_iter().enumerate() {
        let hi = len.saturating_sub(1) as f64;
        let (mut lo_p, mut hi_p) = (*p, *p);
        lo_p[axis] = (p[axis] - 1.0).max(0.0);
        hi_p[axis] = (p[axis] + 1.0).min(hi);
        let span = hi_p[axis] - lo_p[axis];
        if span > 0.0 {
            g[axis] = (volume.sample_at(&hi_p) - volume.sample_at(&lo_p)) / span;
        }
    }
    g * scale
}

/// Structure tensor at `(x, y, z)` over a neighbourhood of `radius` voxels.
///
/// Intensities are normalised by the volume's max intensity when it is
/// known. Neighbourhood points outside the volume are left out. The result
/// is symmetric positive semi-definite.
pub fn structure_tensor<V: ScalarVolume + ?Sized>(
    volume: &V,
    x: f64,
    y: f64,
    z: f64,
    radius: usize,
) -> Matrix3<f64> {
    let scale = volume
        .max_intensity()
        .filter(|m| *m > 0.0)
        .map_or(1.0, |m| 1.0 / m);
    let weights = gaussian_field(radius);
    let dims = volume.dims();
    let r = radius as i64;
    let mut sum = Matrix3::zeros();
    let mut k = 0usize;
    for dz in -r..=r {
        for dy in -r..=r {
            for dx in -r..=r {
                let p = Point3::new(x + dx as f64, y + dy as f64, z + dz as f64);
                let w = weights[k];
                k += 1;
                if !dims.contains(&p) {
                    continue;
                }
                let g = gradient_at(volume, &p, scale);
                sum += g * g.transpose() * w;
            }
        }
    }
    sum / weights.len() as f64
}

/// Eigen-decomposition sorted by descending eigenvalue.
pub fn eigen_pairs(tensor: &Matrix3<f64>) -> [EigenPair; 3] {
    let eig = SymmetricEigen::new(*tensor);
    let mut pairs: Vec<EigenPair> = (0..3)
        .map(|i| EigenPair {
            value: eig.eigenvalues[i],
            vector: eig.eigenvectors.column(i).normalize(),
        })
        .collect();
    pairs.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    [pairs[0], pairs[1], pairs[2]]
}

/// Neighbourhood radius covering half the material thickness, at least 1.
pub fn default_radius(material_thickness: f64, voxel_size: f64) -> usize {
    if !(material_thickness.is_finite() && voxel_size.is_finite())
        || material_thickness <= 0.0
        || voxel_size <= 0.0
    {
        return 1;
    }
    ((material_thickness / voxel_size) * 0.5).round().max(1.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{MemorySliceStore, Volume};

    // Bright sheet at y = 8 with a Gaussian cross profile.
    fn sheet_volume() -> Volume<MemorySliceStore> {
        let store = MemorySliceStore::from_fn(16, 16, 16, |_, y, _| {
            let d = y as f32 - 8.0;
            1000.0 * (-(d * d) / 8.0).exp()
        });
        Volume::from_store(store.metadata(), store)
    }

    #[test]
    fn gaussian_field_is_normalised_and_peaks_at_center() {
        let f = gaussian_field(1);
        assert_eq!(f.len(), 27);
        assert!((f.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        let max = f.iter().cloned().fold(0.0, f64::max);
        assert_eq!(f[13], max);
    }

    #[test]
    fn tensor_is_symmetric() {
        let vol = sheet_volume();
        let t = structure_tensor(&vol, 7.3, 6.5, 8.0, 1);
        assert!((t - t.transpose()).abs().max() < 1e-12);
    }

    #[test]
    fn dominant_eigenvector_is_sheet_normal() {
        let vol = sheet_volume();
        let t = structure_tensor(&vol, 8.0, 6.0, 8.0, 2);
        let pairs = eigen_pairs(&t);
        assert!(pairs[0].value >= pairs[1].value && pairs[1].value >= pairs[2].value);
        assert!(pairs[0].vector.y.abs() > 0.99, "normal={:?}", pairs[0].vector);
        assert!(pairs[1].value.abs() < 1e-6 * pairs[0].value.max(1e-12));
    }

    #[test]
    fn border_gradient_is_one_sided() {
        let store = MemorySliceStore::from_fn(6, 6, 6, |x, y, z| (x + 2 * y + 3 * z) as f32);
        let vol = Volume::from_store(store.metadata(), store);
        let inner = gradient_at(&vol, &Point3::new(2.0, 2.0, 2.0), 1.0);
        let corner = gradient_at(&vol, &Point3::new(0.0, 5.0, 0.0), 1.0);
        let expected = Point3::new(1.0, 2.0, 3.0);
        assert!((inner - expected).norm() < 1e-9, "{inner:?}");
        assert!((corner - expected).norm() < 1e-9, "{corner:?}");
    }

    #[test]
    fn sheet_normal_holds_on_the_volume_edge() {
        let vol = sheet_volume();
        for x in [0.0, 15.0] {
            let t = structure_tensor(&vol, x, 7.0, 8.0, 2);
            let normal = eigen_pairs(&t)[0].vector;
            assert!(normal.y.abs() > 0.99, "x={x} normal={normal:?}");
            assert!(normal.x.abs() < 1e-6, "x={x} normal={normal:?}");
        }
    }

    #[test]
    fn flat_region_has_zero_tensor() {
        let store = MemorySliceStore::from_fn(8, 8, 8, |_, _, _| 5.0);
        let vol = Volume::from_store(store.metadata(), store);
        let t = structure_tensor(&vol, 4.0, 4.0, 4.0, 1);
        assert!(t.abs().max() < 1e-12);
    }

    #[test]
    fn default_radius_uses_half_thickness() {
        assert_eq!(default_radius(40.0, 10.0), 2);
        assert_eq!(default_radius(5.0, 10.0), 1);
        assert_eq!(default_radius(0.0, 10.0), 1);
        assert_eq!(default_radius(100.0, f64::NAN), 1);
    }
}
