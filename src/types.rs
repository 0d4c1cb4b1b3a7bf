use nalgebra::Vector3;

/// Voxel-space position (x, y, z). Slices are indexed by z.
pub type Point3 = Vector3<f64>;

/// Ordered cross-sectional curve at a single z level.
pub type Chain = Vec<Point3>;

/// Z value marking a particle without a valid position.
pub const SENTINEL_Z: f64 = -1.0;

#[inline]
pub fn is_sentinel(p: &Point3) -> bool {
    p.z == SENTINEL_Z
}

/// Keep the in-plane coordinates but flag the point as unresolved.
#[inline]
pub fn to_sentinel(p: &Point3) -> Point3 {
    Point3::new(p.x, p.y, SENTINEL_Z)
}

#[inline]
pub fn z_axis() -> Point3 {
    Point3::new(0.0, 0.0, 1.0)
}

/// Integer extents of a volume in voxels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VolumeDims {
    pub width: usize,
    pub height: usize,
    pub slices: usize,
}

impl VolumeDims {
    pub fn new(width: usize, height: usize, slices: usize) -> Self {
        Self {
            width,
            height,
            slices,
        }
    }

    /// True when `p` lies inside `[0, w-1] × [0, h-1] × [0, slices-1]`.
    #[inline]
    pub fn contains(&self, p: &Point3) -> bool {
        self.contains_xyz(p.x, p.y, p.z)
    }

    #[inline]
    pub fn contains_xyz(&self, x: f64, y: f64, z: f64) -> bool {
        if self.width == 0 || self.height == 0 || self.slices == 0 {
            return false;
        }
        x.is_finite()
            && y.is_finite()
            && z.is_finite()
            && x >= 0.0
            && y >= 0.0
            && z >= 0.0
            && x <= (self.width - 1) as f64
            && y <= (self.height - 1) as f64
            && z <= (self.slices - 1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_inclusive_of_last_voxel() {
        let dims = VolumeDims::new(4, 3, 2);
        assert!(dims.contains_xyz(3.0, 2.0, 1.0));
        assert!(!dims.contains_xyz(3.01, 0.0, 0.0));
        assert!(!dims.contains_xyz(0.0, -0.1, 0.0));
        assert!(!dims.contains_xyz(f64::NAN, 0.0, 0.0));
        assert!(!VolumeDims::new(0, 3, 2).contains_xyz(0.0, 0.0, 0.0));
    }

    #[test]
    fn sentinel_keeps_in_plane_position() {
        let p = Point3::new(4.0, 5.0, 6.0);
        let s = to_sentinel(&p);
        assert!(is_sentinel(&s));
        assert_eq!((s.x, s.y), (4.0, 5.0));
        assert!(!is_sentinel(&p));
    }
}
