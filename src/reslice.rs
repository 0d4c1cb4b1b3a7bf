//! Arbitrary-plane cross sections ("reslices") of a scalar volume.
//!
//! Pixel `(i, j)` of a reslice samples the volume at
//! `origin + i·x̂ + j·ŷ`, where `x̂`/`ŷ` are the normalised in-plane axes.
//! Rows therefore step along `ŷ` and columns along `x̂`.
use crate::error::{Result, SegmentationError};
use crate::image::io::save_grayscale_f32;
use crate::image::{ImageF32, ImageView, ImageViewMut};
use crate::types::Point3;
use crate::volume::ScalarVolume;
use serde::Serialize;
use std::path::Path;

/// Sampled plane together with the frame it was sampled in.
#[derive(Clone, Debug)]
pub struct Reslice {
    pub image: ImageF32,
    pub origin: Point3,
    pub x_axis: Point3,
    pub y_axis: Point3,
}

/// Serializable description of a reslice frame, for debug dumps.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResliceFrame {
    pub width: usize,
    pub height: usize,
    pub origin: [f64; 3],
    pub x_axis: [f64; 3],
    pub y_axis: [f64; 3],
}

impl Reslice {
    #[inline]
    pub fn width(&self) -> usize {
        self.image.w
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.image.h
    }

    /// Intensities along row `j`.
    pub fn row(&self, j: usize) -> &[f32] {
        self.image.row(j)
    }

    /// Pixel index of the plane centre, `(width/2, height/2)`.
    pub fn center(&self) -> (usize, usize) {
        (self.width() / 2, self.height() / 2)
    }

    /// Map (possibly fractional) reslice coordinates back to voxel space.
    pub fn slice_to_voxel(&self, col: f64, row: f64) -> Point3 {
        self.origin + self.x_axis * col + self.y_axis * row
    }

    pub fn frame(&self) -> ResliceFrame {
        ResliceFrame {
            width: self.width(),
            height: self.height(),
            origin: self.origin.into(),
            x_axis: self.x_axis.into(),
            y_axis: self.y_axis.into(),
        }
    }
}

fn unit(v: &Point3, name: &str) -> Result<Point3> {
    v.try_normalize(1e-12).ok_or_else(|| {
        SegmentationError::InvalidOptions(format!("reslice {name} axis must be non-zero"))
    })
}

/// Sample a `width × height` plane starting at `origin`.
pub fn reslice<V: ScalarVolume + ?Sized>(
    volume: &V,
    origin: &Point3,
    x_axis: &Point3,
    y_axis: &Point3,
    width: usize,
    height: usize,
) -> Result<Reslice> {
    let x_axis = unit(x_axis, "x")?;
    let y_axis = unit(y_axis, "y")?;
    let mut image = ImageF32::new(width, height);
    for j in 0..height {
        let row_origin = origin + y_axis * j as f64;
        for (i, px) in image.row_mut(j).iter_mut().enumerate() {
            *px = volume.sample_at(&(row_origin + x_axis * i as f64)) as f32;
        }
    }
    Ok(Reslice {
        image,
        origin: *origin,
        x_axis,
        y_axis,
    })
}

/// Sample a plane whose pixel `(width/2, height/2)` lands on `center`.
pub fn reslice_centered<V: ScalarVolume + ?Sized>(
    volume: &V,
    center: &Point3,
    x_axis: &Point3,
    y_axis: &Point3,
    width: usize,
    height: usize,
) -> Result<Reslice> {
    let xn = unit(x_axis, "x")?;
    let yn = unit(y_axis, "y")?;
    let origin = center - xn * (width / 2) as f64 - yn * (height / 2) as f64;
    reslice(volume, &origin, &xn, &yn, width, height)
}

/// Write a reslice as an 8-bit PNG normalised to its brightest pixel.
pub fn save_reslice_png(reslice: &Reslice, path: &Path) -> Result<()> {
    save_grayscale_f32(&reslice.image, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{MemorySliceStore, Volume};

    fn ramp_volume() -> Volume<MemorySliceStore> {
        let store = MemorySliceStore::from_fn(8, 8, 8, |x, y, z| (x + 10 * y + 100 * z) as f32);
        Volume::from_store(store.metadata(), store)
    }

    #[test]
    fn axis_aligned_reslice_reads_voxels() {
        let vol = ramp_volume();
        let r = reslice(
            &vol,
            &Point3::new(1.0, 2.0, 3.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 0.0, 2.0),
            4,
            3,
        )
        .unwrap();
        assert_eq!((r.width(), r.height()), (4, 3));
        assert_eq!(r.image.get(0, 0), 321.0);
        assert_eq!(r.image.get(3, 0), 324.0);
        // y axis is normalised: one row is one slice.
        assert_eq!(r.image.get(2, 2), 523.0);
        assert_eq!(r.slice_to_voxel(2.0, 2.0), Point3::new(3.0, 2.0, 5.0));
    }

    #[test]
    fn centered_reslice_puts_center_pixel_on_point() {
        let vol = ramp_volume();
        let center = Point3::new(4.0, 4.0, 4.0);
        let r = reslice_centered(&vol, &center, &Point3::y(), &Point3::z(), 6, 6).unwrap();
        let (cx, cy) = r.center();
        assert_eq!(r.slice_to_voxel(cx as f64, cy as f64), center);
        assert_eq!(r.image.get(cx, cy), 444.0);
    }

    #[test]
    fn outside_pixels_hold_no_data_and_output_is_deterministic() {
        let vol = ramp_volume();
        let center = Point3::new(0.0, 0.0, 0.0);
        let a = reslice_centered(&vol, &center, &Point3::x(), &Point3::z(), 4, 4).unwrap();
        let b = reslice_centered(&vol, &center, &Point3::x(), &Point3::z(), 4, 4).unwrap();
        assert_eq!(a.image.get(0, 0), 0.0);
        assert_eq!(a.image, b.image);
    }

    #[test]
    fn zero_axis_is_rejected() {
        let vol = ramp_volume();
        let zero = Point3::zeros();
        assert!(reslice(&vol, &zero, &zero, &Point3::z(), 2, 2).is_err());
    }
}
