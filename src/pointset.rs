//! Ordered point grids produced by propagation.
//!
//! Rows are z levels and columns are chain indices. Every row has the same
//! width; unresolved particles stay in place as sentinels (`z == -1`) so the
//! grid shape is preserved for later meshing.
use crate::error::{Result, SegmentationError};
use crate::image::io::{read_json_file, write_json_file};
use crate::types::{is_sentinel, Chain, Point3};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PointSetRecord", into = "PointSetRecord")]
pub struct OrderedPointSet {
    width: usize,
    points: Vec<Point3>,
}

/// On-disk layout: explicit width/height plus row-major `[x, y, z]` triples.
#[derive(Serialize, Deserialize)]
struct PointSetRecord {
    width: usize,
    height: usize,
    points: Vec<[f64; 3]>,
}

impl From<OrderedPointSet> for PointSetRecord {
    fn from(ps: OrderedPointSet) -> Self {
        Self {
            width: ps.width,
            height: ps.height(),
            points: ps.points.into_iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<PointSetRecord> for OrderedPointSet {
    type Error = String;

    fn try_from(rec: PointSetRecord) -> std::result::Result<Self, String> {
        if rec.points.len() != rec.width * rec.height {
            return Err(format!(
                "point set holds {} points, expected {}x{}",
                rec.points.len(),
                rec.width,
                rec.height
            ));
        }
        Ok(Self {
            width: rec.width,
            points: rec.points.into_iter().map(Point3::from).collect(),
        })
    }
}

impl OrderedPointSet {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            points: Vec::new(),
        }
    }

    /// Build from rows that must all have the same length.
    pub fn from_rows(rows: Vec<Chain>) -> Result<Self> {
        let width = rows.first().map_or(0, Vec::len);
        let mut ps = Self::new(width);
        for row in rows {
            ps.push_row(row)?;
        }
        Ok(ps)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.points.len() / self.width
        }
    }

    /// Total number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn push_row(&mut self, row: Chain) -> Result<()> {
        if row.len() != self.width {
            return Err(SegmentationError::ChainWidthMismatch {
                expected: self.width,
                actual: row.len(),
            });
        }
        self.points.extend(row);
        Ok(())
    }

    pub fn row(&self, i: usize) -> &[Point3] {
        &self.points[i * self.width..(i + 1) * self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Point3]> + '_ {
        self.points.chunks_exact(self.width.max(1))
    }

    /// Append every row of `other`. Widths must match unless `self` is empty.
    pub fn append(&mut self, other: &OrderedPointSet) -> Result<()> {
        if self.is_empty() && self.width == 0 {
            self.width = other.width;
        }
        if other.width != self.width && !other.is_empty() {
            return Err(SegmentationError::ChainWidthMismatch {
                expected: self.width,
                actual: other.width,
            });
        }
        self.points.extend_from_slice(&other.points);
        Ok(())
    }

    /// Copy of rows `[start, end)`.
    pub fn copy_rows(&self, start: usize, end: usize) -> OrderedPointSet {
        let end = end.min(self.height());
        let start = start.min(end);
        OrderedPointSet {
            width: self.width,
            points: self.points[start * self.width..end * self.width].to_vec(),
        }
    }

    /// Smallest z among valid points.
    pub fn min_z(&self) -> Option<f64> {
        self.valid_points().map(|p| p.z).reduce(f64::min)
    }

    /// Largest z among valid points.
    pub fn max_z(&self) -> Option<f64> {
        self.valid_points().map(|p| p.z).reduce(f64::max)
    }

    pub fn sentinel_count(&self) -> usize {
        self.points.iter().filter(|p| is_sentinel(p)).count()
    }

    fn valid_points(&self) -> impl Iterator<Item = &Point3> + '_ {
        self.points.iter().filter(|p| !is_sentinel(p))
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Point3> {
        self.points
    }
}

pub fn load_point_set(path: &Path) -> Result<OrderedPointSet> {
    read_json_file(path)
}

pub fn save_point_set(path: &Path, ps: &OrderedPointSet) -> Result<()> {
    write_json_file(path, ps)
}

/// Seed chain split out of a previously segmented cloud.
#[derive(Clone, Debug)]
pub struct SeedSplit {
    /// Rows below the start index; kept verbatim in the final output.
    pub immutable: OrderedPointSet,
    /// Start row with sentinel points removed.
    pub seed: Chain,
    pub start_index: i64,
}

/// Split `master` at `start_index` (default: its highest valid z).
///
/// Rows are assumed to be consecutive z levels starting at the cloud's
/// lowest z, as produced by propagation with a step of one.
pub fn prepare_seed(master: &OrderedPointSet, start_index: Option<i64>) -> Result<SeedSplit> {
    let (min_z, max_z) = match (master.min_z(), master.max_z()) {
        (Some(lo), Some(hi)) => (lo.floor() as i64, hi.floor() as i64),
        _ => {
            return Err(SegmentationError::InsufficientData(
                "input point set has no valid points".into(),
            ))
        }
    };
    let start = start_index.unwrap_or(max_z);
    if start < min_z || start - min_z >= master.height() as i64 {
        return Err(SegmentationError::IndexOutOfRange {
            index: start,
            len: master.height(),
        });
    }
    let row_index = (start - min_z) as usize;
    let immutable = master.copy_rows(0, row_index);
    let seed: Chain = master
        .row(row_index)
        .iter()
        .filter(|p| !is_sentinel(p))
        .copied()
        .collect();
    Ok(SeedSplit {
        immutable,
        seed,
        start_index: start,
    })
}

/// Resolve the propagation target from either an end index or a stride.
pub fn resolve_target(start: i64, end: Option<i64>, stride: Option<i64>) -> Result<i64> {
    let target = match (end, stride) {
        (Some(end), None) => end,
        (None, Some(stride)) => start + stride,
        (Some(_), Some(_)) => {
            return Err(SegmentationError::InvalidOptions(
                "'end_index' and 'stride' are mutually exclusive".into(),
            ))
        }
        (None, None) => {
            return Err(SegmentationError::InvalidOptions(
                "one of 'end_index' or 'stride' is required".into(),
            ))
        }
    };
    if target <= start {
        return Err(SegmentationError::TargetNotAfterStart { start, target });
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SENTINEL_Z;

    fn row(z: f64, n: usize) -> Chain {
        (0..n).map(|i| Point3::new(i as f64, 2.0, z)).collect()
    }

    #[test]
    fn rows_must_match_width() {
        let mut ps = OrderedPointSet::new(3);
        ps.push_row(row(0.0, 3)).unwrap();
        assert!(matches!(
            ps.push_row(row(1.0, 2)),
            Err(SegmentationError::ChainWidthMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert_eq!(ps.height(), 1);
        assert_eq!(ps.rows().count(), 1);
    }

    #[test]
    fn json_layout_is_explicit_grid() {
        let mut ps = OrderedPointSet::from_rows(vec![row(0.0, 2), row(1.0, 2)]).unwrap();
        ps.points[3].z = SENTINEL_Z;
        let json = serde_json::to_value(&ps).unwrap();
        assert_eq!(json["width"], 2);
        assert_eq!(json["height"], 2);
        assert_eq!(json["points"][3][2], -1.0);
        let back: OrderedPointSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, ps);
        assert_eq!(back.sentinel_count(), 1);
    }

    #[test]
    fn malformed_grid_is_rejected() {
        let text = r#"{"width": 2, "height": 2, "points": [[0,0,0],[1,0,0],[2,0,0]]}"#;
        assert!(serde_json::from_str::<OrderedPointSet>(text).is_err());
    }

    #[test]
    fn seed_split_filters_sentinels_and_keeps_prefix() {
        let mut rows: Vec<Chain> = (10..14).map(|z| row(z as f64, 3)).collect();
        rows[2][1].z = SENTINEL_Z;
        let master = OrderedPointSet::from_rows(rows).unwrap();

        let split = prepare_seed(&master, Some(12)).unwrap();
        assert_eq!(split.immutable.height(), 2);
        assert_eq!(split.seed.len(), 2);

        let top = prepare_seed(&master, None).unwrap();
        assert_eq!(top.start_index, 13);
        assert_eq!(top.immutable.height(), 3);
        assert_eq!(top.seed.len(), 3);

        assert!(prepare_seed(&master, Some(20)).is_err());
    }

    #[test]
    fn stride_and_end_index_resolution() {
        assert_eq!(resolve_target(10, None, Some(5)).unwrap(), 15);
        assert_eq!(resolve_target(10, Some(30), None).unwrap(), 30);
        assert!(matches!(
            resolve_target(10, Some(8), None),
            Err(SegmentationError::TargetNotAfterStart {
                start: 10,
                target: 8
            })
        ));
        assert!(resolve_target(10, Some(12), Some(2)).is_err());
        assert!(resolve_target(10, None, None).is_err());
    }

    #[test]
    fn append_and_copy_rows() {
        let a = OrderedPointSet::from_rows(vec![row(0.0, 2), row(1.0, 2)]).unwrap();
        let mut empty = OrderedPointSet::default();
        empty.append(&a).unwrap();
        assert_eq!(empty.height(), 2);
        assert_eq!(a.copy_rows(1, 5).height(), 1);
        assert_eq!(a.min_z(), Some(0.0));
        assert_eq!(a.max_z(), Some(1.0));
        let wrong = OrderedPointSet::from_rows(vec![row(0.0, 3)]).unwrap();
        assert!(empty.append(&wrong).is_err());
    }
}
