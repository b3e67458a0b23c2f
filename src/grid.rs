use serde::{Deserialize, Serialize};

use crate::error::GridError;

/// Axis-aligned rectangle in model coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub top: f64,
}

impl Bounds {
    pub fn new(left: f64, right: f64, bottom: f64, top: f64) -> Self {
        Self {
            left: left.min(right),
            right: left.max(right),
            bottom: bottom.min(top),
            top: bottom.max(top),
        }
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            left: self.left.min(other.left),
            right: self.right.max(other.right),
            bottom: self.bottom.min(other.bottom),
            top: self.top.max(other.top),
        }
    }

    pub fn intersection(&self, other: &Bounds) -> Option<Bounds> {
        let left = self.left.max(other.left);
        let right = self.right.min(other.right);
        let bottom = self.bottom.max(other.bottom);
        let top = self.top.min(other.top);
        (left <= right && bottom <= top).then_some(Bounds {
            left,
            right,
            bottom,
            top,
        })
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right && y >= self.bottom && y <= self.top
    }
}

////////////////////////////////////////////////
/// Grid
/// * Height samples `z[row][col]` over the axes `x` (columns) and `y` (rows).
/// * Holes are stored as NaN.
/// * Immutable once shared: edits always build a new grid, so workers and the
///   renderer can hold `Arc<Grid>` snapshots without locking.
////////////////////////////////////////////////
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
}

impl Grid {
    /// Builds a grid from row-major heights. `z.len()` must equal `x.len() * y.len()`.
    pub fn new(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Result<Self, GridError> {
        validate_axis("x", &x)?;
        validate_axis("y", &y)?;
        if z.len() != x.len() * y.len() {
            return Err(GridError::ShapeMismatch {
                expected_rows: y.len(),
                expected_cols: x.len(),
                rows: z.len() / x.len(),
                row: z.len() / x.len(),
                cols: z.len() % x.len(),
            });
        }
        Ok(Self { x, y, z })
    }

    pub fn from_rows(x: Vec<f64>, y: Vec<f64>, rows: Vec<Vec<f64>>) -> Result<Self, GridError> {
        validate_axis("x", &x)?;
        validate_axis("y", &y)?;
        if rows.len() != y.len() {
            return Err(GridError::ShapeMismatch {
                expected_rows: y.len(),
                expected_cols: x.len(),
                rows: rows.len(),
                row: rows.len().min(y.len()),
                cols: rows.first().map_or(0, Vec::len),
            });
        }
        if let Some((row, bad)) = rows.iter().enumerate().find(|(_, r)| r.len() != x.len()) {
            return Err(GridError::ShapeMismatch {
                expected_rows: y.len(),
                expected_cols: x.len(),
                rows: rows.len(),
                row,
                cols: bad.len(),
            });
        }
        let z = rows.into_iter().flatten().collect();
        Ok(Self { x, y, z })
    }

    /// Same as [`Grid::from_rows`], turning every `no_data` sample into a hole.
    pub fn with_no_data(
        x: Vec<f64>,
        y: Vec<f64>,
        rows: Vec<Vec<f64>>,
        no_data: Option<f64>,
    ) -> Result<Self, GridError> {
        let mut grid = Self::from_rows(x, y, rows)?;
        if let Some(sentinel) = no_data {
            for value in grid.z.iter_mut() {
                if *value == sentinel {
                    *value = f64::NAN;
                }
            }
        }
        Ok(grid)
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn z(&self) -> &[f64] {
        &self.z
    }

    pub fn rows(&self) -> usize {
        self.y.len()
    }

    pub fn cols(&self) -> usize {
        self.x.len()
    }

    pub fn len(&self) -> usize {
        self.z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    #[inline]
    pub fn offset(&self, row: usize, col: usize) -> usize {
        row * self.x.len() + col
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.z[self.offset(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        let offset = self.offset(row, col);
        self.z[offset] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let start = self.offset(row, 0);
        &self.z[start..start + self.x.len()]
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.z.chunks(self.x.len()).map(<[f64]>::to_vec).collect()
    }

    /// Replaces the heights while keeping the axes.
    pub fn with_heights(&self, z: Vec<f64>) -> Result<Self, GridError> {
        Self::new(self.x.clone(), self.y.clone(), z)
    }

    /// Same axes, heights of the same length. Used by operators that only
    /// rewrite heights.
    pub(crate) fn with_same_shape(&self, z: Vec<f64>) -> Grid {
        debug_assert_eq!(z.len(), self.z.len());
        Grid {
            x: self.x.clone(),
            y: self.y.clone(),
            z,
        }
    }

    pub fn has_holes(&self) -> bool {
        self.z.iter().any(|v| v.is_nan())
    }

    pub fn hole_count(&self) -> usize {
        self.z.iter().filter(|v| v.is_nan()).count()
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            left: self.x[0],
            right: self.x[self.x.len() - 1],
            bottom: self.y[0],
            top: self.y[self.y.len() - 1],
        }
    }

    /// Minimum and maximum of the defined heights.
    pub fn height_range(&self) -> Option<(f64, f64)> {
        self.z
            .iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Closest `(row, col)` to the coordinate; see [`closest_index`].
    pub fn index_of(&self, x: f64, y: f64) -> (usize, usize) {
        (closest_index(&self.y, y), closest_index(&self.x, x))
    }

    /// Inclusive `(first, last)` index ranges of the rows and columns inside `bounds`.
    pub fn index_range(&self, bounds: &Bounds) -> Option<((usize, usize), (usize, usize))> {
        let rows = axis_range(&self.y, bounds.bottom, bounds.top)?;
        let cols = axis_range(&self.x, bounds.left, bounds.right)?;
        Some((rows, cols))
    }

    /// Keeps every `step`-th row and column, always including the last ones.
    pub fn decimated(&self, step: usize) -> Grid {
        let rows = sample_indices(self.rows(), step);
        let cols = sample_indices(self.cols(), step);
        let x = cols.iter().map(|&c| self.x[c]).collect();
        let y = rows.iter().map(|&r| self.y[r]).collect();
        let mut z = Vec::with_capacity(rows.len() * cols.len());
        for &r in &rows {
            for &c in &cols {
                z.push(self.get(r, c));
            }
        }
        Grid { x, y, z }
    }
}

/// Sampled positions along an axis of `len` entries for a decimation `step`.
pub fn sample_indices(len: usize, step: usize) -> Vec<usize> {
    let step = step.max(1);
    let mut indices: Vec<usize> = (0..len).step_by(step).collect();
    if let Some(&last) = indices.last() {
        if last + 1 != len {
            indices.push(len - 1);
        }
    }
    indices
}

/// Binary search for the axis entry closest to `value`. Exact ties between two
/// neighbours resolve to the lower index; values outside the axis clamp.
pub fn closest_index(axis: &[f64], value: f64) -> usize {
    let upper = axis.partition_point(|&a| a < value);
    if upper == 0 {
        return 0;
    }
    if upper >= axis.len() {
        return axis.len() - 1;
    }
    let lower = upper - 1;
    if value - axis[lower] <= axis[upper] - value {
        lower
    } else {
        upper
    }
}

/// Tolerant coordinate equality used when matching axes of two grids.
pub fn same_coordinate(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

/// Index of the entry in `axis` matching `value`, if any.
pub fn find_coordinate(axis: &[f64], value: f64) -> Option<usize> {
    let index = closest_index(axis, value);
    same_coordinate(axis[index], value).then_some(index)
}

fn axis_range(axis: &[f64], lo: f64, hi: f64) -> Option<(usize, usize)> {
    let first = axis.partition_point(|&a| a < lo);
    let end = axis.partition_point(|&a| a <= hi);
    (first < end).then(|| (first, end - 1))
}

fn validate_axis(name: &'static str, axis: &[f64]) -> Result<(), GridError> {
    if axis.is_empty() {
        return Err(GridError::EmptyAxis(name));
    }
    for (index, value) in axis.iter().enumerate() {
        if !value.is_finite() {
            return Err(GridError::NonFiniteAxis { axis: name, index });
        }
        if index > 0 && *value < axis[index - 1] {
            return Err(GridError::NonMonotonicAxis { axis: name, index });
        }
    }
    Ok(())
}
