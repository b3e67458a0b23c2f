use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{GridError, MapTransformationError, Result},
    grid::{Grid, find_coordinate, same_coordinate},
    interpolation::{Interpolator, InterpolatorKind},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePriority {
    /// Keep the primary's defined values, fill its holes from the secondary.
    #[default]
    Primary,
    Secondary,
}

/// Whole-grid operator producing a new grid from one or two inputs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MapTransformation {
    Merge {
        #[serde(default)]
        priority: MergePriority,
    },
    Subtract,
    FillNan {
        value: f64,
    },
    ReplaceNan,
    InterpolateNan {
        kind: InterpolatorKind,
    },
    NanConvolution {
        radius: usize,
    },
    /// Holes out every primary cell whose coordinate is defined in the secondary.
    MaskDefined,
    /// Holes out defined cells whose neighbourhood is mostly holes.
    PruneIsolated {
        kernel_size: usize,
        nan_limit: f64,
    },
}

impl MapTransformation {
    pub fn name(&self) -> &'static str {
        match self {
            MapTransformation::Merge { .. } => "merge",
            MapTransformation::Subtract => "subtract",
            MapTransformation::FillNan { .. } => "fill_nan",
            MapTransformation::ReplaceNan => "replace_nan",
            MapTransformation::InterpolateNan { .. } => "interpolate_nan",
            MapTransformation::NanConvolution { .. } => "nan_convolution",
            MapTransformation::MaskDefined => "mask_defined",
            MapTransformation::PruneIsolated { .. } => "prune_isolated",
        }
    }

    pub fn requires_secondary(&self) -> bool {
        matches!(
            self,
            MapTransformation::Merge { .. }
                | MapTransformation::Subtract
                | MapTransformation::MaskDefined
        )
    }

    /// Checks parameters and arity before any work is dispatched.
    pub fn validate(&self, has_secondary: bool) -> std::result::Result<(), MapTransformationError> {
        if self.requires_secondary() && !has_secondary {
            return Err(MapTransformationError::MissingSecondary(self.name()));
        }
        match *self {
            MapTransformation::NanConvolution { radius: 0 } => {
                Err(MapTransformationError::InvalidParameter {
                    operation: self.name(),
                    reason: "radius must be at least 1".to_string(),
                })
            }
            MapTransformation::PruneIsolated {
                kernel_size,
                nan_limit,
            } if kernel_size == 0 || !(0.0..=1.0).contains(&nan_limit) => {
                Err(MapTransformationError::InvalidParameter {
                    operation: self.name(),
                    reason: format!(
                        "kernel size must be positive and the limit within [0, 1], got {kernel_size} and {nan_limit}"
                    ),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn apply(&self, primary: &Grid, secondary: Option<&Grid>) -> Result<Grid> {
        self.validate(secondary.is_some())?;
        debug!(op = self.name(), rows = primary.rows(), cols = primary.cols(), "applying map transformation");
        let missing = || MapTransformationError::MissingSecondary(self.name());
        let grid = match *self {
            MapTransformation::Merge { priority } => {
                let secondary = secondary.ok_or_else(missing)?;
                match priority {
                    MergePriority::Primary => merge(primary, secondary)?,
                    MergePriority::Secondary => merge(secondary, primary)?,
                }
            }
            MapTransformation::Subtract => subtract(primary, secondary.ok_or_else(missing)?)?,
            MapTransformation::MaskDefined => mask_defined(primary, secondary.ok_or_else(missing)?)?,
            MapTransformation::FillNan { value } => primary.with_same_shape(
                primary
                    .z()
                    .iter()
                    .map(|&v| if v.is_nan() { value } else { v })
                    .collect(),
            ),
            MapTransformation::ReplaceNan => replace_nan(primary),
            MapTransformation::InterpolateNan { kind } => Interpolator::new(kind).fill(primary)?,
            MapTransformation::NanConvolution { radius } => nan_convolution(primary, radius),
            MapTransformation::PruneIsolated {
                kernel_size,
                nan_limit,
            } => prune_isolated(primary, kernel_size, nan_limit),
        };
        Ok(grid)
    }
}

fn union_axis(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut axis: Vec<f64> = a.iter().chain(b).copied().collect();
    axis.sort_by(f64::total_cmp);
    axis.dedup_by(|next, kept| same_coordinate(*next, *kept));
    axis
}

/// Value of `grid` at an exact shared coordinate, if the grid has one there.
fn value_at(grid: &Grid, x: f64, y: f64) -> Option<f64> {
    let col = find_coordinate(grid.x(), x)?;
    let row = find_coordinate(grid.y(), y)?;
    Some(grid.get(row, col))
}

/// Union of both grids; `preferred` wins wherever it is defined.
fn merge(preferred: &Grid, other: &Grid) -> std::result::Result<Grid, GridError> {
    let x = union_axis(preferred.x(), other.x());
    let y = union_axis(preferred.y(), other.y());
    let z: Vec<f64> = y
        .par_iter()
        .flat_map_iter(|&yv| {
            x.iter().map(move |&xv| {
                value_at(preferred, xv, yv)
                    .filter(|v| !v.is_nan())
                    .or_else(|| value_at(other, xv, yv))
                    .unwrap_or(f64::NAN)
            })
        })
        .collect();
    Grid::new(x, y, z)
}

type SharedIndices = (Vec<Option<usize>>, Vec<Option<usize>>);

/// For every primary row and column, the matching secondary index.
fn shared_indices(
    primary: &Grid,
    secondary: &Grid,
) -> std::result::Result<SharedIndices, MapTransformationError> {
    let cols: Vec<Option<usize>> = primary
        .x()
        .iter()
        .map(|&x| find_coordinate(secondary.x(), x))
        .collect();
    let rows: Vec<Option<usize>> = primary
        .y()
        .iter()
        .map(|&y| find_coordinate(secondary.y(), y))
        .collect();
    if cols.iter().all(Option::is_none) {
        return Err(MapTransformationError::NoOverlap("x"));
    }
    if rows.iter().all(Option::is_none) {
        return Err(MapTransformationError::NoOverlap("y"));
    }
    Ok((rows, cols))
}

/// `primary - secondary` on the primary's axes. Holes in the secondary count
/// as zero; cells without a shared coordinate become holes.
fn subtract(primary: &Grid, secondary: &Grid) -> std::result::Result<Grid, MapTransformationError> {
    let (rows, cols) = shared_indices(primary, secondary)?;
    let mut z = Vec::with_capacity(primary.len());
    for (row, other_row) in rows.iter().enumerate() {
        for (col, other_col) in cols.iter().enumerate() {
            let value = match (other_row, other_col) {
                (Some(r), Some(c)) => {
                    let other = secondary.get(*r, *c);
                    primary.get(row, col) - if other.is_nan() { 0.0 } else { other }
                }
                _ => f64::NAN,
            };
            z.push(value);
        }
    }
    Ok(primary.with_same_shape(z))
}

fn mask_defined(primary: &Grid, secondary: &Grid) -> std::result::Result<Grid, MapTransformationError> {
    let (rows, cols) = shared_indices(primary, secondary)?;
    let mut z = primary.z().to_vec();
    for (row, other_row) in rows.iter().enumerate() {
        for (col, other_col) in cols.iter().enumerate() {
            if let (Some(r), Some(c)) = (other_row, other_col) {
                if !secondary.get(*r, *c).is_nan() {
                    z[primary.offset(row, col)] = f64::NAN;
                }
            }
        }
    }
    Ok(primary.with_same_shape(z))
}

fn window(center: usize, radius: usize, len: usize) -> std::ops::RangeInclusive<usize> {
    center.saturating_sub(radius)..=(center + radius).min(len - 1)
}

/// Holes become the mean of their defined 8-neighbours, in a single pass.
fn replace_nan(grid: &Grid) -> Grid {
    let cols = grid.cols();
    let mut z = grid.z().to_vec();
    z.par_chunks_mut(cols).enumerate().for_each(|(row, out)| {
        for (col, value) in out.iter_mut().enumerate() {
            if !value.is_nan() {
                continue;
            }
            let (mut sum, mut count) = (0.0, 0usize);
            for r in window(row, 1, grid.rows()) {
                for c in window(col, 1, cols) {
                    let v = grid.get(r, c);
                    if !v.is_nan() {
                        sum += v;
                        count += 1;
                    }
                }
            }
            if count > 0 {
                *value = sum / count as f64;
            }
        }
    });
    grid.with_same_shape(z)
}

/// Box average over defined cells only; holes stay holes.
fn nan_convolution(grid: &Grid, radius: usize) -> Grid {
    let cols = grid.cols();
    let mut z = grid.z().to_vec();
    z.par_chunks_mut(cols).enumerate().for_each(|(row, out)| {
        for (col, value) in out.iter_mut().enumerate() {
            if value.is_nan() {
                continue;
            }
            let (mut sum, mut count) = (0.0, 0usize);
            for r in window(row, radius, grid.rows()) {
                for c in window(col, radius, cols) {
                    let v = grid.get(r, c);
                    if !v.is_nan() {
                        sum += v;
                        count += 1;
                    }
                }
            }
            *value = sum / count as f64;
        }
    });
    grid.with_same_shape(z)
}

fn prune_isolated(grid: &Grid, kernel_size: usize, nan_limit: f64) -> Grid {
    let kernel_size = if kernel_size % 2 == 0 {
        kernel_size + 1
    } else {
        kernel_size
    };
    let radius = kernel_size / 2;
    let cols = grid.cols();
    let mut z = grid.z().to_vec();
    z.par_chunks_mut(cols).enumerate().for_each(|(row, out)| {
        for (col, value) in out.iter_mut().enumerate() {
            if value.is_nan() {
                continue;
            }
            let (mut holes, mut neighbours) = (0usize, 0usize);
            for r in window(row, radius, grid.rows()) {
                for c in window(col, radius, cols) {
                    if r == row && c == col {
                        continue;
                    }
                    neighbours += 1;
                    if grid.get(r, c).is_nan() {
                        holes += 1;
                    }
                }
            }
            if neighbours > 0 && holes as f64 / neighbours as f64 > nan_limit {
                *value = f64::NAN;
            }
        }
    });
    grid.with_same_shape(z)
}
