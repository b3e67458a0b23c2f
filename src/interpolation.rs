use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{error::InterpolationError, grid::Grid};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolatorKind {
    Nearest,
    #[default]
    Linear,
    Cubic,
    Smooth,
}

impl InterpolatorKind {
    pub fn name(&self) -> &'static str {
        match self {
            InterpolatorKind::Nearest => "nearest",
            InterpolatorKind::Linear => "linear",
            InterpolatorKind::Cubic => "cubic",
            InterpolatorKind::Smooth => "smooth",
        }
    }
}

pub const DEFAULT_SMOOTH_RADIUS: usize = 2;

////////////////////////////////////////////////
/// Interpolator
/// * Estimates heights from the defined samples of a grid.
/// * Every strategy is hole-aware: holes inside a neighbourhood are replaced
///   by their nearest defined sample, and a strategy that cannot gather a
///   full neighbourhood degrades Cubic -> Linear -> Nearest.
/// * Distances are planar, measured in model coordinates. Ties resolve to the
///   lowest row-major index.
////////////////////////////////////////////////
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interpolator {
    pub kind: InterpolatorKind,
    /// Kernel radius, in cells, of the Smooth strategy.
    pub smooth_radius: usize,
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new(InterpolatorKind::default())
    }
}

impl From<InterpolatorKind> for Interpolator {
    fn from(kind: InterpolatorKind) -> Self {
        Self::new(kind)
    }
}

impl Interpolator {
    pub fn new(kind: InterpolatorKind) -> Self {
        Self {
            kind,
            smooth_radius: DEFAULT_SMOOTH_RADIUS,
        }
    }

    pub fn with_smooth_radius(mut self, radius: usize) -> Self {
        self.smooth_radius = radius.max(1);
        self
    }

    /// Height estimate at an arbitrary coordinate. Coordinates outside the grid
    /// use the nearest defined sample.
    pub fn estimate(&self, grid: &Grid, x: f64, y: f64) -> Result<f64, InterpolationError> {
        if grid.z().iter().all(|v| v.is_nan()) {
            return Err(InterpolationError::NoKnownSamples);
        }
        let known = |offset: usize| !grid.z()[offset].is_nan();
        if !grid.bounds().contains(x, y) {
            return Ok(nearest(grid, x, y, &known));
        }
        let value = match self.kind {
            InterpolatorKind::Nearest => nearest(grid, x, y, &known),
            InterpolatorKind::Linear => bilinear(grid, x, y, &known),
            InterpolatorKind::Cubic => bicubic(grid, x, y, &known),
            InterpolatorKind::Smooth => {
                let (row, col) = grid.index_of(x, y);
                gaussian(grid, row, col, self.smooth_radius, &known)
                    .unwrap_or_else(|| nearest(grid, x, y, &known))
            }
        };
        Ok(value)
    }

    /// Returns a copy of the grid with every hole estimated.
    pub fn fill(&self, grid: &Grid) -> Result<Grid, InterpolationError> {
        if !grid.has_holes() {
            return Ok(grid.clone());
        }
        let mask: Vec<bool> = grid.z().iter().map(|v| v.is_nan()).collect();
        self.fill_where(grid, &mask)
    }

    /// Re-estimates the masked cells from the unmasked defined ones.
    pub fn fill_where(&self, grid: &Grid, mask: &[bool]) -> Result<Grid, InterpolationError> {
        let known = |offset: usize| !mask[offset] && !grid.z()[offset].is_nan();
        if !(0..grid.len()).any(known) {
            return Err(InterpolationError::NoKnownSamples);
        }

        let cols = grid.cols();
        let mut z = grid.z().to_vec();
        z.par_chunks_mut(cols).enumerate().for_each(|(row, out)| {
            for (col, value) in out.iter_mut().enumerate() {
                if mask[row * cols + col] {
                    *value = self.fill_cell(grid, row, col, &known);
                }
            }
        });

        Ok(grid.with_same_shape(z))
    }

    /// Replaces the masked cells by a gaussian-weighted average of the defined
    /// cells around them, themselves included.
    pub fn smooth_where(&self, grid: &Grid, mask: &[bool]) -> Result<Grid, InterpolationError> {
        let known = |offset: usize| !grid.z()[offset].is_nan();
        if !(0..grid.len()).any(known) {
            return Err(InterpolationError::NoKnownSamples);
        }

        let cols = grid.cols();
        let radius = self.smooth_radius;
        let mut z = grid.z().to_vec();
        z.par_chunks_mut(cols).enumerate().for_each(|(row, out)| {
            for (col, value) in out.iter_mut().enumerate() {
                if mask[row * cols + col] {
                    if let Some(smoothed) = gaussian(grid, row, col, radius, &known) {
                        *value = smoothed;
                    }
                }
            }
        });

        Ok(grid.with_same_shape(z))
    }

    fn fill_cell(&self, grid: &Grid, row: usize, col: usize, known: &impl Fn(usize) -> bool) -> f64 {
        let (x, y) = (grid.x()[col], grid.y()[row]);
        let estimate = match self.kind {
            InterpolatorKind::Nearest => None,
            InterpolatorKind::Linear => axis_blend(grid, row, col, 1, known),
            InterpolatorKind::Cubic => {
                axis_blend(grid, row, col, 2, known).or_else(|| axis_blend(grid, row, col, 1, known))
            }
            InterpolatorKind::Smooth => gaussian(grid, row, col, self.smooth_radius, known),
        };
        estimate.unwrap_or_else(|| nearest(grid, x, y, known))
    }
}

/// Closest defined sample to `(x, y)` by ring search around the closest cell.
fn nearest(grid: &Grid, x: f64, y: f64, known: &impl Fn(usize) -> bool) -> f64 {
    let (xs, ys) = (grid.x(), grid.y());
    let (r0, c0) = grid.index_of(x, y);
    let max_ring = grid.rows().max(grid.cols());

    let mut best: Option<(f64, usize)> = None;
    for ring in 0..max_ring {
        if let Some((best_d2, _)) = best {
            let bound = ring_lower_bound(xs, c0, x, ring).min(ring_lower_bound(ys, r0, y, ring));
            if bound * bound > best_d2 {
                break;
            }
        }
        let rows = r0.saturating_sub(ring)..=(r0 + ring).min(grid.rows() - 1);
        for row in rows {
            let on_edge_row = row + ring == r0 || row == r0 + ring;
            let cols: Box<dyn Iterator<Item = usize>> = if on_edge_row {
                Box::new(c0.saturating_sub(ring)..=(c0 + ring).min(grid.cols() - 1))
            } else {
                let left = c0.checked_sub(ring);
                let right = (c0 + ring < grid.cols()).then_some(c0 + ring);
                Box::new(left.into_iter().chain(right))
            };
            for col in cols {
                let offset = grid.offset(row, col);
                if !known(offset) {
                    continue;
                }
                let d2 = (xs[col] - x).powi(2) + (ys[row] - y).powi(2);
                let better = match best {
                    None => true,
                    Some((bd, bo)) => d2 < bd || (d2 == bd && offset < bo),
                };
                if better {
                    best = Some((d2, offset));
                }
            }
        }
    }

    best.map_or(f64::NAN, |(_, offset)| grid.z()[offset])
}

/// Smallest distance along one axis reachable by cells `ring` steps away.
fn ring_lower_bound(axis: &[f64], center: usize, value: f64, ring: usize) -> f64 {
    let above = axis.get(center + ring).map(|a| (a - value).abs());
    let below = center.checked_sub(ring).map(|i| (axis[i] - value).abs());
    match (above, below) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => f64::INFINITY,
    }
}

fn sample(grid: &Grid, row: usize, col: usize, known: &impl Fn(usize) -> bool) -> f64 {
    if known(grid.offset(row, col)) {
        grid.get(row, col)
    } else {
        nearest(grid, grid.x()[col], grid.y()[row], known)
    }
}

/// Enclosing pair of indices along an axis and the blend factor between them.
fn bracket(axis: &[f64], value: f64) -> (usize, usize, f64) {
    if axis.len() == 1 {
        return (0, 0, 0.0);
    }
    let upper = axis.partition_point(|&a| a <= value).clamp(1, axis.len() - 1);
    let lower = upper - 1;
    let span = axis[upper] - axis[lower];
    let t = if span > 0.0 {
        ((value - axis[lower]) / span).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (lower, upper, t)
}

fn bilinear(grid: &Grid, x: f64, y: f64, known: &impl Fn(usize) -> bool) -> f64 {
    let (c0, c1, tx) = bracket(grid.x(), x);
    let (r0, r1, ty) = bracket(grid.y(), y);
    let h00 = sample(grid, r0, c0, known);
    let h10 = sample(grid, r0, c1, known);
    let h01 = sample(grid, r1, c0, known);
    let h11 = sample(grid, r1, c1, known);

    let hx0 = h00 + (h10 - h00) * tx;
    let hx1 = h01 + (h11 - h01) * tx;
    hx0 + (hx1 - hx0) * ty
}

fn bicubic(grid: &Grid, x: f64, y: f64, known: &impl Fn(usize) -> bool) -> f64 {
    let (c0, _, _) = bracket(grid.x(), x);
    let (r0, _, _) = bracket(grid.y(), y);
    let window = |start: Option<usize>, len: usize| start.filter(|s| s + 3 < len);
    let (Some(cs), Some(rs)) = (window(c0.checked_sub(1), grid.cols()), window(r0.checked_sub(1), grid.rows()))
    else {
        return bilinear(grid, x, y, known);
    };

    let xs = [grid.x()[cs], grid.x()[cs + 1], grid.x()[cs + 2], grid.x()[cs + 3]];
    let ys = [grid.y()[rs], grid.y()[rs + 1], grid.y()[rs + 2], grid.y()[rs + 3]];
    let mut columns = [0.0; 4];
    for (i, row) in (rs..rs + 4).enumerate() {
        let mut values = [0.0; 4];
        for (j, col) in (cs..cs + 4).enumerate() {
            if !known(grid.offset(row, col)) {
                return bilinear(grid, x, y, known);
            }
            values[j] = grid.get(row, col);
        }
        match lagrange(&xs, &values, x) {
            Some(v) => columns[i] = v,
            None => return bilinear(grid, x, y, known),
        }
    }
    lagrange(&ys, &columns, y).unwrap_or_else(|| bilinear(grid, x, y, known))
}

fn lagrange(xs: &[f64], values: &[f64], at: f64) -> Option<f64> {
    let mut total = 0.0;
    for i in 0..xs.len() {
        let mut weight = 1.0;
        for j in 0..xs.len() {
            if i == j {
                continue;
            }
            let denom = xs[i] - xs[j];
            if denom == 0.0 {
                return None;
            }
            weight *= (at - xs[j]) / denom;
        }
        total += weight * values[i];
    }
    Some(total)
}

/// Row-wise and column-wise estimate from the `per_side` nearest defined
/// samples on each side of the cell; the two axes are averaged when both exist.
fn axis_blend(
    grid: &Grid,
    row: usize,
    col: usize,
    per_side: usize,
    known: &impl Fn(usize) -> bool,
) -> Option<f64> {
    let along_row = axis_estimate(
        grid.x(),
        col,
        per_side,
        |c| known(grid.offset(row, c)),
        |c| grid.get(row, c),
    );
    let along_col = axis_estimate(
        grid.y(),
        row,
        per_side,
        |r| known(grid.offset(r, col)),
        |r| grid.get(r, col),
    );
    match (along_row, along_col) {
        (Some(a), Some(b)) => Some((a + b) * 0.5),
        (a, b) => a.or(b),
    }
}

fn axis_estimate(
    axis: &[f64],
    index: usize,
    per_side: usize,
    known: impl Fn(usize) -> bool,
    value: impl Fn(usize) -> f64,
) -> Option<f64> {
    let before: Vec<usize> = (0..index).rev().filter(|&i| known(i)).take(per_side).collect();
    let after: Vec<usize> = (index + 1..axis.len()).filter(|&i| known(i)).take(per_side).collect();
    if before.len() < per_side || after.len() < per_side {
        return None;
    }
    let points: Vec<usize> = before.into_iter().rev().chain(after).collect();
    let xs: Vec<f64> = points.iter().map(|&i| axis[i]).collect();
    let values: Vec<f64> = points.iter().map(|&i| value(i)).collect();
    if per_side == 1 {
        let span = xs[1] - xs[0];
        if span <= 0.0 {
            return Some((values[0] + values[1]) * 0.5);
        }
        let t = (axis[index] - xs[0]) / span;
        return Some(values[0] + (values[1] - values[0]) * t);
    }
    lagrange(&xs, &values, axis[index])
}

fn gaussian(
    grid: &Grid,
    row: usize,
    col: usize,
    radius: usize,
    known: &impl Fn(usize) -> bool,
) -> Option<f64> {
    let sigma = (radius as f64 * 0.5).max(0.5);
    let denom = 2.0 * sigma * sigma;
    let rows = row.saturating_sub(radius)..=(row + radius).min(grid.rows() - 1);

    let mut weighted = 0.0;
    let mut weights = 0.0;
    for r in rows {
        for c in col.saturating_sub(radius)..=(col + radius).min(grid.cols() - 1) {
            if !known(grid.offset(r, c)) {
                continue;
            }
            let dr = r as f64 - row as f64;
            let dc = c as f64 - col as f64;
            let w = (-(dr * dr + dc * dc) / denom).exp();
            weighted += w * grid.get(r, c);
            weights += w;
        }
    }
    (weights > 0.0).then(|| weighted / weights)
}
