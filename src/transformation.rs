use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{FilterError, InterpolationError, Result, TransformationError},
    filter::{Filter, PreparedFilter, all_match},
    grid::{Bounds, Grid},
    interpolation::{DEFAULT_SMOOTH_RADIUS, Interpolator, InterpolatorKind},
    polygon::{Polygon, PolygonId, PolygonSource},
};

/// How matched cells receive their new height.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum HeightRule {
    Constant { height: f64 },
    Clamp { min: f64, max: f64 },
    /// Rescales the matched heights from their current range into `[min, max]`.
    Linear { min: f64, max: f64 },
    FillNan,
    Interpolate { kind: InterpolatorKind },
}

impl HeightRule {
    fn range(&self) -> Option<(f64, f64)> {
        match self {
            HeightRule::Clamp { min, max } | HeightRule::Linear { min, max } => Some((*min, *max)),
            _ => None,
        }
    }
}

////////////////////////////////////////////////
/// Transformation
/// * Filters are AND-combined and evaluated only inside the scope rectangle:
///   the explicit zone, else the bounds of the `IsIn` polygons, else the grid.
/// * The input grid is never written; the result is a fresh grid so the
///   previous state stays available for undo.
////////////////////////////////////////////////
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub zone: Option<Bounds>,
    pub rule: HeightRule,
}

impl Transformation {
    pub fn new(rule: HeightRule) -> Self {
        Self {
            filters: Vec::new(),
            zone: None,
            rule,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_zone(mut self, zone: Bounds) -> Self {
        self.zone = Some(zone);
        self
    }

    pub fn validate(&self) -> std::result::Result<(), TransformationError> {
        if self.filters.is_empty() && self.zone.is_none() {
            return Err(TransformationError::AmbiguousScope);
        }
        if let Some((min, max)) = self.rule.range() {
            if !(min <= max) {
                return Err(TransformationError::InvalidRange { min, max });
            }
        }
        Ok(())
    }

    fn scope<S: PolygonSource + ?Sized>(&self, grid: &Grid, polygons: &S) -> Option<Bounds> {
        let requested = self.zone.or_else(|| {
            self.filters
                .iter()
                .filter_map(|f| match f {
                    Filter::IsIn(id) => polygons.polygon(*id).and_then(Polygon::bounds),
                    _ => None,
                })
                .reduce(|a, b| a.union(&b))
        });
        match requested {
            Some(bounds) => bounds.intersection(&grid.bounds()),
            None => Some(grid.bounds()),
        }
    }

    /// Row-major mask of the cells that pass every filter inside the scope.
    pub fn matched_cells<S: PolygonSource + ?Sized>(&self, grid: &Grid, polygons: &S) -> Result<Vec<bool>> {
        self.validate()?;
        let prepared = self
            .filters
            .iter()
            .map(|f| f.prepare(polygons))
            .collect::<std::result::Result<Vec<PreparedFilter<'_>>, FilterError>>()?;

        let mut mask = vec![false; grid.len()];
        let range = self
            .scope(grid, polygons)
            .and_then(|bounds| grid.index_range(&bounds));
        let Some(((row_start, row_end), (col_start, col_end))) = range else {
            return Ok(mask);
        };
        for row in row_start..=row_end {
            for col in col_start..=col_end {
                if all_match(&prepared, row, col, grid) {
                    mask[grid.offset(row, col)] = true;
                }
            }
        }
        Ok(mask)
    }

    pub fn apply<S: PolygonSource + ?Sized>(&self, grid: &Grid, polygons: &S) -> Result<Grid> {
        let mask = self.matched_cells(grid, polygons)?;
        let matched = mask.iter().filter(|m| **m).count();
        debug!(rule = ?self.rule, matched, "applying transformation");
        if matched == 0 {
            return Ok(grid.clone());
        }

        if let HeightRule::Interpolate { kind } = self.rule {
            return Ok(Interpolator::new(kind).fill_where(grid, &mask)?);
        }

        let mut z = grid.z().to_vec();
        let cells = z.iter_mut().zip(&mask).filter(|(_, m)| **m).map(|(v, _)| v);
        match self.rule {
            HeightRule::Constant { height } => cells.for_each(|v| *v = height),
            HeightRule::Clamp { min, max } => cells.for_each(|v| *v = (*v).clamp(min, max)),
            HeightRule::FillNan => cells.for_each(|v| *v = f64::NAN),
            HeightRule::Linear { min, max } => {
                let current = grid
                    .z()
                    .iter()
                    .zip(&mask)
                    .filter(|(v, m)| **m && !v.is_nan())
                    .fold(None, |acc: Option<(f64, f64)>, (&v, _)| match acc {
                        None => Some((v, v)),
                        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                    });
                if let Some((lo, hi)) = current {
                    let span = hi - lo;
                    cells.for_each(|v| {
                        *v = if span > 0.0 {
                            min + (*v - lo) * (max - min) / span
                        } else {
                            (min + max) * 0.5
                        };
                    });
                }
            }
            HeightRule::Interpolate { .. } => {}
        }
        Ok(grid.with_same_shape(z))
    }
}

/// Re-estimates the ring of cells lying outside a polygon within `distance`
/// of its boundary, blending an edited area into its surroundings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeBlend {
    pub polygon: PolygonId,
    pub distance: f64,
    pub kind: InterpolatorKind,
    #[serde(default = "default_smooth_radius")]
    pub smooth_radius: usize,
}

fn default_smooth_radius() -> usize {
    DEFAULT_SMOOTH_RADIUS
}

impl EdgeBlend {
    pub fn new(polygon: PolygonId, distance: f64, kind: InterpolatorKind) -> Self {
        Self {
            polygon,
            distance,
            kind,
            smooth_radius: DEFAULT_SMOOTH_RADIUS,
        }
    }

    pub fn ring_cells<S: PolygonSource + ?Sized>(&self, grid: &Grid, polygons: &S) -> Result<Vec<bool>> {
        if !(self.distance > 0.0) {
            return Err(InterpolationError::InvalidDistance(self.distance).into());
        }
        let polygon = polygons
            .polygon(self.polygon)
            .ok_or(FilterError::UnknownPolygon(self.polygon))?;
        if polygon.is_degenerate() {
            return Err(InterpolationError::DegeneratePolygon(self.polygon).into());
        }
        let region = polygon.prepared();

        let mut mask = vec![false; grid.len()];
        let Some(bounds) = polygon.bounds() else {
            return Ok(mask);
        };
        let grown = Bounds::new(
            bounds.left - self.distance,
            bounds.right + self.distance,
            bounds.bottom - self.distance,
            bounds.top + self.distance,
        );
        let Some(((row_start, row_end), (col_start, col_end))) = grown
            .intersection(&grid.bounds())
            .and_then(|b| grid.index_range(&b))
        else {
            return Ok(mask);
        };
        for row in row_start..=row_end {
            for col in col_start..=col_end {
                let (x, y) = (grid.x()[col], grid.y()[row]);
                if !region.contains(x, y) && region.distance_to_boundary(x, y) <= self.distance {
                    mask[grid.offset(row, col)] = true;
                }
            }
        }
        Ok(mask)
    }

    pub fn apply<S: PolygonSource + ?Sized>(&self, grid: &Grid, polygons: &S) -> Result<Grid> {
        let mask = self.ring_cells(grid, polygons)?;
        let ring = mask.iter().filter(|m| **m).count();
        debug!(polygon = self.polygon, distance = self.distance, ring, "blending polygon border");
        if ring == 0 {
            return Ok(grid.clone());
        }
        let interpolator = Interpolator::new(self.kind).with_smooth_radius(self.smooth_radius);
        let blended = match self.kind {
            InterpolatorKind::Smooth => interpolator.smooth_where(grid, &mask)?,
            _ => interpolator.fill_where(grid, &mask)?,
        };
        Ok(blended)
    }
}

/// Highest and lowest defined heights inside a polygon, as `(max, min)`.
pub fn polygon_height_extremes(grid: &Grid, polygon: &Polygon) -> Option<(f64, f64)> {
    let bounds = polygon.bounds()?.intersection(&grid.bounds())?;
    let ((row_start, row_end), (col_start, col_end)) = grid.index_range(&bounds)?;
    let region = polygon.prepared();
    let mut extremes: Option<(f64, f64)> = None;
    for row in row_start..=row_end {
        for col in col_start..=col_end {
            let z = grid.get(row, col);
            if z.is_nan() || !region.contains(grid.x()[col], grid.y()[row]) {
                continue;
            }
            extremes = Some(match extremes {
                None => (z, z),
                Some((hi, lo)) => (hi.max(z), lo.min(z)),
            });
        }
    }
    extremes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    fn grid() -> Grid {
        Grid::from_rows(
            vec![0.0, 1.0, 2.0],
            vec![0.0, 1.0],
            vec![vec![10.0, 20.0, 30.0], vec![40.0, 50.0, 60.0]],
        )
        .expect("grid")
    }

    fn column_zero() -> Vec<Polygon> {
        vec![Polygon::new(1, "column 0").with_points(&[
            (-0.5, -0.5),
            (0.5, -0.5),
            (0.5, 1.5),
            (-0.5, 1.5),
        ])]
    }

    #[test]
    fn constant_inside_polygon() {
        let t = Transformation::new(HeightRule::Constant { height: 0.0 })
            .with_filter(Filter::IsIn(1))
            .with_filter(Filter::HeightGreaterThan(5.0));
        let out = t.apply(&grid(), &column_zero()).expect("apply");
        assert_eq!(out.to_rows(), vec![vec![0.0, 20.0, 30.0], vec![0.0, 50.0, 60.0]]);
    }

    #[test]
    fn ambiguous_scope_is_rejected() {
        let t = Transformation::new(HeightRule::Constant { height: 0.0 });
        let err = t.apply(&grid(), &column_zero()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Transformation(TransformationError::AmbiguousScope)
        ));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let t = Transformation::new(HeightRule::Clamp { min: 5.0, max: 1.0 })
            .with_zone(Bounds::new(0.0, 2.0, 0.0, 1.0));
        assert_eq!(
            t.validate(),
            Err(TransformationError::InvalidRange { min: 5.0, max: 1.0 })
        );
    }

    #[test]
    fn zone_outside_grid_is_a_noop() {
        let t = Transformation::new(HeightRule::Constant { height: -1.0 })
            .with_zone(Bounds::new(10.0, 12.0, 10.0, 12.0));
        let g = grid();
        assert_eq!(t.apply(&g, &column_zero()).expect("apply"), g);
    }

    #[test]
    fn linear_rescales_matched_range() {
        let t = Transformation::new(HeightRule::Linear { min: 0.0, max: 1.0 })
            .with_zone(Bounds::new(0.0, 2.0, 0.0, 0.0));
        let out = t.apply(&grid(), &column_zero()).expect("apply");
        assert_eq!(out.to_rows(), vec![vec![0.0, 0.5, 1.0], vec![40.0, 50.0, 60.0]]);
    }

    #[test]
    fn clamp_and_fill_nan() {
        let zone = Bounds::new(0.0, 2.0, 0.0, 1.0);
        let clamped = Transformation::new(HeightRule::Clamp { min: 15.0, max: 45.0 })
            .with_zone(zone)
            .apply(&grid(), &column_zero())
            .expect("apply");
        assert_eq!(clamped.to_rows(), vec![vec![15.0, 20.0, 30.0], vec![40.0, 45.0, 45.0]]);

        let holed = Transformation::new(HeightRule::FillNan)
            .with_filter(Filter::HeightLessThan(20.0))
            .apply(&grid(), &column_zero())
            .expect("apply");
        assert!(holed.get(0, 0).is_nan() && holed.get(0, 1).is_nan());
        assert_eq!(holed.hole_count(), 2);
    }

    #[test]
    fn interpolate_rule_replaces_matched_cells() {
        let spiked = Grid::from_rows(vec![0.0, 1.0, 2.0], vec![0.0], vec![vec![10.0, 999.0, 30.0]])
            .expect("grid");
        let t = Transformation::new(HeightRule::Interpolate {
            kind: InterpolatorKind::Linear,
        })
        .with_zone(Bounds::new(1.0, 1.0, 0.0, 0.0));
        let out = t.apply(&spiked, &column_zero()).expect("apply");
        assert_eq!(out.to_rows(), vec![vec![10.0, 20.0, 30.0]]);
    }

    #[test]
    fn many_vertex_polygon_scope_stays_fast() {
        let axis: Vec<f64> = (0..100).map(f64::from).collect();
        let g = Grid::new(axis.clone(), axis, vec![1.0; 100 * 100]).expect("grid");
        let circle: Vec<(f64, f64)> = (0..400)
            .map(|i| {
                let angle = i as f64 * std::f64::consts::TAU / 400.0;
                (49.5 + 45.0 * angle.cos(), 49.5 + 45.0 * angle.sin())
            })
            .collect();
        let polygons = vec![Polygon::new(1, "circle").with_points(&circle)];

        let started = std::time::Instant::now();
        let out = Transformation::new(HeightRule::Constant { height: 0.0 })
            .with_filter(Filter::IsIn(1))
            .apply(&g, &polygons)
            .expect("apply");
        let elapsed = started.elapsed();

        assert_eq!(out.get(50, 50), 0.0);
        assert_eq!(out.get(0, 0), 1.0);
        assert!(
            elapsed < std::time::Duration::from_secs(3),
            "circle scope took {elapsed:?}"
        );
    }

    #[test]
    fn height_extremes_skip_boundary_nodes() {
        let polygon = Polygon::new(1, "square").with_points(&[(0.0, 0.0), (2.0, 0.0), (2.0, 1.0), (0.0, 1.0)]);
        assert_eq!(polygon_height_extremes(&grid(), &polygon), None);
        let wide = Polygon::new(2, "wide").with_points(&[(0.5, -1.0), (2.5, -1.0), (2.5, 2.0), (0.5, 2.0)]);
        assert_eq!(polygon_height_extremes(&grid(), &wide), Some((60.0, 20.0)));
    }

    #[test]
    fn edge_blend_validates_inputs() {
        let polygons = column_zero();
        let g = grid();
        let err = EdgeBlend::new(1, 0.0, InterpolatorKind::Linear)
            .apply(&g, &polygons)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Interpolation(InterpolationError::InvalidDistance(_))
        ));
        let err = EdgeBlend::new(4, 1.0, InterpolatorKind::Linear)
            .apply(&g, &polygons)
            .unwrap_err();
        assert!(matches!(err, EngineError::Filter(FilterError::UnknownPolygon(4))));
    }

    #[test]
    fn edge_blend_touches_only_the_ring() {
        let g = Grid::from_rows(
            (0..5).map(f64::from).collect(),
            vec![0.0],
            vec![vec![0.0, 0.0, 100.0, 4.0, 4.0]],
        )
        .expect("grid");
        let polygons = vec![Polygon::new(1, "left").with_points(&[
            (-0.5, -1.0),
            (1.5, -1.0),
            (1.5, 1.0),
            (-0.5, 1.0),
        ])];
        let ring = EdgeBlend::new(1, 0.6, InterpolatorKind::Linear)
            .ring_cells(&g, &polygons)
            .expect("ring");
        assert_eq!(ring, vec![false, false, true, false, false]);
        let out = EdgeBlend::new(1, 0.6, InterpolatorKind::Linear)
            .apply(&g, &polygons)
            .expect("blend");
        assert_eq!(out.z(), &[0.0, 0.0, 2.0, 4.0, 4.0]);
    }

    #[test]
    fn extremes_inside_polygon() {
        let polygons = column_zero();
        assert_eq!(polygon_height_extremes(&grid(), &polygons[0]), Some((40.0, 10.0)));
    }
}
