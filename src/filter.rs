use serde::{Deserialize, Serialize};

use crate::{
    error::FilterError,
    grid::Grid,
    polygon::{Polygon, PolygonId, PolygonSource, PreparedPolygon},
};

/// Cell predicate used to scope a transformation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Filter {
    /// Matches `z <= threshold`.
    HeightLessThan(f64),
    /// Matches `z >= threshold`.
    HeightGreaterThan(f64),
    IsIn(PolygonId),
    IsNotIn(PolygonId),
}

impl Filter {
    pub fn name(&self) -> &'static str {
        match self {
            Filter::HeightLessThan(_) => "height <=",
            Filter::HeightGreaterThan(_) => "height >=",
            Filter::IsIn(_) => "is in",
            Filter::IsNotIn(_) => "is not in",
        }
    }

    pub fn polygon_id(&self) -> Option<PolygonId> {
        match self {
            Filter::IsIn(id) | Filter::IsNotIn(id) => Some(*id),
            _ => None,
        }
    }

    pub fn matches<S: PolygonSource + ?Sized>(
        &self,
        row: usize,
        col: usize,
        grid: &Grid,
        polygons: &S,
    ) -> Result<bool, FilterError> {
        Ok(self.prepare(polygons)?.matches(row, col, grid))
    }

    /// Resolves the polygon reference once so that cells can be evaluated
    /// without further lookups.
    pub fn prepare<'a, S: PolygonSource + ?Sized>(
        &self,
        polygons: &'a S,
    ) -> Result<PreparedFilter<'a>, FilterError> {
        Ok(match self {
            Filter::HeightLessThan(t) => PreparedFilter::HeightLessThan(*t),
            Filter::HeightGreaterThan(t) => PreparedFilter::HeightGreaterThan(*t),
            Filter::IsIn(id) => PreparedFilter::IsIn(resolve(*id, polygons)?.prepared()),
            Filter::IsNotIn(id) => PreparedFilter::IsNotIn(resolve(*id, polygons)?.prepared()),
        })
    }
}

fn resolve<S: PolygonSource + ?Sized>(id: PolygonId, polygons: &S) -> Result<&Polygon, FilterError> {
    let polygon = polygons
        .polygon(id)
        .ok_or(FilterError::UnknownPolygon(id))?;
    if polygon.vertex_count() < 3 {
        return Err(FilterError::NotEnoughVertices {
            id,
            count: polygon.vertex_count(),
        });
    }
    Ok(polygon)
}

#[derive(Clone, Copy, Debug)]
pub enum PreparedFilter<'a> {
    HeightLessThan(f64),
    HeightGreaterThan(f64),
    IsIn(PreparedPolygon<'a>),
    IsNotIn(PreparedPolygon<'a>),
}

impl PreparedFilter<'_> {
    #[inline]
    pub fn matches(&self, row: usize, col: usize, grid: &Grid) -> bool {
        match self {
            PreparedFilter::HeightLessThan(t) => {
                let z = grid.get(row, col);
                !z.is_nan() && z <= *t
            }
            PreparedFilter::HeightGreaterThan(t) => {
                let z = grid.get(row, col);
                !z.is_nan() && z >= *t
            }
            PreparedFilter::IsIn(polygon) => polygon.contains(grid.x()[col], grid.y()[row]),
            PreparedFilter::IsNotIn(polygon) => !polygon.contains(grid.x()[col], grid.y()[row]),
        }
    }
}

/// AND-combination with short-circuit on the first failing filter.
pub fn all_match(filters: &[PreparedFilter<'_>], row: usize, col: usize, grid: &Grid) -> bool {
    filters.iter().all(|f| f.matches(row, col, grid))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Grid, Vec<Polygon>) {
        let grid = Grid::from_rows(
            vec![0.0, 1.0, 2.0],
            vec![0.0, 1.0],
            vec![vec![10.0, f64::NAN, 30.0], vec![40.0, 50.0, 60.0]],
        )
        .expect("grid");
        let polygons = vec![
            Polygon::new(1, "column 0").with_points(&[
                (-0.5, -0.5),
                (0.5, -0.5),
                (0.5, 1.5),
                (-0.5, 1.5),
            ]),
            Polygon::new(2, "segment").with_points(&[(0.0, 0.0), (1.0, 1.0)]),
        ];
        (grid, polygons)
    }

    #[test]
    fn height_filters_are_inclusive_and_skip_holes() {
        let (grid, polygons) = setup();
        let less = Filter::HeightLessThan(30.0);
        let greater = Filter::HeightGreaterThan(30.0);
        assert!(less.matches(0, 2, &grid, &polygons).expect("filter"));
        assert!(greater.matches(0, 2, &grid, &polygons).expect("filter"));
        assert!(!less.matches(0, 1, &grid, &polygons).expect("filter"));
        assert!(!greater.matches(0, 1, &grid, &polygons).expect("filter"));
    }

    #[test]
    fn polygon_filters_use_axis_coordinates() {
        let (grid, polygons) = setup();
        let inside = Filter::IsIn(1);
        assert!(inside.matches(1, 0, &grid, &polygons).expect("filter"));
        assert!(!inside.matches(1, 1, &grid, &polygons).expect("filter"));
        assert!(Filter::IsNotIn(1).matches(1, 1, &grid, &polygons).expect("filter"));
    }

    #[test]
    fn polygon_errors() {
        let (grid, polygons) = setup();
        assert_eq!(
            Filter::IsIn(7).matches(0, 0, &grid, &polygons),
            Err(FilterError::UnknownPolygon(7))
        );
        assert_eq!(
            Filter::IsNotIn(2).matches(0, 0, &grid, &polygons),
            Err(FilterError::NotEnoughVertices { id: 2, count: 2 })
        );
    }

    #[test]
    fn filters_serialize_as_tagged_json() {
        let filters = vec![Filter::IsIn(3), Filter::HeightGreaterThan(5.0)];
        let json = serde_json::to_string(&filters).expect("serialize");
        assert_eq!(
            json,
            r#"[{"type":"is_in","value":3},{"type":"height_greater_than","value":5.0}]"#
        );
    }
}
