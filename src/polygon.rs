use std::collections::BTreeMap;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::grid::Bounds;

pub type PolygonId = u32;

/// Scalar stored in a polygon's parameter map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(v) => Some(*v),
            ParamValue::Text(s) => s.trim().parse().ok(),
            ParamValue::Bool(_) => None,
        }
    }
}

/// Exchange form of a polygon used for import and export.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolygonRecord {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    pub id: PolygonId,
    pub name: String,
    pub points: Vec<DVec2>,
    pub color: [f32; 3],
    pub dot_color: [f32; 3],
    pub closed: bool,
    pub params: BTreeMap<String, ParamValue>,
}

impl Polygon {
    pub fn new(id: PolygonId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            points: Vec::new(),
            color: [1.0, 1.0, 1.0],
            dot_color: [1.0, 0.0, 0.0],
            closed: true,
            params: BTreeMap::new(),
        }
    }

    pub fn with_points(mut self, points: &[(f64, f64)]) -> Self {
        self.points = points.iter().map(|&(x, y)| DVec2::new(x, y)).collect();
        self
    }

    pub fn from_record(id: PolygonId, record: &PolygonRecord) -> Self {
        Self {
            points: record.points.iter().map(|p| DVec2::from_array(*p)).collect(),
            params: record.params.clone(),
            ..Self::new(id, record.name.clone())
        }
    }

    pub fn to_record(&self) -> PolygonRecord {
        PolygonRecord {
            name: self.name.clone(),
            points: self.points.iter().map(|p| p.to_array()).collect(),
            params: self.params.clone(),
        }
    }

    pub fn push_point(&mut self, x: f64, y: f64) {
        self.points.push(DVec2::new(x, y));
    }

    pub fn pop_point(&mut self) -> Option<DVec2> {
        self.points.pop()
    }

    pub fn vertex_count(&self) -> usize {
        self.points.len()
    }

    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let twice: f64 = (0..n)
            .map(|i| self.points[i].perp_dot(self.points[(i + 1) % n]))
            .sum();
        twice.abs() * 0.5
    }

    /// Usable as a containment region: at least 3 vertices and a non-zero area.
    pub fn is_degenerate(&self) -> bool {
        self.points.len() < 3 || self.area() <= f64::EPSILON
    }

    pub fn bounds(&self) -> Option<Bounds> {
        let first = self.points.first()?;
        Some(self.points.iter().fold(
            Bounds::new(first.x, first.x, first.y, first.y),
            |b, p| Bounds {
                left: b.left.min(p.x),
                right: b.right.max(p.x),
                bottom: b.bottom.min(p.y),
                top: b.top.max(p.y),
            },
        ))
    }

    fn edges(&self) -> impl Iterator<Item = (DVec2, DVec2)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    /// A polygon is planar when no two non-adjacent edges cross.
    pub fn is_planar(&self) -> bool {
        let n = self.points.len();
        if n < 4 {
            return n == 3 && self.area() > f64::EPSILON;
        }
        for i in 0..n {
            let (a, b) = (self.points[i], self.points[(i + 1) % n]);
            for j in (i + 1)..n {
                if j == i + 1 || (i == 0 && j == n - 1) {
                    continue;
                }
                let (c, d) = (self.points[j], self.points[(j + 1) % n]);
                if segments_intersect(a, b, c, d) {
                    return false;
                }
            }
        }
        true
    }

    /// Point containment on the 2D projection. Points on the boundary are
    /// outside. Resolves planarity on every call; use [`Polygon::prepared`]
    /// when testing many points.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.prepared().contains(x, y)
    }

    /// Containment view with planarity computed once.
    pub fn prepared(&self) -> PreparedPolygon<'_> {
        PreparedPolygon {
            polygon: self,
            planar: self.is_planar(),
        }
    }

    /// Distance from the point to the closest polygon edge.
    pub fn distance_to_boundary(&self, x: f64, y: f64) -> f64 {
        let p = DVec2::new(x, y);
        self.edges()
            .map(|(a, b)| segment_distance(p, a, b))
            .fold(f64::INFINITY, f64::min)
    }
}

/// A polygon with its planarity resolved, for repeated point queries.
/// Planar polygons use ray casting, self-intersecting ones the non-zero
/// winding rule so that overlapping loops still count as covered.
#[derive(Clone, Copy, Debug)]
pub struct PreparedPolygon<'a> {
    polygon: &'a Polygon,
    planar: bool,
}

impl<'a> PreparedPolygon<'a> {
    pub fn polygon(&self) -> &'a Polygon {
        self.polygon
    }

    pub fn is_planar(&self) -> bool {
        self.planar
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        if self.polygon.points.len() < 3 {
            return false;
        }
        let p = DVec2::new(x, y);
        if self.on_boundary(p) {
            return false;
        }
        if self.planar {
            ray_cast(self.polygon.edges(), p)
        } else {
            winding_number(self.polygon.edges(), p) != 0
        }
    }

    pub fn distance_to_boundary(&self, x: f64, y: f64) -> f64 {
        self.polygon.distance_to_boundary(x, y)
    }

    fn on_boundary(&self, p: DVec2) -> bool {
        let tolerance = 1e-9 * p.abs().max_element().max(1.0);
        self.polygon
            .edges()
            .any(|(a, b)| segment_distance(p, a, b) <= tolerance)
    }
}

fn ray_cast(edges: impl Iterator<Item = (DVec2, DVec2)>, p: DVec2) -> bool {
    let mut inside = false;
    for (a, b) in edges {
        if (a.y > p.y) != (b.y > p.y) {
            let cross_x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < cross_x {
                inside = !inside;
            }
        }
    }
    inside
}

fn winding_number(edges: impl Iterator<Item = (DVec2, DVec2)>, p: DVec2) -> i32 {
    let mut winding = 0;
    for (a, b) in edges {
        let side = (b - a).perp_dot(p - a);
        if a.y <= p.y {
            if b.y > p.y && side > 0.0 {
                winding += 1;
            }
        } else if b.y <= p.y && side < 0.0 {
            winding -= 1;
        }
    }
    winding
}

fn orientation(a: DVec2, b: DVec2, c: DVec2) -> f64 {
    (b - a).perp_dot(c - a)
}

fn on_segment(a: DVec2, b: DVec2, p: DVec2) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

fn segments_intersect(a: DVec2, b: DVec2, c: DVec2, d: DVec2) -> bool {
    let o1 = orientation(a, b, c);
    let o2 = orientation(a, b, d);
    let o3 = orientation(c, d, a);
    let o4 = orientation(c, d, b);
    if ((o1 > 0.0 && o2 < 0.0) || (o1 < 0.0 && o2 > 0.0))
        && ((o3 > 0.0 && o4 < 0.0) || (o3 < 0.0 && o4 > 0.0))
    {
        return true;
    }
    (o1 == 0.0 && on_segment(a, b, c))
        || (o2 == 0.0 && on_segment(a, b, d))
        || (o3 == 0.0 && on_segment(c, d, a))
        || (o4 == 0.0 && on_segment(c, d, b))
}

fn segment_distance(p: DVec2, a: DVec2, b: DVec2) -> f64 {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 == 0.0 {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

/// Read access to the polygons known to a scene.
pub trait PolygonSource {
    fn polygon(&self, id: PolygonId) -> Option<&Polygon>;
}

impl PolygonSource for BTreeMap<PolygonId, Polygon> {
    fn polygon(&self, id: PolygonId) -> Option<&Polygon> {
        self.get(&id)
    }
}

impl PolygonSource for [Polygon] {
    fn polygon(&self, id: PolygonId) -> Option<&Polygon> {
        self.iter().find(|p| p.id == id)
    }
}

impl PolygonSource for Vec<Polygon> {
    fn polygon(&self, id: PolygonId) -> Option<&Polygon> {
        self.as_slice().polygon(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        Polygon::new(1, "square").with_points(&[(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)])
    }

    #[test]
    fn ray_cast_containment() {
        let poly = square();
        assert!(poly.contains(1.0, 1.0));
        assert!(!poly.contains(3.0, 1.0));
        assert!(!poly.contains(-0.1, 1.0));
    }

    #[test]
    fn bowtie_is_not_planar() {
        let bowtie =
            Polygon::new(2, "bowtie").with_points(&[(0.0, 0.0), (2.0, 2.0), (2.0, 0.0), (0.0, 2.0)]);
        assert!(!bowtie.is_planar());
        assert!(square().is_planar());
        assert!(bowtie.contains(0.5, 1.0));
        assert!(!bowtie.contains(1.0, 1.9));
    }

    #[test]
    fn boundary_points_are_outside() {
        let poly = square();
        for (x, y) in [(0.0, 1.0), (2.0, 1.0), (1.0, 0.0), (1.0, 2.0), (0.0, 0.0), (2.0, 2.0)] {
            assert!(!poly.contains(x, y), "({x}, {y}) lies on the boundary");
        }
        let triangle = Polygon::new(5, "triangle").with_points(&[(0.0, 0.0), (4.0, 0.0), (0.0, 4.0)]);
        assert!(!triangle.contains(2.0, 2.0));
        assert!(triangle.contains(1.0, 1.0));
    }

    #[test]
    fn prepared_polygon_keeps_planarity() {
        let bowtie =
            Polygon::new(2, "bowtie").with_points(&[(0.0, 0.0), (2.0, 2.0), (2.0, 0.0), (0.0, 2.0)]);
        let prepared = bowtie.prepared();
        assert!(!prepared.is_planar());
        assert_eq!(prepared.polygon().id, 2);
        for (x, y) in [(0.5, 1.0), (1.0, 1.9), (1.5, 1.0), (3.0, 3.0)] {
            assert_eq!(prepared.contains(x, y), bowtie.contains(x, y));
        }
        assert!(square().prepared().is_planar());
    }

    #[test]
    fn degenerate_polygons() {
        let line = Polygon::new(3, "line").with_points(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        assert!(line.is_degenerate());
        let pair = Polygon::new(4, "pair").with_points(&[(0.0, 0.0), (1.0, 1.0)]);
        assert!(pair.is_degenerate());
        assert!(!pair.contains(0.5, 0.5));
        assert!(!square().is_degenerate());
    }

    #[test]
    fn boundary_distance() {
        let poly = square();
        assert!((poly.distance_to_boundary(3.0, 1.0) - 1.0).abs() < 1e-12);
        assert!((poly.distance_to_boundary(1.0, 1.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn record_round_trip_keeps_params() {
        let mut poly = square();
        poly.params.insert("max_height".into(), ParamValue::Number(12.5));
        poly.params.insert("method".into(), ParamValue::Text("linear".into()));
        let json = serde_json::to_string(&poly.to_record()).expect("serialize");
        let record: PolygonRecord = serde_json::from_str(&json).expect("deserialize");
        let restored = Polygon::from_record(9, &record);
        assert_eq!(restored.points, poly.points);
        assert_eq!(restored.params["max_height"].as_f64(), Some(12.5));
        assert_eq!(restored.id, 9);
    }
}
