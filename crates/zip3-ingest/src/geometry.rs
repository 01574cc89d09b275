//! Polygon geometry and the operations every stage shares
//!
//! All stages talk to geometry through [`Geometry`]: a tagged
//! polygon/multipolygon with explicit rings. The heavy lifting (boolean
//! overlay, predicates, simplification) is delegated to the `geo` crate; this
//! module only fixes the vocabulary the pipeline uses.

use crate::crs::{reproject, Crs};
use geo::line_intersection::line_intersection;
use geo::{
    Area, BooleanOps, BoundingRect, Centroid, Contains, CoordsIter, Intersects, Line,
    LineIntersection, LineString, MultiPolygon, Point, Polygon, Rect, SimplifyVwPreserve,
};
use std::borrow::Cow;

/// A polygonal geometry in some CRS (the CRS is tracked by the owning dataset)
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl Geometry {
    pub fn empty() -> Self {
        Geometry::MultiPolygon(MultiPolygon::new(Vec::new()))
    }

    /// Wrap an overlay result, collapsing single-part results to a polygon
    pub fn from_multi(mut mp: MultiPolygon<f64>) -> Self {
        if mp.0.len() == 1 {
            if let Some(polygon) = mp.0.pop() {
                return Geometry::Polygon(polygon);
            }
        }
        Geometry::MultiPolygon(mp)
    }

    pub fn polygons(&self) -> &[Polygon<f64>] {
        match self {
            Geometry::Polygon(p) => std::slice::from_ref(p),
            Geometry::MultiPolygon(mp) => &mp.0,
        }
    }

    pub fn as_multi(&self) -> Cow<'_, MultiPolygon<f64>> {
        match self {
            Geometry::Polygon(p) => Cow::Owned(MultiPolygon::new(vec![p.clone()])),
            Geometry::MultiPolygon(mp) => Cow::Borrowed(mp),
        }
    }

    pub fn into_multi(self) -> MultiPolygon<f64> {
        match self {
            Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
            Geometry::MultiPolygon(mp) => mp,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.polygons().is_empty() || self.area() <= 0.0
    }

    /// Planar area in the units of the geometry's CRS
    pub fn area(&self) -> f64 {
        match self {
            Geometry::Polygon(p) => p.unsigned_area(),
            Geometry::MultiPolygon(mp) => mp.unsigned_area(),
        }
    }

    /// Area in square metres, measured in the equal-area CONUS Albers projection
    pub fn equal_area(&self, crs: Crs) -> f64 {
        if crs == Crs::ConusAlbers {
            return self.area();
        }
        reproject(&self.as_multi(), crs, Crs::ConusAlbers).unsigned_area()
    }

    pub fn vertex_count(&self) -> usize {
        self.polygons().iter().map(|p| p.coords_count()).sum()
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            Geometry::Polygon(p) => p.bounding_rect(),
            Geometry::MultiPolygon(mp) => mp.bounding_rect(),
        }
    }

    pub fn centroid(&self) -> Option<Point<f64>> {
        match self {
            Geometry::Polygon(p) => p.centroid(),
            Geometry::MultiPolygon(mp) => mp.centroid(),
        }
    }

    pub fn intersection(&self, other: &Geometry) -> Geometry {
        Geometry::from_multi(self.as_multi().intersection(other.as_multi().as_ref()))
    }

    pub fn union(&self, other: &Geometry) -> Geometry {
        Geometry::from_multi(self.as_multi().union(other.as_multi().as_ref()))
    }

    pub fn difference(&self, other: &Geometry) -> Geometry {
        Geometry::from_multi(self.as_multi().difference(other.as_multi().as_ref()))
    }

    /// Union of many parts, reduced pairwise so no intermediate grows lopsided.
    ///
    /// A single part is returned untouched.
    pub fn union_all(parts: Vec<Geometry>) -> Geometry {
        let mut layer: Vec<MultiPolygon<f64>> = parts.into_iter().map(Geometry::into_multi).collect();

        while layer.len() > 1 {
            let mut next = Vec::with_capacity(layer.len() / 2 + 1);
            let mut iter = layer.into_iter();
            while let Some(a) = iter.next() {
                match iter.next() {
                    Some(b) => next.push(a.union(&b)),
                    None => next.push(a),
                }
            }
            layer = next;
        }

        layer
            .pop()
            .map(Geometry::from_multi)
            .unwrap_or_else(Geometry::empty)
    }

    /// `self` fully contains `other` (the "within" predicate seen from the container)
    pub fn contains(&self, other: &Geometry) -> bool {
        match (self.bounding_rect(), other.bounding_rect()) {
            (Some(outer), Some(inner)) if rect_contains(&outer, &inner) => {},
            _ => return false,
        }
        self.as_multi().contains(other.as_multi().as_ref())
    }

    pub fn contains_point(&self, point: &Point<f64>) -> bool {
        match self {
            Geometry::Polygon(p) => p.contains(point),
            Geometry::MultiPolygon(mp) => mp.contains(point),
        }
    }

    pub fn bbox_intersects(&self, rect: &Rect<f64>) -> bool {
        self.bounding_rect()
            .map(|own| own.intersects(rect))
            .unwrap_or(false)
    }

    /// First structural defect found, if any
    pub fn structural_issue(&self) -> Option<&'static str> {
        let polygons = self.polygons();
        if polygons.is_empty() {
            return Some("geometry is empty");
        }
        for polygon in polygons {
            for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                if ring.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
                    return Some("ring has a non-finite coordinate");
                }
                if ring.0.len() < 4 {
                    return Some("ring has fewer than four coordinates");
                }
                if !ring.is_closed() {
                    return Some("ring is not closed");
                }
            }
        }
        if !(self.area() > 0.0) {
            return Some("geometry has zero area");
        }
        None
    }

    /// Two edges cross or overlap along a stretch.
    ///
    /// Adjacent edges of the same ring and edges meeting at a vertex are
    /// allowed. Edges are swept in order of their minimum x so only edges with
    /// overlapping x ranges are compared.
    pub fn has_crossing_edges(&self) -> bool {
        // (edge, ring id, position in ring, edge count of ring)
        let mut edges: Vec<(Line<f64>, usize, usize, usize)> = Vec::new();
        let rings = self
            .polygons()
            .iter()
            .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()));
        for (ring_id, ring) in rings.enumerate() {
            let count = ring.lines().len();
            for (pos, line) in ring.lines().enumerate() {
                if line.start != line.end {
                    edges.push((line, ring_id, pos, count));
                }
            }
        }

        let min_x = |l: &Line<f64>| l.start.x.min(l.end.x);
        let max_x = |l: &Line<f64>| l.start.x.max(l.end.x);
        edges.sort_by(|a, b| min_x(&a.0).total_cmp(&min_x(&b.0)));

        for (i, &(a, ring_a, pos_a, count)) in edges.iter().enumerate() {
            let reach = max_x(&a);
            for &(b, ring_b, pos_b, _) in &edges[i + 1..] {
                if min_x(&b) > reach {
                    break;
                }
                if ring_a == ring_b {
                    let gap = pos_a.abs_diff(pos_b);
                    if gap == 1 || gap + 1 == count {
                        continue;
                    }
                }
                match line_intersection(a, b) {
                    Some(LineIntersection::SinglePoint { is_proper: true, .. }) => return true,
                    Some(LineIntersection::Collinear { intersection }) if intersection.start != intersection.end => {
                        return true
                    },
                    _ => {},
                }
            }
        }
        false
    }

    /// Structurally defective or has crossing edges
    pub fn needs_repair(&self) -> bool {
        self.structural_issue().is_some() || self.has_crossing_edges()
    }

    /// Zero-distance-buffer equivalent: degenerate rings are discarded and the
    /// remainder is run through the overlay engine, which resolves
    /// self-intersections and overlapping parts into valid polygons.
    ///
    /// Geometries that do not need repair are returned unchanged.
    pub fn repair(&self) -> Geometry {
        if !self.needs_repair() {
            return self.clone();
        }
        let cleaned: Vec<Polygon<f64>> = self.polygons().iter().filter_map(clean_polygon).collect();
        if cleaned.is_empty() {
            return Geometry::empty();
        }
        let resolved = MultiPolygon::new(cleaned).union(&MultiPolygon::new(Vec::new()));
        Geometry::from_multi(resolved)
    }

    /// Topology-preserving simplification with a distance tolerance in metres.
    ///
    /// The geometry is projected to `working_crs`, simplified there with
    /// Visvalingam-Whyatt (triangles smaller than `tolerance²` are removed
    /// without introducing self-intersections), and projected back. When no
    /// vertex is removed the geometry is returned unchanged.
    pub fn simplify(&self, tolerance_m: f64, data_crs: Crs, working_crs: Crs) -> Geometry {
        let projected = reproject(&self.as_multi(), data_crs, working_crs);
        let epsilon = tolerance_m * tolerance_m;
        let simplified = projected.simplify_vw_preserve(&epsilon);
        if simplified.coords_count() == projected.coords_count() {
            return self.clone();
        }
        Geometry::from_multi(reproject(&simplified, working_crs, data_crs))
    }

    pub fn reproject(&self, from: Crs, to: Crs) -> Geometry {
        if from == to {
            return self.clone();
        }
        Geometry::from_multi(reproject(&self.as_multi(), from, to))
    }
}

impl From<MultiPolygon<f64>> for Geometry {
    fn from(mp: MultiPolygon<f64>) -> Self {
        Geometry::from_multi(mp)
    }
}

impl From<Polygon<f64>> for Geometry {
    fn from(p: Polygon<f64>) -> Self {
        Geometry::Polygon(p)
    }
}

fn rect_contains(outer: &Rect<f64>, inner: &Rect<f64>) -> bool {
    outer.min().x <= inner.min().x
        && outer.min().y <= inner.min().y
        && outer.max().x >= inner.max().x
        && outer.max().y >= inner.max().y
}

fn ring_is_usable(ring: &LineString<f64>) -> bool {
    ring.0.len() >= 4 && ring.0.iter().all(|c| c.x.is_finite() && c.y.is_finite())
}

fn clean_polygon(polygon: &Polygon<f64>) -> Option<Polygon<f64>> {
    if !ring_is_usable(polygon.exterior()) {
        return None;
    }
    let interiors = polygon
        .interiors()
        .iter()
        .filter(|ring| ring_is_usable(ring))
        .cloned()
        .collect();
    Some(Polygon::new(polygon.exterior().clone(), interiors))
}
