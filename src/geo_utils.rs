//! # Geographic Utilities
//!
//! Core geometry used by every stage of the capture pipeline.
//!
//! The game works on walkable areas a few hundred meters across, so all
//! computations use a flat projection where one degree of latitude and one degree
//! of longitude both count as [`METERS_PER_DEGREE`] meters. The validator's jump
//! check, the tracker's closure radius and the registry's areas all go through
//! this module so anti-cheat geometry and capture geometry never disagree.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`distance_meters`] | Planar distance between two GPS points |
//! | [`path_length`] | Total length of a walked path in meters |
//! | [`point_in_polygon`] | Ray-casting containment, boundary counts as inside |
//! | [`polygon_area`] | Shoelace area of a ring in m² |
//! | [`intersection_area`] | Area shared by two rings |
//! | [`union_area`] | Area covered by a set of rings |
//! | [`is_simple_ring`] | Self-intersection test |
//! | [`simple_parts`] | Split pinched set-operation output into simple rings |
//! | [`bounds_overlap`] | Bounding box overlap with a buffer |
//!
//! ## Example
//!
//! ```rust
//! use capture_engine::{GpsPoint, geo_utils};
//!
//! let square = vec![
//!     GpsPoint::new(0.0, 0.0),
//!     GpsPoint::new(0.0, 0.001),
//!     GpsPoint::new(0.001, 0.001),
//!     GpsPoint::new(0.001, 0.0),
//! ];
//!
//! // 111m x 111m
//! let area = geo_utils::polygon_area(&square);
//! assert!((area - 12_321.0).abs() < 1.0);
//!
//! assert!(geo_utils::point_in_polygon(&GpsPoint::new(0.0005, 0.0005), &square));
//! ```
//!
//! ## Determinism
//!
//! Areas are always summed in ascending vertex order, relative to the first vertex
//! of the ring. Boolean operations (intersection, union, difference) come from the
//! `geo` crate; their output is measured with the same shoelace routine.

use geo::{BooleanOps, Coord, LineString, MultiPolygon, Polygon};
use crate::error::GeometryIssue;
use crate::{Bounds, GpsPoint};

/// Meters per degree in the game's flat projection.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Tolerance for collinearity tests, in squared degrees.
const COLLINEAR_EPSILON: f64 = 1e-16;

// =============================================================================
// Distance Functions
// =============================================================================

/// Planar distance between two GPS points in meters.
///
/// # Example
///
/// ```rust
/// use capture_engine::{GpsPoint, geo_utils};
///
/// let a = GpsPoint::new(0.0, 0.0);
/// let b = GpsPoint::new(0.001, 0.0);
/// assert!((geo_utils::distance_meters(&a, &b) - 111.0).abs() < 1e-6);
/// ```
#[inline]
pub fn distance_meters(a: &GpsPoint, b: &GpsPoint) -> f64 {
    let dlat = a.latitude - b.latitude;
    let dlng = a.longitude - b.longitude;
    (dlat * dlat + dlng * dlng).sqrt() * METERS_PER_DEGREE
}

/// Total length of a path in meters. Empty or single-point paths return 0.0.
pub fn path_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| distance_meters(&w[0], &w[1]))
        .sum()
}

/// Convert meters to degrees in the flat projection.
#[inline]
pub fn meters_to_degrees(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE
}

// =============================================================================
// Ring Functions
// =============================================================================

/// Strip the closing duplicate vertex and consecutive duplicates from a ring.
///
/// Rings may arrive either open (`[a, b, c]`) or closed (`[a, b, c, a]`); every
/// other function in this module accepts both, and this is the canonical form.
pub fn normalize_ring(ring: &[GpsPoint]) -> Vec<GpsPoint> {
    let mut out: Vec<GpsPoint> = Vec::with_capacity(ring.len());
    for p in ring {
        if out.last() != Some(p) {
            out.push(*p);
        }
    }
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

/// Check whether `p` lies inside `ring` using ray casting.
///
/// Points exactly on an edge or vertex are treated as inside. Rings with fewer
/// than 3 vertices contain nothing.
pub fn point_in_polygon(p: &GpsPoint, ring: &[GpsPoint]) -> bool {
    let ring = normalize_ring(ring);
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let (px, py) = (p.longitude, p.latitude);
    let mut inside = false;
    let mut j = n - 1;

    for i in 0..n {
        let (xi, yi) = (ring[i].longitude, ring[i].latitude);
        let (xj, yj) = (ring[j].longitude, ring[j].latitude);

        if on_segment(&ring[j], &ring[i], p) {
            return true;
        }

        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Shoelace area of a ring in m². Degenerate rings return 0.0.
///
/// Winding order does not matter; the absolute area is returned.
pub fn polygon_area(ring: &[GpsPoint]) -> f64 {
    let ring = normalize_ring(ring);
    if ring.len() < 3 {
        return 0.0;
    }
    let coords: Vec<Coord> = ring.iter().map(to_coord).collect();
    coords_area(&coords)
}

/// Area of a polygon with holes in m².
pub fn shape_area(exterior: &[GpsPoint], holes: &[Vec<GpsPoint>]) -> f64 {
    let outer = polygon_area(exterior);
    let inner: f64 = holes.iter().map(|h| polygon_area(h)).sum();
    (outer - inner).max(0.0)
}

/// Check that a ring has no self-intersections.
///
/// Non-adjacent edges may not touch at all; adjacent edges may only share their
/// common vertex (a path that doubles back on itself is not simple).
pub fn is_simple_ring(ring: &[GpsPoint]) -> bool {
    let ring = normalize_ring(ring);
    let n = ring.len();
    if n < 3 {
        return false;
    }

    for i in 0..n {
        let a1 = &ring[i];
        let a2 = &ring[(i + 1) % n];
        for k in (i + 1)..n {
            let b1 = &ring[k];
            let b2 = &ring[(k + 1) % n];

            let adjacent = k == i + 1 || (i == 0 && k == n - 1);
            if adjacent {
                // Shared vertex is a2 == b1 (k == i + 1) or a1 == b2 (wrap-around)
                let (shared, before, after) = if k == i + 1 { (a2, a1, b2) } else { (a1, b1, a2) };
                if doubles_back(before, shared, after) {
                    return false;
                }
            } else if segments_touch(a1, a2, b1, b2) {
                return false;
            }
        }
    }

    true
}

/// Normalize a ring and check it can bound an area.
///
/// Checks run in order: coordinates, vertex count, area, simplicity.
pub fn validate_ring(ring: &[GpsPoint]) -> Result<Vec<GpsPoint>, GeometryIssue> {
    if ring.iter().any(|p| !p.is_valid()) {
        return Err(GeometryIssue::InvalidCoordinate);
    }
    let ring = normalize_ring(ring);
    if ring.len() < 3 {
        return Err(GeometryIssue::TooFewVertices);
    }
    if polygon_area(&ring) <= 0.0 {
        return Err(GeometryIssue::ZeroArea);
    }
    if !is_simple_ring(&ring) {
        return Err(GeometryIssue::SelfIntersecting);
    }
    Ok(ring)
}

/// Split a ring at every vertex it passes through more than once.
///
/// Each lobe comes back as an open ring that visits no vertex twice. A ring
/// without repeats is returned as its only lobe. Lobes with fewer than 3
/// vertices are dropped.
pub fn split_pinched_ring(ring: &[GpsPoint]) -> Vec<Vec<GpsPoint>> {
    let mut lobes = Vec::new();
    let mut open: Vec<GpsPoint> = Vec::with_capacity(ring.len());
    for p in normalize_ring(ring) {
        match open.iter().position(|q| *q == p) {
            Some(pos) => {
                // The walk came back to `p`: everything after it closes a lobe
                let mut lobe = vec![p];
                lobe.extend(open.split_off(pos + 1));
                lobes.push(lobe);
            }
            None => open.push(p),
        }
    }
    lobes.push(open);
    lobes.retain(|lobe| lobe.len() >= 3);
    lobes
}

/// Rebuild a polygon whose rings may be pinched as a list of exteriors with holes.
///
/// Set operations can return one exterior ring pinched where two lobes meet, or
/// where a hole touches the outline at a single vertex. Exterior lobes wound
/// like the whole ring become separate exteriors. Lobes wound the other way are
/// holes and join the exterior that contains them, as do the polygon's own
/// holes. Holes that fit no exterior are dropped.
///
/// The returned rings are not validated.
pub fn simple_parts(
    exterior: &[GpsPoint],
    holes: &[Vec<GpsPoint>],
) -> Vec<(Vec<GpsPoint>, Vec<Vec<GpsPoint>>)> {
    let winding = signed_area(exterior) > 0.0;
    let mut parts: Vec<(Vec<GpsPoint>, Vec<Vec<GpsPoint>>)> = Vec::new();
    let mut inner: Vec<Vec<GpsPoint>> = Vec::new();

    for lobe in split_pinched_ring(exterior) {
        let area = signed_area(&lobe);
        if area == 0.0 {
            continue;
        }
        if (area > 0.0) == winding {
            parts.push((lobe, Vec::new()));
        } else {
            inner.push(lobe);
        }
    }

    for hole in holes {
        let winding = signed_area(hole) > 0.0;
        inner.extend(split_pinched_ring(hole).into_iter().filter(|lobe| {
            let area = signed_area(lobe);
            area != 0.0 && (area > 0.0) == winding
        }));
    }

    for hole in inner {
        let owner = parts
            .iter_mut()
            .find(|(outer, _)| hole.iter().all(|p| point_in_polygon(p, outer)));
        if let Some((_, owned)) = owner {
            owned.push(hole);
        }
    }

    parts
}

// =============================================================================
// Polygon Set Functions
// =============================================================================

/// Area shared by two rings in m².
///
/// Returns 0.0 if either ring is degenerate (fewer than 3 vertices) or the rings
/// are disjoint.
///
/// # Example
///
/// ```rust
/// use capture_engine::{GpsPoint, geo_utils};
///
/// let square = |lat: f64, lng: f64, size: f64| vec![
///     GpsPoint::new(lat, lng),
///     GpsPoint::new(lat, lng + size),
///     GpsPoint::new(lat + size, lng + size),
///     GpsPoint::new(lat + size, lng),
/// ];
///
/// let a = square(0.0, 0.0, 0.002);
/// let b = square(0.001, 0.001, 0.002);
/// let shared = geo_utils::intersection_area(&a, &b);
/// assert!((shared - geo_utils::polygon_area(&square(0.001, 0.001, 0.001))).abs() < 1.0);
/// ```
pub fn intersection_area(a: &[GpsPoint], b: &[GpsPoint]) -> f64 {
    let a = normalize_ring(a);
    let b = normalize_ring(b);
    if a.len() < 3 || b.len() < 3 {
        return 0.0;
    }

    match (Bounds::from_points(&a), Bounds::from_points(&b)) {
        (Some(ba), Some(bb)) if bounds_overlap(&ba, &bb, 0.0) => {}
        _ => return 0.0,
    }

    let pa = to_multi(to_geo_polygon(&a, &[]));
    let pb = to_multi(to_geo_polygon(&b, &[]));
    multipolygon_area(&pa.intersection(&pb))
}

/// Area covered by the union of a set of rings in m².
///
/// Overlapping rings are counted once. Degenerate rings are ignored.
pub fn union_area(rings: &[Vec<GpsPoint>]) -> f64 {
    let polygons: Vec<Polygon<f64>> = rings
        .iter()
        .map(|r| normalize_ring(r))
        .filter(|r| r.len() >= 3)
        .map(|r| to_geo_polygon(&r, &[]))
        .collect();

    multipolygon_area(&union_all(&polygons))
}

/// Union a list of polygons, folding in list order.
pub fn union_all(polygons: &[Polygon<f64>]) -> MultiPolygon<f64> {
    let mut parts = polygons.iter();
    let Some(first) = parts.next() else {
        return MultiPolygon::new(Vec::new());
    };
    parts.fold(to_multi(first.clone()), |acc, p| acc.union(&to_multi(p.clone())))
}

/// Wrap a single polygon so both operands of a boolean op share a type.
#[inline]
pub fn to_multi(polygon: Polygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon])
}

/// Area of a `geo` polygon (exterior minus holes) in m².
pub fn geo_polygon_area(polygon: &Polygon<f64>) -> f64 {
    let outer = coords_area(&polygon.exterior().0);
    let inner: f64 = polygon.interiors().iter().map(|h| coords_area(&h.0)).sum();
    (outer - inner).max(0.0)
}

/// Total area of a `geo` multipolygon in m², summed in part order.
pub fn multipolygon_area(mp: &MultiPolygon<f64>) -> f64 {
    mp.0.iter().map(geo_polygon_area).sum()
}

// =============================================================================
// Conversion Functions
// =============================================================================

/// Build a `geo` polygon (x = longitude, y = latitude) from an exterior ring and holes.
pub fn to_geo_polygon(exterior: &[GpsPoint], holes: &[Vec<GpsPoint>]) -> Polygon<f64> {
    let ring = |points: &[GpsPoint]| -> LineString<f64> {
        LineString::new(normalize_ring(points).iter().map(to_coord).collect())
    };
    Polygon::new(ring(exterior), holes.iter().map(|h| ring(h.as_slice())).collect())
}

/// Split a `geo` polygon back into an open exterior ring and open hole rings.
pub fn from_geo_polygon(polygon: &Polygon<f64>) -> (Vec<GpsPoint>, Vec<Vec<GpsPoint>>) {
    let ring = |ls: &LineString<f64>| -> Vec<GpsPoint> {
        let points: Vec<GpsPoint> = ls.0.iter().map(|c| GpsPoint::new(c.y, c.x)).collect();
        normalize_ring(&points)
    };
    let exterior = ring(polygon.exterior());
    let holes = polygon
        .interiors()
        .iter()
        .map(ring)
        .filter(|h| h.len() >= 3)
        .collect();
    (exterior, holes)
}

#[inline]
fn to_coord(p: &GpsPoint) -> Coord<f64> {
    Coord { x: p.longitude, y: p.latitude }
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Check if two bounding boxes overlap, with a buffer in meters.
///
/// Touching boxes count as overlapping.
pub fn bounds_overlap(a: &Bounds, b: &Bounds, buffer_meters: f64) -> bool {
    let buffer_deg = meters_to_degrees(buffer_meters);

    !(a.max_lat + buffer_deg < b.min_lat ||
      b.max_lat + buffer_deg < a.min_lat ||
      a.max_lng + buffer_deg < b.min_lng ||
      b.max_lng + buffer_deg < a.min_lng)
}

/// Compute the vertex centroid of a ring. Returns (0, 0) for empty input.
///
/// Used to anchor region labels on the map; not an area centroid.
pub fn compute_center(points: &[GpsPoint]) -> GpsPoint {
    let points = normalize_ring(points);
    if points.is_empty() {
        return GpsPoint::new(0.0, 0.0);
    }

    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    let n = points.len() as f64;

    GpsPoint::new(sum_lat / n, sum_lng / n)
}

// =============================================================================
// Internal Helpers
// =============================================================================

/// Absolute shoelace area of a coordinate ring, in m².
///
/// Coordinates are taken relative to the first vertex to keep the products small.
fn coords_area(coords: &[Coord<f64>]) -> f64 {
    let n = coords.len();
    if n < 3 {
        return 0.0;
    }

    let origin = coords[0];
    let mut twice_area = 0.0;
    for i in 0..n {
        let a = coords[i];
        let b = coords[(i + 1) % n];
        let (ax, ay) = (a.x - origin.x, a.y - origin.y);
        let (bx, by) = (b.x - origin.x, b.y - origin.y);
        twice_area += ax * by - bx * ay;
    }

    (twice_area / 2.0).abs() * METERS_PER_DEGREE * METERS_PER_DEGREE
}

/// Shoelace area of a ring in squared degrees, positive when counter-clockwise.
fn signed_area(ring: &[GpsPoint]) -> f64 {
    let ring = normalize_ring(ring);
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }

    let origin = ring[0];
    let mut twice_area = 0.0;
    for i in 0..n {
        let a = &ring[i];
        let b = &ring[(i + 1) % n];
        let (ax, ay) = (a.longitude - origin.longitude, a.latitude - origin.latitude);
        let (bx, by) = (b.longitude - origin.longitude, b.latitude - origin.latitude);
        twice_area += ax * by - bx * ay;
    }
    twice_area / 2.0
}

/// Cross product of (b - a) x (c - a), in squared degrees.
#[inline]
fn orientation(a: &GpsPoint, b: &GpsPoint, c: &GpsPoint) -> f64 {
    (b.longitude - a.longitude) * (c.latitude - a.latitude)
        - (b.latitude - a.latitude) * (c.longitude - a.longitude)
}

/// True if `p` lies on the closed segment `a`-`b`.
fn on_segment(a: &GpsPoint, b: &GpsPoint, p: &GpsPoint) -> bool {
    if orientation(a, b, p).abs() > COLLINEAR_EPSILON {
        return false;
    }
    p.longitude >= a.longitude.min(b.longitude)
        && p.longitude <= a.longitude.max(b.longitude)
        && p.latitude >= a.latitude.min(b.latitude)
        && p.latitude <= a.latitude.max(b.latitude)
}

/// True if the closed segments `p1`-`p2` and `q1`-`q2` share any point.
fn segments_touch(p1: &GpsPoint, p2: &GpsPoint, q1: &GpsPoint, q2: &GpsPoint) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    let straddles = |x: f64, y: f64| (x > COLLINEAR_EPSILON && y < -COLLINEAR_EPSILON)
        || (x < -COLLINEAR_EPSILON && y > COLLINEAR_EPSILON);
    if straddles(d1, d2) && straddles(d3, d4) {
        return true;
    }

    on_segment(q1, q2, p1) || on_segment(q1, q2, p2) || on_segment(p1, p2, q1) || on_segment(p1, p2, q2)
}

/// True if the path `before` -> `shared` -> `after` reverses along the same line.
fn doubles_back(before: &GpsPoint, shared: &GpsPoint, after: &GpsPoint) -> bool {
    if orientation(before, shared, after).abs() > COLLINEAR_EPSILON {
        return false;
    }
    let dot = (before.longitude - shared.longitude) * (after.longitude - shared.longitude)
        + (before.latitude - shared.latitude) * (after.latitude - shared.latitude);
    dot > 0.0
}

// =============================================================================
// Unit Tests
// =============================================================================
