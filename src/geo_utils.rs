//! # Geographic Utilities
//!
//! Distance math shared by the deviation decision, the indexed path and track replay.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two positions |
//! | [`equirectangular_distance`] | Planar approximation for small deltas |
//! | [`polyline_length`] | Total length of a path in meters |
//! | [`search_envelope`] | Lat/lng box guaranteed to contain every point within a radius |
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! The haversine formula calculates the great-circle distance between two points on a sphere.
//! It's the standard method for GPS distance calculation, accurate to within 0.3% for most
//! practical applications.
//!
//! Reference: [Haversine formula (Wikipedia)](https://en.wikipedia.org/wiki/Haversine_formula)
//!
//! ### Equirectangular Approximation
//!
//! Projects both points onto a plane tangent at their mean latitude:
//! `x = Δλ·cos(φm)·R`, `y = Δφ·R`. Cheaper than haversine (one cosine, no arcsine) and
//! within a fraction of a meter of it at the 50-500m scale of reroute thresholds. It grows
//! wrong over long distances and near the poles.
//!
//! Both methods use the same sphere radius ([`EARTH_RADIUS_METERS`]) so a position on the
//! margin of the threshold only flips when the two formulas genuinely disagree.

use geo::{Distance, Haversine, Point};
use rstar::AABB;

use crate::Position;

/// Mean earth radius in meters (IUGG), the radius `geo`'s haversine uses.
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Relative slack added to search envelopes to absorb floating point error.
const ENVELOPE_SLACK: f64 = 1.001;

/// Absolute padding in degrees so a zero-radius envelope still holds points an ulp away.
const ENVELOPE_PAD_DEG: f64 = 1e-9;

// =============================================================================
// Distance Functions
// =============================================================================

/// How distances between a position and a waypoint are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DistanceMethod {
    /// Great-circle distance on a sphere. Exact for the spherical model.
    #[default]
    Haversine,
    /// Planar approximation at the mean latitude. Only meaningful for small deltas.
    Equirectangular,
}

impl DistanceMethod {
    /// Distance in meters between two positions.
    #[inline]
    pub fn distance(&self, p1: &Position, p2: &Position) -> f64 {
        match self {
            DistanceMethod::Haversine => haversine_distance(p1, p2),
            DistanceMethod::Equirectangular => equirectangular_distance(p1, p2),
        }
    }
}

/// Calculate the great-circle distance between two positions using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface (assuming a spherical Earth
/// with radius [`EARTH_RADIUS_METERS`]).
///
/// # Arguments
///
/// * `p1` - First position
/// * `p2` - Second position
///
/// # Returns
///
/// Distance in meters between the two positions.
///
/// # Example
///
/// ```rust
/// use route_deviation::{Position, geo_utils};
///
/// let a = Position::new(14.700, 120.983);
/// let b = Position::new(14.705, 120.983);
///
/// let distance = geo_utils::haversine_distance(&a, &b);
/// assert!((distance - 556.0).abs() < 1.0);
/// ```
///
/// # Performance
///
/// O(1) with several trigonometric calls. On every location sample this runs once per
/// candidate waypoint, which is why [`crate::PlannedPath`] narrows candidates first.
#[inline]
pub fn haversine_distance(p1: &Position, p2: &Position) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Calculate the equirectangular (flat-earth) distance between two positions in meters.
///
/// The longitude delta is wrapped into [-180°, 180°] so points on either side of the
/// antimeridian stay close. Deltas are taken in degrees before converting, so two
/// distinct coordinates never collapse to a zero distance through radian rounding.
///
/// # Arguments
///
/// * `p1` - First position
/// * `p2` - Second position
///
/// # Returns
///
/// Approximate distance in meters. Within a fraction of a meter of
/// [`haversine_distance`] below a few kilometers.
#[inline]
pub fn equirectangular_distance(p1: &Position, p2: &Position) -> f64 {
    let mut d_lng_deg = p2.longitude - p1.longitude;
    if d_lng_deg > 180.0 {
        d_lng_deg -= 360.0;
    } else if d_lng_deg < -180.0 {
        d_lng_deg += 360.0;
    }

    let mean_lat = ((p1.latitude + p2.latitude) / 2.0).to_radians();
    let x = d_lng_deg.to_radians() * mean_lat.cos();
    let y = (p2.latitude - p1.latitude).to_radians();
    (x * x + y * y).sqrt() * EARTH_RADIUS_METERS
}

/// Calculate the total length of a polyline in meters.
///
/// Sums the haversine distance between consecutive points. Empty or single-point
/// paths return 0.0.
pub fn polyline_length(points: &[Position]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Spatial Search
// =============================================================================

/// Compute a `[lat, lng]` envelope containing every position within `radius_meters`
/// of `center`, for either distance method.
///
/// Latitude spans `±δ` with `δ = radius / R`. Longitude spans the larger of the
/// great-circle bound `asin(sin δ / cos φ)` and the equirectangular bound
/// `δ / cos(|φ| + δ)`. Both spans get a relative slack plus an absolute pad of
/// `1e-9°`, so even a zero radius keeps waypoints that measure as zero distance.
///
/// # Arguments
///
/// * `center` - Query position
/// * `radius_meters` - Search radius, finite and non-negative
///
/// # Returns
///
/// The envelope in `[lat, lng]` order, matching the R-tree in [`crate::PlannedPath`].
/// Returns `None` for invalid input, and when the circle reaches a pole or crosses the
/// antimeridian; callers fall back to a linear scan in that case.
///
/// # Performance
///
/// O(1). A handful of trigonometric calls, no allocation.
pub fn search_envelope(center: &Position, radius_meters: f64) -> Option<AABB<[f64; 2]>> {
    if !center.is_valid() || !radius_meters.is_finite() || radius_meters < 0.0 {
        return None;
    }

    let delta = radius_meters / EARTH_RADIUS_METERS * ENVELOPE_SLACK;
    let lat = center.latitude.to_radians();
    let half_pi = std::f64::consts::FRAC_PI_2;

    if lat.abs() + delta >= half_pi {
        return None;
    }

    let great_circle = (delta.sin() / lat.cos()).asin();
    let planar = delta / (lat.abs() + delta).cos();
    let d_lng = great_circle.max(planar) * ENVELOPE_SLACK;

    let d_lat_deg = delta.to_degrees() + ENVELOPE_PAD_DEG;
    let d_lng_deg = d_lng.to_degrees() + ENVELOPE_PAD_DEG;

    let min_lng = center.longitude - d_lng_deg;
    let max_lng = center.longitude + d_lng_deg;
    if min_lng < -180.0 || max_lng > 180.0 {
        return None;
    }

    Some(AABB::from_corners(
        [center.latitude - d_lat_deg, min_lng],
        [center.latitude + d_lat_deg, max_lng],
    ))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstar::Envelope;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = Position::new(14.700, 120.983);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // 0.005 degrees of latitude is ~556m
        let a = Position::new(14.700, 120.983);
        let b = Position::new(14.705, 120.983);
        assert!(approx_eq(haversine_distance(&a, &b), 555.97, 1.0));
    }

    #[test]
    fn test_haversine_long_distance() {
        // London to Paris is approximately 344 km
        let london = Position::new(51.5074, -0.1278);
        let paris = Position::new(48.8566, 2.3522);
        assert!(approx_eq(haversine_distance(&london, &paris), 343_560.0, 5000.0));
    }

    #[test]
    fn test_equirectangular_matches_haversine_at_small_scale() {
        let a = Position::new(14.700, 120.983);
        let b = Position::new(14.7012, 120.9841);
        let h = haversine_distance(&a, &b);
        let e = equirectangular_distance(&a, &b);
        assert!(approx_eq(h, e, 0.01), "haversine {} vs equirectangular {}", h, e);
    }

    #[test]
    fn test_equirectangular_wraps_antimeridian() {
        let a = Position::new(0.0, 179.9995);
        let b = Position::new(0.0, -179.9995);
        let d = equirectangular_distance(&a, &b);
        assert!(approx_eq(d, haversine_distance(&a, &b), 0.01));
        assert!(d < 200.0);
    }

    #[test]
    fn test_distance_method_dispatch() {
        let a = Position::new(14.700, 120.983);
        let b = Position::new(14.705, 120.983);
        assert_eq!(DistanceMethod::Haversine.distance(&a, &b), haversine_distance(&a, &b));
        assert_eq!(
            DistanceMethod::Equirectangular.distance(&a, &b),
            equirectangular_distance(&a, &b)
        );
        assert_eq!(DistanceMethod::default(), DistanceMethod::Haversine);
    }

    #[test]
    fn test_polyline_length() {
        assert_eq!(polyline_length(&[]), 0.0);
        assert_eq!(polyline_length(&[Position::new(14.7, 120.983)]), 0.0);

        let path = vec![
            Position::new(14.700, 120.983),
            Position::new(14.705, 120.983),
            Position::new(14.710, 120.983),
        ];
        assert!(approx_eq(polyline_length(&path), 1111.9, 2.0));
    }

    #[test]
    fn test_search_envelope_contains_circle() {
        let center = Position::new(51.5, -0.12);
        let envelope = search_envelope(&center, 500.0).unwrap();

        // Sample points just inside the radius in every direction
        for step in 0..36 {
            let bearing = (step as f64 * 10.0).to_radians();
            let d = 499.0 / EARTH_RADIUS_METERS;
            let lat = center.latitude + (d * bearing.cos()).to_degrees();
            let lng = center.longitude
                + (d * bearing.sin() / center.latitude.to_radians().cos()).to_degrees();
            let p = Position::new(lat, lng);
            if haversine_distance(&center, &p) <= 500.0 {
                assert!(envelope.contains_point(&[p.latitude, p.longitude]));
            }
        }
    }

    #[test]
    fn test_search_envelope_edge_cases() {
        assert!(search_envelope(&Position::new(89.9999, 0.0), 500.0).is_none());
        assert!(search_envelope(&Position::new(0.0, 179.9999), 500.0).is_none());
        assert!(search_envelope(&Position::new(f64::NAN, 0.0), 500.0).is_none());
        assert!(search_envelope(&Position::new(0.0, 0.0), -1.0).is_none());
        assert!(search_envelope(&Position::new(0.0, 0.0), 0.0).is_some());
    }

    #[test]
    fn test_one_ulp_apart_is_nonzero() {
        let waypoint = Position::new(14.60, 120.98);
        let nudged_lat = Position::new(14.595 + 2.0 * 0.0025, 120.98);
        let nudged_lng = Position::new(14.60, f64::from_bits(120.98f64.to_bits() + 1));
        assert_ne!(nudged_lat.latitude, waypoint.latitude);

        for method in [DistanceMethod::Haversine, DistanceMethod::Equirectangular] {
            assert_eq!(method.distance(&waypoint, &waypoint), 0.0);
            assert!(method.distance(&waypoint, &nudged_lat) > 0.0, "{:?}", method);
        }
        assert!(equirectangular_distance(&waypoint, &nudged_lng) > 0.0);
    }

    #[test]
    fn test_zero_radius_envelope_keeps_neighbouring_ulps() {
        let center = Position::new(14.595 + 2.0 * 0.0025, 120.98);
        let envelope = search_envelope(&center, 0.0).unwrap();

        assert!(envelope.contains_point(&[center.latitude, center.longitude]));
        assert!(envelope.contains_point(&[14.60, 120.98]));
        assert!(!envelope.contains_point(&[14.6001, 120.98]));
    }

    #[test]
    fn test_search_envelope_near_pole() {
        // 500m at 89.9° stays clear of the pole but needs a wide longitude span
        let center = Position::new(89.9, 10.0);
        let envelope = search_envelope(&center, 500.0).unwrap();
        let lower = envelope.lower();
        let upper = envelope.upper();
        assert!(upper[0] < 90.0);
        assert!(upper[1] - lower[1] > 5.0);

        assert!(search_envelope(&Position::new(89.999, 10.0), 500.0).is_none());
    }
}
