//! Planned path with an R-tree over its waypoints.
//!
//! Long planned paths (thousands of waypoints for a cross-city ride) are queried on every
//! location sample. Instead of measuring the distance to every waypoint, candidates are
//! pulled from an R-tree using a lat/lng envelope that provably contains every waypoint
//! within the query radius, and only those are measured exactly.
//!
//! Decisions are identical to the linear [`crate::is_deviated_with`] for every input.

use std::fmt;

use log::debug;
use rstar::{RTree, RTreeObject, AABB};

use crate::deviation::{self, DeviationCheck, DeviationConfig, DeviationError, NearestWaypoint};
use crate::geo_utils::{self, DistanceMethod};
use crate::{Bounds, Position};

/// Starting radius for nearest-waypoint searches.
const INITIAL_SEARCH_RADIUS_METERS: f64 = 250.0;

/// Past this radius the index stops expanding and scans linearly.
const MAX_SEARCH_RADIUS_METERS: f64 = 64_000.0;

/// A waypoint with its index for R-tree queries
#[derive(Debug, Clone, Copy)]
struct IndexedWaypoint {
    idx: usize,
    lat: f64,
    lng: f64,
}

impl RTreeObject for IndexedWaypoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lng])
    }
}

/// An immutable planned path.
///
/// # Example
/// ```
/// use route_deviation::{DistanceMethod, PlannedPath, Position};
///
/// let path = PlannedPath::new(vec![
///     Position::new(14.700, 120.983),
///     Position::new(14.701, 120.984),
/// ]).unwrap();
///
/// assert!(!path.is_deviated(&Position::new(14.7001, 120.983), 50.0, DistanceMethod::Haversine));
/// assert!(path.is_deviated(&Position::new(14.710, 120.983), 50.0, DistanceMethod::Haversine));
/// ```
#[derive(Clone)]
pub struct PlannedPath {
    points: Vec<Position>,
    tree: RTree<IndexedWaypoint>,
    bounds: Option<Bounds>,
    length_meters: f64,
}

impl PlannedPath {
    /// Build a planned path. Every waypoint must be valid; an empty path is allowed.
    ///
    /// # Arguments
    ///
    /// * `points` - Waypoints in route order
    ///
    /// # Returns
    ///
    /// The indexed path, or [`DeviationError::InvalidWaypoint`] naming the first
    /// waypoint with a non-finite or out-of-range coordinate.
    ///
    /// # Performance
    ///
    /// O(n log n) to bulk-load the R-tree, plus one pass for bounds and length. Build once
    /// per route and share it across samples.
    pub fn new(points: Vec<Position>) -> Result<Self, DeviationError> {
        deviation::validate_waypoints(&points)?;

        let indexed: Vec<IndexedWaypoint> = points
            .iter()
            .enumerate()
            .map(|(i, p)| IndexedWaypoint { idx: i, lat: p.latitude, lng: p.longitude })
            .collect();
        let tree = RTree::bulk_load(indexed);
        let bounds = Bounds::from_points(&points);
        let length_meters = geo_utils::polyline_length(&points);

        debug!(
            "[PlannedPath] Indexed {} waypoints, {:.0}m",
            points.len(),
            length_meters
        );

        Ok(Self { points, tree, bounds, length_meters })
    }

    /// Number of waypoints.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the path has no waypoints. An empty path never reports a deviation.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Waypoints in route order.
    pub fn points(&self) -> &[Position] {
        &self.points
    }

    /// Bounding box, `None` for an empty path.
    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    /// Total length along the waypoints in meters.
    pub fn length_meters(&self) -> f64 {
        self.length_meters
    }

    /// Find the waypoint nearest to `current`. Ties resolve to the lowest index.
    ///
    /// Searches an expanding envelope until it contains a waypoint, then measures every
    /// waypoint inside the envelope of the best distance found so far. Anything nearer must
    /// lie inside that envelope, so the result is exact.
    pub fn nearest_waypoint(&self, current: &Position, method: DistanceMethod) -> Option<NearestWaypoint> {
        if self.is_empty() || !current.is_valid() {
            return None;
        }

        let mut radius = INITIAL_SEARCH_RADIUS_METERS;
        while radius <= MAX_SEARCH_RADIUS_METERS {
            let envelope = match geo_utils::search_envelope(current, radius) {
                Some(envelope) => envelope,
                None => break,
            };

            if let Some(candidate) = self.nearest_in(&envelope, current, method) {
                // Re-query with the candidate's distance so nothing outside the first box is missed
                let exact = geo_utils::search_envelope(current, candidate.distance_meters)
                    .and_then(|envelope| self.nearest_in(&envelope, current, method));
                return match exact {
                    Some(best) => Some(best),
                    None => deviation::nearest_waypoint(current, &self.points, method),
                };
            }
            radius *= 4.0;
        }

        deviation::nearest_waypoint(current, &self.points, method)
    }

    /// Check whether `current` is farther than `threshold_meters` from every waypoint.
    ///
    /// Same semantics as [`crate::is_deviated_with`]: empty path and invalid input
    /// return `false`.
    pub fn is_deviated(&self, current: &Position, threshold_meters: f64, method: DistanceMethod) -> bool {
        if self.is_empty() || !current.is_valid() || !deviation::threshold_is_valid(threshold_meters) {
            return deviation::is_deviated_with(current, &self.points, threshold_meters, method);
        }

        match geo_utils::search_envelope(current, threshold_meters) {
            Some(envelope) => !self
                .tree
                .locate_in_envelope(&envelope)
                .any(|w| method.distance(current, &self.points[w.idx]) <= threshold_meters),
            None => deviation::is_deviated_with(current, &self.points, threshold_meters, method),
        }
    }

    /// Checked deviation test against this path.
    pub fn check(&self, current: &Position, config: &DeviationConfig) -> Result<DeviationCheck, DeviationError> {
        config.validate()?;
        if !current.is_valid() {
            return Err(DeviationError::invalid_position(current));
        }
        let nearest = self.nearest_waypoint(current, config.distance_method);
        Ok(DeviationCheck::from_nearest(nearest, config.threshold_meters))
    }

    fn nearest_in(
        &self,
        envelope: &AABB<[f64; 2]>,
        current: &Position,
        method: DistanceMethod,
    ) -> Option<NearestWaypoint> {
        let mut best: Option<NearestWaypoint> = None;
        for w in self.tree.locate_in_envelope(envelope) {
            let waypoint = self.points[w.idx];
            let distance_meters = method.distance(current, &waypoint);
            let better = match best {
                None => true,
                Some(b) => {
                    distance_meters < b.distance_meters
                        || (distance_meters == b.distance_meters && w.idx < b.index)
                }
            };
            if better {
                best = Some(NearestWaypoint { index: w.idx, waypoint, distance_meters });
            }
        }
        best
    }
}

impl fmt::Debug for PlannedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlannedPath")
            .field("waypoints", &self.points.len())
            .field("bounds", &self.bounds)
            .field("length_meters", &self.length_meters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A winding ~10km path with a waypoint every ~20m
    fn long_path() -> Vec<Position> {
        (0..500)
            .map(|i| {
                let t = i as f64;
                Position::new(14.60 + t * 0.00018, 120.98 + (t / 40.0).sin() * 0.004)
            })
            .collect()
    }

    fn samples() -> Vec<Position> {
        let mut samples = Vec::new();
        for i in 0..40 {
            for j in 0..5 {
                samples.push(Position::new(
                    14.595 + i as f64 * 0.0025,
                    120.970 + j as f64 * 0.005,
                ));
            }
        }
        samples
    }

    const METHODS: [DistanceMethod; 2] = [DistanceMethod::Haversine, DistanceMethod::Equirectangular];

    fn next_up(x: f64) -> f64 {
        f64::from_bits(x.to_bits() + 1)
    }

    #[test]
    fn test_rejects_invalid_waypoints() {
        let err = PlannedPath::new(vec![Position::new(14.7, 120.9), Position::new(f64::NAN, 0.0)])
            .unwrap_err();
        assert!(matches!(err, DeviationError::InvalidWaypoint { index: 1, .. }));
    }

    #[test]
    fn test_empty_path() {
        let path = PlannedPath::new(vec![]).unwrap();
        assert!(path.is_empty());
        assert!(path.bounds().is_none());
        assert_eq!(path.length_meters(), 0.0);
        let p = Position::new(14.7, 120.983);
        assert!(!path.is_deviated(&p, 50.0, DistanceMethod::Haversine));
        assert!(path.nearest_waypoint(&p, DistanceMethod::Haversine).is_none());
    }

    #[test]
    fn test_indexed_matches_linear_decision() {
        let points = long_path();
        let path = PlannedPath::new(points.clone()).unwrap();

        for method in METHODS {
            for sample in samples() {
                for threshold in [0.0, 25.0, 50.0, 200.0, 1000.0] {
                    assert_eq!(
                        path.is_deviated(&sample, threshold, method),
                        crate::is_deviated_with(&sample, &points, threshold, method),
                        "sample {:?} threshold {} {:?}",
                        sample,
                        threshold,
                        method
                    );
                }
            }
        }
    }

    #[test]
    fn test_indexed_matches_linear_nearest() {
        let points = long_path();
        let path = PlannedPath::new(points.clone()).unwrap();

        for method in METHODS {
            for sample in samples() {
                let indexed = path.nearest_waypoint(&sample, method).unwrap();
                let linear = deviation::nearest_waypoint(&sample, &points, method).unwrap();
                assert_eq!(indexed.index, linear.index, "sample {:?} {:?}", sample, method);
                assert_eq!(indexed.distance_meters, linear.distance_meters);
            }
        }
    }

    #[test]
    fn test_zero_threshold_on_and_beside_a_waypoint() {
        let points = long_path();
        let path = PlannedPath::new(points.clone()).unwrap();

        // 14.595 + 2 * 0.0025 lands one ulp above the first waypoint's latitude
        let rounded = Position::new(14.595 + 2.0 * 0.0025, 120.98);
        let beside_lat = Position::new(next_up(points[0].latitude), points[0].longitude);
        let beside_lng = Position::new(points[300].latitude, next_up(points[300].longitude));

        for method in METHODS {
            assert!(!path.is_deviated(&points[0], 0.0, method));
            assert!(!path.is_deviated(&points[300], 0.0, method));

            for current in [rounded, beside_lat, beside_lng] {
                for threshold in [0.0, 1e-12] {
                    assert_eq!(
                        path.is_deviated(&current, threshold, method),
                        crate::is_deviated_with(&current, &points, threshold, method),
                        "{:?} threshold {} {:?}",
                        current,
                        threshold,
                        method
                    );
                }
                assert!(path.is_deviated(&current, 0.0, method));
                assert!(!path.is_deviated(&current, 1e-6, method));
            }
        }
    }

    #[test]
    fn test_nearest_tie_picks_lowest_index() {
        // The route doubles back over the same waypoint at indices 2 and 6
        let shared = Position::new(14.7010, 120.9830);
        let points = vec![
            Position::new(14.7000, 120.9830),
            Position::new(14.7005, 120.9830),
            shared,
            Position::new(14.7015, 120.9835),
            Position::new(14.7020, 120.9840),
            Position::new(14.7015, 120.9835),
            shared,
            Position::new(14.7005, 120.9830),
        ];
        let path = PlannedPath::new(points.clone()).unwrap();

        for method in METHODS {
            // Directly on the shared waypoint, and off to the side so the re-query radius is not zero
            for current in [shared, Position::new(14.7010, 120.9790)] {
                let indexed = path.nearest_waypoint(&current, method).unwrap();
                let linear = deviation::nearest_waypoint(&current, &points, method).unwrap();
                assert_eq!(indexed.index, 2, "{:?} {:?}", current, method);
                assert_eq!(indexed.index, linear.index);
                assert_eq!(indexed.distance_meters, linear.distance_meters);
            }

            // Indices 3 and 5 also coincide
            let near_turn = Position::new(14.7016, 120.9836);
            let indexed = path.nearest_waypoint(&near_turn, method).unwrap();
            assert_eq!(indexed.index, 3);
        }
    }

    #[test]
    fn test_near_pole_matches_linear() {
        // Waypoints ~11km from the north pole; some queries reach the pole and fall back
        let points: Vec<Position> = (0..30)
            .map(|i| Position::new(89.9 + i as f64 * 0.003, 10.0 + i as f64 * 0.8))
            .collect();
        let path = PlannedPath::new(points.clone()).unwrap();

        assert!(geo_utils::search_envelope(&points[0], 500.0).is_some());
        assert!(geo_utils::search_envelope(&Position::new(89.994, 10.0), 500.0).is_none());

        for method in METHODS {
            for i in 0..12 {
                for j in 0..8 {
                    let current = Position::new(89.895 + i as f64 * 0.009, 5.0 + j as f64 * 4.0);
                    assert_eq!(
                        path.is_deviated(&current, 500.0, method),
                        crate::is_deviated_with(&current, &points, 500.0, method),
                        "{:?} {:?}",
                        current,
                        method
                    );
                    let indexed = path.nearest_waypoint(&current, method).unwrap();
                    let linear = deviation::nearest_waypoint(&current, &points, method).unwrap();
                    assert_eq!(indexed.index, linear.index, "{:?} {:?}", current, method);
                }
            }
        }
    }

    #[test]
    fn test_nearest_far_away_falls_back() {
        let path = PlannedPath::new(long_path()).unwrap();
        // Hundreds of km away, beyond the expanding search
        let nearest = path
            .nearest_waypoint(&Position::new(10.0, 124.0), DistanceMethod::Haversine)
            .unwrap();
        assert!(nearest.distance_meters > 400_000.0);
    }

    #[test]
    fn test_antimeridian_path() {
        let points = vec![
            Position::new(-16.80, 179.9995),
            Position::new(-16.80, -179.9995),
        ];
        let path = PlannedPath::new(points.clone()).unwrap();
        let current = Position::new(-16.80, 180.0);
        assert!(!path.is_deviated(&current, 100.0, DistanceMethod::Haversine));
        assert_eq!(
            path.is_deviated(&current, 10.0, DistanceMethod::Haversine),
            crate::is_deviated(&current, &points, 10.0)
        );
    }

    #[test]
    fn test_check_against_path() {
        let path = PlannedPath::new(long_path()).unwrap();
        let config = DeviationConfig::default();

        let on = path.check(&path.points()[100], &config).unwrap();
        assert!(!on.deviated);
        assert_eq!(on.nearest.unwrap().index, 100);
        assert_eq!(on.nearest.unwrap().distance_meters, 0.0);

        let off = path.check(&Position::new(14.65, 121.10), &config).unwrap();
        assert!(off.deviated);

        assert!(path.check(&Position::new(f64::NAN, 0.0), &config).is_err());
        assert!(path.check(&path.points()[0], &DeviationConfig::with_threshold(-1.0)).is_err());
    }

    #[test]
    fn test_path_metadata() {
        let points = long_path();
        let path = PlannedPath::new(points.clone()).unwrap();
        assert_eq!(path.len(), 500);
        assert_eq!(path.points(), points.as_slice());
        assert!(path.length_meters() > 9_000.0);
        let bounds = path.bounds().unwrap();
        assert!(bounds.contains(&points[250]));
    }
}
