//! # Deviation Decision
//!
//! The off-route decision for a single location sample:
//! a position is deviated iff its distance to the *nearest waypoint* of the planned path
//! is strictly greater than the threshold.
//!
//! The decision is a pure function of (position, path, threshold). There is no state
//! carried between calls, so samples may be evaluated in any order or in parallel.
//!
//! Two entry points with different failure behavior:
//!
//! - [`is_deviated`] / [`is_deviated_with`] are safe to call straight from a location
//!   callback. Invalid input never asserts deviation; it returns `false` and logs.
//! - [`check_deviation`] fails fast with a [`DeviationError`] and reports the nearest
//!   waypoint alongside the decision.

use std::fmt;

use log::{debug, warn};

use crate::geo_utils::DistanceMethod;
use crate::Position;

/// Default deviation threshold in meters.
pub const DEFAULT_THRESHOLD_METERS: f64 = 50.0;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for deviation detection.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeviationConfig {
    /// Maximum allowed distance from the nearest waypoint before the rider is off route.
    /// Default: 50.0 meters
    pub threshold_meters: f64,

    /// Distance formula used for every waypoint comparison.
    /// Default: Haversine
    pub distance_method: DistanceMethod,

    /// Consecutive off-route samples required before a reroute is recommended.
    /// Absorbs single GPS spikes. Values below 1 are treated as 1.
    /// Default: 1
    pub confirm_samples: u32,
}

impl Default for DeviationConfig {
    fn default() -> Self {
        Self {
            threshold_meters: DEFAULT_THRESHOLD_METERS,
            distance_method: DistanceMethod::Haversine,
            confirm_samples: 1,
        }
    }
}

impl DeviationConfig {
    /// Config with a custom threshold and defaults elsewhere.
    pub fn with_threshold(threshold_meters: f64) -> Self {
        Self { threshold_meters, ..Self::default() }
    }

    /// Reject thresholds that are negative, NaN or infinite.
    pub fn validate(&self) -> Result<(), DeviationError> {
        if threshold_is_valid(self.threshold_meters) {
            Ok(())
        } else {
            Err(DeviationError::InvalidThreshold(self.threshold_meters))
        }
    }

    /// Load a config from JSON. Missing fields fall back to their defaults.
    ///
    /// ```
    /// use route_deviation::{DeviationConfig, DistanceMethod};
    ///
    /// let config = DeviationConfig::from_json(r#"{"threshold_meters": 75.0}"#).unwrap();
    /// assert_eq!(config.threshold_meters, 75.0);
    /// assert_eq!(config.distance_method, DistanceMethod::Haversine);
    /// ```
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, DeviationError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DeviationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn required_samples(&self) -> u32 {
        self.confirm_samples.max(1)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Input validation failures.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviationError {
    /// The current position has NaN or out-of-range coordinates.
    InvalidPosition { latitude: f64, longitude: f64 },
    /// A waypoint of the planned path has NaN or out-of-range coordinates.
    InvalidWaypoint { index: usize, latitude: f64, longitude: f64 },
    /// Threshold is negative, NaN or infinite.
    InvalidThreshold(f64),
    /// Config could not be parsed.
    InvalidConfig(String),
}

impl fmt::Display for DeviationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviationError::InvalidPosition { latitude, longitude } => {
                write!(f, "invalid position ({}, {})", latitude, longitude)
            }
            DeviationError::InvalidWaypoint { index, latitude, longitude } => {
                write!(f, "invalid waypoint #{} ({}, {})", index, latitude, longitude)
            }
            DeviationError::InvalidThreshold(t) => {
                write!(f, "invalid deviation threshold {}m", t)
            }
            DeviationError::InvalidConfig(msg) => write!(f, "invalid deviation config: {}", msg),
        }
    }
}

impl std::error::Error for DeviationError {}

impl DeviationError {
    pub(crate) fn invalid_position(p: &Position) -> Self {
        DeviationError::InvalidPosition { latitude: p.latitude, longitude: p.longitude }
    }
}

// ============================================================================
// Results
// ============================================================================

/// The waypoint closest to a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestWaypoint {
    /// Index of the waypoint in the planned path
    pub index: usize,
    /// The waypoint itself
    pub waypoint: Position,
    /// Distance from the position to the waypoint in meters
    pub distance_meters: f64,
}

/// Result of a checked deviation test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviationCheck {
    /// True iff the nearest waypoint is farther than the threshold
    pub deviated: bool,
    /// Nearest waypoint, `None` for an empty path
    pub nearest: Option<NearestWaypoint>,
}

impl DeviationCheck {
    pub(crate) fn from_nearest(nearest: Option<NearestWaypoint>, threshold_meters: f64) -> Self {
        Self {
            deviated: nearest.is_some_and(|n| n.distance_meters > threshold_meters),
            nearest,
        }
    }
}

// ============================================================================
// Core Functions
// ============================================================================

/// Check whether `current` has strayed more than `threshold_meters` from every waypoint
/// of `path`, using haversine distance.
///
/// Returns `false` for an empty path, and for invalid input (bad position, bad threshold,
/// or a path with no valid waypoint). Invalid waypoints are skipped.
///
/// # Example
/// ```
/// use route_deviation::{Position, is_deviated};
///
/// let path = vec![Position::new(14.700, 120.983)];
///
/// assert!(!is_deviated(&Position::new(14.700, 120.983), &path, 50.0));
/// assert!(is_deviated(&Position::new(14.705, 120.983), &path, 50.0));
/// assert!(!is_deviated(&Position::new(14.705, 120.983), &[], 50.0));
/// ```
pub fn is_deviated(current: &Position, path: &[Position], threshold_meters: f64) -> bool {
    is_deviated_with(current, path, threshold_meters, DistanceMethod::Haversine)
}

/// [`is_deviated`] with an explicit distance method.
pub fn is_deviated_with(
    current: &Position,
    path: &[Position],
    threshold_meters: f64,
    method: DistanceMethod,
) -> bool {
    if !current.is_valid() {
        warn!(
            "[Deviation] Ignoring invalid position ({}, {})",
            current.latitude, current.longitude
        );
        return false;
    }
    if !threshold_is_valid(threshold_meters) {
        warn!("[Deviation] Ignoring invalid threshold {}m", threshold_meters);
        return false;
    }

    let mut any_valid = false;
    let mut skipped = 0usize;
    for waypoint in path {
        if !waypoint.is_valid() {
            skipped += 1;
            continue;
        }
        any_valid = true;
        // Any waypoint within range settles it
        if method.distance(current, waypoint) <= threshold_meters {
            return false;
        }
    }

    if skipped > 0 {
        debug!("[Deviation] Skipped {} invalid waypoints of {}", skipped, path.len());
    }

    any_valid
}

/// Find the waypoint nearest to `current`.
///
/// Invalid waypoints are skipped. Ties resolve to the lowest index. Returns `None` when
/// `current` is invalid or the path has no valid waypoint.
pub fn nearest_waypoint(
    current: &Position,
    path: &[Position],
    method: DistanceMethod,
) -> Option<NearestWaypoint> {
    if !current.is_valid() {
        return None;
    }

    let mut best: Option<NearestWaypoint> = None;
    for (index, waypoint) in path.iter().enumerate() {
        if !waypoint.is_valid() {
            continue;
        }
        let distance_meters = method.distance(current, waypoint);
        if best.map_or(true, |b| distance_meters < b.distance_meters) {
            best = Some(NearestWaypoint { index, waypoint: *waypoint, distance_meters });
        }
    }
    best
}

/// Checked deviation test: validates every input, then reports the decision together with
/// the nearest waypoint.
///
/// # Example
/// ```
/// use route_deviation::{DeviationConfig, DeviationError, Position, check_deviation};
///
/// let path = vec![Position::new(14.700, 120.983), Position::new(14.701, 120.983)];
/// let config = DeviationConfig::default();
///
/// let check = check_deviation(&Position::new(14.705, 120.983), &path, &config).unwrap();
/// assert!(check.deviated);
/// assert_eq!(check.nearest.unwrap().index, 1);
///
/// let err = check_deviation(&Position::new(f64::NAN, 0.0), &path, &config);
/// assert!(matches!(err, Err(DeviationError::InvalidPosition { .. })));
/// ```
pub fn check_deviation(
    current: &Position,
    path: &[Position],
    config: &DeviationConfig,
) -> Result<DeviationCheck, DeviationError> {
    config.validate()?;
    if !current.is_valid() {
        return Err(DeviationError::invalid_position(current));
    }
    validate_waypoints(path)?;

    let nearest = nearest_waypoint(current, path, config.distance_method);
    Ok(DeviationCheck::from_nearest(nearest, config.threshold_meters))
}

// ============================================================================
// Helpers
// ============================================================================

pub(crate) fn threshold_is_valid(threshold_meters: f64) -> bool {
    threshold_meters.is_finite() && threshold_meters >= 0.0
}

pub(crate) fn validate_waypoints(path: &[Position]) -> Result<(), DeviationError> {
    match path.iter().position(|p| !p.is_valid()) {
        Some(index) => Err(DeviationError::InvalidWaypoint {
            index,
            latitude: path[index].latitude,
            longitude: path[index].longitude,
        }),
        None => Ok(()),
    }
}

// ============================================================================
// Tests
// ============================================================================
