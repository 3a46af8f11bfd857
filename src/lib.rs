//! # Route Deviation
//!
//! Off-route detection for GPS ride and route-planning clients.
//!
//! This library provides:
//! - A pure deviation decision: is the rider farther than a threshold from every
//!   waypoint of the planned path?
//! - An indexed planned path that answers the same question without scanning
//!   every waypoint on each location sample
//! - A route monitor that turns a stream of location samples into
//!   "off route" / "back on route" events for the UI layer
//! - Track replay for evaluating recorded rides against a planned path
//!
//! ## Features
//!
//! - **`parallel`** - Evaluate recorded tracks in parallel with rayon
//! - **`stream`** - Async adapters for tokio/futures location streams
//! - **`serde`** - (De)serialize positions and configuration
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use route_deviation::{Position, is_deviated};
//!
//! let path = vec![
//!     Position::new(14.700, 120.983),
//!     Position::new(14.701, 120.984),
//! ];
//!
//! // Standing on the first waypoint
//! assert!(!is_deviated(&Position::new(14.700, 120.983), &path, 50.0));
//!
//! // ~550m north of the path
//! assert!(is_deviated(&Position::new(14.706, 120.983), &path, 50.0));
//! ```

// Geographic helpers (distances, search envelopes)
pub mod geo_utils;
pub use geo_utils::DistanceMethod;

// Pure deviation decision and its configuration
pub mod deviation;
pub use deviation::{
    DeviationCheck, DeviationConfig, DeviationError, NearestWaypoint,
    check_deviation, is_deviated, is_deviated_with, nearest_waypoint,
    DEFAULT_THRESHOLD_METERS,
};

// Planned path with a spatial index
pub mod path;
pub use path::PlannedPath;

// Location sample consumer
pub mod monitor;
pub use monitor::{DeviationEvent, RouteMonitor};

// Recorded track evaluation
pub mod replay;
pub use replay::{OffRouteSpan, SampleVerdict, TrackReport, evaluate_track};

// Async location stream adapters
#[cfg(feature = "stream")]
pub mod stream;

#[cfg(feature = "stream")]
pub use stream::{spawn_monitor, watch};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("RouteDeviationRust")
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A device position (WGS84 latitude and longitude in degrees).
///
/// # Example
/// ```
/// use route_deviation::Position;
/// let here = Position::new(14.700, 120.983); // Manila
/// assert!(here.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    /// Create a new position.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the position has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box of a planned path.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from positions.
    pub fn from_points(points: &[Position]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self { min_lat, max_lat, min_lng, max_lng })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> Position {
        Position::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Check whether a position lies inside the bounds (edges inclusive).
    pub fn contains(&self, p: &Position) -> bool {
        p.latitude >= self.min_lat
            && p.latitude <= self.max_lat
            && p.longitude >= self.min_lng
            && p.longitude <= self.max_lng
    }
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use log::{debug, info, warn};
    use std::fmt;
    use std::sync::{Arc, Mutex};

    /// Error surfaced to Kotlin/Swift when a monitor cannot be built.
    #[derive(Debug, uniffi::Error)]
    pub enum FfiDeviationError {
        Invalid { message: String },
    }

    impl fmt::Display for FfiDeviationError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                FfiDeviationError::Invalid { message } => write!(f, "{}", message),
            }
        }
    }

    impl std::error::Error for FfiDeviationError {}

    impl From<DeviationError> for FfiDeviationError {
        fn from(e: DeviationError) -> Self {
            FfiDeviationError::Invalid { message: e.to_string() }
        }
    }

    /// Nearest waypoint with a u64 index (uniffi has no usize)
    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiNearestWaypoint {
        pub index: u64,
        pub waypoint: Position,
        pub distance_meters: f64,
    }

    impl From<NearestWaypoint> for FfiNearestWaypoint {
        fn from(n: NearestWaypoint) -> Self {
            Self {
                index: n.index as u64,
                waypoint: n.waypoint,
                distance_meters: n.distance_meters,
            }
        }
    }

    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiDeviationCheck {
        pub deviated: bool,
        pub nearest: Option<FfiNearestWaypoint>,
    }

    #[derive(Debug, Clone, uniffi::Enum)]
    pub enum FfiDeviationEvent {
        OffRoute { position: Position, nearest: FfiNearestWaypoint },
        BackOnRoute { position: Position, nearest: FfiNearestWaypoint },
    }

    impl From<DeviationEvent> for FfiDeviationEvent {
        fn from(event: DeviationEvent) -> Self {
            match event {
                DeviationEvent::OffRoute { position, nearest } => {
                    FfiDeviationEvent::OffRoute { position, nearest: nearest.into() }
                }
                DeviationEvent::BackOnRoute { position, nearest } => {
                    FfiDeviationEvent::BackOnRoute { position, nearest: nearest.into() }
                }
            }
        }
    }

    /// Check whether a position is off the planned path.
    /// Invalid input never asserts deviation.
    #[uniffi::export]
    pub fn ffi_is_deviated(current: Position, path: Vec<Position>, threshold_meters: f64) -> bool {
        init_logging();
        is_deviated(&current, &path, threshold_meters)
    }

    /// Checked deviation with nearest waypoint. Returns None on invalid input.
    #[uniffi::export]
    pub fn ffi_check_deviation(
        current: Position,
        path: Vec<Position>,
        config: DeviationConfig,
    ) -> Option<FfiDeviationCheck> {
        init_logging();
        match check_deviation(&current, &path, &config) {
            Ok(check) => Some(FfiDeviationCheck {
                deviated: check.deviated,
                nearest: check.nearest.map(Into::into),
            }),
            Err(e) => {
                warn!("[RouteDeviationRust] check_deviation rejected input: {}", e);
                None
            }
        }
    }

    /// Get default configuration.
    #[uniffi::export]
    pub fn default_deviation_config() -> DeviationConfig {
        init_logging();
        DeviationConfig::default()
    }

    /// Route monitor handle for the mobile location callback.
    #[derive(uniffi::Object)]
    pub struct FfiRouteMonitor {
        inner: Mutex<RouteMonitor>,
    }

    #[uniffi::export]
    impl FfiRouteMonitor {
        #[uniffi::constructor]
        pub fn new(path: Vec<Position>, config: DeviationConfig) -> Result<Arc<Self>, FfiDeviationError> {
            init_logging();
            info!("[RouteDeviationRust] Creating monitor for {} waypoints", path.len());
            let path = PlannedPath::new(path)?;
            let monitor = RouteMonitor::new(path, config)?;
            Ok(Arc::new(Self { inner: Mutex::new(monitor) }))
        }

        /// Feed one location sample; returns an event on route state changes.
        pub fn on_position(&self, position: Position) -> Option<FfiDeviationEvent> {
            let mut monitor = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let event = monitor.on_position(position);
            if let Some(ref e) = event {
                debug!("[RouteDeviationRust] Event: {:?}", e);
            }
            event.map(Into::into)
        }

        pub fn is_off_route(&self) -> bool {
            self.inner.lock().unwrap_or_else(|e| e.into_inner()).is_off_route()
        }

        pub fn reset(&self) {
            self.inner.lock().unwrap_or_else(|e| e.into_inner()).reset();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
