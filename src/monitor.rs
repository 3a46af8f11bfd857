//! Route monitor: consumes location samples and tells the UI when to prompt a reroute.
//!
//! Each sample goes through the pure deviation decision. The monitor only adds
//! edge detection on top of it:
//!
//! - `OffRoute` fires once, when `confirm_samples` consecutive samples are off route
//! - `BackOnRoute` fires once, on the first on-route sample after an `OffRoute`
//!
//! Invalid samples (NaN, out of range) are logged and dropped without touching state.

use log::{debug, info, warn};

use crate::deviation::{DeviationConfig, DeviationError, NearestWaypoint};
use crate::path::PlannedPath;
use crate::Position;

/// Route state change reported to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviationEvent {
    /// The rider left the planned path; show the reroute prompt.
    OffRoute { position: Position, nearest: NearestWaypoint },
    /// The rider rejoined the planned path; dismiss the prompt.
    BackOnRoute { position: Position, nearest: NearestWaypoint },
}

impl DeviationEvent {
    pub fn position(&self) -> Position {
        match self {
            DeviationEvent::OffRoute { position, .. } | DeviationEvent::BackOnRoute { position, .. } => *position,
        }
    }

    pub fn nearest(&self) -> NearestWaypoint {
        match self {
            DeviationEvent::OffRoute { nearest, .. } | DeviationEvent::BackOnRoute { nearest, .. } => *nearest,
        }
    }

    pub fn is_off_route(&self) -> bool {
        matches!(self, DeviationEvent::OffRoute { .. })
    }
}

/// Consumer of a location-update stream for one planned route.
///
/// Path and config are handed in at construction; the monitor reads nothing global.
///
/// # Example
/// ```
/// use route_deviation::{DeviationConfig, DeviationEvent, PlannedPath, Position, RouteMonitor};
///
/// let path = PlannedPath::new(vec![Position::new(14.700, 120.983)]).unwrap();
/// let mut monitor = RouteMonitor::new(path, DeviationConfig::default()).unwrap();
///
/// assert_eq!(monitor.on_position(Position::new(14.700, 120.983)), None);
/// let event = monitor.on_position(Position::new(14.705, 120.983)).unwrap();
/// assert!(event.is_off_route());
/// ```
#[derive(Debug, Clone)]
pub struct RouteMonitor {
    path: PlannedPath,
    config: DeviationConfig,
    off_route: bool,
    consecutive_off: u32,
    samples_seen: u64,
}

impl RouteMonitor {
    /// Create a monitor. Fails if the config threshold is invalid.
    pub fn new(path: PlannedPath, config: DeviationConfig) -> Result<Self, DeviationError> {
        config.validate()?;
        info!(
            "[RouteMonitor] Monitoring {} waypoints ({:.0}m) with {}m threshold, {} sample(s) to confirm",
            path.len(),
            path.length_meters(),
            config.threshold_meters,
            config.required_samples()
        );
        Ok(Self {
            path,
            config,
            off_route: false,
            consecutive_off: 0,
            samples_seen: 0,
        })
    }

    /// Feed one location sample. Returns an event when the route state changes.
    pub fn on_position(&mut self, sample: Position) -> Option<DeviationEvent> {
        if !sample.is_valid() {
            warn!(
                "[RouteMonitor] Dropping invalid sample ({}, {})",
                sample.latitude, sample.longitude
            );
            return None;
        }
        self.samples_seen += 1;

        let nearest = self.path.nearest_waypoint(&sample, self.config.distance_method)?;
        let deviated = nearest.distance_meters > self.config.threshold_meters;

        if deviated {
            self.consecutive_off = self.consecutive_off.saturating_add(1);
            debug!(
                "[RouteMonitor] Sample #{} off route by {:.1}m ({} consecutive)",
                self.samples_seen, nearest.distance_meters, self.consecutive_off
            );
            if !self.off_route && self.consecutive_off >= self.config.required_samples() {
                self.off_route = true;
                info!(
                    "[RouteMonitor] Off route: {:.0}m from waypoint #{}",
                    nearest.distance_meters, nearest.index
                );
                return Some(DeviationEvent::OffRoute { position: sample, nearest });
            }
            None
        } else {
            self.consecutive_off = 0;
            if self.off_route {
                self.off_route = false;
                info!("[RouteMonitor] Back on route near waypoint #{}", nearest.index);
                return Some(DeviationEvent::BackOnRoute { position: sample, nearest });
            }
            None
        }
    }

    /// True between an `OffRoute` event and the following `BackOnRoute`.
    pub fn is_off_route(&self) -> bool {
        self.off_route
    }

    /// Valid samples processed since creation or the last reset.
    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    /// Forget route state, e.g. after the user accepted a reroute prompt.
    pub fn reset(&mut self) {
        self.off_route = false;
        self.consecutive_off = 0;
        self.samples_seen = 0;
    }

    pub fn path(&self) -> &PlannedPath {
        &self.path
    }

    pub fn config(&self) -> &DeviationConfig {
        &self.config
    }
}
