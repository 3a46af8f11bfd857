//! Track replay: evaluate a recorded ride against its planned path.
//!
//! Every sample is judged independently with the same decision the live monitor uses,
//! then consecutive off-route samples are merged into spans. Useful for tuning the
//! threshold against real rides and for post-ride summaries.
//!
//! With the `parallel` feature the per-sample work runs on rayon; results are identical.

use log::info;

use crate::deviation::{DeviationConfig, DeviationError};
use crate::path::PlannedPath;
use crate::Position;

/// Verdict for one recorded sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleVerdict {
    /// Index of the sample in the recorded track
    pub index: usize,
    pub position: Position,
    /// Distance to the nearest waypoint; `None` for invalid samples or an empty path
    pub distance_meters: Option<f64>,
    pub deviated: bool,
}

/// A maximal run of off-route samples (inclusive sample indices).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffRouteSpan {
    pub start: usize,
    pub end: usize,
}

impl OffRouteSpan {
    /// Number of samples in the span.
    pub fn sample_count(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Summary of a replayed track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackReport {
    pub verdicts: Vec<SampleVerdict>,
    pub spans: Vec<OffRouteSpan>,
    /// Largest distance from the nearest waypoint among valid samples
    pub max_deviation_meters: Option<f64>,
    pub valid_samples: usize,
    pub invalid_samples: usize,
}

impl TrackReport {
    /// Fraction of valid samples that were off route (0.0 when there are none).
    pub fn off_route_ratio(&self) -> f64 {
        if self.valid_samples == 0 {
            return 0.0;
        }
        let off = self.verdicts.iter().filter(|v| v.deviated).count();
        off as f64 / self.valid_samples as f64
    }
}

/// Evaluate every sample of `track` against `path`.
///
/// Invalid samples get `distance_meters: None, deviated: false` and do not break a span.
///
/// # Example
/// ```
/// use route_deviation::{DeviationConfig, PlannedPath, Position, evaluate_track};
///
/// let path = PlannedPath::new(vec![Position::new(14.700, 120.983)]).unwrap();
/// let track = vec![
///     Position::new(14.700, 120.983),
///     Position::new(14.705, 120.983),
///     Position::new(14.706, 120.983),
///     Position::new(14.7001, 120.983),
/// ];
///
/// let report = evaluate_track(&track, &path, &DeviationConfig::default()).unwrap();
/// assert_eq!(report.spans.len(), 1);
/// assert_eq!(report.spans[0].sample_count(), 2);
/// ```
pub fn evaluate_track(
    track: &[Position],
    path: &PlannedPath,
    config: &DeviationConfig,
) -> Result<TrackReport, DeviationError> {
    config.validate()?;

    let judge = |(index, position): (usize, &Position)| -> SampleVerdict {
        let distance_meters = if position.is_valid() {
            path.nearest_waypoint(position, config.distance_method)
                .map(|n| n.distance_meters)
        } else {
            None
        };
        SampleVerdict {
            index,
            position: *position,
            distance_meters,
            deviated: distance_meters.is_some_and(|d| d > config.threshold_meters),
        }
    };

    #[cfg(feature = "parallel")]
    let verdicts: Vec<SampleVerdict> = {
        use rayon::prelude::*;
        track.par_iter().enumerate().map(judge).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let verdicts: Vec<SampleVerdict> = track.iter().enumerate().map(judge).collect();

    let invalid_samples = track.iter().filter(|p| !p.is_valid()).count();
    let valid_samples = track.len() - invalid_samples;
    let spans = off_route_spans(&verdicts);
    let max_deviation_meters = verdicts
        .iter()
        .filter_map(|v| v.distance_meters)
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |m| m.max(d))));

    info!(
        "[Replay] {} samples ({} invalid) against {} waypoints: {} off-route span(s)",
        track.len(),
        invalid_samples,
        path.len(),
        spans.len()
    );

    Ok(TrackReport {
        verdicts,
        spans,
        max_deviation_meters,
        valid_samples,
        invalid_samples,
    })
}

/// Merge consecutive deviated verdicts into spans. Invalid samples are skipped over.
fn off_route_spans(verdicts: &[SampleVerdict]) -> Vec<OffRouteSpan> {
    let mut spans = Vec::new();
    let mut current: Option<OffRouteSpan> = None;

    for v in verdicts {
        if v.distance_meters.is_none() {
            continue;
        }
        if v.deviated {
            current = Some(match current {
                Some(span) => OffRouteSpan { start: span.start, end: v.index },
                None => OffRouteSpan { start: v.index, end: v.index },
            });
        } else if let Some(span) = current.take() {
            spans.push(span);
        }
    }
    if let Some(span) = current {
        spans.push(span);
    }
    spans
}
