//! Async adapters between a location-update feed and a [`RouteMonitor`].
//!
//! Monitoring stops when the feed ends: drop the position sender (or the stream) to
//! unsubscribe. There is no other cancellation.

use futures::future;
use futures::stream::{Stream, StreamExt};
use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::monitor::{DeviationEvent, RouteMonitor};
use crate::Position;

/// Events buffered between the monitor task and the UI consumer.
pub const DEFAULT_EVENT_BUFFER: usize = 16;

/// Turn a stream of positions into a stream of route events.
///
/// The monitor is moved into the returned stream; samples are processed in arrival order.
///
/// # Example
/// ```
/// use futures::{executor::block_on, stream, StreamExt};
/// use route_deviation::{DeviationConfig, PlannedPath, Position, RouteMonitor, watch};
///
/// let path = PlannedPath::new(vec![Position::new(14.700, 120.983)]).unwrap();
/// let monitor = RouteMonitor::new(path, DeviationConfig::default()).unwrap();
///
/// let samples = stream::iter(vec![
///     Position::new(14.700, 120.983),
///     Position::new(14.705, 120.983),
/// ]);
/// let events: Vec<_> = block_on(watch(samples, monitor).collect());
/// assert_eq!(events.len(), 1);
/// ```
pub fn watch<S>(positions: S, mut monitor: RouteMonitor) -> impl Stream<Item = DeviationEvent>
where
    S: Stream<Item = Position>,
{
    positions.filter_map(move |sample| future::ready(monitor.on_position(sample)))
}

/// Run a monitor on its own tokio task, fed by a channel of location samples.
///
/// Returns the task handle and the event receiver. The task ends when every position
/// sender is dropped or the event receiver is dropped, and hands the monitor back
/// through the join handle.
///
/// Must be called from within a tokio runtime.
pub fn spawn_monitor(
    mut positions: mpsc::Receiver<Position>,
    mut monitor: RouteMonitor,
    event_buffer: usize,
) -> (JoinHandle<RouteMonitor>, mpsc::Receiver<DeviationEvent>) {
    let (events_tx, events_rx) = mpsc::channel(event_buffer.max(1));

    let handle = tokio::spawn(async move {
        while let Some(sample) = positions.recv().await {
            if let Some(event) = monitor.on_position(sample) {
                if events_tx.send(event).await.is_err() {
                    debug!("[RouteMonitor] Event receiver dropped, stopping");
                    break;
                }
            }
        }
        info!(
            "[RouteMonitor] Location feed closed after {} samples",
            monitor.samples_seen()
        );
        monitor
    });

    (handle, events_rx)
}
