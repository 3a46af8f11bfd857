//! Simulated ride that drifts off the planned path and comes back.
//!
//! Run with: cargo run --example reroute_prompt

use route_deviation::{
    DeviationConfig, DeviationEvent, PlannedPath, Position, RouteMonitor, is_deviated,
};

fn main() {
    // Planned path heading north through Manila, a waypoint every ~55m
    let waypoints: Vec<Position> = (0..20)
        .map(|i| Position::new(14.700 + i as f64 * 0.0005, 120.983))
        .collect();

    // One-shot checks
    println!("One-shot checks (50m threshold):");
    for (label, p) in [
        ("on the path", Position::new(14.700, 120.983)),
        ("~556m north of the start", Position::new(14.705, 120.983)),
        ("~540m east", Position::new(14.702, 120.988)),
    ] {
        println!("   {:<28} deviated = {}", label, is_deviated(&p, &waypoints[..1], 50.0));
    }

    let path = PlannedPath::new(waypoints).expect("demo waypoints are valid");
    let config = DeviationConfig { confirm_samples: 2, ..DeviationConfig::default() };

    println!("\nRide ({} waypoints, {:.0}m, confirm after {} samples):",
        path.len(), path.length_meters(), config.confirm_samples);

    let mut monitor = RouteMonitor::new(path, config).expect("default threshold is valid");

    // Ride north, drift east for a few samples, then return
    let ride: Vec<Position> = (0..30)
        .map(|i| {
            let lng = if (10..18).contains(&i) { 120.983 + (i - 9) as f64 * 0.0003 } else { 120.983 };
            Position::new(14.700 + i as f64 * 0.0003, lng)
        })
        .collect();

    for (i, sample) in ride.into_iter().enumerate() {
        match monitor.on_position(sample) {
            Some(DeviationEvent::OffRoute { nearest, .. }) => println!(
                "   #{:02} OFF ROUTE - {:.0}m from waypoint #{} -> show reroute prompt",
                i, nearest.distance_meters, nearest.index
            ),
            Some(DeviationEvent::BackOnRoute { nearest, .. }) => println!(
                "   #{:02} back on route near waypoint #{} -> dismiss prompt",
                i, nearest.index
            ),
            None => {}
        }
    }

    println!("\nProcessed {} samples, off route now: {}", monitor.samples_seen(), monitor.is_off_route());
}
