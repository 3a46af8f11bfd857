//! Replay a recorded ride against its planned path and summarise the excursions.
//!
//! Run with: cargo run --example track_replay --features parallel

use route_deviation::{DeviationConfig, PlannedPath, Position, evaluate_track};

fn main() {
    let path = PlannedPath::new(
        (0..200)
            .map(|i| Position::new(14.600 + i as f64 * 0.0004, 120.980))
            .collect(),
    )
    .expect("demo waypoints are valid");

    // Recorded ride with a detour around samples 80-110 and a GPS glitch
    let mut track: Vec<Position> = (0..200)
        .map(|i| {
            let detour = if (80..110).contains(&i) { 0.0012 } else { 0.0 };
            Position::new(14.600 + i as f64 * 0.0004, 120.980 + detour + (i as f64).sin() * 0.00005)
        })
        .collect();
    track[150] = Position::new(f64::NAN, f64::NAN);

    for threshold in [50.0, 100.0, 150.0] {
        let config = DeviationConfig::with_threshold(threshold);
        let report = evaluate_track(&track, &path, &config).expect("threshold is valid");

        println!("Threshold {:>4.0}m:", threshold);
        println!("   valid samples: {} (invalid: {})", report.valid_samples, report.invalid_samples);
        println!("   off route: {:.1}%", report.off_route_ratio() * 100.0);
        if let Some(max) = report.max_deviation_meters {
            println!("   max distance from path: {:.0}m", max);
        }
        for span in &report.spans {
            println!("   excursion: samples {}..={} ({} samples)", span.start, span.end, span.sample_count());
        }
        println!();
    }
}
