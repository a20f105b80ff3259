//! One player walks a loop through the park and claims it.
//!
//! Run with: cargo run --example walk_loop

use capture_engine::{CaptureEngine, EngineConfig, MapMessage, Position, Team};

const CONFIG: &str = r#"{
    "territory": [
        {"lat": 37.5650, "lng": 126.9750},
        {"lat": 37.5650, "lng": 126.9850},
        {"lat": 37.5720, "lng": 126.9850},
        {"lat": 37.5720, "lng": 126.9750}
    ],
    "capture": {"min_capture_area_m2": 500.0}
}"#;

fn main() {
    let config = EngineConfig::from_json(CONFIG).unwrap();
    let engine = CaptureEngine::from_config(config).unwrap();
    let mut session = engine.session("walker-1", Team::Green);

    // Clockwise around a ~66m square, one fix every 5 seconds
    let (lat0, lng0) = (37.5680, 126.9800);
    let offsets = [
        (0.0, 0.0), (0.0, 0.0002), (0.0, 0.0004), (0.0, 0.0006),
        (0.0002, 0.0006), (0.0004, 0.0006), (0.0006, 0.0006),
        (0.0006, 0.0004), (0.0006, 0.0002), (0.0006, 0.0),
        (0.0004, 0.0), (0.0002, 0.0), (0.00005, 0.0),
    ];

    println!("Walking {} fixes around the block\n", offsets.len());

    for (i, (dlat, dlng)) in offsets.iter().enumerate() {
        let raw = Position::new(lat0 + dlat, lng0 + dlng, i as i64 * 5000)
            .with_speed(1.2)
            .with_accuracy(8.0);
        let outcome = session.on_location_update(&raw);
        let progress = session.progress();

        println!(
            "fix {:>2}: inside={} tracking={} points={} walked={:.0}m",
            i,
            outcome.in_territory,
            session.tracker().is_tracking(),
            progress.path_points,
            progress.distance_m
        );

        if let Some(ring) = outcome.captured_path {
            let report = session.on_capture_event(&ring).unwrap();
            println!(
                "\nCaptured region {} ({:.0} m², {} vertices)",
                report.region.id,
                report.region.area_m2(),
                report.region.polygon.len()
            );
            println!("Map: {}", MapMessage::region_delta(&report.delta()).to_json().unwrap());
        }
    }

    if let Some(msg) = session.location_message() {
        println!("\nMap: {}", msg.to_json().unwrap());
    }

    println!("\nScoreboard:");
    for score in engine.scoreboard().scores {
        println!("  {:<5} {:>2} regions {:>5.1}%", score.team, score.region_count, score.percent);
    }
}
