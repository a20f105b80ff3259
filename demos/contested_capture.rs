//! Three teams capture overlapping ground from separate threads.
//!
//! Run with: cargo run --example contested_capture --features parallel

use std::thread;
use std::time::Instant;
use capture_engine::{CaptureEngine, GpsPoint, Team, Territory};

fn square(lat: f64, lng: f64, size: f64) -> Vec<GpsPoint> {
    vec![
        GpsPoint::new(lat, lng),
        GpsPoint::new(lat, lng + size),
        GpsPoint::new(lat + size, lng + size),
        GpsPoint::new(lat + size, lng),
    ]
}

fn main() {
    let territory = Territory::new(&square(0.0, 0.0, 0.02)).unwrap();
    let engine = CaptureEngine::with_territory(territory);

    println!("Contested capture: 3 teams x 40 loops\n");
    let start = Instant::now();

    let handles: Vec<_> = Team::ALL
        .into_iter()
        .enumerate()
        .map(|(k, team)| {
            let engine = engine.clone();
            thread::spawn(move || {
                let user = format!("{}-runner", team.as_str().to_lowercase());
                for i in 0..40 {
                    // Each team sweeps diagonally, crossing the others' ground
                    let step = (i * 7 + k * 13) % 40;
                    let lat = step as f64 * 0.0004;
                    let lng = ((step + k * 11) % 40) as f64 * 0.0004;
                    if let Err(e) = engine.on_capture_event(&square(lat, lng, 0.003), team, &user) {
                        eprintln!("{} rejected: {}", user, e);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    println!("Committed in {:?}\n", start.elapsed());

    let board = engine.scoreboard();
    let mut total = 0.0;
    for score in &board.scores {
        total += score.percent;
        println!(
            "{:<5} {:>3} regions {:>9.0} m² {:>5.1}%",
            score.team, score.region_count, score.area_m2, score.percent
        );
    }
    println!("\nTotal regions: {}", board.total_regions);
    println!("Combined coverage: {:.1}%", total);
    match board.leader {
        Some(team) => println!("Leader: {}", team),
        None => println!("No leader"),
    }
}
