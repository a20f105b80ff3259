//! Two devices stay in step through the in-memory shared store.
//!
//! Run with: cargo run --example store_sync --features sync

use std::sync::Arc;
use capture_engine::{
    CaptureEngine, GpsPoint, MemoryRegionStore, Position, RegionStore, SyncedEngine, Team, Territory,
};

fn square(lat: f64, lng: f64, size: f64) -> Vec<GpsPoint> {
    vec![
        GpsPoint::new(lat, lng),
        GpsPoint::new(lat, lng + size),
        GpsPoint::new(lat + size, lng + size),
        GpsPoint::new(lat + size, lng),
    ]
}

#[tokio::main]
async fn main() {
    let territory = Territory::new(&square(0.0, 0.0, 0.02)).unwrap();
    let store = Arc::new(MemoryRegionStore::new());

    let phone_a = SyncedEngine::new(CaptureEngine::with_territory(territory.clone()), Arc::clone(&store));
    let phone_b = SyncedEngine::new(CaptureEngine::with_territory(territory), Arc::clone(&store));

    let mut rx = store.subscribe();

    phone_a.publish_presence("alice", &Position::new(0.005, 0.005, 0));
    phone_a.commit(&square(0.0, 0.0, 0.01), Team::Red, "alice", 1_000).unwrap();
    phone_a.commit(&square(0.005, 0.005, 0.01), Team::Blue, "bob", 2_000).unwrap();
    phone_a.commit(&square(0.006, 0.006, 0.002), Team::Red, "alice", 3_000).unwrap();

    println!("Store holds {} region documents", store.snapshot().len());
    for doc in store.snapshot() {
        println!("  {} {:<5} by {}", doc.id, doc.owner_team, doc.captured_by);
    }

    // Every snapshot is complete, so phone B only needs the newest one
    let mut received = 0;
    let mut latest = None;
    while let Ok(docs) = rx.try_recv() {
        received += 1;
        latest = Some(docs);
    }
    if let Some(docs) = latest {
        phone_b.apply_snapshot(&docs);
    }

    println!("\nPhone B received {} snapshots", received);
    println!("{:<6} {:>8} {:>8}", "team", "phone A", "phone B");
    for team in Team::ALL {
        println!(
            "{:<6} {:>7.1}% {:>7.1}%",
            team,
            phone_a.engine().coverage_percent(team),
            phone_b.engine().coverage_percent(team)
        );
    }

    if let Some(presence) = store.presence("alice") {
        println!("\nalice last seen at {:?}", presence.last_location);
    }
}
