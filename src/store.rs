//! # Shared Region Store
//!
//! Every device keeps its own [`RegionRegistry`](crate::RegionRegistry) and the
//! shared store is the meeting point: a commit writes its delta to the store, and
//! the store pushes the full region set to every subscriber after each write.
//!
//! [`MemoryRegionStore`] is the in-process implementation used by tests, demos
//! and single-host deployments. Remote backends implement [`RegionStore`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use log::{debug, warn};
use tokio::sync::broadcast;
use crate::messages::{PresenceDocument, RegionDelta, RegionDocument};
use crate::{CaptureEngine, CaptureResult, GpsPoint, Position, Region, Team};

/// Snapshots buffered per subscriber before it starts lagging.
const SUBSCRIBER_CAPACITY: usize = 16;

/// Read/write operations the engine needs from a shared store.
pub trait RegionStore: Send + Sync {
    /// Write the regions a commit changed and delete the ones it retired.
    fn persist(&self, delta: &RegionDelta) -> CaptureResult<()>;

    /// Record a player's last known location.
    fn update_presence(&self, user_id: &str, doc: PresenceDocument);

    /// Live feed of the full region set, sent after every write.
    fn subscribe(&self) -> broadcast::Receiver<Vec<RegionDocument>>;

    /// Current region set.
    fn snapshot(&self) -> Vec<RegionDocument>;
}

#[derive(Default)]
struct StoreState {
    /// Region documents in first-write order
    regions: Vec<RegionDocument>,
    presence: HashMap<String, PresenceDocument>,
}

/// In-memory [`RegionStore`] with `tokio` broadcast subscriptions.
pub struct MemoryRegionStore {
    state: Mutex<StoreState>,
    sender: broadcast::Sender<Vec<RegionDocument>>,
}

impl Default for MemoryRegionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegionStore {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            state: Mutex::new(StoreState::default()),
            sender,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn presence(&self, user_id: &str) -> Option<PresenceDocument> {
        self.lock().presence.get(user_id).cloned()
    }
}

impl RegionStore for MemoryRegionStore {
    fn persist(&self, delta: &RegionDelta) -> CaptureResult<()> {
        let docs = delta
            .upserted
            .iter()
            .map(RegionDocument::from_region)
            .collect::<CaptureResult<Vec<_>>>()?;

        let snapshot = {
            let mut state = self.lock();
            state.regions.retain(|r| !delta.removed.contains(&r.id));
            for doc in docs {
                match state.regions.iter_mut().find(|r| r.id == doc.id) {
                    Some(existing) => *existing = doc,
                    None => state.regions.push(doc),
                }
            }
            state.regions.clone()
        };

        debug!(
            "[Store] Persisted {} upserts, {} removals ({} regions)",
            delta.upserted.len(),
            delta.removed.len(),
            snapshot.len()
        );

        // No subscribers is fine
        let _ = self.sender.send(snapshot);
        Ok(())
    }

    fn update_presence(&self, user_id: &str, doc: PresenceDocument) {
        self.lock().presence.insert(user_id.to_string(), doc);
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<RegionDocument>> {
        self.sender.subscribe()
    }

    fn snapshot(&self) -> Vec<RegionDocument> {
        self.lock().regions.clone()
    }
}

/// A [`CaptureEngine`] kept in step with a [`RegionStore`].
pub struct SyncedEngine<S: RegionStore> {
    engine: CaptureEngine,
    store: Arc<S>,
}

impl<S: RegionStore> Clone for SyncedEngine<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RegionStore> SyncedEngine<S> {
    pub fn new(engine: CaptureEngine, store: Arc<S>) -> Self {
        Self { engine, store }
    }

    /// Commit locally, then write the resulting delta to the store.
    ///
    /// The local registry is changed before the store is written. If `persist`
    /// fails, the error is returned but the capture stays in the local registry
    /// until the next snapshot replaces the region set. Do not retry by
    /// committing the same polygon again. Apply the store's
    /// [`snapshot`](RegionStore::snapshot) to drop the local change, or wait for
    /// the next broadcast.
    pub fn commit(
        &self,
        polygon: &[GpsPoint],
        team: Team,
        user_id: &str,
        captured_at_ms: i64,
    ) -> CaptureResult<Region> {
        let report = self.engine.commit(polygon, team, user_id, captured_at_ms)?;
        self.store.persist(&report.delta())?;
        Ok(report.region)
    }

    pub fn publish_presence(&self, user_id: &str, position: &Position) {
        self.store.update_presence(user_id, PresenceDocument::from(position));
    }

    /// Replace local regions with a store snapshot. Malformed documents are skipped.
    ///
    /// Returns the number of regions loaded.
    pub fn apply_snapshot(&self, docs: &[RegionDocument]) -> usize {
        let regions: Vec<Region> = docs
            .iter()
            .filter_map(|doc| match doc.to_region() {
                Ok(region) => Some(region),
                Err(e) => {
                    warn!("[Store] {}", e);
                    None
                }
            })
            .collect();
        self.engine.apply_remote(regions)
    }

    /// Apply snapshots from `rx` until the store goes away.
    ///
    /// A lagging receiver skips straight to the next snapshot, which is always
    /// complete. Returns the number of snapshots applied.
    pub async fn follow(&self, mut rx: broadcast::Receiver<Vec<RegionDocument>>) -> usize {
        let mut applied = 0;
        loop {
            match rx.recv().await {
                Ok(docs) => {
                    self.apply_snapshot(&docs);
                    applied += 1;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("[Store] Subscriber lagged, skipped {} snapshots", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        applied
    }

    pub fn engine(&self) -> &CaptureEngine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}
