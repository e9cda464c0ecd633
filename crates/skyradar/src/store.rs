//! In-memory registry of live aircraft.
//!
//! [`AircraftStore`] holds one [`PositionRecord`] per tracked session and
//! publishes a full [`StoreSnapshot`] after every successful mutation.
//!
//! Mutations are serialized by a single mutex that also covers the publish
//! step, so snapshot versions reach subscribers in mutation order. Publishing
//! goes through a `tokio::sync::broadcast` channel and never waits on a
//! subscriber: a viewer that falls behind skips ahead to the newest snapshot
//! instead of holding up ingest.
//!
//! Records are stored behind `Arc` and modified copy-on-write, so a snapshot
//! taken before a mutation keeps seeing the old values.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Error, Result, ValidationError};
use crate::incident::{IncidentEvent, IncidentLog};
use crate::position::{PositionRecord, PositionUpdate, TrackPolicy};

/// Tunables for an [`AircraftStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoreOptions {
    /// Merge rules for incoming updates.
    pub policy: TrackPolicy,
    /// Snapshots buffered per subscriber before it starts skipping.
    pub broadcast_capacity: usize,
    /// Trailing window of retained incidents.
    pub incident_window: Duration,
    /// Maximum number of retained incidents.
    pub incident_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            policy: TrackPolicy::default(),
            broadcast_capacity: 64,
            incident_window: Duration::from_secs(3 * 60 * 60),
            incident_capacity: 1_000,
        }
    }
}

impl StoreOptions {
    /// Build options from the application configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            policy: TrackPolicy {
                path_cap: config.tracker.path_cap,
                airborne_agl_ft: config.tracker.airborne_agl_ft,
            },
            broadcast_capacity: config.server.broadcast_capacity,
            incident_window: config.incident_window(),
            incident_capacity: config.incidents.capacity,
        }
    }
}

/// A point-in-time copy of every tracked record, ordered by id.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    /// Mutation counter at the time of the snapshot.
    pub version: u64,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// The records, ordered by id.
    pub aircraft: Vec<Arc<PositionRecord>>,
}

/// Wire shape shared by the snapshot endpoint and the stream.
#[derive(Debug, Serialize)]
pub struct SnapshotPayload<'a> {
    /// Number of aircraft in the payload.
    pub count: usize,
    /// The aircraft.
    pub aircraft: Vec<&'a PositionRecord>,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

impl StoreSnapshot {
    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }

    /// Look up a record by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PositionRecord> {
        self.aircraft
            .binary_search_by(|r| r.id.as_str().cmp(id))
            .ok()
            .map(|i| self.aircraft[i].as_ref())
    }

    /// Whether a record with this id is present.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// The full payload.
    #[must_use]
    pub fn payload(&self) -> SnapshotPayload<'_> {
        self.payload_where(|_| true)
    }

    /// A payload holding only records that match `keep`.
    pub fn payload_where<F>(&self, mut keep: F) -> SnapshotPayload<'_>
    where
        F: FnMut(&PositionRecord) -> bool,
    {
        let aircraft: Vec<&PositionRecord> = self
            .aircraft
            .iter()
            .map(AsRef::as_ref)
            .filter(|r| keep(r))
            .collect();
        SnapshotPayload {
            count: aircraft.len(),
            aircraft,
            timestamp: self.taken_at,
        }
    }

    /// Serialize the full payload to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.payload())?)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    records: BTreeMap<String, Arc<PositionRecord>>,
    version: u64,
}

impl StoreState {
    fn snapshot(&self, taken_at: DateTime<Utc>) -> StoreSnapshot {
        StoreSnapshot {
            version: self.version,
            taken_at,
            aircraft: self.records.values().cloned().collect(),
        }
    }
}

/// The live aircraft registry.
#[derive(Debug)]
pub struct AircraftStore {
    clock: Arc<dyn Clock>,
    policy: TrackPolicy,
    state: Mutex<StoreState>,
    updates: broadcast::Sender<Arc<StoreSnapshot>>,
    incidents: IncidentLog,
}

impl AircraftStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, options: StoreOptions) -> Self {
        let (updates, _) = broadcast::channel(options.broadcast_capacity.max(1));
        Self {
            clock,
            policy: options.policy,
            state: Mutex::new(StoreState::default()),
            updates,
            incidents: IncidentLog::new(options.incident_window, options.incident_capacity),
        }
    }

    /// The clock records are stamped with.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Merge an update into the record for `id`, creating it if needed.
    ///
    /// The update is validated before the store is locked, so a rejected
    /// update leaves any existing record untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the id is empty, the callsign is
    /// blank, or a coordinate is not finite.
    pub fn upsert(&self, id: &str, update: &PositionUpdate) -> Result<Arc<PositionRecord>> {
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyId.into());
        }
        update.validate()?;

        let now = self.clock.now();
        let mut state = self.lock();

        let previous_emergency = state.records.get(id).and_then(|r| r.emergency());
        let policy = self.policy;
        let record = state
            .records
            .entry(id.to_string())
            .and_modify(|r| Arc::make_mut(r).apply(update, now, &policy))
            .or_insert_with(|| {
                debug!(id, callsign = %update.callsign, "Tracking new aircraft");
                Arc::new(PositionRecord::from_update(id, update, now, &policy))
            })
            .clone();

        if let Some(kind) = record.emergency() {
            if previous_emergency != Some(kind) {
                self.incidents.record(IncidentEvent {
                    id: record.id.clone(),
                    callsign: record.callsign.clone(),
                    flight_number: record.flight_number.clone(),
                    squawk: record.squawk.clone(),
                    kind,
                    timestamp: now,
                });
            }
        }

        state.version += 1;
        trace!(id, version = state.version, path = record.path_len(), "Upserted aircraft");
        self.publish(&state, now);
        Ok(record)
    }

    /// Fetch a record by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<PositionRecord>> {
        self.lock().records.get(id).cloned()
    }

    /// Remove a record and its flight path.
    ///
    /// Returns `true` if a record existed.
    pub fn remove(&self, id: &str) -> bool {
        let mut state = self.lock();
        if state.records.remove(id).is_none() {
            return false;
        }
        state.version += 1;
        debug!(id, "Removed aircraft");
        self.publish(&state, self.clock.now());
        true
    }

    /// Remove a record only if it has gone without a report for longer than
    /// `timeout` as of `now`.
    ///
    /// The staleness check and the removal happen under the same lock, so a
    /// report that lands in between keeps the record alive.
    pub fn remove_if_stale(
        &self,
        id: &str,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Option<Arc<PositionRecord>> {
        let mut state = self.lock();
        if !state.records.get(id)?.is_stale(now, timeout) {
            return None;
        }
        let removed = state.records.remove(id)?;
        state.version += 1;
        self.publish(&state, now);
        Some(removed)
    }

    /// Copy of every record at call time, ordered by id.
    #[must_use]
    pub fn list_all(&self) -> Vec<Arc<PositionRecord>> {
        self.lock().records.values().cloned().collect()
    }

    /// A versioned snapshot of the whole store.
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.lock();
        state.snapshot(self.clock.now())
    }

    /// Records whose callsign matches, ignoring ASCII case.
    #[must_use]
    pub fn find_by_callsign(&self, callsign: &str) -> Vec<Arc<PositionRecord>> {
        let callsign = callsign.trim();
        self.lock()
            .records
            .values()
            .filter(|r| r.callsign.eq_ignore_ascii_case(callsign))
            .cloned()
            .collect()
    }

    /// Number of tracked records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Current mutation counter.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    /// Drop every record. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.records.len();
        if removed > 0 {
            state.records.clear();
            state.version += 1;
            self.publish(&state, self.clock.now());
        }
        removed
    }

    /// The incident log fed by this store.
    #[must_use]
    pub fn incidents(&self) -> &IncidentLog {
        &self.incidents
    }

    /// Incidents inside the retention window, newest first.
    #[must_use]
    pub fn recent_incidents(&self) -> Vec<IncidentEvent> {
        self.incidents.recent(self.clock.now())
    }

    /// Number of live snapshot receivers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.updates.receiver_count()
    }

    /// Receive a snapshot after every future mutation.
    ///
    /// Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> SnapshotReceiver {
        SnapshotReceiver {
            rx: self.updates.subscribe(),
        }
    }

    /// Run `callback` with a snapshot after every future mutation.
    ///
    /// The callback runs on its own task, never inside the mutating call. A
    /// callback that panics is detached and the store carries on. Must be
    /// called from within a tokio runtime.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe_with<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(Arc<StoreSnapshot>) + Send + 'static,
    {
        let mut receiver = self.subscribe();
        let active = Arc::new(AtomicBool::new(true));
        let still_active = Arc::clone(&active);

        let task = tokio::spawn(async move {
            while let Ok(snapshot) = receiver.recv().await {
                if !still_active.load(Ordering::SeqCst) {
                    break;
                }
                let delivered = std::panic::catch_unwind(AssertUnwindSafe(|| callback(snapshot)));
                if delivered.is_err() {
                    warn!("Snapshot subscriber panicked, detaching it");
                    still_active.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        Subscription { active, task }
    }

    fn publish(&self, state: &StoreState, now: DateTime<Utc>) {
        if self.updates.receiver_count() == 0 {
            return;
        }
        // Only fails when every receiver has gone away in the meantime.
        let _ = self.updates.send(Arc::new(state.snapshot(now)));
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A subscription to store snapshots.
#[derive(Debug)]
pub struct SnapshotReceiver {
    rx: broadcast::Receiver<Arc<StoreSnapshot>>,
}

impl SnapshotReceiver {
    /// Wait for the next snapshot.
    ///
    /// A receiver that fell behind skips straight to the oldest snapshot still
    /// buffered; since every snapshot is complete nothing is lost but latency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SubscriptionClosed`] once the store is dropped.
    pub async fn recv(&mut self) -> Result<Arc<StoreSnapshot>> {
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Ok(snapshot),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Snapshot subscriber lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(Error::SubscriptionClosed),
            }
        }
    }

    /// Unwrap into the underlying broadcast receiver.
    #[must_use]
    pub fn into_inner(self) -> broadcast::Receiver<Arc<StoreSnapshot>> {
        self.rx
    }
}

/// Handle for a callback registered with [`AircraftStore::subscribe_with`].
///
/// Dropping the handle unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivering snapshots. Safe to call more than once.
    ///
    /// Returns `true` if this call detached the callback.
    pub fn unsubscribe(&self) -> bool {
        let was_active = self.active.swap(false, Ordering::SeqCst);
        self.task.abort();
        was_active
    }

    /// Whether the callback is still attached.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::position::PathPoint;

    fn create_test_store() -> (AircraftStore, ManualClock) {
        let clock = ManualClock::default();
        let store = AircraftStore::new(Arc::new(clock.clone()), StoreOptions::default());
        (store, clock)
    }

    #[test]
    fn test_upsert_creates_and_get_returns() {
        let (store, _) = create_test_store();
        let record = store
            .upsert("DAL1:p", &PositionUpdate::new("DAL1", 10.0, 20.0))
            .unwrap();

        assert_eq!(record.id, "DAL1:p");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("DAL1:p").unwrap().lat, 10.0);
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_upsert_identical_input_keeps_path_length() {
        let (store, _) = create_test_store();
        let update = PositionUpdate::new("DAL1", 10.0, 20.0);

        store.upsert("DAL1", &update).unwrap();
        let second = store.upsert("DAL1", &update).unwrap();

        assert_eq!(second.path_len(), 1);
    }

    #[test]
    fn test_path_cap_keeps_most_recent() {
        let (store, _) = create_test_store();
        for i in 0..600 {
            let update = PositionUpdate::new("DAL1", f64::from(i) * 0.01, 0.0);
            store.upsert("DAL1", &update).unwrap();
        }

        let record = store.get("DAL1").unwrap();
        assert_eq!(record.path_len(), 500);
        assert_eq!(record.flight_path.front(), Some(&PathPoint(1.0, 0.0)));
        assert_eq!(record.flight_path.back(), Some(&PathPoint(5.99, 0.0)));
        let lats: Vec<f64> = record.flight_path.iter().map(PathPoint::lat).collect();
        assert!(lats.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_validation_rejects_without_mutation() {
        let (store, clock) = create_test_store();
        store
            .upsert("DAL1", &PositionUpdate::new("DAL1", 10.0, 20.0))
            .unwrap();
        let before = store.get("DAL1").unwrap();
        let version = store.version();

        clock.advance(Duration::from_secs(1));
        let err = store
            .upsert("DAL1", &PositionUpdate::new("DAL1", f64::NAN, 21.0))
            .unwrap_err();

        assert!(err.is_validation());
        assert_eq!(*store.get("DAL1").unwrap(), *before);
        assert_eq!(store.version(), version);
    }

    #[test]
    fn test_upsert_rejects_blank_callsign_and_id() {
        let (store, _) = create_test_store();
        assert!(store
            .upsert("X", &PositionUpdate::new("", 1.0, 1.0))
            .unwrap_err()
            .is_validation());
        assert!(store
            .upsert(" ", &PositionUpdate::new("X", 1.0, 1.0))
            .unwrap_err()
            .is_validation());
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_isolation() {
        let (store, _) = create_test_store();
        store
            .upsert("A", &PositionUpdate::new("A", 1.0, 1.0))
            .unwrap();

        let held = store.list_all();
        let held_snapshot = store.snapshot();
        store
            .upsert("B", &PositionUpdate::new("B", 2.0, 2.0))
            .unwrap();
        store
            .upsert("A", &PositionUpdate::new("A", 5.0, 5.0))
            .unwrap();

        assert_eq!(held.len(), 1);
        assert!(held.iter().all(|r| r.id != "B"));
        assert_eq!(held[0].lat, 1.0);
        assert!(!held_snapshot.contains("B"));
        assert_eq!(store.list_all().len(), 2);
    }

    #[test]
    fn test_remove() {
        let (store, _) = create_test_store();
        store
            .upsert("A", &PositionUpdate::new("A", 1.0, 1.0))
            .unwrap();

        assert!(store.remove("A"));
        assert!(!store.remove("A"));
        assert!(store.get("A").is_none());
    }

    #[test]
    fn test_remove_if_stale_respects_window() {
        let (store, clock) = create_test_store();
        store
            .upsert("A", &PositionUpdate::new("A", 1.0, 1.0))
            .unwrap();
        let timeout = Duration::from_secs(12);

        clock.advance(Duration::from_secs(11));
        assert!(store.remove_if_stale("A", clock.now(), timeout).is_none());
        assert!(store.get("A").is_some());

        clock.advance(Duration::from_secs(2));
        let removed = store.remove_if_stale("A", clock.now(), timeout).unwrap();
        assert_eq!(removed.id, "A");
        assert!(store.is_empty());
    }

    #[test]
    fn test_incident_detection() {
        let (store, _) = create_test_store();
        let mut update = PositionUpdate::new("UAL123", 10.0, 10.0);
        update.squawk = "7700".to_string();
        store.upsert("UAL123", &update).unwrap();

        let incidents = store.recent_incidents();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].squawk, "7700");
        assert_eq!(incidents[0].callsign, "UAL123");

        let mut normal = PositionUpdate::new("N123", 10.0, 10.0);
        normal.squawk = "1200".to_string();
        store.upsert("N123", &normal).unwrap();
        assert_eq!(store.recent_incidents().len(), 1);
    }

    #[test]
    fn test_repeated_emergency_squawk_records_once() {
        let (store, _) = create_test_store();
        let mut update = PositionUpdate::new("UAL123", 10.0, 10.0);
        update.squawk = "7700".to_string();
        store.upsert("UAL123", &update).unwrap();
        update.lat = 10.1;
        store.upsert("UAL123", &update).unwrap();
        assert_eq!(store.recent_incidents().len(), 1);

        update.squawk = "7600".to_string();
        store.upsert("UAL123", &update).unwrap();
        assert_eq!(store.recent_incidents().len(), 2);
        assert_eq!(store.recent_incidents()[0].squawk, "7600");
    }

    #[test]
    fn test_find_by_callsign() {
        let (store, _) = create_test_store();
        store
            .upsert("DAL1:a", &PositionUpdate::new("DAL1", 1.0, 1.0))
            .unwrap();
        store
            .upsert("DAL1:b", &PositionUpdate::new("DAL1", 2.0, 2.0))
            .unwrap();
        store
            .upsert("UAL2", &PositionUpdate::new("UAL2", 3.0, 3.0))
            .unwrap();

        assert_eq!(store.find_by_callsign("dal1").len(), 2);
        assert!(store.find_by_callsign("AAL9").is_empty());
    }

    #[test]
    fn test_clear() {
        let (store, _) = create_test_store();
        store
            .upsert("A", &PositionUpdate::new("A", 1.0, 1.0))
            .unwrap();
        store
            .upsert("B", &PositionUpdate::new("B", 1.0, 1.0))
            .unwrap();
        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());
        assert_eq!(store.clear(), 0);
    }

    #[test]
    fn test_snapshot_payload_shape() {
        let (store, _) = create_test_store();
        store
            .upsert("B", &PositionUpdate::new("B", 1.0, 1.0))
            .unwrap();
        store
            .upsert("A", &PositionUpdate::new("A", 1.0, 1.0))
            .unwrap();

        let snapshot = store.snapshot();
        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(json["count"], 2);
        assert_eq!(json["aircraft"][0]["id"], "A");
        assert_eq!(json["aircraft"][1]["id"], "B");
        assert!(json["timestamp"].is_string());

        let filtered = snapshot.payload_where(|r| r.id == "B");
        assert_eq!(filtered.count, 1);
    }

    #[tokio::test]
    async fn test_subscriber_receives_ordered_snapshots() {
        let (store, _) = create_test_store();
        let mut rx = store.subscribe();

        store
            .upsert("A", &PositionUpdate::new("A", 1.0, 1.0))
            .unwrap();
        store
            .upsert("B", &PositionUpdate::new("B", 2.0, 2.0))
            .unwrap();
        store.remove("A");

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();

        assert!(first.version < second.version && second.version < third.version);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
        assert_eq!(third.len(), 1);
        assert!(third.contains("B"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_publish_gap_free_versions() {
        const TASKS: u32 = 8;
        const REPORTS: u32 = 50;

        let options = StoreOptions {
            broadcast_capacity: 1_024,
            ..StoreOptions::default()
        };
        let store = Arc::new(AircraftStore::new(Arc::new(ManualClock::default()), options));
        let mut rx = store.subscribe();

        let writers: Vec<_> = (0..TASKS)
            .map(|t| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let id = format!("FLT{t}");
                    for i in 0..REPORTS {
                        let update = PositionUpdate::new(id.clone(), f64::from(i) * 0.01, f64::from(t));
                        store.upsert(&id, &update).unwrap();
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let total = u64::from(TASKS * REPORTS);
        for expected in 1..=total {
            assert_eq!(rx.recv().await.unwrap().version, expected);
        }
        assert_eq!(store.version(), total);
        assert_eq!(store.len(), TASKS as usize);
        for record in store.list_all() {
            assert_eq!(record.path_len(), REPORTS as usize);
        }
    }

    #[tokio::test]
    async fn test_stalled_subscriber_does_not_block_ingest() {
        let clock = ManualClock::default();
        let options = StoreOptions {
            broadcast_capacity: 2,
            ..StoreOptions::default()
        };
        let store = AircraftStore::new(Arc::new(clock), options);
        let mut rx = store.subscribe();

        for i in 0..50 {
            store
                .upsert("A", &PositionUpdate::new("A", f64::from(i), 0.0))
                .unwrap();
        }

        let snapshot = rx.recv().await.unwrap();
        assert!(snapshot.version >= 49);
    }

    #[tokio::test]
    async fn test_dropping_receiver_unsubscribes() {
        let (store, _) = create_test_store();
        let rx = store.subscribe();
        assert_eq!(store.subscriber_count(), 1);
        drop(rx);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_with_callback_and_unsubscribe() {
        let (store, _) = create_test_store();
        let (tx, mut seen) = tokio::sync::mpsc::unbounded_channel();
        let subscription = store.subscribe_with(move |snapshot| {
            let _ = tx.send(snapshot.len());
        });

        store
            .upsert("A", &PositionUpdate::new("A", 1.0, 1.0))
            .unwrap();
        assert_eq!(seen.recv().await, Some(1));

        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());
        assert!(!subscription.is_active());

        store
            .upsert("B", &PositionUpdate::new("B", 1.0, 1.0))
            .unwrap();
        // The aborted task drops its sender, closing the channel.
        assert_eq!(seen.recv().await, None);
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_isolated() {
        crate::logging::init_test_logging();
        let (store, _) = create_test_store();
        let bad = store.subscribe_with(|_| panic!("subscriber failure"));
        let mut good = store.subscribe();

        store
            .upsert("A", &PositionUpdate::new("A", 1.0, 1.0))
            .unwrap();
        store
            .upsert("B", &PositionUpdate::new("B", 1.0, 1.0))
            .unwrap();

        assert_eq!(good.recv().await.unwrap().len(), 1);
        assert_eq!(good.recv().await.unwrap().len(), 2);
        assert_eq!(store.len(), 2);

        tokio::task::yield_now().await;
        drop(bad);
    }

    #[tokio::test]
    async fn test_closed_store_ends_subscription() {
        let (store, _) = create_test_store();
        let mut rx = store.subscribe();
        drop(store);
        assert!(matches!(rx.recv().await, Err(Error::SubscriptionClosed)));
    }
}
