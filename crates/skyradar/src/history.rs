//! Flight history collaborators.
//!
//! When the reaper evicts a session, [`FlightFinalizer`] decides whether the
//! flight is worth keeping and hands it to a [`FlightArchive`]. Whether a
//! session qualifies depends on its reporter's [`Role`], looked up through an
//! [`EntitlementLookup`].
//!
//! [`SqliteHistory`] implements both traits on top of [`Storage`], running
//! every query on the blocking pool so the async runtime is never stalled by
//! `SQLite`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::flight::{FlightRecord, Role};
use crate::position::PositionRecord;
use crate::reaper::ExpiryHook;
use crate::storage::Storage;

/// Destination for finalized flights.
#[async_trait::async_trait]
pub trait FlightArchive: Send + Sync {
    /// Store a flight. Returns the new id, or `None` if it was already stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is unavailable.
    async fn archive(&self, flight: FlightRecord) -> Result<Option<i64>>;
}

/// Source of entitlement roles for external identities.
#[async_trait::async_trait]
pub trait EntitlementLookup: Send + Sync {
    /// The role of `identity`, or `None` if it is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup is unavailable.
    async fn role_of(&self, identity: &str) -> Result<Option<Role>>;
}

/// Both history collaborators backed by one `SQLite` database.
#[derive(Debug, Clone)]
pub struct SqliteHistory {
    storage: Arc<Mutex<Storage>>,
}

impl SqliteHistory {
    /// Wrap an open storage handle.
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
        }
    }

    /// Run `f` against the storage on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or an internal error if the blocking
    /// task could not complete.
    pub async fn with_storage<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Storage) -> Result<T> + Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || {
            let guard = storage.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await?
    }
}

#[async_trait::async_trait]
impl FlightArchive for SqliteHistory {
    async fn archive(&self, flight: FlightRecord) -> Result<Option<i64>> {
        self.with_storage(move |storage| storage.insert_flight(&flight))
            .await
            .map_err(|e| Error::persistence(format!("failed to archive flight: {e}")))
    }
}

#[async_trait::async_trait]
impl EntitlementLookup for SqliteHistory {
    async fn role_of(&self, identity: &str) -> Result<Option<Role>> {
        let identity = identity.to_string();
        self.with_storage(move |storage| storage.user_role(&identity))
            .await
            .map_err(|e| Error::persistence(format!("failed to look up role: {e}")))
    }
}

/// In-process archive, for tests and for running without a database.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    flights: Mutex<Vec<FlightRecord>>,
}

impl MemoryArchive {
    /// Create an empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every archived flight, in insertion order.
    #[must_use]
    pub fn flights(&self) -> Vec<FlightRecord> {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl FlightArchive for MemoryArchive {
    async fn archive(&self, mut flight: FlightRecord) -> Result<Option<i64>> {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        if flights
            .iter()
            .any(|f| f.content_hash == flight.content_hash)
        {
            return Ok(None);
        }
        let id = i64::try_from(flights.len()).unwrap_or(i64::MAX) + 1;
        flight.id = Some(id);
        flights.push(flight);
        Ok(Some(id))
    }
}

/// Fixed role table, for tests and for running without a database.
#[derive(Debug, Default)]
pub struct StaticEntitlements {
    roles: HashMap<String, Role>,
}

impl StaticEntitlements {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a role.
    #[must_use]
    pub fn with(mut self, identity: impl Into<String>, role: Role) -> Self {
        self.roles.insert(identity.into(), role);
        self
    }
}

#[async_trait::async_trait]
impl EntitlementLookup for StaticEntitlements {
    async fn role_of(&self, identity: &str) -> Result<Option<Role>> {
        Ok(self.roles.get(identity).copied())
    }
}

/// What the finalizer did with an evicted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalization {
    /// Stored under the given id.
    Archived(i64),
    /// Already stored by an earlier attempt.
    Duplicate,
    /// The session had no reporter to look up.
    Anonymous,
    /// The reporter's role does not keep history.
    NotEntitled(Role),
    /// The path was too short to be worth keeping.
    TooShort(usize),
}

/// [`ExpiryHook`] that archives qualifying sessions.
///
/// A session qualifies when its reporter's role keeps history and its path
/// has more than `min_path_points` points.
pub struct FlightFinalizer {
    archive: Arc<dyn FlightArchive>,
    entitlements: Arc<dyn EntitlementLookup>,
    min_path_points: usize,
}

impl std::fmt::Debug for FlightFinalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightFinalizer")
            .field("min_path_points", &self.min_path_points)
            .finish_non_exhaustive()
    }
}

impl FlightFinalizer {
    /// Create a finalizer.
    #[must_use]
    pub fn new(
        archive: Arc<dyn FlightArchive>,
        entitlements: Arc<dyn EntitlementLookup>,
        min_path_points: usize,
    ) -> Self {
        Self {
            archive,
            entitlements,
            min_path_points,
        }
    }

    /// Archive `record` if it qualifies.
    ///
    /// # Errors
    ///
    /// Returns an error if the role lookup or the archive fails.
    pub async fn finalize(&self, record: &PositionRecord) -> Result<Finalization> {
        let Some(reporter) = record.reporter.as_deref() else {
            return Ok(Finalization::Anonymous);
        };

        let role = self.entitlements.role_of(reporter).await?.unwrap_or_default();
        if !role.keeps_history() {
            return Ok(Finalization::NotEntitled(role));
        }

        let points = record.path_len();
        if points <= self.min_path_points {
            return Ok(Finalization::TooShort(points));
        }

        let flight = FlightRecord::from_expired(record);
        Ok(match self.archive.archive(flight).await? {
            Some(id) => {
                info!(id, session = %record.id, callsign = %record.callsign, points, "Archived flight");
                Finalization::Archived(id)
            }
            None => Finalization::Duplicate,
        })
    }
}

#[async_trait::async_trait]
impl ExpiryHook for FlightFinalizer {
    async fn on_expire(&self, record: &PositionRecord) -> Result<()> {
        let outcome = self.finalize(record).await?;
        debug!(session = %record.id, ?outcome, "Finalized session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::{PositionUpdate, TrackPolicy};
    use chrono::Utc;

    struct FailingArchive;

    #[async_trait::async_trait]
    impl FlightArchive for FailingArchive {
        async fn archive(&self, _flight: FlightRecord) -> Result<Option<i64>> {
            Err(Error::persistence("database is locked"))
        }
    }

    fn record_with_path(reporter: Option<&str>, points: usize) -> PositionRecord {
        let now = Utc::now();
        let policy = TrackPolicy::default();
        let mut update = PositionUpdate::new("DAL1", 0.0, 0.0);
        update.reporter = reporter.map(str::to_string);
        let mut record = PositionRecord::from_update("DAL1:p", &update, now, &policy);
        for i in 1..points {
            update.lat = f64::from(u32::try_from(i).unwrap()) * 0.01;
            record.apply(&update, now, &policy);
        }
        record
    }

    fn finalizer(archive: Arc<dyn FlightArchive>) -> FlightFinalizer {
        let entitlements = StaticEntitlements::new()
            .with("premium-user", Role::Premium)
            .with("member-user", Role::Member);
        FlightFinalizer::new(archive, Arc::new(entitlements), 10)
    }

    #[tokio::test]
    async fn test_finalize_archives_entitled_session() {
        let archive = Arc::new(MemoryArchive::new());
        let finalizer = finalizer(archive.clone());

        let outcome = finalizer
            .finalize(&record_with_path(Some("premium-user"), 11))
            .await
            .unwrap();

        assert_eq!(outcome, Finalization::Archived(1));
        let flights = archive.flights();
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].path_len(), 11);
    }

    #[tokio::test]
    async fn test_finalize_skips_unqualified_sessions() {
        let archive = Arc::new(MemoryArchive::new());
        let finalizer = finalizer(archive.clone());

        assert_eq!(
            finalizer.finalize(&record_with_path(None, 50)).await.unwrap(),
            Finalization::Anonymous
        );
        assert_eq!(
            finalizer
                .finalize(&record_with_path(Some("member-user"), 50))
                .await
                .unwrap(),
            Finalization::NotEntitled(Role::Member)
        );
        assert_eq!(
            finalizer
                .finalize(&record_with_path(Some("stranger"), 50))
                .await
                .unwrap(),
            Finalization::NotEntitled(Role::Guest)
        );
        assert_eq!(
            finalizer
                .finalize(&record_with_path(Some("premium-user"), 10))
                .await
                .unwrap(),
            Finalization::TooShort(10)
        );
        assert!(archive.flights().is_empty());
    }

    #[tokio::test]
    async fn test_finalize_twice_is_duplicate() {
        let archive = Arc::new(MemoryArchive::new());
        let finalizer = finalizer(archive.clone());
        let record = record_with_path(Some("premium-user"), 20);

        finalizer.finalize(&record).await.unwrap();
        assert_eq!(
            finalizer.finalize(&record).await.unwrap(),
            Finalization::Duplicate
        );
        assert_eq!(archive.flights().len(), 1);
    }

    #[tokio::test]
    async fn test_archive_failure_surfaces_as_persistence_error() {
        let finalizer = finalizer(Arc::new(FailingArchive));
        let err = finalizer
            .on_expire(&record_with_path(Some("premium-user"), 20))
            .await
            .unwrap_err();
        assert!(err.is_persistence());
    }

    #[tokio::test]
    async fn test_sqlite_history_round_trip() {
        let storage = Storage::open_in_memory().unwrap();
        storage.set_user_role("premium-user", Role::Premium).unwrap();
        let history = Arc::new(SqliteHistory::new(storage));

        assert_eq!(
            history.role_of("premium-user").await.unwrap(),
            Some(Role::Premium)
        );
        assert_eq!(history.role_of("nobody").await.unwrap(), None);

        let finalizer = FlightFinalizer::new(history.clone(), history.clone(), 10);
        let outcome = finalizer
            .finalize(&record_with_path(Some("premium-user"), 15))
            .await
            .unwrap();
        assert!(matches!(outcome, Finalization::Archived(_)));

        let count = history
            .with_storage(|storage| storage.count_flights())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
