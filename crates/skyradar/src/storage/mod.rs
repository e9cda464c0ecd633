//! Storage layer for skyradar.
//!
//! This module provides `SQLite`-based persistent storage for archived
//! flights and the entitlement roles that decide which sessions are archived.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::flight::{FlightRecord, Role};
use crate::position::PathPoint;

const FLIGHT_COLUMNS: &str = "id, session_id, callsign, aircraft_type, flight_number, departure, \
     arrival, reporter, route, path, takeoff_time, ended_at, content_hash";

/// Storage engine for the flight history archive.
///
/// Provides persistent storage using `SQLite` with support for:
/// - Flight insertion with deduplication
/// - Lookup by id and callsign
/// - Pruning of old flights
/// - Entitlement roles per external identity
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Archive a flight.
    ///
    /// Returns the assigned id, or `None` if an identical flight is already
    /// archived (a retried finalize lands here).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_flight(&self, flight: &FlightRecord) -> Result<Option<i64>> {
        let route = serde_json::to_string(&flight.route)?;
        let path = serde_json::to_string(&flight.path)?;
        let path_points = i64::try_from(flight.path.len()).unwrap_or(i64::MAX);

        let affected = self.conn.execute(
            r"
            INSERT OR IGNORE INTO flights (
                session_id, callsign, aircraft_type, flight_number, departure, arrival,
                reporter, route, path, path_points, takeoff_time, ended_at, content_hash
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ",
            params![
                flight.session_id,
                flight.callsign,
                flight.aircraft_type,
                flight.flight_number,
                flight.departure,
                flight.arrival,
                flight.reporter,
                route,
                path,
                path_points,
                flight.takeoff_time.map(timestamp),
                timestamp(flight.ended_at),
                flight.content_hash,
            ],
        )?;

        if affected == 0 {
            debug!(
                "Skipping duplicate flight with hash {}",
                &flight.content_hash[..16.min(flight.content_hash.len())]
            );
            return Ok(None);
        }

        let id = self.conn.last_insert_rowid();
        debug!(id, session = %flight.session_id, "Archived flight");
        Ok(Some(id))
    }

    /// Get a flight by its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_flight(&self, id: i64) -> Result<Option<FlightRecord>> {
        let sql = format!("SELECT {FLIGHT_COLUMNS} FROM flights WHERE id = ?1");
        let flight = self
            .conn
            .query_row(&sql, [id], Self::row_to_flight)
            .optional()?;
        Ok(flight)
    }

    /// Most recently ended flights, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_flights(&self, limit: usize) -> Result<Vec<FlightRecord>> {
        let sql = format!(
            "SELECT {FLIGHT_COLUMNS} FROM flights ORDER BY ended_at DESC, id DESC LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let flights = stmt
            .query_map([limit_i64], Self::row_to_flight)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(flights)
    }

    /// Flights flown under a callsign, ignoring case, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn flights_by_callsign(&self, callsign: &str, limit: usize) -> Result<Vec<FlightRecord>> {
        let sql = format!(
            "SELECT {FLIGHT_COLUMNS} FROM flights WHERE callsign = ?1 COLLATE NOCASE \
             ORDER BY ended_at DESC, id DESC LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let flights = stmt
            .query_map(params![callsign.trim(), limit_i64], Self::row_to_flight)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(flights)
    }

    /// Count archived flights.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_flights(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM flights", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete a flight by id.
    ///
    /// Returns `true` if a flight was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_flight(&self, id: i64) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM flights WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Delete flights that ended more than `max_age` ago.
    ///
    /// Returns the number of flights deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_older_than(&self, max_age: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let cutoff = timestamp(cutoff);

        let affected = self
            .conn
            .execute("DELETE FROM flights WHERE ended_at < ?1", [cutoff])?;

        if affected > 0 {
            info!("Pruned {} old flights", affected);
        }
        Ok(affected)
    }

    /// Set the role of an external identity, replacing any previous role.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_user_role(&self, identity: &str, role: Role) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO users (identity, role, updated_at) VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(identity) DO UPDATE SET role = excluded.role, updated_at = excluded.updated_at
            ",
            params![identity.trim(), role.as_str()],
        )?;
        debug!(identity, %role, "Set user role");
        Ok(())
    }

    /// Look up the role of an external identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn user_role(&self, identity: &str) -> Result<Option<Role>> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT role FROM users WHERE identity = ?1",
                [identity.trim()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(stored.map(|s| {
            s.parse().unwrap_or_else(|_| {
                warn!("Unknown role {} for {}, treating as guest", s, identity);
                Role::Guest
            })
        }))
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let total_flights = self.count_flights()?;
        let total_users: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;

        let (oldest, newest): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(ended_at), MAX(ended_at) FROM flights",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_flights,
            total_users,
            oldest_flight: oldest.as_deref().and_then(parse_timestamp),
            newest_flight: newest.as_deref().and_then(parse_timestamp),
            db_size_bytes,
        })
    }

    fn row_to_flight(row: &rusqlite::Row) -> rusqlite::Result<FlightRecord> {
        let route: String = row.get(8)?;
        let path: String = row.get(9)?;
        let takeoff_time: Option<String> = row.get(10)?;
        let ended_at: String = row.get(11)?;

        let route = serde_json::from_str(&route).unwrap_or_else(|e| {
            warn!("Unreadable route JSON in flight row: {}", e);
            serde_json::Value::Array(Vec::new())
        });
        let path: Vec<PathPoint> = serde_json::from_str(&path).unwrap_or_else(|e| {
            warn!("Unreadable path JSON in flight row: {}", e);
            Vec::new()
        });

        Ok(FlightRecord {
            id: Some(row.get(0)?),
            session_id: row.get(1)?,
            callsign: row.get(2)?,
            aircraft_type: row.get(3)?,
            flight_number: row.get(4)?,
            departure: row.get(5)?,
            arrival: row.get(6)?,
            reporter: row.get(7)?,
            route,
            path,
            takeoff_time: takeoff_time.as_deref().and_then(parse_timestamp),
            ended_at: parse_timestamp(&ended_at).unwrap_or_default(),
            content_hash: row.get(12)?,
        })
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Total number of archived flights.
    pub total_flights: i64,
    /// Number of identities with a role.
    pub total_users: i64,
    /// End time of the oldest archived flight.
    pub oldest_flight: Option<DateTime<Utc>>,
    /// End time of the newest archived flight.
    pub newest_flight: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
