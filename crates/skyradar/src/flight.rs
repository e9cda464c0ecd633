//! Archived flight types.
//!
//! A [`FlightRecord`] is what remains of a tracked session once the reaper
//! evicts it and the session qualifies for history. [`Role`] is the
//! entitlement that decides whether a reporter's sessions qualify.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::position::{PathPoint, PositionRecord};

/// Entitlement level of an external identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Unknown or anonymous user.
    #[default]
    Guest,
    /// Registered user without history.
    Member,
    /// Paying user; flights are archived.
    Premium,
    /// Operator; flights are archived.
    Admin,
}

impl Role {
    /// Whether sessions reported by this role are archived.
    #[must_use]
    pub fn keeps_history(self) -> bool {
        matches!(self, Self::Premium | Self::Admin)
    }

    /// The lowercase name stored in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Member => "member",
            Self::Premium => "premium",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guest" => Ok(Self::Guest),
            "member" => Ok(Self::Member),
            "premium" => Ok(Self::Premium),
            "admin" => Ok(Self::Admin),
            _ => Err(Error::InvalidRole(s.to_string())),
        }
    }
}

/// A finalized flight, as stored in the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecord {
    /// Row id, assigned by storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Session id of the tracked aircraft.
    pub session_id: String,
    /// Callsign.
    pub callsign: String,
    /// Aircraft type designator.
    pub aircraft_type: String,
    /// Airline flight number.
    pub flight_number: String,
    /// Departure airport.
    pub departure: String,
    /// Arrival airport.
    pub arrival: String,
    /// External identity of the reporter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter: Option<String>,
    /// Opaque route data as last reported.
    pub route: Value,
    /// Flight path, oldest first.
    pub path: Vec<PathPoint>,
    /// When the session left the ground.
    pub takeoff_time: Option<DateTime<Utc>>,
    /// Time of the last report before eviction.
    pub ended_at: DateTime<Utc>,
    /// BLAKE3 hash of session, takeoff and path, used for deduplication.
    pub content_hash: String,
}

impl FlightRecord {
    /// Build an archive entry from an evicted record.
    #[must_use]
    pub fn from_expired(record: &PositionRecord) -> Self {
        let path: Vec<PathPoint> = record.flight_path.iter().copied().collect();
        let content_hash = Self::compute_hash(&record.id, record.takeoff_time, &path);
        Self {
            id: None,
            session_id: record.id.clone(),
            callsign: record.callsign.clone(),
            aircraft_type: record.aircraft_type.clone(),
            flight_number: record.flight_number.clone(),
            departure: record.departure.clone(),
            arrival: record.arrival.clone(),
            reporter: record.reporter.clone(),
            route: record.flight_plan_raw.clone(),
            path,
            takeoff_time: record.takeoff_time,
            ended_at: record.last_updated_at,
            content_hash,
        }
    }

    /// Hash the fields that identify one flight.
    #[must_use]
    pub fn compute_hash(
        session_id: &str,
        takeoff_time: Option<DateTime<Utc>>,
        path: &[PathPoint],
    ) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(session_id.as_bytes());
        hasher.update(&[0]);
        if let Some(takeoff) = takeoff_time {
            hasher.update(takeoff.to_rfc3339().as_bytes());
        }
        hasher.update(&[0]);
        for point in path {
            hasher.update(&point.lat().to_le_bytes());
            hasher.update(&point.lon().to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Number of points in the path.
    #[must_use]
    pub fn path_len(&self) -> usize {
        self.path.len()
    }

    /// Time between takeoff and the last report.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.takeoff_time.map(|t| self.ended_at - t)
    }
}
