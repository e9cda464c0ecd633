//! Core position types for skyradar.
//!
//! This module defines the live state kept for each tracked aircraft
//! session and the validated update that is merged into it.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::incident::EmergencyCode;

/// One recorded point of a flight path, serialized as `[lat, lon]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint(pub f64, pub f64);

impl PathPoint {
    /// Latitude in degrees.
    #[must_use]
    pub fn lat(&self) -> f64 {
        self.0
    }

    /// Longitude in degrees.
    #[must_use]
    pub fn lon(&self) -> f64 {
        self.1
    }
}

/// Rules applied when merging an update into a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPolicy {
    /// Maximum number of points kept in a flight path.
    pub path_cap: usize,
    /// Altitude above ground (feet) above which an aircraft counts as airborne.
    pub airborne_agl_ft: f64,
}

impl Default for TrackPolicy {
    fn default() -> Self {
        Self {
            path_cap: 500,
            airborne_agl_ft: 50.0,
        }
    }
}

/// A validated position report, ready to be merged into the store.
///
/// Built from the wire format by [`crate::ingest::PositionReport::into_update`],
/// or directly by callers that already hold typed data.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    /// Callsign as reported.
    pub callsign: String,
    /// External identity of the reporting user, if known.
    pub reporter: Option<String>,
    /// Aircraft type designator.
    pub aircraft_type: String,
    /// Airline flight number.
    pub flight_number: String,
    /// Departure airport.
    pub departure: String,
    /// Arrival airport.
    pub arrival: String,
    /// Transponder code.
    pub squawk: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Altitude above ground level in feet.
    pub altitude_agl: f64,
    /// Altitude above mean sea level in feet.
    pub altitude_msl: f64,
    /// Heading in degrees.
    pub heading: f64,
    /// Ground speed in knots.
    pub speed: f64,
    /// Vertical speed in feet per minute.
    pub vertical_speed: Option<f64>,
    /// Opaque route data, passed through untouched.
    pub flight_plan_raw: Value,
    /// Takeoff time claimed by the reporter.
    pub takeoff_time: Option<DateTime<Utc>>,
}

impl PositionUpdate {
    /// Create an update with the required fields and defaults for the rest.
    #[must_use]
    pub fn new(callsign: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            callsign: callsign.into(),
            reporter: None,
            aircraft_type: String::new(),
            flight_number: String::new(),
            departure: String::new(),
            arrival: String::new(),
            squawk: String::new(),
            lat,
            lon,
            altitude_agl: 0.0,
            altitude_msl: 0.0,
            heading: 0.0,
            speed: 0.0,
            vertical_speed: None,
            flight_plan_raw: Value::Array(Vec::new()),
            takeoff_time: None,
        }
    }

    /// Check the fields the store relies on.
    ///
    /// # Errors
    ///
    /// Returns an error if the callsign is blank or a coordinate is not finite.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.callsign.trim().is_empty() {
            return Err(ValidationError::MissingCallsign);
        }
        if !self.lat.is_finite() {
            return Err(ValidationError::NonFiniteCoordinate { field: "lat" });
        }
        if !self.lon.is_finite() {
            return Err(ValidationError::NonFiniteCoordinate { field: "lon" });
        }
        Ok(())
    }

    /// The reported position as a path point.
    #[must_use]
    pub fn point(&self) -> PathPoint {
        PathPoint(self.lat, self.lon)
    }
}

/// Last-known state of one tracked aircraft session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    /// Session identity.
    pub id: String,
    /// Callsign.
    pub callsign: String,
    /// External identity of the reporting user. Never published.
    #[serde(skip)]
    pub reporter: Option<String>,
    /// Aircraft type designator.
    pub aircraft_type: String,
    /// Airline flight number.
    pub flight_number: String,
    /// Departure airport.
    pub departure: String,
    /// Arrival airport.
    pub arrival: String,
    /// Transponder code.
    pub squawk: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Altitude above ground level in feet.
    #[serde(rename = "altitudeAGL")]
    pub altitude_agl: f64,
    /// Altitude above mean sea level in feet.
    #[serde(rename = "altitudeMSL")]
    pub altitude_msl: f64,
    /// Heading in degrees.
    pub heading: f64,
    /// Ground speed in knots.
    pub speed: f64,
    /// Vertical speed in feet per minute.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub vertical_speed: Option<f64>,
    /// Opaque route data.
    pub flight_plan_raw: Value,
    /// When this session first left the ground.
    #[serde(rename = "takeoffTimeUTC")]
    pub takeoff_time: Option<DateTime<Utc>>,
    /// Server time of the most recent report.
    pub last_updated_at: DateTime<Utc>,
    /// Recent positions, oldest first.
    pub flight_path: VecDeque<PathPoint>,
}

impl PositionRecord {
    /// Create a record from its first update.
    #[must_use]
    pub fn from_update(
        id: impl Into<String>,
        update: &PositionUpdate,
        now: DateTime<Utc>,
        policy: &TrackPolicy,
    ) -> Self {
        let mut record = Self {
            id: id.into(),
            callsign: String::new(),
            reporter: None,
            aircraft_type: String::new(),
            flight_number: String::new(),
            departure: String::new(),
            arrival: String::new(),
            squawk: String::new(),
            lat: update.lat,
            lon: update.lon,
            altitude_agl: 0.0,
            altitude_msl: 0.0,
            heading: 0.0,
            speed: 0.0,
            vertical_speed: None,
            flight_plan_raw: Value::Array(Vec::new()),
            takeoff_time: None,
            last_updated_at: now,
            flight_path: VecDeque::new(),
        };
        record.apply(update, now, policy);
        record
    }

    /// Merge an update into this record.
    ///
    /// Scalar fields are replaced wholesale, the flight path grows only when
    /// the position moved, and `last_updated_at` never goes backwards.
    pub fn apply(&mut self, update: &PositionUpdate, now: DateTime<Utc>, policy: &TrackPolicy) {
        self.callsign.clone_from(&update.callsign);
        if update.reporter.is_some() {
            self.reporter.clone_from(&update.reporter);
        }
        self.aircraft_type.clone_from(&update.aircraft_type);
        self.flight_number.clone_from(&update.flight_number);
        self.departure.clone_from(&update.departure);
        self.arrival.clone_from(&update.arrival);
        self.squawk.clone_from(&update.squawk);
        self.lat = update.lat;
        self.lon = update.lon;
        self.altitude_agl = update.altitude_agl;
        self.altitude_msl = update.altitude_msl;
        self.heading = update.heading;
        self.speed = update.speed;
        self.vertical_speed = update.vertical_speed;
        self.flight_plan_raw.clone_from(&update.flight_plan_raw);

        if now > self.last_updated_at {
            self.last_updated_at = now;
        }

        if self.takeoff_time.is_none() {
            if update.takeoff_time.is_some() {
                self.takeoff_time = update.takeoff_time;
            } else if self.is_airborne(policy.airborne_agl_ft) {
                self.takeoff_time = Some(self.last_updated_at);
            }
        }

        self.push_path_point(update.point(), policy.path_cap);
    }

    /// Append a point unless it repeats the last one, dropping the oldest
    /// points beyond `cap`.
    ///
    /// Returns `true` if the point was appended.
    pub fn push_path_point(&mut self, point: PathPoint, cap: usize) -> bool {
        if self.flight_path.back() == Some(&point) {
            return false;
        }
        self.flight_path.push_back(point);
        while self.flight_path.len() > cap {
            self.flight_path.pop_front();
        }
        true
    }

    /// Whether the aircraft is above the airborne threshold.
    #[must_use]
    pub fn is_airborne(&self, airborne_agl_ft: f64) -> bool {
        self.altitude_agl > airborne_agl_ft
    }

    /// Whether the record has gone without a report for longer than `timeout`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(self.last_updated_at) > timeout
    }

    /// The emergency this record is squawking, if any.
    #[must_use]
    pub fn emergency(&self) -> Option<EmergencyCode> {
        EmergencyCode::from_squawk(&self.squawk)
    }

    /// Number of points in the flight path.
    #[must_use]
    pub fn path_len(&self) -> usize {
        self.flight_path.len()
    }
}
