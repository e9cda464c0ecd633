//! Wire schema for inbound position reports.
//!
//! Reporters are independent client scripts that send loosely-typed JSON:
//! numbers arrive as strings, squawks arrive as numbers, optional fields go
//! missing. [`PositionReport`] accepts all of that, and
//! [`PositionReport::into_update`] is the single place where the payload is
//! checked and turned into a typed [`PositionUpdate`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::position::PositionUpdate;

/// Identity of one tracked session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AircraftId(String);

impl AircraftId {
    /// Derive an id from a callsign and the reporter that sent it.
    ///
    /// Two reporters flying the same callsign get distinct ids. Without a
    /// reporter the callsign alone is used.
    #[must_use]
    pub fn derive(callsign: &str, reporter: Option<&str>) -> Self {
        let callsign = callsign.trim();
        match reporter.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reporter) => Self(format!("{callsign}:{reporter}")),
            None => Self(callsign.to_string()),
        }
    }

    /// Use a caller-supplied id.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyId`] if the id is blank.
    pub fn explicit(id: &str) -> Result<Self, ValidationError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        Ok(Self(id.to_string()))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AircraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AircraftId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One position report as it arrives on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionReport {
    /// Explicit session id; derived from callsign and reporter when absent.
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub id: Option<String>,
    /// External identity of the reporting user.
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub reporter: Option<String>,
    /// Callsign; must be a non-empty string.
    #[serde(default)]
    pub callsign: Option<Value>,
    /// Latitude; must be a finite number.
    #[serde(default)]
    pub lat: Option<Value>,
    /// Longitude; must be a finite number.
    #[serde(default)]
    pub lon: Option<Value>,
    /// Altitude above ground level in feet.
    #[serde(default, rename = "altitudeAGL", deserialize_with = "lenient_f64")]
    pub altitude_agl: f64,
    /// Altitude above mean sea level in feet.
    #[serde(default, rename = "altitudeMSL", deserialize_with = "lenient_f64")]
    pub altitude_msl: f64,
    /// Heading in degrees.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub heading: f64,
    /// Ground speed in knots.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub speed: f64,
    /// Vertical speed in feet per minute.
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub vertical_speed: Option<f64>,
    /// Aircraft type designator.
    #[serde(default, deserialize_with = "lenient_string")]
    pub aircraft_type: String,
    /// Airline flight number.
    #[serde(default, deserialize_with = "lenient_string")]
    pub flight_number: String,
    /// Departure airport.
    #[serde(default, deserialize_with = "lenient_string")]
    pub departure: String,
    /// Arrival airport.
    #[serde(default, deserialize_with = "lenient_string")]
    pub arrival: String,
    /// Transponder code.
    #[serde(default, deserialize_with = "lenient_string")]
    pub squawk: String,
    /// Opaque route data.
    #[serde(default, alias = "flightPlan")]
    pub flight_plan_raw: Option<Value>,
    /// Takeoff time claimed by the reporter, RFC 3339.
    #[serde(default, rename = "takeoffTimeUTC")]
    pub takeoff_time: Option<Value>,
}

impl PositionReport {
    /// Parse a report from an arbitrary JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotAnObject`] unless `value` is an object.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        if !value.is_object() {
            return Err(ValidationError::NotAnObject);
        }
        serde_json::from_value(value).map_err(|_| ValidationError::NotAnObject)
    }

    /// Validate the report and convert it into a session id and update.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing the first problem found.
    pub fn into_update(
        self,
        require_reporter: bool,
    ) -> Result<(AircraftId, PositionUpdate), ValidationError> {
        let callsign = match &self.callsign {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Err(ValidationError::MissingCallsign),
        };
        let lat = coordinate(self.lat.as_ref(), "lat")?;
        let lon = coordinate(self.lon.as_ref(), "lon")?;

        let reporter = self
            .reporter
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if require_reporter && reporter.is_none() {
            return Err(ValidationError::MissingReporter);
        }

        let id = match self.id.as_deref() {
            Some(explicit) => AircraftId::explicit(explicit)?,
            None => AircraftId::derive(&callsign, reporter.as_deref()),
        };

        let takeoff_time = match self.takeoff_time {
            Some(Value::String(raw)) if !raw.trim().is_empty() => Some(
                DateTime::parse_from_rfc3339(raw.trim())
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|_| ValidationError::InvalidTimestamp {
                        field: "takeoffTimeUTC",
                        value: raw,
                    })?,
            ),
            _ => None,
        };

        let update = PositionUpdate {
            callsign,
            reporter,
            aircraft_type: self.aircraft_type,
            flight_number: self.flight_number,
            departure: self.departure,
            arrival: self.arrival,
            squawk: self.squawk.trim().to_string(),
            lat,
            lon,
            altitude_agl: self.altitude_agl,
            altitude_msl: self.altitude_msl,
            heading: self.heading,
            speed: self.speed,
            vertical_speed: self.vertical_speed,
            flight_plan_raw: match self.flight_plan_raw {
                None | Some(Value::Null) => Value::Array(Vec::new()),
                Some(raw) => raw,
            },
            takeoff_time,
        };
        Ok((id, update))
    }
}

fn coordinate(value: Option<&Value>, field: &'static str) -> Result<f64, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::MissingCoordinate { field }),
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or(ValidationError::NonFiniteCoordinate { field }),
        Some(_) => Err(ValidationError::NonFiniteCoordinate { field }),
    }
}

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(number(&Value::deserialize(deserializer)?).unwrap_or(0.0))
}

fn lenient_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(number(&Value::deserialize(deserializer)?))
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(text(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(text(Value::deserialize(deserializer)?))
}
