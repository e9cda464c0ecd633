//! Emergency squawk incidents.
//!
//! The store records an [`IncidentEvent`] whenever an aircraft enters one of
//! the emergency transponder codes. Events live in an [`IncidentLog`], a
//! ring buffer bounded both by count and by a trailing time window.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An emergency transponder code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyCode {
    /// 7500, unlawful interference.
    Hijack,
    /// 7600, lost communications.
    RadioFailure,
    /// 7700, general emergency.
    Emergency,
}

impl EmergencyCode {
    /// Classify a squawk, ignoring surrounding whitespace.
    #[must_use]
    pub fn from_squawk(squawk: &str) -> Option<Self> {
        match squawk.trim() {
            "7500" => Some(Self::Hijack),
            "7600" => Some(Self::RadioFailure),
            "7700" => Some(Self::Emergency),
            _ => None,
        }
    }

    /// The four-digit code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Hijack => "7500",
            Self::RadioFailure => "7600",
            Self::Emergency => "7700",
        }
    }
}

impl std::fmt::Display for EmergencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hijack => write!(f, "hijack"),
            Self::RadioFailure => write!(f, "radio_failure"),
            Self::Emergency => write!(f, "emergency"),
        }
    }
}

/// One emergency squawk observed on ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentEvent {
    /// Session id of the aircraft.
    pub id: String,
    /// Callsign at the time of the incident.
    pub callsign: String,
    /// Flight number at the time of the incident.
    pub flight_number: String,
    /// The squawk as reported.
    pub squawk: String,
    /// Classification of the squawk.
    pub kind: EmergencyCode,
    /// Server time the incident was observed.
    pub timestamp: DateTime<Utc>,
}

/// Time-windowed ring buffer of incidents, oldest at the front.
#[derive(Debug)]
pub struct IncidentLog {
    window: Duration,
    capacity: usize,
    events: Mutex<VecDeque<IncidentEvent>>,
}

impl IncidentLog {
    /// Create a log that keeps at most `capacity` events no older than `window`.
    #[must_use]
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity: capacity.max(1),
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Append an event, evicting the oldest once over capacity.
    pub fn record(&self, event: IncidentEvent) {
        let mut events = self.lock();
        tracing::warn!(
            id = %event.id,
            callsign = %event.callsign,
            squawk = %event.squawk,
            kind = %event.kind,
            "Emergency squawk"
        );
        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
        }
    }

    /// Events still inside the window at `now`, newest first.
    ///
    /// Expired events are evicted as a side effect.
    pub fn recent(&self, now: DateTime<Utc>) -> Vec<IncidentEvent> {
        let mut events = self.lock();
        Self::evict_expired(&mut events, self.cutoff(now));
        events.iter().rev().cloned().collect()
    }

    /// Drop events older than the window. Returns how many were removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut events = self.lock();
        Self::evict_expired(&mut events, self.cutoff(now))
    }

    /// Number of retained events, including any not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the log holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::MAX);
        now.checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn evict_expired(events: &mut VecDeque<IncidentEvent>, cutoff: DateTime<Utc>) -> usize {
        let before = events.len();
        // Events are appended in observation order, so the front is always oldest.
        while events.front().is_some_and(|e| e.timestamp < cutoff) {
            events.pop_front();
        }
        before - events.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<IncidentEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
