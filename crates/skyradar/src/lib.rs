//! `skyradar` - Live aircraft position store and radar broadcast service
//!
//! Flight simulator clients post position reports; the [`AircraftStore`]
//! keeps one live record per session, the [`Reaper`] evicts sessions that
//! stop reporting, and every change is streamed to connected viewers as a
//! full snapshot. Finished flights of entitled users are archived in `SQLite`.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod flight;
pub mod history;
pub mod incident;
pub mod ingest;
pub mod logging;
pub mod position;
pub mod reaper;
pub mod server;
pub mod storage;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result, ValidationError};
pub use flight::{FlightRecord, Role};
pub use history::{EntitlementLookup, FlightArchive, FlightFinalizer, SqliteHistory};
pub use incident::{EmergencyCode, IncidentEvent, IncidentLog};
pub use ingest::{AircraftId, PositionReport};
pub use logging::init_logging;
pub use position::{PathPoint, PositionRecord, PositionUpdate, TrackPolicy};
pub use reaper::{ExpiryHook, Reaper, ReaperHandle};
pub use server::AppState;
pub use storage::{Storage, StorageStats};
pub use store::{AircraftStore, StoreOptions, StoreSnapshot, Subscription};
