//! `SQLite` schema for the flight history archive.

/// Archived flights, one row per finalized session.
pub const CREATE_FLIGHTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS flights (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    callsign TEXT NOT NULL,
    aircraft_type TEXT NOT NULL DEFAULT '',
    flight_number TEXT NOT NULL DEFAULT '',
    departure TEXT NOT NULL DEFAULT '',
    arrival TEXT NOT NULL DEFAULT '',
    reporter TEXT,
    route TEXT NOT NULL DEFAULT '[]',
    path TEXT NOT NULL,
    path_points INTEGER NOT NULL,
    takeoff_time TEXT,
    ended_at TEXT NOT NULL,
    content_hash TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// Newest-first listing.
pub const CREATE_ENDED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_flights_ended ON flights(ended_at DESC)
";

/// Lookup by callsign.
pub const CREATE_CALLSIGN_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_flights_callsign ON flights(callsign COLLATE NOCASE)
";

/// Lookup by reporter.
pub const CREATE_REPORTER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_flights_reporter ON flights(reporter)
";

/// Entitlement roles keyed by external identity.
pub const CREATE_USERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS users (
    identity TEXT PRIMARY KEY,
    role TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_FLIGHTS_TABLE,
    CREATE_ENDED_INDEX,
    CREATE_CALLSIGN_INDEX,
    CREATE_REPORTER_INDEX,
    CREATE_USERS_TABLE,
    CREATE_METADATA_TABLE,
];
