//! Error types for skyradar.
//!
//! This module defines all error types used throughout the skyradar crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Reasons a position report is rejected at the ingest boundary.
///
/// Validation always happens before the store is touched, so a rejected
/// report never leaves partially-applied state behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The report body was not a JSON object.
    #[error("position report must be a JSON object")]
    NotAnObject,

    /// The callsign was missing, empty, or not a string.
    #[error("callsign is required and must be a non-empty string")]
    MissingCallsign,

    /// A required coordinate was missing.
    #[error("{field} is required")]
    MissingCoordinate {
        /// Name of the coordinate field.
        field: &'static str,
    },

    /// A required coordinate was present but not a finite number.
    #[error("{field} must be a finite number")]
    NonFiniteCoordinate {
        /// Name of the coordinate field.
        field: &'static str,
    },

    /// A reporter identity is required by configuration but was not supplied.
    #[error("reporter is required to derive a session id")]
    MissingReporter,

    /// An explicitly supplied id was empty.
    #[error("id must not be empty when supplied")]
    EmptyId,

    /// A timestamp field could not be parsed.
    #[error("{field} is not a valid RFC 3339 timestamp: {value}")]
    InvalidTimestamp {
        /// Name of the timestamp field.
        field: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// The main error type for skyradar operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Ingest Errors ===
    /// A position report failed validation.
    #[error("invalid position report: {0}")]
    Validation(#[from] ValidationError),

    /// The requested aircraft is not tracked.
    #[error("aircraft not found: {0}")]
    NotFound(String),

    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// A persistence collaborator failed; the caller may retry later.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// A role name did not match any known role.
    #[error("unknown role: {0} (expected guest, member, premium or admin)")]
    InvalidRole(String),

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Streaming Errors ===
    /// A snapshot subscription was closed because the store went away.
    #[error("subscription closed")]
    SubscriptionClosed,

    // === I/O Errors ===
    /// File system or socket operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for skyradar operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("background task failed: {err}"))
    }
}

impl Error {
    /// Create a new persistence error.
    #[must_use]
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is an ingest validation failure.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this error came from the persistence layer.
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_)
                | Self::DatabaseOpen { .. }
                | Self::DatabaseQuery(_)
                | Self::DatabaseMigration { .. }
        )
    }

    /// HTTP status code this error maps to.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Json(_) | Self::InvalidRole(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::SubscriptionClosed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}
