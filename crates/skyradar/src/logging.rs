//! Logging configuration for skyradar.
//!
//! Sets up the tracing subscriber used by the server, the reaper and the CLI.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How chatty the service is, as picked by `-q` and `-v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Connections, reaper sweeps and archived flights.
    #[default]
    Normal,
    /// Every accepted report and evicted session.
    Verbose,
    /// Every store mutation.
    Trace,
}

impl Verbosity {
    /// Level applied to skyradar's own targets.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

/// Filter directives used when `RUST_LOG` is unset.
///
/// Only skyradar follows `verbosity`; the HTTP stack stays at `warn`.
#[must_use]
pub fn default_directives(verbosity: Verbosity) -> String {
    format!(
        "skyradar={},axum=warn,tower=warn,hyper=warn",
        verbosity.to_level_filter()
    )
}

/// Install the global subscriber.
///
/// `RUST_LOG`, when set and valid, replaces [`default_directives`] entirely.
/// A second call is a no-op.
///
/// ```no_run
/// use skyradar::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .try_init();
}

/// Route `warn` and above into the test harness's captured output.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("skyradar=warn")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_to_level() {
        assert_eq!(Verbosity::Quiet.to_level_filter(), Level::ERROR);
        assert_eq!(Verbosity::Normal.to_level_filter(), Level::INFO);
        assert_eq!(Verbosity::Verbose.to_level_filter(), Level::DEBUG);
        assert_eq!(Verbosity::Trace.to_level_filter(), Level::TRACE);
    }

    #[test]
    fn test_verbosity_default() {
        assert_eq!(Verbosity::default(), Verbosity::Normal);
    }

    #[test]
    fn test_default_directives_scope_verbosity_to_skyradar() {
        let directives = default_directives(Verbosity::Trace);
        assert!(directives.starts_with("skyradar=TRACE"));
        assert!(directives.contains("axum=warn"));
        assert!(EnvFilter::try_new(&directives).is_ok());
        assert!(EnvFilter::try_new(default_directives(Verbosity::Quiet)).is_ok());
    }

    #[test]
    fn test_init_logging_is_repeatable() {
        init_logging(Verbosity::Quiet);
        init_logging(Verbosity::Trace);
        init_test_logging();
    }
}
