//! HTTP surface of skyradar.
//!
//! [`AppState`] is the composition root shared by every handler. [`router`]
//! wires the routes and [`run`] assembles a full service from configuration:
//! store, reaper, history archive and listener.

mod handlers;
mod stream;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{delete, get};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::history::{FlightFinalizer, SqliteHistory};
use crate::reaper::{ExpiryHook, NoopExpiry, Reaper};
use crate::storage::Storage;
use crate::store::{AircraftStore, StoreOptions};

/// Shared state handed to every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    store: Arc<AircraftStore>,
    config: Arc<Config>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    /// Create state around an existing store.
    #[must_use]
    pub fn new(store: Arc<AircraftStore>, config: Config) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            config: Arc::new(config),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Create state with a fresh store built from `config`.
    #[must_use]
    pub fn from_config(config: Config, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(AircraftStore::new(clock, StoreOptions::from_config(&config)));
        Self::new(store, config)
    }

    /// The live aircraft store.
    #[must_use]
    pub fn store(&self) -> &Arc<AircraftStore> {
        &self.store
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// End every open stream so the server can drain.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Resolves once [`Self::begin_shutdown`] has been called.
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown.subscribe();
        async move {
            // An error means the sender is gone, which is also a shutdown.
            let _ = rx.wait_for(|stopping| *stopping).await;
        }
    }
}

/// Build the router for all API routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/aircraft",
            get(handlers::list_aircraft).post(handlers::ingest),
        )
        .route("/api/aircraft/stream", get(stream::stream_aircraft))
        .route("/api/aircraft/{id}", delete(handlers::remove_aircraft))
        .route("/api/incidents", get(handlers::list_incidents))
        .route("/health", get(handlers::health))
        .with_state(state)
}

/// Serve `state` on `listener` until `signal` resolves.
///
/// # Errors
///
/// Returns an error if the listener fails.
pub async fn serve<F>(state: AppState, listener: TcpListener, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let draining = state.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            signal.await;
            info!("Shutting down, closing streams");
            draining.begin_shutdown();
        })
        .await?;
    Ok(())
}

/// Run the complete service until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the history database cannot be opened or the listener
/// cannot be bound.
pub async fn run(config: Config, bind: SocketAddr) -> Result<()> {
    config.validate()?;

    let state = AppState::from_config(config, Arc::new(SystemClock));
    let config = state.config();

    let hook: Arc<dyn ExpiryHook> = if config.history.enabled {
        let storage = Storage::open(config.database_path())?;
        let history = Arc::new(SqliteHistory::new(storage));
        Arc::new(FlightFinalizer::new(
            history.clone(),
            history,
            config.history.min_path_points,
        ))
    } else {
        info!("Flight history disabled");
        Arc::new(NoopExpiry)
    };

    let reaper = Reaper::new(
        Arc::clone(state.store()),
        hook,
        config.stale_timeout(),
        config.reap_interval(),
    )
    .spawn();

    let listener = TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "skyradar listening");

    let result = serve(state, listener, ctrl_c()).await;
    reaper.shutdown().await?;
    result
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
