//! Server-sent event stream of store snapshots.
//!
//! Each viewer gets the current snapshot immediately, then one event per
//! store mutation. Event ids carry the snapshot version. A viewer that
//! falls behind the broadcast buffer skips the snapshots it missed.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use super::AppState;
use crate::store::StoreSnapshot;

/// Logs when a viewer's stream is dropped.
struct Disconnect;

impl Drop for Disconnect {
    fn drop(&mut self) {
        debug!("Stream viewer disconnected");
    }
}

/// `GET /api/aircraft/stream`
pub async fn stream_aircraft(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe before taking the initial snapshot so nothing falls in between.
    let updates = state.store().subscribe().into_inner();
    let initial = state.store().snapshot();
    let since = initial.version;

    info!(
        aircraft = initial.len(),
        viewers = state.store().subscriber_count(),
        "Stream viewer connected"
    );

    let first = stream::iter(snapshot_event(&initial).map(Ok::<_, Infallible>));
    let guard = Disconnect;
    let rest = BroadcastStream::new(updates).filter_map(move |message| {
        let _alive = &guard;
        let event = match message {
            Ok(snapshot) if snapshot.version > since => snapshot_event(&snapshot),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                debug!(skipped, "Stream viewer lagged, skipping ahead");
                None
            }
        };
        std::future::ready(event.map(Ok))
    });

    let heartbeat = KeepAlive::new()
        .interval(state.config().heartbeat_interval())
        .text("heartbeat");

    Sse::new(first.chain(rest).take_until(state.shutdown_signal())).keep_alive(heartbeat)
}

fn snapshot_event(snapshot: &StoreSnapshot) -> Option<Event> {
    match snapshot.to_json() {
        Ok(json) => Some(Event::default().id(snapshot.version.to_string()).data(json)),
        Err(e) => {
            warn!(version = snapshot.version, error = %e, "Failed to serialize snapshot");
            None
        }
    }
}
