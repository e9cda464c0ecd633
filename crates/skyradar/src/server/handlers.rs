//! Request handlers for the aircraft and incident routes.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::AppState;
use crate::error::{Error, Result};
use crate::incident::IncidentEvent;
use crate::ingest::PositionReport;

/// Acknowledgement for an accepted report.
#[derive(Debug, Serialize)]
pub struct IngestAck {
    success: bool,
    id: String,
    timestamp: DateTime<Utc>,
}

/// `POST /api/aircraft`
pub async fn ingest(State(state): State<AppState>, body: Bytes) -> Result<Json<IngestAck>> {
    let value: Value = serde_json::from_slice(&body)?;
    let require_reporter = state.config().tracker.require_reporter;
    let (id, update) = PositionReport::from_value(value)?.into_update(require_reporter)?;

    let record = state.store().upsert(id.as_str(), &update)?;
    debug!(id = %id, path = record.path_len(), "Accepted position report");

    Ok(Json(IngestAck {
        success: true,
        id: id.to_string(),
        timestamp: state.store().clock().now(),
    }))
}

/// Filters for the snapshot listing.
#[derive(Debug, Default, Deserialize)]
pub struct AircraftQuery {
    id: Option<String>,
    callsign: Option<String>,
}

/// `GET /api/aircraft[?id=..|callsign=..]`
pub async fn list_aircraft(
    State(state): State<AppState>,
    Query(query): Query<AircraftQuery>,
) -> Result<Response> {
    let id = query.id.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let callsign = query
        .callsign
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let snapshot = state.store().snapshot();
    let payload = snapshot.payload_where(|r| {
        id.is_none_or(|id| r.id == id)
            && callsign.is_none_or(|cs| r.callsign.eq_ignore_ascii_case(cs))
    });

    if payload.count == 0 {
        if let Some(wanted) = id.or(callsign) {
            return Err(Error::NotFound(wanted.to_string()));
        }
    }

    Ok(Json(payload).into_response())
}

/// `DELETE /api/aircraft/{id}`
pub async fn remove_aircraft(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<Value> {
    let removed = state.store().remove(&id);
    Json(json!({ "removed": removed }))
}

/// Incident listing.
#[derive(Debug, Serialize)]
pub struct IncidentList {
    count: usize,
    incidents: Vec<IncidentEvent>,
    timestamp: DateTime<Utc>,
}

/// `GET /api/incidents`
pub async fn list_incidents(State(state): State<AppState>) -> Json<IncidentList> {
    let incidents = state.store().recent_incidents();
    Json(IncidentList {
        count: incidents.len(),
        incidents,
        timestamp: state.store().clock().now(),
    })
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let store = state.store();
    Json(json!({
        "status": "ok",
        "aircraft": store.len(),
        "subscribers": store.subscriber_count(),
        "version": store.version(),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::server::{router, AppState};

    fn create_test_state() -> AppState {
        AppState::from_config(Config::default(), Arc::new(ManualClock::default()))
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post(body: &str) -> Request<Body> {
        Request::post("/api/aircraft")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_accepts_report() {
        let state = create_test_state();
        let (status, body) = send(
            &state,
            post(r#"{"callsign":"DAL1","reporter":"p","lat":33.6,"lon":-84.4,"altitudeAGL":"1200"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["id"], "DAL1:p");
        assert!(body["timestamp"].is_string());

        let record = state.store().get("DAL1:p").unwrap();
        assert_eq!(record.altitude_agl, 1200.0);
    }

    #[tokio::test]
    async fn test_ingest_rejects_without_mutation() {
        let state = create_test_state();
        send(&state, post(r#"{"callsign":"DAL1","lat":10.0,"lon":20.0}"#)).await;
        let version = state.store().version();

        let (status, body) = send(&state, post(r#"{"callsign":"DAL1","lat":"abc","lon":20.0}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("lat"));

        let (status, _) = send(&state, post(r#"{"lat":10.0,"lon":20.0}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&state, post("not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        assert_eq!(state.store().version(), version);
        assert_eq!(state.store().get("DAL1").unwrap().lat, 10.0);
    }

    #[tokio::test]
    async fn test_ingest_requires_reporter_when_configured() {
        let mut config = Config::default();
        config.tracker.require_reporter = true;
        let state = AppState::from_config(config, Arc::new(ManualClock::default()));

        let (status, body) = send(&state, post(r#"{"callsign":"DAL1","lat":1.0,"lon":2.0}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("reporter"));
        assert!(state.store().is_empty());
    }

    #[tokio::test]
    async fn test_list_and_filter() {
        let state = create_test_state();
        send(&state, post(r#"{"callsign":"DAL1","lat":1.0,"lon":2.0}"#)).await;
        send(&state, post(r#"{"callsign":"UAL2","lat":3.0,"lon":4.0}"#)).await;

        let (status, body) = send(&state, get("/api/aircraft")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["aircraft"].as_array().unwrap().len(), 2);

        let (status, body) = send(&state, get("/api/aircraft?callsign=ual2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["aircraft"][0]["callsign"], "UAL2");

        let (status, body) = send(&state, get("/api/aircraft?id=DAL1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["aircraft"][0]["id"], "DAL1");

        let (status, body) = send(&state, get("/api/aircraft?id=AAL9")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_empty_listing_is_not_an_error() {
        let state = create_test_state();
        let (status, body) = send(&state, get("/api/aircraft")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let state = create_test_state();
        send(&state, post(r#"{"callsign":"DAL1","lat":1.0,"lon":2.0}"#)).await;

        let delete = || Request::delete("/api/aircraft/DAL1").body(Body::empty()).unwrap();
        let (status, body) = send(&state, delete()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], true);

        let (_, body) = send(&state, delete()).await;
        assert_eq!(body["removed"], false);
    }

    #[tokio::test]
    async fn test_incidents_endpoint() {
        let state = create_test_state();
        send(&state, post(r#"{"callsign":"UAL9","lat":1.0,"lon":2.0,"squawk":7700}"#)).await;
        send(&state, post(r#"{"callsign":"N1","lat":1.0,"lon":2.0,"squawk":"1200"}"#)).await;

        let (status, body) = send(&state, get("/api/incidents")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["incidents"][0]["callsign"], "UAL9");
        assert_eq!(body["incidents"][0]["squawk"], "7700");
        assert_eq!(body["incidents"][0]["kind"], "emergency");
    }

    #[tokio::test]
    async fn test_health() {
        let state = create_test_state();
        let (status, body) = send(&state, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["aircraft"], 0);
    }
}
