//! REST API routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use crate::api::{playback, ws};
use crate::state::AppState;

/// Create the API router.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        // Live fleet
        .route("/v1/fleet", get(list_fleet))
        .route("/v1/fleet", delete(clear_fleet))
        .route("/v1/fleet/active", get(list_active))
        .route("/v1/fleet/:vehicle_id", delete(remove_vehicle))
        // Geofence events
        .route("/v1/geoevents", get(list_geoevents))
        .route("/v1/geoevents/counters", get(geoevent_counters))
        .route("/v1/geoevents/read", post(mark_geoevents_read))
        // Smoothed markers
        .route("/v1/markers", get(list_markers))
        .route("/v1/stream", get(ws::ws_handler))
        // Playback
        .route("/v1/playback/sessions", post(playback::create_session))
        .route("/v1/playback/sessions/:session_id", get(playback::get_session))
        .route("/v1/playback/sessions/:session_id", delete(playback::delete_session))
        .route(
            "/v1/playback/sessions/:session_id/timeupdate",
            post(playback::time_update),
        )
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let counts = state.fleet_counts(Utc::now());
    Json(json!({
        "status": "ok",
        "transport": state.transport_status(),
        "vehicles": counts.vehicles,
        "active_vehicles": counts.active,
        "alerts_received": state.alerts_received(),
        "dispatcher": state.dispatcher().stats(),
        "playback_sessions": state.playback_count(),
    }))
}

async fn list_fleet(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.fleet_snapshot(Utc::now()))
}

async fn list_active(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.active_fleet(Utc::now()))
}

async fn remove_vehicle(
    State(state): State<Arc<AppState>>,
    Path(vehicle_id): Path<String>,
) -> impl IntoResponse {
    if state.remove_vehicle(&vehicle_id) {
        tracing::info!(vehicle_id = %vehicle_id, "vehicle removed by operator");
        StatusCode::NO_CONTENT.into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown vehicle {}", vehicle_id) })),
        )
            .into_response()
    }
}

async fn clear_fleet(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cleared = state.clear_fleet();
    tracing::info!(cleared, "fleet cleared by operator");
    Json(json!({ "cleared": cleared }))
}

#[derive(Debug, Deserialize, Default)]
struct GeoEventQuery {
    vehicle_id: Option<String>,
}

async fn list_geoevents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GeoEventQuery>,
) -> impl IntoResponse {
    let vehicle_id = query.vehicle_id.as_deref().filter(|id| !id.is_empty());
    Json(state.geoevents(vehicle_id))
}

async fn geoevent_counters(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.geofence_counters())
}

async fn mark_geoevents_read(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.mark_geoevents_read())
}

async fn list_markers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.marker_positions(Instant::now()))
}
