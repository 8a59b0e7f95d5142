//! Playback session endpoints.
//!
//! The video player posts every `timeupdate`; the response says whether the
//! aligned telemetry sample changed so the client can skip redundant renders.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use fleet_core::{PlaybackView, PlaybackWindow};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub vehicle_id: String,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize)]
pub struct TimeUpdateRequest {
    pub current_time: f64,
    pub duration: f64,
}

#[derive(Debug, Serialize)]
pub struct TimeUpdateResponse {
    pub changed: bool,
    pub view: PlaybackView,
}

fn not_found(session_id: &str) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("unknown playback session {}", session_id) })),
    )
        .into_response()
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    if request.vehicle_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "vehicle_id is required" })),
        )
            .into_response();
    }

    let session_id = state.open_playback(
        request.vehicle_id.trim(),
        PlaybackWindow::new(request.start, request.end),
    );
    (
        StatusCode::CREATED,
        Json(json!({ "session_id": session_id })),
    )
        .into_response()
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let Some(session) = state.playback(&session_id) else {
        return not_found(&session_id);
    };
    let view = session.lock().await.view();
    Json(view).into_response()
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    if state.close_playback(&session_id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        not_found(&session_id)
    }
}

pub async fn time_update(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(request): Json<TimeUpdateRequest>,
) -> impl IntoResponse {
    let Some(session) = state.playback(&session_id) else {
        return not_found(&session_id);
    };

    // Ticks for one session are serialized here, so the range loads once
    // even if the player posts several updates while it is in flight.
    let mut session = session.lock().await;
    let changed = session
        .on_timeupdate(request.current_time, request.duration)
        .await
        .is_some();
    Json(TimeUpdateResponse {
        changed,
        view: session.view(),
    })
    .into_response()
}
