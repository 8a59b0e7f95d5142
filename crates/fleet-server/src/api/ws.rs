//! WebSocket streaming of smoothed marker positions.
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use fleet_core::MarkerFrame;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Handler for WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsQuery>,
) -> axum::response::Response {
    let vehicle_filter = params.vehicle_id.filter(|id| !id.is_empty());
    ws.on_upgrade(move |socket| handle_socket(socket, state, vehicle_filter))
        .into_response()
}

#[derive(Debug, Deserialize, Default)]
pub struct WsQuery {
    vehicle_id: Option<String>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamMessage<'a> {
    /// Every marker's drawn position, sent once on connect
    Snapshot { markers: &'a [MarkerFrame] },
    /// Markers that moved in the last frame
    Frame { markers: &'a [MarkerFrame] },
}

fn filtered(frames: &[MarkerFrame], vehicle_filter: Option<&str>) -> Vec<MarkerFrame> {
    match vehicle_filter {
        Some(vehicle_id) => frames
            .iter()
            .filter(|frame| frame.vehicle_id == vehicle_id)
            .cloned()
            .collect(),
        None => frames.to_vec(),
    }
}

async fn send_json(socket: &mut WebSocket, message: &StreamMessage<'_>) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => socket.send(Message::Text(text)).await.is_ok(),
        Err(err) => {
            tracing::warn!(error = %err, "failed to encode marker message");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, vehicle_filter: Option<String>) {
    let mut rx = state.tx.subscribe();

    let snapshot = filtered(&state.marker_positions(Instant::now()), vehicle_filter.as_deref());
    if !send_json(&mut socket, &StreamMessage::Snapshot { markers: &snapshot }).await {
        return;
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
            batch = rx.recv() => {
                match batch {
                    Ok(batch) => {
                        let markers = filtered(&batch, vehicle_filter.as_deref());
                        if markers.is_empty() {
                            continue;
                        }
                        if !send_json(&mut socket, &StreamMessage::Frame { markers: &markers }).await {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        // Drop missed frames; the next one carries current positions.
                        continue;
                    }
                    Err(_) => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{LatLng, MarkerPhase};

    fn frame(vehicle_id: &str) -> MarkerFrame {
        MarkerFrame {
            vehicle_id: vehicle_id.to_string(),
            position: LatLng::new(1.0, 2.0),
            phase: MarkerPhase::Animating,
        }
    }

    #[test]
    fn filter_keeps_requested_vehicle() {
        let frames = vec![frame("D1"), frame("D2")];
        assert_eq!(filtered(&frames, Some("D2")).len(), 1);
        assert_eq!(filtered(&frames, None).len(), 2);
    }

    #[test]
    fn stream_message_is_tagged() {
        let frames = vec![frame("D1")];
        let text = serde_json::to_string(&StreamMessage::Frame { markers: &frames }).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "frame");
        assert_eq!(value["markers"][0]["phase"], "animating");
    }
}
