use axum::Json;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    action: Option<String>,
    channel: Option<String>,
}

/// Live-updates socket. Clients steer their channel set with
/// `{"action": "subscribe"|"unsubscribe"|"ping", "channel"?}` frames.
pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let client_id = query
        .client_id
        .unwrap_or_else(|| format!("client-{}", Uuid::new_v4()));
    ws.on_upgrade(move |socket| handle_socket(state, socket, client_id))
}

pub async fn ws_stats(State(state): State<AppState>) -> Json<Value> {
    Json(state.bus.stats())
}

async fn handle_socket(state: AppState, socket: WebSocket, client_id: String) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    state.bus.connect(&client_id, tx);
    tracing::info!(client_id, "websocket client connected");

    // the bus enqueues frames; this writer owns the socket sink
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => handle_client_frame(&state, &client_id, text.as_str()),
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.bus.disconnect(&client_id);
    writer.abort();
    tracing::info!(client_id, "websocket client disconnected");
}

fn handle_client_frame(state: &AppState, client_id: &str, raw: &str) {
    let Ok(frame) = serde_json::from_str::<ClientFrame>(raw) else {
        state
            .bus
            .send_personal(client_id, &json!({"event": "error", "message": "Invalid JSON"}));
        return;
    };

    match (frame.action.as_deref(), frame.channel) {
        (Some("subscribe"), Some(channel)) => {
            state.bus.subscribe(client_id, &channel);
        }
        (Some("unsubscribe"), Some(channel)) => {
            state.bus.unsubscribe(client_id, &channel);
        }
        (Some("ping"), _) => {
            state
                .bus
                .send_personal(client_id, &json!({"event": "pong", "timestamp": Utc::now()}));
        }
        (action, _) => {
            state.bus.send_personal(
                client_id,
                &json!({
                    "event": "error",
                    "message": format!("Unknown action: {}", action.unwrap_or("none")),
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::HttpClassifier;
    use std::sync::Arc;

    fn test_state() -> AppState {
        let config = Config {
            listen_addr: "127.0.0.1:0".into(),
            ai_service_url: "http://localhost:0".into(),
            event_webhook_url: None,
            resolution_webhook_url: None,
            coding_webhook_url: None,
        };
        let (state, _rx) =
            AppState::build(&config, Arc::new(HttpClassifier::new("http://localhost:0")));
        state
    }

    fn connect(state: &AppState, id: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.bus.connect(id, tx);
        rx.try_recv().unwrap(); // subscribed: all
        rx
    }

    fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn subscribe_frame_updates_the_bus() {
        let state = test_state();
        let mut rx = connect(&state, "c1");

        handle_client_frame(&state, "c1", r#"{"action": "subscribe", "channel": "queue.TRIAGE"}"#);
        assert_eq!(next(&mut rx)["channel"], "queue.TRIAGE");
        assert!(state.bus.client_subscriptions("c1").contains("queue.TRIAGE"));

        handle_client_frame(
            &state,
            "c1",
            r#"{"action": "unsubscribe", "channel": "queue.TRIAGE"}"#,
        );
        assert_eq!(next(&mut rx)["event"], "unsubscribed");
    }

    #[tokio::test]
    async fn ping_answers_pong() {
        let state = test_state();
        let mut rx = connect(&state, "c1");

        handle_client_frame(&state, "c1", r#"{"action": "ping"}"#);
        let frame = next(&mut rx);
        assert_eq!(frame["event"], "pong");
        assert!(frame.get("timestamp").is_some());
    }

    #[tokio::test]
    async fn bad_frames_yield_error_events() {
        let state = test_state();
        let mut rx = connect(&state, "c1");

        handle_client_frame(&state, "c1", "{not json");
        assert_eq!(next(&mut rx)["message"], "Invalid JSON");

        handle_client_frame(&state, "c1", r#"{"action": "dance"}"#);
        assert_eq!(next(&mut rx)["message"], "Unknown action: dance");
    }
}
