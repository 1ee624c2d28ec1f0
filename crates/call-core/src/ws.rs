//! The WebSocket control surface: one axum route that upgrades a connection,
//! then bridges text frames to and from a single [`run_control_loop`] task.
//!
//! A fresh [`Orchestrator`] is created per connection — this endpoint serves
//! one remote control session at a time, matching the single-call-per-process
//! model the orchestrator itself assumes.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::control::ControlMessage;
use crate::orchestrator::{run_control_loop, Orchestrator, OrchestratorConfig};

#[derive(Clone)]
struct AppState {
    config: Arc<OrchestratorConfig>,
}

/// Builds the `/control` router. `config` is cloned fresh into an
/// `Orchestrator` for every connection.
pub fn router(config: OrchestratorConfig) -> Router {
    let state = AppState { config: Arc::new(config) };
    Router::new().route("/control", get(upgrade)).with_state(state)
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve(socket, state))
}

async fn serve(socket: WebSocket, state: AppState) {
    let orchestrator = Orchestrator::new((*state.config).clone());

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<ControlMessage>();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<crate::control::ControlEvent>();

    let (mut ws_tx, mut ws_rx) = socket.split();

    let loop_task = tokio::spawn(run_control_loop(
        orchestrator,
        inbound_rx,
        outbound_tx,
        inbound_tx.clone(),
    ));

    let writer_task = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            if ws_tx.send(Message::Text(event.to_wire())).await.is_err() {
                break;
            }
        }
    });

    // Fragmented text frames arrive as separate `Message::Text` chunks only
    // when the peer explicitly sends continuation frames; axum's WebSocket
    // already reassembles those into one `Message::Text` per logical
    // message, so no manual reassembly buffer is needed here.
    while let Some(Ok(message)) = ws_rx.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match ControlMessage::parse(&text) {
            Ok(parsed) => {
                if inbound_tx.send(parsed).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, message = %text, "rejected malformed control message");
            }
        }
    }

    drop(inbound_tx);
    let _ = loop_task.await;
    writer_task.abort();
    info!("control connection closed");
}
