//! HTTP and WebSocket routes for the Ceres server.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::{Html, IntoResponse, Json},
    routing::get,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex as TokioMutex;
use tower_http::cors::CorsLayer;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::KernelSession;

type WsSender = Arc<TokioMutex<SplitSink<WebSocket, Message>>>;

/// Application state shared across handlers.
pub struct AppState {
    /// The kernel session all clients share.
    pub session: Arc<KernelSession>,
    /// Address of the input relay.
    pub relay_url: String,
}

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Ceres</title>
    <style>
        body { font-family: system-ui, sans-serif; margin: 2rem; }
        h1 { color: #b45309; }
        pre { background: #f3f4f6; padding: 1rem; border-radius: 0.5rem; }
    </style>
</head>
<body>
    <h1>Ceres C Kernel Server</h1>
    <p>WebSocket endpoint: <code>/ws</code></p>
    <p>Messages:</p>
    <ul>
        <li><code>{"type":"execute","code":"..."}</code> - Compile and run C source</li>
        <li><code>{"type":"interrupt"}</code> - Abort the running submission</li>
    </ul>
    <script>
        const ws = new WebSocket(`ws://${location.host}/ws`);
        ws.onmessage = (e) => console.log('Server:', JSON.parse(e.data));
    </script>
</body>
</html>"#,
    )
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "busy": state.session.is_busy(),
        "execution_count": state.session.execution_count(),
        "relay_url": state.relay_url,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();
    let mut rx = state.session.subscribe();

    let sender: WsSender = Arc::new(TokioMutex::new(sender));
    let sender_clone = sender.clone();

    let forward_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if !send_message(&sender_clone, &msg).await {
                break;
            }
        }
    });

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => handle_client_message(msg, &state, &sender).await,
                Err(e) => {
                    tracing::warn!("Failed to parse client message: {} (input: {})", e, text);
                    send_message(
                        &sender,
                        &ServerMessage::Error {
                            message: format!("Invalid message format: {}", e),
                        },
                    )
                    .await;
                }
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    forward_task.abort();
}

/// Send a server message through the WebSocket. Returns `false` once the
/// socket is gone.
async fn send_message(sender: &WsSender, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let mut sender = sender.lock().await;
            sender.send(Message::Text(json.into())).await.is_ok()
        }
        Err(e) => {
            tracing::warn!("Failed to serialize server message: {}", e);
            true
        }
    }
}

/// Handle a client message.
async fn handle_client_message(msg: ClientMessage, state: &Arc<AppState>, sender: &WsSender) {
    let result = match msg {
        ClientMessage::Execute { code } => state.session.start_execution(code).map(|_| ()),
        ClientMessage::Interrupt => state.session.interrupt(),
    };

    if let Err(e) = result {
        send_message(
            sender,
            &ServerMessage::Error {
                message: e.to_string(),
            },
        )
        .await;
    }
}
