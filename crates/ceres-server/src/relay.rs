//! Input relay HTTP endpoint.
//!
//! Accepts `POST /` with form fields `id` and `value` and fills the matching
//! slot of a [`RelayTable`]. Runs on its own listener, usually on an
//! ephemeral port, so the address can be handed to input widgets.

use std::net::SocketAddr;

use axum::{
    Form, Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use ceres_core::{RelayTable, RequestId, SubmitOutcome};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::error::ServerResult;

/// Form body of a relay submission.
#[derive(Debug, Deserialize)]
pub struct Submission {
    pub id: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// Create the relay router for `table`.
pub fn relay_router(table: RelayTable) -> Router {
    Router::new()
        .route("/", post(submit_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(table)
}

async fn submit_handler(
    State(table): State<RelayTable>,
    Form(submission): Form<Submission>,
) -> (StatusCode, &'static str) {
    if submission.id.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing id");
    }

    // Unknown and malformed ids are dropped silently.
    let outcome = RequestId::parse(&submission.id)
        .map(|id| table.submit(id, submission.value.unwrap_or_default()))
        .unwrap_or(SubmitOutcome::Ignored);
    if outcome == SubmitOutcome::Ignored {
        tracing::debug!("Relay ignored submission for {:?}", submission.id);
    }

    (StatusCode::OK, "OK")
}

async fn health_handler(State(table): State<RelayTable>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "pending": table.pending_count(),
    }))
}

/// A running relay endpoint.
pub struct RelayServer {
    addr: SocketAddr,
    table: RelayTable,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RelayServer {
    /// Bind `addr` and serve `table` until [`RelayServer::shutdown`].
    ///
    /// Port 0 picks an ephemeral port; see [`RelayServer::local_addr`].
    pub async fn spawn(table: RelayTable, addr: SocketAddr) -> ServerResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let app = relay_router(table.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                tracing::warn!("Relay server stopped: {}", e);
            }
        });

        tracing::info!("Input relay listening at http://{}/", addr);

        Ok(Self {
            addr,
            table,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    /// Bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// URL input widgets post to.
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// The table this endpoint fills.
    pub fn table(&self) -> &RelayTable {
        &self.table
    }

    /// Stop accepting submissions and wait for the server task.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
