//! Ceres C kernel server.
//!
//! The network face of the execution bridge.
//!
//! # Architecture
//!
//! The server consists of:
//! - **Relay**: HTTP endpoint filling the input relay table
//! - **Session**: The shared controller and per-client message queues
//! - **Protocol**: Client/server WebSocket message types
//! - **Routes**: HTTP and WebSocket handlers
//! - **Widget**: HTML input affordance

pub mod error;
pub mod protocol;
pub mod relay;
pub mod routes;
pub mod session;
pub mod widget;

use std::net::SocketAddr;
use std::sync::Arc;

use ceres_core::{
    CCompiler, Compiler, CompilerConfig, ExecutionConfig, ExecutionController, RelayTable,
};

pub use error::{ServerError, ServerResult};
pub use protocol::{ClientMessage, ServerMessage};
pub use relay::{RelayServer, relay_router};
pub use routes::{AppState, create_router};
pub use session::{KernelSession, SharedController};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port of the WebSocket front end.
    pub port: u16,
    /// Port of the input relay. 0 picks an ephemeral port.
    pub relay_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8888,
            relay_port: 0,
        }
    }
}

impl ServerConfig {
    /// Address of the WebSocket front end.
    pub fn addr(&self) -> ServerResult<SocketAddr> {
        parse_addr(&self.host, self.port)
    }

    /// Address of the input relay.
    pub fn relay_addr(&self) -> ServerResult<SocketAddr> {
        parse_addr(&self.host, self.relay_port)
    }
}

fn parse_addr(host: &str, port: u16) -> ServerResult<SocketAddr> {
    format!("{}:{}", host, port)
        .parse()
        .map_err(|_| ServerError::InvalidAddress(format!("{}:{}", host, port)))
}

/// Start the Ceres server.
pub async fn serve(
    config: ServerConfig,
    compiler: CompilerConfig,
    execution: ExecutionConfig,
) -> ServerResult<()> {
    let addr = config.addr()?;
    let table = RelayTable::new();
    let relay = RelayServer::spawn(table.clone(), config.relay_addr()?).await?;

    let compiler: Arc<dyn Compiler> = Arc::new(CCompiler::new(compiler));
    let controller =
        ExecutionController::new(compiler, table, execution)?.with_relay_url(relay.url());

    let state = Arc::new(AppState {
        session: Arc::new(KernelSession::new(controller)),
        relay_url: relay.url(),
    });
    let app = create_router(state);

    tracing::info!("Starting Ceres server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
        }
    });

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
    });

    server.await?;
    relay.shutdown().await;

    tracing::info!("Server shutdown complete");

    Ok(())
}
