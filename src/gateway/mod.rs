//! HTTP gateway
//!
//! REST endpoints over the storage catalog, liveness/status probes, and the
//! `/ws` bridge that lets out-of-process workers speak the bus protocol.

pub mod handlers;
pub mod routes;
pub mod state;
pub mod websocket;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

use crate::error::{PoolError, Result};

pub use routes::create_router;
pub use state::GatewayState;

pub struct GatewayServer {
    state: GatewayState,
    bind: String,
}

impl GatewayServer {
    pub fn new(state: GatewayState, bind: impl Into<String>) -> Self {
        Self {
            state,
            bind: bind.into(),
        }
    }

    /// Bind and serve until shutdown
    pub async fn run(self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let listener = TcpListener::bind(&self.bind).await?;
        serve(listener, self.state, shutdown_rx).await
    }
}

/// Serve on an already-bound listener
pub async fn serve(
    listener: TcpListener,
    state: GatewayState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("Starting gateway on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("gateway: shutdown signal received");
        })
        .await
        .map_err(|e| PoolError::Internal(format!("Gateway server error: {}", e)))?;

    Ok(())
}
