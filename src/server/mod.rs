pub mod handlers;
pub mod router;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::core::errors::RagError;
use crate::state::AppState;

/// Bind and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> Result<SocketAddr, RagError> {
    let bind_addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| RagError::Configuration(format!("failed to bind to {}: {}", bind_addr, e)))?;
    let addr = listener.local_addr().map_err(RagError::internal)?;

    tracing::info!("Listening on {}", addr);
    axum::serve(listener, router::router(state))
        .await
        .map_err(RagError::internal)?;

    Ok(addr)
}
