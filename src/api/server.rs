//! HTTP server lifecycle.
//!
//! `serve` binds `0.0.0.0:PORT` and runs until Ctrl-C. `start_on` is the
//! same server on any address, spawned in the background with a shutdown
//! handle: bind → spawn background task → return handle with shutdown
//! channel.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::api::router::api_router;
use crate::core_state::{CoreState, StartupError};

/// Handle to a server spawned by [`start_on`].
pub struct ApiServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ApiServer {
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!(addr = %self.addr, "API server shutdown signal sent");
        }
    }
}

/// Serve the API on every interface at the configured port until Ctrl-C.
pub async fn serve(core: Arc<CoreState>) -> Result<(), StartupError> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), core.config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "MedSpace API listening");

    let app = api_router(core).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for Ctrl-C: {e}");
                return;
            }
            tracing::info!("Shutdown requested");
        })
        .await?;

    tracing::info!("MedSpace API stopped");
    Ok(())
}

/// Bind `addr` (port 0 picks a free one) and serve in a background task.
pub async fn start_on(core: Arc<CoreState>, addr: SocketAddr) -> Result<ApiServer, StartupError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;
    let app = api_router(core).into_make_service_with_connect_info::<SocketAddr>();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
        };

        tracing::info!(%addr, "API server started");
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("API server error: {e}");
        }
        tracing::info!(%addr, "API server stopped");
    });

    Ok(ApiServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_state::testing::test_core;
    use crate::mailer::testing::RecordingMailer;

    async fn start(dir: &std::path::Path) -> ApiServer {
        let core = Arc::new(test_core(dir, Arc::new(RecordingMailer::default())));
        start_on(core, SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("server should start")
    }

    #[tokio::test]
    async fn serves_ping_over_tcp() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = start(dir.path()).await;
        assert!(server.addr.port() > 0);

        let resp = reqwest::get(format!("http://{}/ping", server.addr))
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["message"], "pong");

        let resp = reqwest::get(format!("http://{}/nonexistent", server.addr))
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

        server.shutdown();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = start(dir.path()).await;
        server.shutdown();
        server.shutdown();
    }
}
