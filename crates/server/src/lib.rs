//! HTTP front end for check encoding-line extraction.

pub mod config;
pub mod error;
pub mod payload;
pub mod platform;
pub mod routes;
pub mod telemetry;

use std::net::SocketAddr;
use std::sync::Arc;

use micr_ocr::{CheckPipeline, OcrBackend};
use tracing::{info, warn};

pub use config::{ConfigError, LogFormat, ServerConfig};
pub use error::{ApiError, ErrorBody};
pub use routes::{router, AppState};

/// Bind `host:port` and serve until Ctrl+C or SIGTERM.
pub async fn serve<R: OcrBackend + 'static>(
    config: &ServerConfig,
    pipeline: CheckPipeline<R>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = Arc::new(AppState::new(pipeline, config.max_body_bytes));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    info!("  GET  /health");
    info!("  POST /processCheck");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
