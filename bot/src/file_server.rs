/// Static file server for the storage directory.
///
/// Completion messages link to `BASE_URL/<dir>/<file>`; this serves exactly
/// that tree so the links work without a separate web server.
use std::net::SocketAddr;
use std::path::Path;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn router(storage_dir: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(storage_dir))
        .layer(TraceLayer::new_for_http())
}

pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!("File server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, app: Router, shutdown: CancellationToken) -> anyhow::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("File server stopped");
    Ok(())
}
