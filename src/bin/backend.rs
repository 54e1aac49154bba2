//! Context file-serving backend binary.
//!
//! Serves the context documents in `CONTEXT_DIR` (default `/app/context`)
//! on `PORT` (default 3000):
//!
//! - `GET /api/files`: list context files
//! - `GET /api/files/{name}`: file content
//! - `GET /api/health`: health check

use context_weaver::backend::FileServer;
use std::net::SocketAddr;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let root = std::env::var("CONTEXT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/app/context"));
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let server = FileServer::start(root.clone(), addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to start file backend: {e}"))?;

    tracing::info!(addr = %server.addr(), root = %root.display(), "weaver-backend running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("weaver-backend shutting down");
    server.shutdown();
    Ok(())
}
