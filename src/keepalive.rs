use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{error, info};

pub const LIVENESS: &str = "Bot is running.";

pub fn router() -> Router {
    Router::new().route("/", get(|| async { LIVENESS }))
}

/// Serves [`router`] on `0.0.0.0:port` in the background. Failures are
/// logged and leave the bot running.
pub fn spawn(port: u16) -> JoinHandle<()> {
    tokio::spawn(async move {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = match TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(%addr, "Failed to bind keepalive endpoint: {e}");
                return;
            }
        };

        info!(%addr, "Keepalive endpoint listening");
        if let Err(e) = axum::serve(listener, router()).await {
            error!("Keepalive endpoint stopped: {e}");
        }
    })
}
