//! HTTP endpoint in front of the bridge.

use crate::bridge::Bridge;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const ROUTE: &str = "/neoai";
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub fn router(bridge: Arc<Bridge>) -> Router {
    Router::new()
        .route(ROUTE, get(complete))
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(bridge)
}

async fn complete(
    State(bridge): State<Arc<Bridge>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(data) = params.get("data").filter(|data| !data.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing 'data' query parameter").into_response();
    };

    let body = bridge.request(data.as_bytes()).await;
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// Serves until `shutdown` resolves, then gives in-flight requests
/// [`SHUTDOWN_GRACE`] to finish before returning.
pub async fn serve<F>(bridge: Arc<Bridge>, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Starting server on {}", listener.local_addr()?);

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let graceful = async move {
        shutdown.await;
        let _ = signalled_tx.send(());
    };

    let mut server = tokio::spawn(
        axum::serve(listener, router(bridge))
            .with_graceful_shutdown(graceful)
            .into_future(),
    );

    tokio::select! {
        joined = &mut server => joined??,
        Ok(()) = signalled_rx => {
            tracing::info!("Shutdown signal received, shutting down server...");
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                Ok(joined) => joined??,
                Err(_) => {
                    tracing::warn!("Connections still open after {:?}, closing anyway", SHUTDOWN_GRACE);
                    server.abort();
                }
            }
        }
    }

    tracing::info!("Server stopped.");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
