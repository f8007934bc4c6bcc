//! Debug HTTP endpoint (§6.5), grounded on this repository's `axum::Router` + `AppState` +
//! `axum::serve(...).with_graceful_shutdown(...)` shape — pruned to the one route this forwarder
//! exposes (`GET /cache`) plus metrics export, dropping the cluster-registry/config-reload/rate-
//! limiter routes the teacher's debug server carries for a different deployment shape.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::cache::Cache;
use crate::metrics::ForwarderMetrics;

#[derive(Clone)]
struct AppState {
    cache: Arc<Cache>,
    metrics: Arc<ForwarderMetrics>,
}

#[derive(Deserialize)]
struct CacheQuery {
    #[serde(default = "default_nobody")]
    nobody: bool,
}

fn default_nobody() -> bool {
    true
}

pub struct DebugHttpServer {
    cache: Arc<Cache>,
    metrics: Arc<ForwarderMetrics>,
    bind_addr: SocketAddr,
}

impl DebugHttpServer {
    pub fn new(cache: Arc<Cache>, metrics: Arc<ForwarderMetrics>, bind_addr: SocketAddr) -> Self {
        DebugHttpServer {
            cache,
            metrics,
            bind_addr,
        }
    }

    /// Serves `/cache` and `/metrics` until `shutdown` resolves (§5: the HTTP listener has its
    /// own graceful shutdown, same as the UDP/TCP listeners).
    pub async fn run(
        self,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let state = AppState {
            cache: self.cache,
            metrics: self.metrics,
        };

        let app = Router::new()
            .route("/cache", get(cache_dump))
            .route("/metrics", get(prometheus_metrics))
            .with_state(state)
            .layer(CorsLayer::permissive());

        info!(addr = %self.bind_addr, "debug HTTP listener started");
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("debug HTTP listener shutting down");
            })
            .await?;

        Ok(())
    }
}

/// `GET /cache[?nobody=false]` (§6.5): `{length, capacity, body}`, bodies omitted by default.
async fn cache_dump(State(state): State<AppState>, Query(q): Query<CacheQuery>) -> impl IntoResponse {
    let (body, _) = state.cache.dump(!q.nobody);
    Json(json!({
        "length": state.cache.len(),
        "capacity": state.cache.capacity(),
        "body": body,
    }))
}

async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(axum::body::Body::from(bytes))
            .unwrap(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(axum::body::Body::empty())
                .unwrap()
        }
    }
}
