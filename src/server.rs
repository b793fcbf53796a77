//! # HTTP Servers
//!
//! Three small axum services:
//!
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` + `/readyz` - Kubernetes probes
//! - the artifact file server - serves the artifact root as static files;
//!   directory listings and trailing-slash paths return 404

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tracing::{error, info};

pub struct ServerState {
    pub is_ready: Arc<AtomicBool>,
}

/// Serve `/metrics` on the given address
pub async fn start_metrics_server(addr: String) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = TcpListener::bind(&addr).await?;
    info!("metrics server listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Serve `/healthz` and `/readyz` on the given address
pub async fn start_probe_server(addr: String, state: Arc<ServerState>) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state);
    let listener = TcpListener::bind(&addr).await?;
    info!("probe server listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Serve the artifact root as static files on the given address
pub async fn start_artifact_server(addr: String, root: PathBuf) -> anyhow::Result<()> {
    let app = Router::new()
        .fallback(get(artifact_handler))
        .with_state(Arc::new(root));
    let listener = TcpListener::bind(&addr).await?;
    info!("artifact server listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = crate::observability::metrics::REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("failed to encode metrics: {e}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            format!("failed to encode metrics: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        buffer,
    )
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn artifact_handler(State(root): State<Arc<PathBuf>>, uri: Uri) -> impl IntoResponse {
    let path = uri.path();

    // directory listings and trailing-slash redirects are suppressed
    if path.ends_with('/') {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Some(relative) = sanitize_path(path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let target = root.join(relative);
    match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.is_file() => {}
        _ => return StatusCode::NOT_FOUND.into_response(),
    }

    match tokio::fs::read(&target).await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type(&target))],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(path = %target.display(), "failed to read artifact: {e}");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Normalize a request path into a safe relative path; rejects traversal
fn sanitize_path(path: &str) -> Option<PathBuf> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let relative = Path::new(trimmed);
    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            _ => return None,
        }
    }
    Some(clean)
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => "application/gzip",
        Some("sha1") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rejects_traversal() {
        assert!(sanitize_path("/../etc/passwd").is_none());
        assert!(sanitize_path("/a/../../b").is_none());
        assert!(sanitize_path("/").is_none());
    }

    #[test]
    fn sanitize_accepts_artifact_paths() {
        assert_eq!(
            sanitize_path("/mavenartifact/ns/name/abc.tar.gz"),
            Some(PathBuf::from("mavenartifact/ns/name/abc.tar.gz"))
        );
    }
}
