use std::future::Future;

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Extension},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{ingest, ingest::IngestError, writer::AppendWriter};

#[derive(Clone)]
struct HttpState {
    writer: AppendWriter,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

pub(crate) fn router(writer: AppendWriter) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ingest", post(handle_ingest))
        .route("/logline", post(handle_logline))
        .layer(Extension(HttpState { writer }))
        .layer(DefaultBodyLimit::disable())
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

pub(crate) async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .context("Failed to read listener address")?;
    tracing::info!("listener accepting requests on {addr}");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server encountered an unrecoverable error")?;

    tracing::info!("listener stopped");
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn handle_ingest(
    Extension(state): Extension<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, IngestError> {
    let ts = ingest::timestamp(Utc::now());
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    let line = ingest::ingest_line(content_type, &body, &ts).map_err(|err| {
        tracing::debug!(content_type, "rejected ingest payload: {err}");
        err
    })?;

    state.writer.append(&line).await;
    Ok(StatusCode::ACCEPTED)
}

async fn handle_logline(Extension(state): Extension<HttpState>, body: Bytes) -> impl IntoResponse {
    let ts = ingest::timestamp(Utc::now());
    state.writer.append(&ingest::logline(&body, &ts)).await;
    Json(json!({ "status": "ok" }))
}

/// Any origin, method and header; credentials are never allowed.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to install SIGTERM handler: {err}");
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
    tracing::info!("shutdown signal received");
}
