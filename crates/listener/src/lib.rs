//! Portwatcher listener: a small HTTP endpoint that timestamps incoming events
//! and appends them, one per line, to a flat log file.
//!
//! Routes:
//! - `GET /healthz` liveness check
//! - `POST /ingest` JSON objects or free text
//! - `POST /logline` free text, empty lines included

use std::future::Future;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;

pub mod config;
mod http_server;
pub mod ingest;
pub mod writer;

pub use config::ListenerConfig;
pub use ingest::IngestError;
pub use writer::{AppendError, AppendWriter};

pub struct ListenerService {
    config: ListenerConfig,
    writer: AppendWriter,
}

impl ListenerService {
    pub fn new(config: ListenerConfig) -> Self {
        let writer = AppendWriter::new(config.log_file.clone());
        Self { config, writer }
    }

    /// Creates the log directory. Never fails; problems are logged.
    pub fn bootstrap(&self) {
        writer::ensure_log_dir(self.writer.path());
    }

    pub fn router(&self) -> Router {
        http_server::router(self.writer.clone())
    }

    /// Binds the configured address and serves until Ctrl-C or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let host = self.config.host.as_str();
        let port = self.config.port;
        let listener = TcpListener::bind((host, port))
            .await
            .with_context(|| format!("Failed to bind listener to {host}:{port}"))?;

        self.serve(listener, http_server::shutdown_signal()).await
    }

    /// Serves on an already bound socket until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(log_file = %self.writer.path().display(), "appending events");
        http_server::serve(listener, self.router(), shutdown).await
    }
}
