use std::{io, path::PathBuf};

use anyhow::Result;
use clap::Parser;
use listener::{
    config::{self, CliOptions, EnvOptions},
    ListenerService,
};
use tracing_subscriber::EnvFilter;

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "portwatcher-listener", version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// File that ingested events are appended to (overrides LOG_FILE)
    #[arg(long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Host to bind the HTTP server on
    #[arg(long = "host", value_name = "HOST")]
    host: Option<String>,

    /// Port to bind the HTTP server on
    #[arg(long = "port", value_name = "PORT")]
    port: Option<u16>,

    /// Optional TOML file with a [listener] table
    #[arg(long = "config", value_name = "FILE")]
    config_path: Option<PathBuf>,

    /// Log filter (e.g. info, debug); overrides RUST_LOG
    #[arg(long = "log-level", value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.log_level.as_deref());
    tracing::info!(
        version = SERVER_VERSION,
        built_at = listener_build_info::BUILT_AT,
        revision = listener_build_info::GIT_REVISION,
        "starting portwatcher-listener"
    );

    let env_options = EnvOptions::from_env()?;
    let config_path = args
        .config_path
        .clone()
        .or_else(|| env_options.config_path.clone());
    let file_config = config::load_file_config(config_path.as_deref())?;

    let cli_options = CliOptions {
        log_file: args.log_file,
        host: args.host,
        port: args.port,
    };
    let resolved = config::resolve(&cli_options, &env_options, file_config.as_ref());
    tracing::debug!(?resolved, "resolved configuration");

    let service = ListenerService::new(resolved);
    service.bootstrap();
    service.run().await
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}
