//! Reference service built on the lifecycle orchestrator.
//!
//! Loads configuration, installs logging, registers the metrics exporter and
//! the HTTP server, then runs until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use axum::{routing::get, Json, Router};
use clap::Parser;
use serde_json::json;

use layout::config::{self, ServiceConfig};
use layout::http::HttpServer;
use layout::lifecycle::{signals, App};
use layout::observability::{logging, metrics::PrometheusExporter};

#[derive(Parser)]
#[command(name = "layout")]
#[command(about = "Service skeleton with ordered component lifecycle", long_about = None)]
struct Cli {
    /// Path to the JSON or TOML config file.
    #[arg(
        short,
        long,
        env = "CONFIG_FILE_PATH",
        default_value = config::loader::DEFAULT_CONFIG_PATH
    )]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config: ServiceConfig = match config::load_from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.observability) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "layout starting"
    );

    match run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Service failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut app = App::from_config(&config.lifecycle)
        .with_span(tracing::info_span!("app", service_id = config.http.service_id));

    if config.observability.metrics_enabled {
        app.add_component(Arc::new(PrometheusExporter::from_config(&config.observability)?))?;
    }
    app.add_component(Arc::new(HttpServer::new(config.http.clone(), routes())))?;

    if let Err(e) = app.start().await {
        tracing::error!(error = %e, "Startup failed, stopping started components");
        if let Err(stop_err) = app.stop().await {
            tracing::error!(error = %stop_err, "Cleanup after failed startup also failed");
        }
        return Err(e.into());
    }

    let signal = signals::shutdown_signal().await?;
    tracing::info!(signal, "Shutdown signal received");

    app.stop().await?;
    Ok(())
}

fn routes() -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/version",
            get(|| async { Json(json!({ "version": env!("CARGO_PKG_VERSION") })) }),
        )
}
