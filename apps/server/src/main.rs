#![warn(clippy::all, clippy::pedantic)]

use std::path::PathBuf;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use anyhow::Context;
use clap::Parser;
use tracing::info;
use uptime_service::config::{Config, ServerConfig};
use uptime_service::{Engine, MonitorService};

mod auth;
mod error;
mod response;
mod routes;

use logger::init_tracing;

/// HTTP front end of the uptime monitoring engine
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the TOML config; created with defaults when missing
    #[arg(short, long, env = "UPTIME_CONFIG")]
    config: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = Config::from_config(cli.config.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!("\n{config}");

    let engine = Engine::bootstrap(&config).await?;
    let served = run_server(&config.server, engine.service()).await;
    engine.shutdown().await;
    served
}

async fn run_server(config: &ServerConfig, monitors: Arc<MonitorService>) -> anyhow::Result<()> {
    let monitors = web::Data::from(monitors);
    let server = HttpServer::new(move || App::new().app_data(monitors.clone()).configure(routes::routes))
        .bind((config.bind.as_str(), config.port))
        .with_context(|| format!("Failed to bind {}:{}", config.bind, config.port))?
        .disable_signals()
        .run();
    let handle = server.handle();
    let server_task = actix_web::rt::spawn(server);
    info!(bind = %config.bind, port = config.port, "HTTP server listening");

    tokio::select! {
        joined = server_task => {
            joined.context("HTTP server task panicked")?.context("HTTP server failed")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Shutdown signal received, stopping HTTP server");
            handle.stop(true).await;
        }
    }

    Ok(())
}
