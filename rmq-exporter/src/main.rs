mod args_parse;
mod collector;
mod exporter_metrics;
mod http;
mod service_configuration;

use std::{fs::read_to_string, sync::Arc, time::Duration};

use crate::{
    args_parse::Args,
    collector::CollectorRegistry,
    exporter_metrics::{init_metrics, spawn_upkeep},
    http::{build_router, AppState},
    service_configuration::{LoadConfiguration, ServiceConfiguration},
};

use anyhow::{Context, Result};
use clap::Parser;
use rmq_client::ClusterClient;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load the configuration file if one was given, then apply command line overrides
    let load_config = match &args.config_file {
        Some(path) => {
            let content = read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            LoadConfiguration::from_yaml(&content)?
        }
        None => LoadConfiguration::default(),
    };
    let service_config: ServiceConfiguration = args.apply(load_config).try_into()?;

    // Initialize logging, RUST_LOG takes precedence over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&service_config.log_level)),
        )
        .init();

    let handle = init_metrics()?;
    spawn_upkeep(handle.clone(), Duration::from_secs(5));

    let client = ClusterClient::builder()
        .with_call_timeout(service_config.call_timeout)
        .build();

    let registry = CollectorRegistry::new(&service_config, client.clone())?;
    info!(
        "Enabled collectors: [{}], nameserver {}",
        registry.names().join(", "),
        service_config.namesrv_addr
    );

    let state = Arc::new(AppState::new(
        registry,
        handle,
        service_config.metrics_path.clone(),
        service_config.scrape_timeout,
        service_config.max_requests,
    ));
    let router = build_router(state);

    let listener = TcpListener::bind(service_config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", service_config.listen_addr))?;
    info!(
        "Listening on http://{}{}",
        service_config.listen_addr, service_config.metrics_path
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    client.close().await;
    info!("RocketMQ exporter stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => {
            warn!("Unable to listen for the shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    }
}
