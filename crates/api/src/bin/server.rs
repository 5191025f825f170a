//! Threshold Ceremony Coordinator Server
//!
//! Runs the node registry, quorum selection and session coordination behind
//! the HTTP API, together with the background health checker and session
//! reaper.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use threshold_api::{handlers::nodes, start_server, AppState, CeremonyDefaults};
use threshold_orchestrator::{
    CoordinatorConfig, CoordinatorConfigBuilder, HealthCheckerBuilder, HttpActionNotifier,
    NodeRegistry, ResultBus, SelectionPolicy, SessionCoordinator, SessionReaperBuilder,
};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting threshold ceremony coordinator");

    // Load configuration from environment
    let config = load_config()?;
    info!(
        "Selection policy: {}, dispatch timeout: {:?}, result timeout: {:?}",
        config.coordinator.selection_policy,
        config.coordinator.dispatch_timeout,
        config.coordinator.result_timeout
    );

    // Seed the registry with statically configured nodes
    let registry = NodeRegistry::new();
    for (id, endpoint) in &config.node_endpoints {
        nodes::register_node(&registry, *id, endpoint)
            .map_err(|e| anyhow::anyhow!("Cannot seed node-{}: {}", id, e))?;
    }
    info!("Node registry initialized with {} nodes", registry.len());

    let notifier = Arc::new(HttpActionNotifier::new(
        config.notifier_url.clone(),
        config.coordinator.dispatch_timeout,
    )?);
    info!("Ceremony notifications go to {}", config.notifier_url);

    let results = ResultBus::new();
    let coordinator = Arc::new(SessionCoordinator::new(
        config.coordinator.clone(),
        registry.clone(),
        notifier,
        results.clone(),
    ));

    // Start background services
    let reaper = SessionReaperBuilder::new()
        .with_coordinator(Arc::clone(&coordinator))
        .build()?;
    let reaper_handle = Arc::clone(&reaper).start();
    info!("Session reaper started");

    let health = if config.enable_health_checks {
        let health_checker = HealthCheckerBuilder::new()
            .with_registry(registry.clone())
            .with_config(&config.coordinator)
            .build()?;
        let health_handle = Arc::clone(&health_checker).start();
        info!("Health checker started");
        Some((health_checker, health_handle))
    } else {
        warn!("Health checks disabled - node status relies on heartbeats only");
        None
    };

    let state = AppState::new(coordinator, config.defaults);
    let addr: SocketAddr = config.listen_addr.parse()?;

    // Start the API server in a separate task
    info!("API server starting on {}", addr);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(state, addr).await {
            error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    info!("Server running. Press Ctrl+C to shutdown.");
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    // Graceful shutdown
    let shutdown_timeout = Duration::from_secs(10);

    reaper.shutdown().await;
    tokio::select! {
        _ = reaper_handle => info!("Session reaper stopped"),
        _ = tokio::time::sleep(shutdown_timeout) => warn!("Session reaper shutdown timed out"),
    }

    if let Some((health_checker, health_handle)) = health {
        health_checker.shutdown().await;
        tokio::select! {
            _ = health_handle => info!("Health checker stopped"),
            _ = tokio::time::sleep(shutdown_timeout) => warn!("Health checker shutdown timed out"),
        }
    }

    // Waiters still pending see a closed result channel
    results.close_all();

    // Stop API server
    server_handle.abort();
    info!("API server stopped");

    info!("Shutdown complete");
    Ok(())
}

#[derive(Debug)]
struct Config {
    listen_addr: String,
    notifier_url: String,
    coordinator: CoordinatorConfig,
    defaults: CeremonyDefaults,
    enable_health_checks: bool,
    node_endpoints: Vec<(u64, String)>,
}

fn load_config() -> Result<Config> {
    let listen_addr = std::env::var("LISTEN_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let notifier_url = std::env::var("NOTIFIER_URL")
        .map_err(|_| anyhow::anyhow!("NOTIFIER_URL environment variable is required"))?;

    let mut builder = CoordinatorConfigBuilder::new();

    if let Ok(policy) = std::env::var("SELECTION_POLICY") {
        builder = builder.selection_policy(policy.parse::<SelectionPolicy>()?);
    }

    if let Ok(secs) = std::env::var("DISPATCH_TIMEOUT_SECS") {
        builder = builder.dispatch_timeout(Duration::from_secs(secs.parse::<u64>()?));
    }

    if let Ok(secs) = std::env::var("RESULT_TIMEOUT_SECS") {
        builder = builder.result_timeout(Duration::from_secs(secs.parse::<u64>()?));
    }

    let coordinator = builder.build()?;

    let defaults = CeremonyDefaults {
        total_nodes: std::env::var("DEFAULT_TOTAL_NODES")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u32>()?,
        threshold: std::env::var("DEFAULT_THRESHOLD")
            .unwrap_or_else(|_| "2".to_string())
            .parse::<u32>()?,
    };

    let enable_health_checks = std::env::var("ENABLE_HEALTH_CHECKS")
        .unwrap_or_else(|_| "true".to_string())
        .parse::<bool>()
        .unwrap_or(true);

    let node_endpoints = parse_node_endpoints(&std::env::var("NODE_ENDPOINTS").unwrap_or_default());

    Ok(Config {
        listen_addr,
        notifier_url,
        coordinator,
        defaults,
        enable_health_checks,
        node_endpoints,
    })
}

/// Parse `id=url;id=url`, skipping malformed entries.
///
/// Node IDs start at 1 and addresses must be http(s) URLs.
fn parse_node_endpoints(raw: &str) -> Vec<(u64, String)> {
    raw.split(';')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let parsed = entry
                .trim()
                .split_once('=')
                .and_then(|(id, url)| Some((id.trim().parse::<u64>().ok()?, url.trim())));
            match parsed {
                Some((id, url))
                    if id > 0 && (url.starts_with("http://") || url.starts_with("https://")) =>
                {
                    Some((id, url.to_string()))
                }
                _ => {
                    warn!("Ignoring malformed NODE_ENDPOINTS entry {:?}", entry);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_endpoints() {
        let endpoints = parse_node_endpoints("1=http://node-1:8080; 2=http://node-2:8080;bogus;x=http://y");
        assert_eq!(
            endpoints,
            vec![
                (1, "http://node-1:8080".to_string()),
                (2, "http://node-2:8080".to_string()),
            ]
        );
        assert!(parse_node_endpoints("").is_empty());
    }

    #[test]
    fn test_parse_node_endpoints_rejects_zero_id_and_non_http() {
        let endpoints = parse_node_endpoints(
            "0=http://node-0:8080;3=node-3:8080;4=ftp://node-4;5=https://node-5:8443",
        );
        assert_eq!(endpoints, vec![(5, "https://node-5:8443".to_string())]);
    }
}
