// src/main.rs
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use user_service_health::{
    config::{self, LoggingSettings},
    health::{register_store_probes, HealthAggregator, Presenter, ProbeRegistry},
    metrics::MetricsRegistry,
    server::HealthServer,
    store::{PgStore, StoreInspector},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    let settings = config::load_settings(&config_path)?;
    init_tracing(&settings.logging)?;
    info!(path = %config_path, env = ?settings.service.env, "Loaded configuration");

    let health_config = Arc::new(settings.health_config());

    // Storage collaborator shared by the store probes
    let store = PgStore::connect(&settings.database)
        .await
        .context("Failed to create postgres pool")?;
    let inspector: Arc<dyn StoreInspector> = Arc::new(store.clone());

    let registry = Arc::new(ProbeRegistry::new());
    register_store_probes(&registry, inspector, &health_config);

    let mut aggregator = HealthAggregator::new(registry, &health_config);
    let metrics_registry = if settings.metrics.enabled {
        let metrics_registry = Arc::new(MetricsRegistry::new()?);
        aggregator = aggregator.with_metrics(metrics_registry.collector());
        Some(metrics_registry)
    } else {
        None
    };

    let presenter = Arc::new(Presenter::new(aggregator, health_config.clone()));
    let mut server = HealthServer::new(health_config, presenter);
    if let Some(metrics_registry) = metrics_registry {
        server = server.with_metrics(metrics_registry);
    }
    let server = Arc::new(server);

    let mut serving = {
        let server = server.clone();
        tokio::spawn(async move { server.start().await })
    };

    let result = tokio::select! {
        result = &mut serving => result,
        _ = shutdown_signal() => {
            server.shutdown();
            serving.await
        }
    };

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => Err(anyhow::Error::new(e).context("Health check server task failed")),
    };

    store.close().await;
    if let Err(e) = &outcome {
        error!("Health check server error: {:#}", e);
    } else {
        info!("Health check server stopped gracefully");
    }
    outcome
}

fn init_tracing(logging: &LoggingSettings) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("user_service_health=info").add_directive("hyper=info".parse()?),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}
