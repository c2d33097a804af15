// src/server/lifecycle.rs
use super::builder::{HttpTimeouts, ServerBuilder};
use super::handler::HealthHandler;
use crate::config::HealthConfig;
use crate::health::Presenter;
use crate::metrics::MetricsRegistry;
use anyhow::Result;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

/// Owns the health listener: start, stop, nothing else.
pub struct HealthServer {
    config: Arc<HealthConfig>,
    presenter: Arc<Presenter>,
    metrics: Option<Arc<MetricsRegistry>>,
    shutdown_tx: watch::Sender<bool>,
}

impl HealthServer {
    pub fn new(config: Arc<HealthConfig>, presenter: Arc<Presenter>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            presenter,
            metrics: None,
            shutdown_tx,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Bind the configured address and serve until [`HealthServer::shutdown`].
    pub async fn start(&self) -> Result<()> {
        self.log_start(self.config.listen_addr);
        self.builder()
            .serve_with_shutdown(self.shutdown_signal())
            .await
    }

    /// Serve on an already bound listener until [`HealthServer::shutdown`].
    pub async fn start_on(&self, listener: TcpListener) -> Result<()> {
        self.log_start(listener.local_addr()?);
        self.builder()
            .serve_listener(listener, self.shutdown_signal())
            .await
    }

    fn builder(&self) -> ServerBuilder<HealthHandler> {
        let mut handler = HealthHandler::new(self.presenter.clone());
        if let Some(metrics) = &self.metrics {
            handler = handler.with_metrics(metrics.clone());
        }

        ServerBuilder::new(self.config.listen_addr)
            .with_handler(handler)
            .with_timeouts(HttpTimeouts::from(self.config.as_ref()))
    }

    fn log_start(&self, address: SocketAddr) {
        info!(
            %address,
            service = %self.config.service_name,
            version = %self.config.version,
            "Starting health check server"
        );
    }

    /// Stop accepting connections. Safe to call before or after `start`.
    pub fn shutdown(&self) {
        info!("Shutting down health check server");
        self.shutdown_tx.send_replace(true);
    }

    pub async fn is_healthy(&self) -> bool {
        self.presenter.is_healthy().await
    }

    fn shutdown_signal(&self) -> impl Future<Output = ()> {
        let mut rx = self.shutdown_tx.subscribe();
        async move {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }
}
