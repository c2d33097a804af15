// src/health/presenter.rs
use super::aggregator::{AggregateReport, HealthAggregator};
use crate::config::HealthConfig;
use chrono::{DateTime, SecondsFormat, Utc};
use hyper::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const HEALTH_PATH: &str = "/health";
pub const LIVE_PATH: &str = "/live";
pub const INFO_PATH: &str = "/info";

/// Body of the liveness endpoint.
pub const ALIVE: &str = "ALIVE";

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub build_time: String,
    pub runtime_version: String,
    pub endpoints: BTreeMap<&'static str, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_tables: Option<Vec<String>>,
}

/// Shapes aggregator output into the three outward views.
pub struct Presenter {
    aggregator: HealthAggregator,
    config: Arc<HealthConfig>,
    started_at: DateTime<Utc>,
}

impl Presenter {
    pub fn new(aggregator: HealthAggregator, config: Arc<HealthConfig>) -> Self {
        Self {
            aggregator,
            config,
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Run every probe and pair the report with the status it maps to.
    pub async fn readiness(&self) -> (StatusCode, AggregateReport) {
        let report = self.aggregator.check().await;
        (readiness_status(&report), report)
    }

    /// Never consults the aggregator.
    pub fn liveness(&self) -> &'static str {
        ALIVE
    }

    pub fn info(&self) -> ServiceInfo {
        let mut endpoints = BTreeMap::new();
        endpoints.insert("health", HEALTH_PATH.to_string());
        endpoints.insert("live", LIVE_PATH.to_string());
        endpoints.insert("info", INFO_PATH.to_string());
        if let Some(path) = &self.config.metrics_path {
            endpoints.insert("metrics", path.clone());
        }

        let required_tables = if self.config.required_tables.is_empty() {
            None
        } else {
            Some(self.config.required_tables.clone())
        };

        ServiceInfo {
            service: self.config.service_name.clone(),
            version: self.config.version.clone(),
            build_time: self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            runtime_version: runtime_version(),
            endpoints,
            required_tables,
        }
    }

    pub async fn is_healthy(&self) -> bool {
        self.aggregator.check().await.is_up()
    }
}

pub fn readiness_status(report: &AggregateReport) -> StatusCode {
    if report.is_up() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

fn runtime_version() -> String {
    format!("rust/{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}
