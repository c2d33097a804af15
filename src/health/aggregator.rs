// src/health/aggregator.rs
use super::probe::CheckContext;
use super::registry::ProbeRegistry;
use super::status::{CheckResult, HealthStatus};
use crate::config::HealthConfig;
use crate::metrics::{FailureReason, HealthMetrics};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::task::JoinError;
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{debug, error, info, warn};

/// Error attached to a probe whose task panicked.
pub const PROBE_PANICKED: &str = "probe failed abnormally";
/// Error attached to a probe still running when the run deadline passed.
pub const PROBE_TIMED_OUT: &str = "health check timed out";
/// Error attached to a probe whose task was cancelled by the runtime.
pub const PROBE_CANCELLED: &str = "probe was cancelled";

/// Point-in-time result of one aggregation run.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub version: String,
    pub checks: BTreeMap<String, CheckResult>,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
}

impl AggregateReport {
    pub fn is_up(&self) -> bool {
        self.status.is_up()
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{:?}", duration))
}

/// Runs every registered probe concurrently under one deadline and rolls the
/// results up into an [`AggregateReport`].
pub struct HealthAggregator {
    registry: Arc<ProbeRegistry>,
    timeout: Duration,
    service: String,
    version: String,
    metrics: Option<Arc<HealthMetrics>>,
}

impl HealthAggregator {
    pub fn new(registry: Arc<ProbeRegistry>, config: &HealthConfig) -> Self {
        Self {
            registry,
            timeout: config.timeout,
            service: config.service_name.clone(),
            version: config.version.clone(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<HealthMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn check(&self) -> AggregateReport {
        let started = Instant::now();
        let snapshot = self.registry.snapshot();
        let ctx = CheckContext::with_timeout(self.timeout);

        let mut pending = HashMap::with_capacity(snapshot.len());
        let mut in_flight = FuturesUnordered::new();

        for (name, probe) in snapshot.iter() {
            let probe = probe.clone();
            let handle = tokio::spawn(async move { probe.check(&ctx).await });
            pending.insert(name.clone(), handle.abort_handle());

            let name = name.clone();
            in_flight.push(async move { (name, handle.await) });
        }

        debug!(probes = pending.len(), timeout = ?self.timeout, "health check run started");

        let mut checks = BTreeMap::new();
        loop {
            match timeout_at(ctx.deadline(), in_flight.next()).await {
                Ok(Some((name, outcome))) => {
                    pending.remove(&name);
                    let result = self.settle(&name, outcome);
                    checks.insert(name, result);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        unreported = pending.len(),
                        timeout = ?self.timeout,
                        "health check deadline elapsed before every probe reported"
                    );
                    break;
                }
            }
        }
        drop(in_flight);

        // Cooperative probes stop at their next await; the rest are detached.
        for (name, handle) in pending {
            handle.abort();
            warn!(probe = %name, "health probe did not report before the deadline");
            if let Some(metrics) = &self.metrics {
                metrics.record_failure(&name, FailureReason::Timeout);
            }
            let result = CheckResult::down(PROBE_TIMED_OUT)
                .with_detail("timeout_ms", self.timeout.as_millis() as u64);
            checks.insert(name, result);
        }

        let status = HealthStatus::rollup(checks.values().map(|r| r.status));
        let duration = started.elapsed();

        if let Some(metrics) = &self.metrics {
            metrics.record_checks(
                checks
                    .iter()
                    .map(|(name, result)| (name.as_str(), result.status)),
            );
            metrics.record_run(status, duration);
        }

        if status.is_up() {
            debug!(checks = checks.len(), ?duration, "health check run complete: UP");
        } else {
            let down: Vec<&str> = checks
                .iter()
                .filter(|(_, r)| !r.is_up())
                .map(|(n, _)| n.as_str())
                .collect();
            info!(?down, ?duration, "health check run complete: DOWN");
        }

        AggregateReport {
            status,
            timestamp: Utc::now(),
            service: self.service.clone(),
            version: self.version.clone(),
            checks,
            duration,
        }
    }

    fn settle(&self, name: &str, outcome: Result<CheckResult, JoinError>) -> CheckResult {
        match outcome {
            Ok(result) => {
                if result.is_up() {
                    debug!(probe = %name, "health probe is up");
                } else {
                    warn!(probe = %name, error = ?result.error, "health probe is down");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_failure(name, FailureReason::Down);
                    }
                }
                result
            }
            Err(e) if e.is_panic() => {
                error!(probe = %name, "health probe panicked");
                if let Some(metrics) = &self.metrics {
                    metrics.record_failure(name, FailureReason::Panic);
                }
                CheckResult::down(PROBE_PANICKED)
            }
            Err(e) => {
                warn!(probe = %name, %e, "health probe task was cancelled");
                CheckResult::down(PROBE_CANCELLED)
            }
        }
    }
}
