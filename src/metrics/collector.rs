// src/metrics/collector.rs
use crate::health::HealthStatus;
use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<HealthMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(HealthMetrics::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<HealthMetrics> {
        self.collector.clone()
    }

    /// Encode every registered family in the Prometheus text format.
    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Down,
    Panic,
    Timeout,
}

impl FailureReason {
    fn as_label(self) -> &'static str {
        match self {
            FailureReason::Down => "down",
            FailureReason::Panic => "panic",
            FailureReason::Timeout => "timeout",
        }
    }
}

pub struct HealthMetrics {
    pub check_status: IntGaugeVec,
    pub check_runs_total: IntCounterVec,
    pub check_duration_seconds: Histogram,
    pub probe_failures_total: IntCounterVec,
    /// Checks with a status gauge from the previous run.
    reported: Mutex<BTreeSet<String>>,
}

impl HealthMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let check_status = IntGaugeVec::new(
            Opts::new(
                "health_check_status",
                "Last reported probe status (1=up, 0=down)",
            ),
            &["check"],
        )?;
        registry.register(Box::new(check_status.clone()))?;

        let check_runs_total = IntCounterVec::new(
            Opts::new("health_check_runs_total", "Aggregation runs by overall status"),
            &["status"],
        )?;
        registry.register(Box::new(check_runs_total.clone()))?;

        let check_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "health_check_duration_seconds",
            "Wall time of one aggregation run",
        ))?;
        registry.register(Box::new(check_duration_seconds.clone()))?;

        let probe_failures_total = IntCounterVec::new(
            Opts::new("health_probe_failures_total", "Probe failures by reason"),
            &["check", "reason"],
        )?;
        registry.register(Box::new(probe_failures_total.clone()))?;

        Ok(Self {
            check_status,
            check_runs_total,
            check_duration_seconds,
            probe_failures_total,
            reported: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn record_check(&self, check: &str, status: HealthStatus) {
        let value = if status.is_up() { 1 } else { 0 };
        self.check_status.with_label_values(&[check]).set(value);
    }

    /// Record one run's statuses and drop gauges for checks no longer reported.
    pub fn record_checks<'a, I>(&self, checks: I)
    where
        I: IntoIterator<Item = (&'a str, HealthStatus)>,
    {
        let mut current = BTreeSet::new();
        for (check, status) in checks {
            self.record_check(check, status);
            current.insert(check.to_string());
        }

        let mut reported = self.reported.lock().unwrap_or_else(PoisonError::into_inner);
        for stale in reported.difference(&current) {
            // Already gone if a concurrent run removed it.
            let _ = self.check_status.remove_label_values(&[stale.as_str()]);
        }
        *reported = current;
    }

    pub fn record_failure(&self, check: &str, reason: FailureReason) {
        self.probe_failures_total
            .with_label_values(&[check, reason.as_label()])
            .inc();
    }

    pub fn record_run(&self, status: HealthStatus, duration: Duration) {
        let status = status.to_string();
        self.check_runs_total.with_label_values(&[&status]).inc();
        self.check_duration_seconds.observe(duration.as_secs_f64());
    }
}
