// src/health/mod.rs
mod aggregator;
mod presenter;
mod probe;
pub mod probes;
mod registry;
mod status;

pub use aggregator::{
    AggregateReport, HealthAggregator, PROBE_CANCELLED, PROBE_PANICKED, PROBE_TIMED_OUT,
};
pub use presenter::{
    readiness_status, Presenter, ServiceInfo, ALIVE, HEALTH_PATH, INFO_PATH, LIVE_PATH,
};
pub use probe::{probe_fn, CheckContext, DeadlineExceeded, Probe, ProbeFn};
pub use probes::register_store_probes;
pub use registry::{ProbeRegistry, ProbeSnapshot};
pub use status::{CheckResult, HealthStatus};
