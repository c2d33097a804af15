// src/metrics/mod.rs
mod collector;

pub use collector::{FailureReason, HealthMetrics, MetricsRegistry};
