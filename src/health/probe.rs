// src/health/probe.rs
use super::status::CheckResult;
use async_trait::async_trait;
use std::future::Future;
use tokio::time::{timeout_at, Duration, Instant};

/// Deadline shared by every probe of one aggregation run.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext {
    deadline: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("health check deadline exceeded")]
pub struct DeadlineExceeded;

impl CheckContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Drive `fut` until it completes or the deadline passes.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, DeadlineExceeded>
    where
        F: Future,
    {
        timeout_at(self.deadline, fut)
            .await
            .map_err(|_| DeadlineExceeded)
    }
}

/// A pluggable check of one dependency.
///
/// Implementations are expected to honour the context deadline; the
/// aggregator gives up on a probe once the deadline passes but cannot
/// preempt code that never yields.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self, ctx: &CheckContext) -> CheckResult;
}

/// Adapter turning an async closure into a [`Probe`].
pub struct ProbeFn<F> {
    f: F,
}

pub fn probe_fn<F, Fut>(f: F) -> ProbeFn<F>
where
    F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CheckResult> + Send + 'static,
{
    ProbeFn { f }
}

#[async_trait]
impl<F, Fut> Probe for ProbeFn<F>
where
    F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CheckResult> + Send + 'static,
{
    async fn check(&self, ctx: &CheckContext) -> CheckResult {
        (self.f)(*ctx).await
    }
}
