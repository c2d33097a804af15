// src/health/status.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
}

impl HealthStatus {
    /// Down dominates: a single Down entry makes the whole set Down.
    /// An empty set is vacuously Up.
    pub fn rollup<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        if statuses.into_iter().any(|s| s == HealthStatus::Down) {
            HealthStatus::Down
        } else {
            HealthStatus::Up
        }
    }

    pub fn is_up(self) -> bool {
        self == HealthStatus::Up
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Up => write!(f, "UP"),
            HealthStatus::Down => write!(f, "DOWN"),
        }
    }
}

/// Outcome of a single probe invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: HealthStatus,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    pub fn up() -> Self {
        Self {
            status: HealthStatus::Up,
            details: Map::new(),
            error: None,
        }
    }

    pub fn down(error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Down,
            details: Map::new(),
            error: Some(error.into()),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_status(mut self, status: HealthStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_up(&self) -> bool {
        self.status.is_up()
    }
}
