// src/config/health.rs
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_SERVICE_NAME: &str = "unknown-service";
pub const DEFAULT_VERSION: &str = "unknown";

/// Runtime settings of the health listener and aggregator.
///
/// Built from [`HealthConfig::default`] by chaining `with_*` options; each
/// option sets only its own fields and a later call wins over an earlier one.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthConfig {
    pub listen_addr: SocketAddr,
    pub service_name: String,
    pub version: String,
    /// Overall deadline of one aggregation run.
    pub timeout: Duration,
    pub required_tables: Vec<String>,
    /// Minimum accepted schema version; 0 disables the comparison.
    pub migration_version: i64,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub metrics_path: Option<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            version: DEFAULT_VERSION.to_string(),
            timeout: Duration::from_secs(5),
            required_tables: Vec::new(),
            migration_version: 0,
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            metrics_path: None,
        }
    }
}

impl HealthConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.listen_addr.set_port(port);
        self
    }

    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_required_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_migration_version(mut self, version: i64) -> Self {
        self.migration_version = version;
        self
    }

    pub fn with_http_timeouts(mut self, read: Duration, write: Duration, idle: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self.idle_timeout = idle;
        self
    }

    pub fn with_metrics_path(mut self, path: impl Into<String>) -> Self {
        self.metrics_path = Some(path.into());
        self
    }
}
