// src/health/probes.rs
//
// Built-in probes over the user store. Each one only interprets facts the
// store reports; every store call is bounded by the run deadline.
use super::probe::{CheckContext, Probe};
use super::registry::ProbeRegistry;
use super::status::{CheckResult, HealthStatus};
use crate::config::HealthConfig;
use crate::store::{StoreError, StoreInspector, MIGRATIONS_TABLE};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

pub const DATABASE_PROBE: &str = "database";
pub const MIGRATIONS_PROBE: &str = "migrations";
pub const REQUIRED_TABLES_PROBE: &str = "required_tables";

async fn bounded<T, F>(ctx: &CheckContext, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    ctx.run(fut).await?
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Register the store probes the user service ships with.
///
/// `required_tables` is only registered when the config lists any tables.
pub fn register_store_probes(
    registry: &ProbeRegistry,
    store: Arc<dyn StoreInspector>,
    config: &HealthConfig,
) {
    registry.register(DATABASE_PROBE, StoreReachabilityProbe::new(store.clone()));
    registry.register(
        MIGRATIONS_PROBE,
        SchemaStateProbe::new(store.clone(), config.migration_version),
    );
    if !config.required_tables.is_empty() {
        registry.register(
            REQUIRED_TABLES_PROBE,
            RequiredTablesProbe::new(store, config.required_tables.clone()),
        );
    }

    info!(
        service = %config.service_name,
        version = %config.version,
        timeout = ?config.timeout,
        tables_check = !config.required_tables.is_empty(),
        required_tables = ?config.required_tables,
        migration_version = config.migration_version,
        "Health checks configured"
    );
}

/// Pings the store and reports pool usage.
pub struct StoreReachabilityProbe {
    store: Arc<dyn StoreInspector>,
}

impl StoreReachabilityProbe {
    pub fn new(store: Arc<dyn StoreInspector>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Probe for StoreReachabilityProbe {
    async fn check(&self, ctx: &CheckContext) -> CheckResult {
        let start = Instant::now();

        match bounded(ctx, self.store.ping()).await {
            Ok(()) => {
                let stats = self.store.pool_stats();
                CheckResult::up()
                    .with_detail("duration_ms", elapsed_ms(start))
                    .with_detail("total_conns", stats.total)
                    .with_detail("idle_conns", stats.idle)
                    .with_detail("acquired_conns", stats.acquired)
            }
            Err(e) => CheckResult::down(e.to_string()).with_detail("duration_ms", elapsed_ms(start)),
        }
    }
}

/// Inspects the migrations table: presence, dirty flag and minimum version.
pub struct SchemaStateProbe {
    store: Arc<dyn StoreInspector>,
    expected_version: i64,
}

impl SchemaStateProbe {
    /// `expected_version == 0` disables the minimum version comparison.
    pub fn new(store: Arc<dyn StoreInspector>, expected_version: i64) -> Self {
        Self {
            store,
            expected_version,
        }
    }
}

#[async_trait]
impl Probe for SchemaStateProbe {
    async fn check(&self, ctx: &CheckContext) -> CheckResult {
        let start = Instant::now();

        let exists = match bounded(ctx, self.store.table_exists(MIGRATIONS_TABLE)).await {
            Ok(exists) => exists,
            Err(e) => {
                return CheckResult::down(format!("Failed to check migration table: {}", e))
                    .with_detail("duration_ms", elapsed_ms(start));
            }
        };

        if !exists {
            return CheckResult::down("Migration table does not exist")
                .with_detail("duration_ms", elapsed_ms(start))
                .with_detail("note", "Run migrations first");
        }

        let state = match bounded(ctx, self.store.latest_migration()).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                return CheckResult::down("No migration has been recorded")
                    .with_detail("duration_ms", elapsed_ms(start))
                    .with_detail("note", "Run migrations first");
            }
            Err(e) => {
                return CheckResult::down(format!("Failed to get migration version: {}", e))
                    .with_detail("duration_ms", elapsed_ms(start));
            }
        };

        if state.dirty {
            return CheckResult::down("Database is in dirty migration state")
                .with_detail("duration_ms", elapsed_ms(start))
                .with_detail("current_version", state.version)
                .with_detail("dirty", true)
                .with_detail("note", "Fix migration state before proceeding");
        }

        let mut result = CheckResult::up()
            .with_detail("duration_ms", elapsed_ms(start))
            .with_detail("current_version", state.version)
            .with_detail("dirty", false);

        if self.expected_version > 0 {
            let version_match = state.version >= self.expected_version;
            result = result
                .with_detail("expected_version", self.expected_version)
                .with_detail("version_match", version_match);

            if !version_match {
                result = result.with_status(HealthStatus::Down);
                result.error = Some(format!(
                    "Migration version too old. Expected: {}, Current: {}",
                    self.expected_version, state.version
                ));
            }
        }

        result
    }
}

/// Verifies that every listed table exists.
pub struct RequiredTablesProbe {
    store: Arc<dyn StoreInspector>,
    tables: Vec<String>,
}

impl RequiredTablesProbe {
    pub fn new(store: Arc<dyn StoreInspector>, tables: Vec<String>) -> Self {
        Self { store, tables }
    }
}

#[async_trait]
impl Probe for RequiredTablesProbe {
    async fn check(&self, ctx: &CheckContext) -> CheckResult {
        let start = Instant::now();
        let mut existing = Vec::new();
        let mut missing = Vec::new();

        for table in &self.tables {
            match bounded(ctx, self.store.table_exists(table)).await {
                Ok(true) => existing.push(table.clone()),
                Ok(false) => missing.push(table.clone()),
                Err(e) => {
                    return CheckResult::down(format!("Failed to check table {}: {}", table, e))
                        .with_detail("duration_ms", elapsed_ms(start))
                        .with_detail("table", table.as_str());
                }
            }
        }

        let mut result = CheckResult::up()
            .with_detail("duration_ms", elapsed_ms(start))
            .with_detail("total_checked", self.tables.len())
            .with_detail("existing_tables", existing);

        if !missing.is_empty() {
            result = result.with_status(HealthStatus::Down);
            result.error = Some(format!("Missing tables: {}", missing.join(", ")));
            result = result.with_detail("missing_tables", missing);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use tokio::time::Duration;

    fn ctx() -> CheckContext {
        CheckContext::with_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn reachable_store_is_up_with_pool_stats() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(5)));
        let result = StoreReachabilityProbe::new(store).check(&ctx()).await;

        assert_eq!(result.status, HealthStatus::Up);
        let duration_ms = result.details["duration_ms"].as_u64().unwrap();
        assert!((5..1000).contains(&duration_ms), "duration_ms = {duration_ms}");
        assert_eq!(result.details["total_conns"], 1);
        assert_eq!(result.details["idle_conns"], 1);
        assert_eq!(result.details["acquired_conns"], 0);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn unreachable_store_is_down_with_error_text() {
        let store = Arc::new(MemoryStore::new());
        store.set_reachable(false);
        let result = StoreReachabilityProbe::new(store).check(&ctx()).await;

        assert_eq!(result.status, HealthStatus::Down);
        assert!(result.error.unwrap().contains("connection refused"));
        assert!(result.details.contains_key("duration_ms"));
    }

    #[tokio::test]
    async fn slow_store_is_cut_off_by_the_deadline() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_secs(10)));
        let ctx = CheckContext::with_timeout(Duration::from_millis(20));
        let result = StoreReachabilityProbe::new(store).check(&ctx).await;

        assert_eq!(result.status, HealthStatus::Down);
        assert!(result.error.unwrap().contains("deadline exceeded"));
    }

    #[tokio::test]
    async fn missing_migrations_table_is_down() {
        let store = Arc::new(MemoryStore::new());
        let result = SchemaStateProbe::new(store, 0).check(&ctx()).await;

        assert_eq!(result.status, HealthStatus::Down);
        assert!(result.error.unwrap().contains("does not exist"));
        assert_eq!(result.details["note"], "Run migrations first");
    }

    #[tokio::test]
    async fn empty_migrations_table_is_down() {
        let store = Arc::new(MemoryStore::new().with_tables([MIGRATIONS_TABLE]));
        let result = SchemaStateProbe::new(store, 0).check(&ctx()).await;
        assert_eq!(result.status, HealthStatus::Down);
    }

    #[tokio::test]
    async fn dirty_state_is_down_even_when_version_is_new_enough() {
        let store = Arc::new(MemoryStore::new().with_migration(10, true));
        let result = SchemaStateProbe::new(store, 2).check(&ctx()).await;

        assert_eq!(result.status, HealthStatus::Down);
        assert_eq!(result.details["dirty"], true);
        assert_eq!(result.details["current_version"], 10);
    }

    #[tokio::test]
    async fn version_below_minimum_is_down() {
        let store = Arc::new(MemoryStore::new().with_migration(3, false));
        let result = SchemaStateProbe::new(store, 5).check(&ctx()).await;

        assert_eq!(result.status, HealthStatus::Down);
        assert_eq!(result.details["expected_version"], 5);
        assert_eq!(result.details["version_match"], false);
        assert!(result.error.unwrap().contains("Expected: 5, Current: 3"));
    }

    #[tokio::test]
    async fn version_check_disabled_when_expected_is_zero() {
        let store = Arc::new(MemoryStore::new().with_migration(1, false));
        let result = SchemaStateProbe::new(store, 0).check(&ctx()).await;

        assert_eq!(result.status, HealthStatus::Up);
        assert_eq!(result.details["current_version"], 1);
        assert!(!result.details.contains_key("expected_version"));
    }

    #[tokio::test]
    async fn version_at_or_above_minimum_is_up() {
        let store = Arc::new(MemoryStore::new().with_migration(5, false));
        let result = SchemaStateProbe::new(store, 5).check(&ctx()).await;

        assert_eq!(result.status, HealthStatus::Up);
        assert_eq!(result.details["version_match"], true);
    }

    #[tokio::test]
    async fn present_required_tables_are_up() {
        let store = Arc::new(MemoryStore::new().with_tables(["users"]));
        let result = RequiredTablesProbe::new(store, vec!["users".into()])
            .check(&ctx())
            .await;

        assert_eq!(result.status, HealthStatus::Up);
        assert_eq!(result.details["existing_tables"], json!(["users"]));
        assert_eq!(result.details["total_checked"], 1);
        assert!(!result.details.contains_key("missing_tables"));
    }

    #[tokio::test]
    async fn missing_required_table_is_down_and_listed() {
        let store = Arc::new(MemoryStore::new().with_tables(["users"]));
        let result = RequiredTablesProbe::new(store, vec!["users".into(), "orders".into()])
            .check(&ctx())
            .await;

        assert_eq!(result.status, HealthStatus::Down);
        assert_eq!(result.details["missing_tables"], json!(["orders"]));
        assert_eq!(result.details["existing_tables"], json!(["users"]));
        assert_eq!(result.details["total_checked"], 2);
    }

    #[test]
    fn required_tables_probe_is_registered_only_when_configured() {
        let store: Arc<dyn StoreInspector> = Arc::new(MemoryStore::new());

        let registry = ProbeRegistry::new();
        register_store_probes(&registry, store.clone(), &HealthConfig::default());
        assert_eq!(registry.names(), vec![DATABASE_PROBE, MIGRATIONS_PROBE]);

        let registry = ProbeRegistry::new();
        let config = HealthConfig::default().with_required_tables(["users"]);
        register_store_probes(&registry, store, &config);
        assert_eq!(
            registry.names(),
            vec![DATABASE_PROBE, MIGRATIONS_PROBE, REQUIRED_TABLES_PROBE]
        );
    }
}
