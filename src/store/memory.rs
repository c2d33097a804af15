// src/store/memory.rs
use super::{MigrationState, PoolStats, StoreError, StoreInspector, MIGRATIONS_TABLE};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// In-process store whose state is scripted by the caller.
///
/// Every call waits for the configured latency before answering, so probes
/// observe a realistic round trip.
#[derive(Debug)]
pub struct MemoryStore {
    reachable: AtomicBool,
    latency_us: AtomicU64,
    tables: RwLock<BTreeSet<String>>,
    migration: RwLock<Option<MigrationState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            latency_us: AtomicU64::new(0),
            tables: RwLock::new(BTreeSet::new()),
            migration: RwLock::new(None),
        }
    }

    pub fn with_tables<I, S>(self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for table in tables {
            self.add_table(table);
        }
        self
    }

    /// Record a migration row, creating the migrations table if needed.
    pub fn with_migration(self, version: i64, dirty: bool) -> Self {
        self.set_migration(Some(MigrationState { version, dirty }));
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_us.store(micros, Ordering::Relaxed);
    }

    pub fn add_table(&self, table: impl Into<String>) {
        self.tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(table.into());
    }

    pub fn drop_table(&self, table: &str) {
        self.tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(table);
    }

    pub fn set_migration(&self, state: Option<MigrationState>) {
        if state.is_some() {
            self.add_table(MIGRATIONS_TABLE);
        }
        *self.migration.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    async fn round_trip(&self) -> Result<(), StoreError> {
        let latency = Duration::from_micros(self.latency_us.load(Ordering::Relaxed));
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn has_table(&self, table: &str) -> bool {
        self.tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(table)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreInspector for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.round_trip().await
    }

    fn pool_stats(&self) -> PoolStats {
        if self.reachable.load(Ordering::SeqCst) {
            PoolStats {
                total: 1,
                idle: 1,
                acquired: 0,
            }
        } else {
            PoolStats::default()
        }
    }

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        self.round_trip().await?;
        Ok(self.has_table(table))
    }

    async fn latest_migration(&self) -> Result<Option<MigrationState>, StoreError> {
        self.round_trip().await?;
        if !self.has_table(MIGRATIONS_TABLE) {
            return Err(StoreError::Unavailable(format!(
                "relation \"{}\" does not exist",
                MIGRATIONS_TABLE
            )));
        }
        Ok(*self.migration.read().unwrap_or_else(|e| e.into_inner()))
    }
}
