// src/store/mod.rs
//
// Read-only view of the user store used by the health probes.
mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use serde::Serialize;

/// Relation recording applied schema migrations.
pub const MIGRATIONS_TABLE: &str = "schema_migrations";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Deadline(#[from] crate::health::DeadlineExceeded),
}

/// Connection pool counters reported by the reachability probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total: u32,
    pub idle: u32,
    pub acquired: u32,
}

/// Latest row of the migrations table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationState {
    pub version: i64,
    pub dirty: bool,
}

#[async_trait]
pub trait StoreInspector: Send + Sync {
    /// Round trip to the backing store.
    async fn ping(&self) -> Result<(), StoreError>;

    fn pool_stats(&self) -> PoolStats;

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError>;

    /// `None` when the migrations table holds no rows.
    async fn latest_migration(&self) -> Result<Option<MigrationState>, StoreError>;
}
