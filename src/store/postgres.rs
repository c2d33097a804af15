// src/store/postgres.rs
use super::{MigrationState, PoolStats, StoreError, StoreInspector};
use crate::config::DatabaseSettings;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Connection;

const TABLE_EXISTS_SQL: &str = "SELECT EXISTS (
    SELECT FROM information_schema.tables
    WHERE table_schema = 'public'
    AND table_name = $1
)";

const LATEST_MIGRATION_SQL: &str = "SELECT version, dirty
FROM schema_migrations
ORDER BY version DESC
LIMIT 1";

/// Postgres-backed store inspector.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open a pool and verify one connection can be established.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        let dsn = settings
            .dsn()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.connect_timeout())
            .connect(&dsn)
            .await?;

        tracing::info!(
            host = %settings.host,
            port = settings.port,
            db = %settings.db_name,
            "Connected to database"
        );
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl StoreInspector for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await?;
        Ok(())
    }

    fn pool_stats(&self) -> PoolStats {
        let total = self.pool.size();
        let idle = u32::try_from(self.pool.num_idle()).unwrap_or(total);
        PoolStats {
            total,
            idle,
            acquired: total.saturating_sub(idle),
        }
    }

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(TABLE_EXISTS_SQL)
            .bind(table)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn latest_migration(&self) -> Result<Option<MigrationState>, StoreError> {
        let row = sqlx::query_as::<_, (i64, bool)>(LATEST_MIGRATION_SQL)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(version, dirty)| MigrationState { version, dirty }))
    }
}
