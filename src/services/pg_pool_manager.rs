// Manager for PostgreSQL connection pools keyed by target database name
//
// Design: Uses DashMap for lock-free concurrent access.
// Maintains a pool per database so the execution-plan stage can EXPLAIN a
// sample inside the database it was captured in without reconnecting on
// every query.

use crate::config::ConnectionConfig;
use crate::services::pg_client::{PgClient, QuerySource};
use crate::utils::{CollectorError, CollectorResult, StageResult};
use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

/// Hands out a query source scoped to one database. The pool manager is the
/// production implementation; tests substitute a canned provider.
#[async_trait]
pub trait QuerySourceProvider: Send + Sync {
    async fn source_for(&self, database: &str) -> StageResult<Arc<dyn QuerySource>>;
}

#[derive(Clone)]
pub struct PgPoolManager {
    connection: ConnectionConfig,
    pools: Arc<DashMap<String, PgPool>>,
}

impl PgPoolManager {
    pub fn new(connection: ConnectionConfig) -> Self {
        Self { connection, pools: Arc::new(DashMap::new()) }
    }

    /// Get or create a connection pool for the given database
    ///
    /// Fast path: If pool exists, return immediately (lock-free read)
    /// Slow path: Create new pool if doesn't exist
    pub fn get_pool(&self, database: &str) -> CollectorResult<PgPool> {
        if let Some(pool) = self.pools.get(database) {
            return Ok(pool.clone());
        }

        let pool = self.create_pool(database)?;
        self.pools.insert(database.to_string(), pool.clone());

        tracing::info!(
            "Created connection pool for database '{}' ({}:{})",
            database,
            self.connection.host,
            self.connection.port
        );

        Ok(pool)
    }

    /// Get a query client for the given database
    pub fn client(&self, database: &str) -> CollectorResult<PgClient> {
        Ok(PgClient::from_pool(self.get_pool(database)?))
    }

    /// Remove the pool for a specific database
    ///
    /// Useful when a target database disappears or credentials change
    pub fn remove_pool(&self, database: &str) {
        if let Some((_, pool)) = self.pools.remove(database) {
            drop(pool);
            tracing::info!("Removed connection pool for database '{}'", database);
        }
    }

    /// Get pool count (for monitoring)
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    fn create_pool(&self, database: &str) -> CollectorResult<PgPool> {
        let options = PgConnectOptions::new()
            .host(&self.connection.host)
            .port(self.connection.port)
            .username(&self.connection.username)
            .password(&self.connection.password)
            .database(database)
            .application_name("pgpulse")
            // Bounded per-statement timeout at the query-issuance boundary;
            // does not affect result ordering.
            .options([("statement_timeout", self.connection.statement_timeout_ms.to_string())]);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(options);

        Ok(pool)
    }
}

#[async_trait]
impl QuerySourceProvider for PgPoolManager {
    async fn source_for(&self, database: &str) -> StageResult<Arc<dyn QuerySource>> {
        let client = self.client(database).map_err(|e| match e {
            CollectorError::Connection(msg) => crate::utils::StageError::Query(msg),
            other => crate::utils::StageError::Query(other.to_string()),
        })?;
        Ok(Arc::new(client))
    }
}
