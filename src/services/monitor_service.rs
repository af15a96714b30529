// Query monitor orchestrator
// One run = one monitoring cycle: per target database, build the capability
// set, then walk the stages in order. Stage errors are mapped to
// skip-and-continue here, in one place, instead of inside each collector.

use crate::config::{CollectionConfig, ConnectionConfig};
use crate::services::pg_pool_manager::PgPoolManager;
use crate::services::telemetry_client::TelemetryClient;
use crate::services::{
    blocking_session_service, capability_service, execution_plan_service,
    individual_query_service, slow_query_service, wait_event_service,
};
use crate::utils::{CollectorResult, ScheduledTask, StageErrorKind, StageResult};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

pub struct QueryMonitorService {
    pool_manager: Arc<PgPoolManager>,
    telemetry: Arc<TelemetryClient>,
    connection: ConnectionConfig,
    collection: CollectionConfig,
}

impl QueryMonitorService {
    pub fn new(
        pool_manager: Arc<PgPoolManager>,
        telemetry: Arc<TelemetryClient>,
        connection: ConnectionConfig,
        collection: CollectionConfig,
    ) -> Self {
        Self { pool_manager, telemetry, connection, collection }
    }

    /// Run one monitoring cycle over every target database. A failing
    /// database is logged and the cycle moves on to the next one.
    pub async fn run_cycle(&self) -> Result<(), anyhow::Error> {
        let cycle_start = Instant::now();

        for database in &self.collection.databases {
            if let Err(e) = self.run_database(database).await {
                tracing::error!("Monitoring cycle failed for database '{}': {}", database, e);
            }
        }

        tracing::info!("Monitoring cycle completed in {:?}", cycle_start.elapsed());
        Ok(())
    }

    /// Run the full stage sequence against one target database.
    async fn run_database(&self, database: &str) -> CollectorResult<()> {
        let client = self.pool_manager.client(database)?;

        let caps = match capability_service::detect_capabilities(
            &client,
            self.connection.managed,
        )
        .await
        {
            Ok(caps) => caps,
            Err(e) => {
                tracing::warn!("Capability detection failed for '{}': {}", database, e);
                return Ok(());
            },
        };

        tracing::info!(
            "Starting query performance monitoring for '{}' (PostgreSQL {})",
            database,
            caps.version()
        );

        let start = Instant::now();
        let slow = log_stage(
            "slow-query collection",
            slow_query_service::populate_slow_queries(
                &client,
                &caps,
                &self.collection,
                &self.telemetry,
            )
            .await,
        );
        tracing::info!("Slow-query collection took {:?}", start.elapsed());

        let start = Instant::now();
        log_stage(
            "wait-event collection",
            wait_event_service::populate_wait_events(
                &client,
                &caps,
                &self.collection,
                &self.telemetry,
            )
            .await,
        );
        tracing::info!("Wait-event collection took {:?}", start.elapsed());

        let start = Instant::now();
        log_stage(
            "blocking-session collection",
            blocking_session_service::populate_blocking_sessions(
                &client,
                &caps,
                &self.collection,
                &self.telemetry,
            )
            .await,
        );
        tracing::info!("Blocking-session collection took {:?}", start.elapsed());

        let Some((slow_samples, index)) = slow else {
            return Ok(());
        };

        let start = Instant::now();
        let individual = log_stage(
            "individual-query collection",
            individual_query_service::populate_individual_queries(
                &client,
                &caps,
                &self.collection,
                &slow_samples,
                &index,
                &self.telemetry,
            )
            .await,
        );
        tracing::info!("Individual-query collection took {:?}", start.elapsed());

        if let Some(samples) = individual {
            let start = Instant::now();
            log_stage(
                "execution-plan collection",
                execution_plan_service::populate_execution_plans(
                    self.pool_manager.as_ref(),
                    &samples,
                    &self.telemetry,
                )
                .await,
            );
            tracing::info!("Execution-plan collection took {:?}", start.elapsed());
        }

        Ok(())
    }
}

/// Central skip-vs-abort policy: ineligible families are a quiet skip,
/// failures are loud, and neither ends the cycle.
fn log_stage<T>(stage: &str, result: StageResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            match e.kind() {
                StageErrorKind::Ineligible => {
                    tracing::debug!("Skipping {}: {}", stage, e);
                },
                StageErrorKind::Failure => {
                    tracing::error!("Error during {}: {}", stage, e);
                },
            }
            None
        },
    }
}

impl ScheduledTask for QueryMonitorService {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(self.run_cycle())
    }
}
