pub mod blocking_session_service;
pub mod capability_service;
pub mod execution_plan_service;
pub mod individual_query_service;
pub mod monitor_service;
pub mod pg_client;
pub mod pg_pool_manager;
pub mod publisher;
pub mod query_catalog;
pub mod slow_query_service;
pub mod telemetry_client;
pub mod wait_event_service;

pub use monitor_service::QueryMonitorService;
pub use pg_client::{PgClient, QuerySource};
pub use pg_pool_manager::{PgPoolManager, QuerySourceProvider};
pub use publisher::{PUBLISH_THRESHOLD, publish_records};
pub use query_catalog::{MetricFamily, TemplateArg, render_template, select_template};
pub use slow_query_service::CorrelationIndex;
pub use telemetry_client::{
    Entity, HttpTransport, IntegrationPayload, MetricSet, StdoutTransport, TelemetryClient,
    Transport,
};
