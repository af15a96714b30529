// Metric record types for every collected family, plus the static
// field-to-metric descriptor tables that drive the batch publisher.
//
// Each record declares one `FieldSpec` entry per column: metric name,
// numeric-vs-categorical kind, whether the field is ingested at all, and a
// plain accessor fn. The publisher walks these tables instead of inspecting
// types at runtime.

use serde::{Deserialize, Serialize};

/// Classification of an emitted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Numeric sample, emitted as a gauge.
    Gauge,
    /// Categorical value, emitted as an attribute.
    Attribute,
}

/// Raw value read out of a record field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Numeric(f64),
    Text(String),
}

/// One field of a metric record: how to read it and how to emit it.
pub struct FieldSpec<T> {
    pub metric_name: &'static str,
    pub kind: SourceKind,
    /// Fields marked false never reach the transport (e.g. raw query text
    /// retained only for the execution-plan lookup).
    pub ingest: bool,
    pub read: fn(&T) -> Option<FieldValue>,
}

/// A row type the batch publisher can map to metric sets.
pub trait MetricRecord {
    /// Event type of the emitted metric set, e.g. "PostgresSlowQueries".
    const EVENT_TYPE: &'static str;

    fn field_specs() -> &'static [FieldSpec<Self>]
    where
        Self: Sized;
}

fn num_i64(value: i64) -> FieldValue {
    FieldValue::Numeric(value as f64)
}

fn num_f64(value: f64) -> FieldValue {
    FieldValue::Numeric(value)
}

fn text(value: &str) -> FieldValue {
    FieldValue::Text(value.to_string())
}

// ============================================================
// Slow queries (pg_stat_statements aggregates)
// ============================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlowQuerySample {
    pub query_id: Option<i64>,
    pub query_text: Option<String>,
    pub database_name: Option<String>,
    pub schema_name: Option<String>,
    pub execution_count: Option<i64>,
    pub avg_elapsed_time_ms: Option<f64>,
    pub avg_cpu_time_ms: Option<f64>,
    pub avg_disk_reads: Option<f64>,
    pub avg_disk_writes: Option<f64>,
    pub statement_type: Option<String>,
    pub collection_timestamp: Option<String>,
}

pub static SLOW_QUERY_FIELDS: [FieldSpec<SlowQuerySample>; 11] = [
    FieldSpec {
        metric_name: "slowquery.query_id",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.query_id.map(num_i64),
    },
    FieldSpec {
        metric_name: "slowquery.query_text",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.query_text.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "slowquery.database_name",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.database_name.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "slowquery.schema_name",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.schema_name.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "slowquery.execution_count",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.execution_count.map(num_i64),
    },
    FieldSpec {
        metric_name: "slowquery.avg_elapsed_time_ms",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.avg_elapsed_time_ms.map(num_f64),
    },
    FieldSpec {
        metric_name: "slowquery.avg_cpu_time_ms",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.avg_cpu_time_ms.map(num_f64),
    },
    FieldSpec {
        metric_name: "slowquery.avg_disk_reads",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.avg_disk_reads.map(num_f64),
    },
    FieldSpec {
        metric_name: "slowquery.avg_disk_writes",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.avg_disk_writes.map(num_f64),
    },
    FieldSpec {
        metric_name: "slowquery.statement_type",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.statement_type.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "slowquery.collection_timestamp",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.collection_timestamp.as_deref().map(text),
    },
];

impl MetricRecord for SlowQuerySample {
    const EVENT_TYPE: &'static str = "PostgresSlowQueries";

    fn field_specs() -> &'static [FieldSpec<Self>] {
        &SLOW_QUERY_FIELDS
    }
}

// ============================================================
// Individual query samples (pg_stat_monitor)
// ============================================================

/// One per-call sample. `query_text` carries the anonymized form for
/// emission; `real_query_text` carries the literal text, used only to build
/// the EXPLAIN request and never published.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndividualQuerySample {
    pub query_id: Option<i64>,
    pub query_text: Option<String>,
    pub real_query_text: Option<String>,
    pub plan_id: Option<String>,
    pub database_name: Option<String>,
    pub avg_exec_time_ms: Option<f64>,
    pub avg_cpu_time_ms: Option<f64>,
    pub execution_timestamp: Option<String>,
}

pub static INDIVIDUAL_QUERY_FIELDS: [FieldSpec<IndividualQuerySample>; 8] = [
    FieldSpec {
        metric_name: "individualquery.query_id",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.query_id.map(num_i64),
    },
    FieldSpec {
        metric_name: "individualquery.query_text",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.query_text.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "individualquery.real_query_text",
        kind: SourceKind::Attribute,
        ingest: false,
        read: |m| m.real_query_text.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "individualquery.plan_id",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.plan_id.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "individualquery.database_name",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.database_name.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "individualquery.avg_exec_time_ms",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.avg_exec_time_ms.map(num_f64),
    },
    FieldSpec {
        metric_name: "individualquery.avg_cpu_time_ms",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.avg_cpu_time_ms.map(num_f64),
    },
    FieldSpec {
        metric_name: "individualquery.execution_timestamp",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.execution_timestamp.as_deref().map(text),
    },
];

impl MetricRecord for IndividualQuerySample {
    const EVENT_TYPE: &'static str = "PostgresIndividualQueries";

    fn field_specs() -> &'static [FieldSpec<Self>] {
        &INDIVIDUAL_QUERY_FIELDS
    }
}

// ============================================================
// Wait events
// ============================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitEventSample {
    pub wait_event_name: Option<String>,
    pub wait_category: Option<String>,
    pub total_wait_time_ms: Option<f64>,
    pub waiting_tasks_count: Option<i64>,
    pub collection_timestamp: Option<String>,
    pub query_id: Option<i64>,
    pub query_text: Option<String>,
    pub database_name: Option<String>,
}

pub static WAIT_EVENT_FIELDS: [FieldSpec<WaitEventSample>; 8] = [
    FieldSpec {
        metric_name: "waitevent.wait_event_name",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.wait_event_name.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "waitevent.wait_category",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.wait_category.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "waitevent.total_wait_time_ms",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.total_wait_time_ms.map(num_f64),
    },
    FieldSpec {
        metric_name: "waitevent.waiting_tasks_count",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.waiting_tasks_count.map(num_i64),
    },
    FieldSpec {
        metric_name: "waitevent.collection_timestamp",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.collection_timestamp.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "waitevent.query_id",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.query_id.map(num_i64),
    },
    FieldSpec {
        metric_name: "waitevent.query_text",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.query_text.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "waitevent.database_name",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.database_name.as_deref().map(text),
    },
];

impl MetricRecord for WaitEventSample {
    const EVENT_TYPE: &'static str = "PostgresWaitEvents";

    fn field_specs() -> &'static [FieldSpec<Self>] {
        &WAIT_EVENT_FIELDS
    }
}

// ============================================================
// Blocking sessions
// ============================================================

/// One blocked/blocking session pair. The query-id and query-start columns
/// only exist on v14+ templates; older servers leave them None and the
/// publisher skips them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockingSessionSample {
    pub blocked_pid: Option<i64>,
    pub blocked_query: Option<String>,
    pub blocked_query_id: Option<i64>,
    pub blocked_query_start: Option<String>,
    pub database_name: Option<String>,
    pub blocking_pid: Option<i64>,
    pub blocking_query: Option<String>,
    pub blocking_query_id: Option<i64>,
    pub blocking_query_start: Option<String>,
    pub blocking_database: Option<String>,
}

pub static BLOCKING_SESSION_FIELDS: [FieldSpec<BlockingSessionSample>; 10] = [
    FieldSpec {
        metric_name: "blockingquery.blocked_pid",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.blocked_pid.map(num_i64),
    },
    FieldSpec {
        metric_name: "blockingquery.blocked_query",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.blocked_query.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "blockingquery.blocked_query_id",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.blocked_query_id.map(num_i64),
    },
    FieldSpec {
        metric_name: "blockingquery.blocked_query_start",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.blocked_query_start.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "blockingquery.database_name",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.database_name.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "blockingquery.blocking_pid",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.blocking_pid.map(num_i64),
    },
    FieldSpec {
        metric_name: "blockingquery.blocking_query",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.blocking_query.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "blockingquery.blocking_query_id",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.blocking_query_id.map(num_i64),
    },
    FieldSpec {
        metric_name: "blockingquery.blocking_query_start",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.blocking_query_start.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "blockingquery.blocking_database",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.blocking_database.as_deref().map(text),
    },
];

impl MetricRecord for BlockingSessionSample {
    const EVENT_TYPE: &'static str = "PostgresBlockingSessions";

    fn field_specs() -> &'static [FieldSpec<Self>] {
        &BLOCKING_SESSION_FIELDS
    }
}

// ============================================================
// Execution plan nodes
// ============================================================

/// One flattened node of an execution plan tree. `level` is the depth of
/// the node in the source tree, root = 0; rows are ordered by a pre-order
/// traversal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionPlanNode {
    pub query_id: Option<i64>,
    pub plan_id: String,
    pub database_name: Option<String>,
    pub query_text: String,
    pub level: i64,
    pub node_type: String,
    pub startup_cost: f64,
    pub total_cost: f64,
    pub plan_rows: i64,
    pub actual_startup_time: f64,
    pub actual_total_time: f64,
    pub actual_rows: i64,
    pub actual_loops: i64,
    pub shared_hit_blocks: i64,
    pub shared_read_blocks: i64,
    pub shared_dirtied_blocks: i64,
    pub shared_written_blocks: i64,
    pub local_hit_blocks: i64,
    pub local_read_blocks: i64,
    pub local_dirtied_blocks: i64,
    pub local_written_blocks: i64,
    pub temp_read_blocks: i64,
    pub temp_written_blocks: i64,
}

/// Deserialization target for one node of the `EXPLAIN (FORMAT JSON)`
/// document. Field names follow the PostgreSQL plan output keys; fields
/// absent from plain (non-ANALYZE) plans default to zero.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlanNodeJson {
    #[serde(rename = "Node Type")]
    pub node_type: String,
    #[serde(rename = "Startup Cost")]
    pub startup_cost: f64,
    #[serde(rename = "Total Cost")]
    pub total_cost: f64,
    #[serde(rename = "Plan Rows")]
    pub plan_rows: i64,
    #[serde(rename = "Actual Startup Time")]
    pub actual_startup_time: f64,
    #[serde(rename = "Actual Total Time")]
    pub actual_total_time: f64,
    #[serde(rename = "Actual Rows")]
    pub actual_rows: i64,
    #[serde(rename = "Actual Loops")]
    pub actual_loops: i64,
    #[serde(rename = "Shared Hit Blocks")]
    pub shared_hit_blocks: i64,
    #[serde(rename = "Shared Read Blocks")]
    pub shared_read_blocks: i64,
    #[serde(rename = "Shared Dirtied Blocks")]
    pub shared_dirtied_blocks: i64,
    #[serde(rename = "Shared Written Blocks")]
    pub shared_written_blocks: i64,
    #[serde(rename = "Local Hit Blocks")]
    pub local_hit_blocks: i64,
    #[serde(rename = "Local Read Blocks")]
    pub local_read_blocks: i64,
    #[serde(rename = "Local Dirtied Blocks")]
    pub local_dirtied_blocks: i64,
    #[serde(rename = "Local Written Blocks")]
    pub local_written_blocks: i64,
    #[serde(rename = "Temp Read Blocks")]
    pub temp_read_blocks: i64,
    #[serde(rename = "Temp Written Blocks")]
    pub temp_written_blocks: i64,
    #[serde(rename = "Plans")]
    pub plans: Vec<PlanNodeJson>,
}

pub static EXECUTION_PLAN_FIELDS: [FieldSpec<ExecutionPlanNode>; 23] = [
    FieldSpec {
        metric_name: "executionplan.query_id",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| m.query_id.map(num_i64),
    },
    FieldSpec {
        metric_name: "executionplan.plan_id",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| Some(text(&m.plan_id)),
    },
    FieldSpec {
        metric_name: "executionplan.database_name",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| m.database_name.as_deref().map(text),
    },
    FieldSpec {
        metric_name: "executionplan.query_text",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| Some(text(&m.query_text)),
    },
    FieldSpec {
        metric_name: "executionplan.level",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_i64(m.level)),
    },
    FieldSpec {
        metric_name: "executionplan.node_type",
        kind: SourceKind::Attribute,
        ingest: true,
        read: |m| Some(text(&m.node_type)),
    },
    FieldSpec {
        metric_name: "executionplan.startup_cost",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_f64(m.startup_cost)),
    },
    FieldSpec {
        metric_name: "executionplan.total_cost",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_f64(m.total_cost)),
    },
    FieldSpec {
        metric_name: "executionplan.plan_rows",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_i64(m.plan_rows)),
    },
    FieldSpec {
        metric_name: "executionplan.actual_startup_time",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_f64(m.actual_startup_time)),
    },
    FieldSpec {
        metric_name: "executionplan.actual_total_time",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_f64(m.actual_total_time)),
    },
    FieldSpec {
        metric_name: "executionplan.actual_rows",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_i64(m.actual_rows)),
    },
    FieldSpec {
        metric_name: "executionplan.actual_loops",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_i64(m.actual_loops)),
    },
    FieldSpec {
        metric_name: "executionplan.shared_hit_blocks",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_i64(m.shared_hit_blocks)),
    },
    FieldSpec {
        metric_name: "executionplan.shared_read_blocks",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_i64(m.shared_read_blocks)),
    },
    FieldSpec {
        metric_name: "executionplan.shared_dirtied_blocks",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_i64(m.shared_dirtied_blocks)),
    },
    FieldSpec {
        metric_name: "executionplan.shared_written_blocks",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_i64(m.shared_written_blocks)),
    },
    FieldSpec {
        metric_name: "executionplan.local_hit_blocks",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_i64(m.local_hit_blocks)),
    },
    FieldSpec {
        metric_name: "executionplan.local_read_blocks",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_i64(m.local_read_blocks)),
    },
    FieldSpec {
        metric_name: "executionplan.local_dirtied_blocks",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_i64(m.local_dirtied_blocks)),
    },
    FieldSpec {
        metric_name: "executionplan.local_written_blocks",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_i64(m.local_written_blocks)),
    },
    FieldSpec {
        metric_name: "executionplan.temp_read_blocks",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_i64(m.temp_read_blocks)),
    },
    FieldSpec {
        metric_name: "executionplan.temp_written_blocks",
        kind: SourceKind::Gauge,
        ingest: true,
        read: |m| Some(num_i64(m.temp_written_blocks)),
    },
];

impl MetricRecord for ExecutionPlanNode {
    const EVENT_TYPE: &'static str = "PostgresExecutionPlanMetrics";

    fn field_specs() -> &'static [FieldSpec<Self>] {
        &EXECUTION_PLAN_FIELDS
    }
}
