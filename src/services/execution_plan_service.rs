// Execution-plan flattener
// Issues EXPLAIN (FORMAT JSON) for each individual sample inside the
// sample's own database and flattens the nested plan tree into one row per
// node via pre-order depth-first traversal.

use crate::models::metrics::{ExecutionPlanNode, IndividualQuerySample, PlanNodeJson};
use crate::services::pg_client::QuerySource;
use crate::services::pg_pool_manager::QuerySourceProvider;
use crate::services::publisher::publish_records;
use crate::services::telemetry_client::TelemetryClient;
use crate::utils::StageResult;
use serde::Deserialize;

/// Plan id emitted when a sample reaches this stage without one.
const MISSING_PLAN_ID: &str = "999";

#[derive(Debug, Deserialize)]
struct ExplainDocument {
    #[serde(rename = "Plan")]
    plan: PlanNodeJson,
}

/// Flatten one plan subtree. Emits `node` at `level`, then recurses into
/// its children in array order; output order therefore matches the source
/// JSON exactly at every level.
fn flatten_plan(
    sample: &IndividualQuerySample,
    level: i64,
    node: &PlanNodeJson,
    out: &mut Vec<ExecutionPlanNode>,
) {
    out.push(ExecutionPlanNode {
        query_id: sample.query_id,
        plan_id: sample.plan_id.clone().unwrap_or_else(|| MISSING_PLAN_ID.to_string()),
        database_name: sample.database_name.clone(),
        query_text: sample.query_text.clone().unwrap_or_default(),
        level,
        node_type: node.node_type.clone(),
        startup_cost: node.startup_cost,
        total_cost: node.total_cost,
        plan_rows: node.plan_rows,
        actual_startup_time: node.actual_startup_time,
        actual_total_time: node.actual_total_time,
        actual_rows: node.actual_rows,
        actual_loops: node.actual_loops,
        shared_hit_blocks: node.shared_hit_blocks,
        shared_read_blocks: node.shared_read_blocks,
        shared_dirtied_blocks: node.shared_dirtied_blocks,
        shared_written_blocks: node.shared_written_blocks,
        local_hit_blocks: node.local_hit_blocks,
        local_read_blocks: node.local_read_blocks,
        local_dirtied_blocks: node.local_dirtied_blocks,
        local_written_blocks: node.local_written_blocks,
        temp_read_blocks: node.temp_read_blocks,
        temp_written_blocks: node.temp_written_blocks,
    });

    for child in &node.plans {
        flatten_plan(sample, level + 1, child, out);
    }
}

/// Flatten a parsed plan tree into leveled rows for one sample.
pub fn flatten_plan_tree(
    sample: &IndividualQuerySample,
    root: &PlanNodeJson,
) -> Vec<ExecutionPlanNode> {
    let mut nodes = Vec::new();
    flatten_plan(sample, 0, root, &mut nodes);
    nodes
}

/// Extract the plan JSON string from the single EXPLAIN result row.
fn explain_row_text(rows: &[serde_json::Value]) -> Option<String> {
    let row = rows.first()?.as_object()?;
    let value = row.values().next()?;
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Run EXPLAIN for each sample and collect the flattened node rows.
///
/// A failing EXPLAIN (dropped table, permission error, non-explainable
/// statement) skips that sample and continues.
pub async fn get_execution_plans(
    provider: &dyn QuerySourceProvider,
    samples: &[IndividualQuerySample],
) -> Vec<ExecutionPlanNode> {
    let mut nodes = Vec::new();

    for sample in samples {
        let Some(real_text) = sample.real_query_text.as_deref() else {
            continue;
        };
        let Some(database) = sample.database_name.as_deref() else {
            continue;
        };

        let source: std::sync::Arc<dyn QuerySource> = match provider.source_for(database).await {
            Ok(source) => source,
            Err(e) => {
                tracing::info!("No connection for database '{}': {}", database, e);
                continue;
            },
        };

        let sql = format!("EXPLAIN (FORMAT JSON) {}", real_text);
        let rows = match source.query(&sql).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::info!("Error explaining query {:?}: {}", sample.query_id, e);
                continue;
            },
        };

        let Some(plan_json) = explain_row_text(&rows) else {
            tracing::info!("Execution plan not found for query {:?}", sample.query_id);
            continue;
        };

        let documents: Vec<ExplainDocument> = match serde_json::from_str(&plan_json) {
            Ok(documents) => documents,
            Err(e) => {
                tracing::error!("Failed to parse execution plan: {}", e);
                continue;
            },
        };

        let Some(document) = documents.first() else {
            continue;
        };

        flatten_plan(sample, 0, &document.plan, &mut nodes);
    }

    nodes
}

/// Collect and publish execution-plan rows for this cycle.
pub async fn populate_execution_plans(
    provider: &dyn QuerySourceProvider,
    samples: &[IndividualQuerySample],
    client: &TelemetryClient,
) -> StageResult<()> {
    if samples.is_empty() {
        tracing::debug!("No individual queries to explain");
        return Ok(());
    }

    let nodes = get_execution_plans(provider, samples).await;
    if nodes.is_empty() {
        tracing::debug!("No execution plans collected");
        return Ok(());
    }

    publish_records(&nodes, client).await
}
