use crate::models::metrics::{IndividualQuerySample, PlanNodeJson};
use crate::services::execution_plan_service::{
    flatten_plan_tree, get_execution_plans, populate_execution_plans,
};
use crate::tests::common::{
    MockQuerySource, MockSourceProvider, RecordingTransport, test_telemetry_client,
};
use serde_json::json;
use std::sync::Arc;

fn sample(query_id: i64, plan_id: Option<&str>) -> IndividualQuerySample {
    IndividualQuerySample {
        query_id: Some(query_id),
        query_text: Some("SELECT * FROM orders WHERE id=?".to_string()),
        real_query_text: Some("SELECT * FROM orders WHERE id=5".to_string()),
        plan_id: plan_id.map(|p| p.to_string()),
        database_name: Some("app".to_string()),
        ..IndividualQuerySample::default()
    }
}

fn plan_node(value: serde_json::Value) -> PlanNodeJson {
    serde_json::from_value(value).expect("valid plan node json")
}

#[test]
fn two_level_plan_flattens_to_two_leveled_rows() {
    let root = plan_node(json!({
        "Node Type": "Nested Loop",
        "Startup Cost": 0.29,
        "Total Cost": 12.63,
        "Plan Rows": 1,
        "Plans": [{
            "Node Type": "Index Scan",
            "Startup Cost": 0.29,
            "Total Cost": 8.31,
            "Plan Rows": 1
        }]
    }));
    let sample = sample(42, Some("42-117-20231010101010"));

    let nodes = flatten_plan_tree(&sample, &root);

    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0].node_type, "Nested Loop");
    assert_eq!(nodes[0].level, 0);
    assert_eq!(nodes[1].node_type, "Index Scan");
    assert_eq!(nodes[1].level, 1);
    for node in &nodes {
        assert_eq!(node.query_id, Some(42));
        assert_eq!(node.plan_id, "42-117-20231010101010");
        assert_eq!(node.database_name.as_deref(), Some("app"));
        assert_eq!(node.query_text, "SELECT * FROM orders WHERE id=?");
    }
}

#[test]
fn flatten_preserves_source_child_order() {
    let root = plan_node(json!({
        "Node Type": "Hash Join",
        "Plans": [
            {
                "Node Type": "Seq Scan",
                "Plans": [{"Node Type": "Bitmap Index Scan"}]
            },
            {"Node Type": "Hash"}
        ]
    }));

    let nodes = flatten_plan_tree(&sample(7, Some("7-1-20231010101010")), &root);

    let types: Vec<&str> = nodes.iter().map(|n| n.node_type.as_str()).collect();
    assert_eq!(types, vec!["Hash Join", "Seq Scan", "Bitmap Index Scan", "Hash"]);
    let levels: Vec<i64> = nodes.iter().map(|n| n.level).collect();
    assert_eq!(levels, vec![0, 1, 2, 1]);
}

#[test]
fn missing_plan_id_falls_back_to_sentinel() {
    let root = plan_node(json!({"Node Type": "Seq Scan"}));

    let nodes = flatten_plan_tree(&sample(42, None), &root);

    assert_eq!(nodes[0].plan_id, "999");
}

#[tokio::test]
async fn explains_with_the_literal_query_text() {
    let plan_json = r#"[{"Plan": {"Node Type": "Seq Scan", "Total Cost": 23.5, "Plan Rows": 650}}]"#;
    let source = Arc::new(
        MockQuerySource::new().with_rows("EXPLAIN (FORMAT JSON)", vec![json!({"QUERY PLAN": plan_json})]),
    );
    let provider = MockSourceProvider::new().with_source("app", Arc::clone(&source));

    let nodes = get_execution_plans(&provider, &[sample(42, Some("42-9-20231010101010"))]).await;

    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].node_type, "Seq Scan");
    assert_eq!(nodes[0].total_cost, 23.5);
    assert_eq!(nodes[0].plan_rows, 650);

    let executed = source.executed_queries();
    assert_eq!(executed, vec!["EXPLAIN (FORMAT JSON) SELECT * FROM orders WHERE id=5".to_string()]);
}

#[tokio::test]
async fn failed_explain_skips_the_sample_and_continues() {
    let plan_json = r#"[{"Plan": {"Node Type": "Seq Scan"}}]"#;
    let first = Arc::new(
        MockQuerySource::new().with_error("EXPLAIN (FORMAT JSON)", "relation does not exist"),
    );
    let second = Arc::new(
        MockQuerySource::new().with_rows("EXPLAIN (FORMAT JSON)", vec![json!({"QUERY PLAN": plan_json})]),
    );
    let provider = MockSourceProvider::new()
        .with_source("app", Arc::clone(&first))
        .with_source("crm", Arc::clone(&second));

    let mut failing = sample(1, Some("1-1-20231010101010"));
    failing.database_name = Some("app".to_string());
    let mut passing = sample(2, Some("2-2-20231010101010"));
    passing.database_name = Some("crm".to_string());

    let nodes = get_execution_plans(&provider, &[failing, passing]).await;

    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].query_id, Some(2));
}

#[tokio::test]
async fn unparsable_plan_document_is_skipped() {
    let source = Arc::new(
        MockQuerySource::new().with_rows("EXPLAIN (FORMAT JSON)", vec![json!({"QUERY PLAN": "not json"})]),
    );
    let provider = MockSourceProvider::new().with_source("app", source);

    let nodes = get_execution_plans(&provider, &[sample(42, None)]).await;

    assert!(nodes.is_empty());
}

#[tokio::test]
async fn publishes_flattened_plan_rows() {
    let plan_json = r#"[{"Plan": {"Node Type": "Limit", "Plans": [{"Node Type": "Sort"}]}}]"#;
    let source = Arc::new(
        MockQuerySource::new().with_rows("EXPLAIN (FORMAT JSON)", vec![json!({"QUERY PLAN": plan_json})]),
    );
    let provider = MockSourceProvider::new().with_source("app", source);
    let transport = RecordingTransport::new();
    let client = test_telemetry_client(transport.clone());

    populate_execution_plans(&provider, &[sample(42, Some("42-3-20231010101010"))], &client)
        .await
        .unwrap();

    assert_eq!(transport.event_types(), vec!["PostgresExecutionPlanMetrics".to_string(); 2]);
}
