// End-to-end pipeline scenarios across capability detection, collection,
// correlation, plan flattening and publishing, with the stages sequenced
// exactly as the orchestrator sequences them.

use crate::models::capability::{PG_STAT_MONITOR, PG_STAT_STATEMENTS, PG_WAIT_SAMPLING};
use crate::services::capability_service::detect_capabilities;
use crate::services::{
    blocking_session_service, execution_plan_service, individual_query_service,
    slow_query_service, wait_event_service,
};
use crate::tests::common::{
    MockQuerySource, MockSourceProvider, RecordingTransport, test_settings,
    test_telemetry_client,
};
use crate::utils::StageError;
use serde_json::json;
use std::sync::Arc;

fn capability_rows(
    source: MockQuerySource,
    version: &str,
    statements: i64,
    wait_sampling: i64,
    monitor: i64,
) -> MockQuerySource {
    source
        .with_rows("SELECT version()", vec![json!({"version": version})])
        .with_rows("extname = 'pg_stat_statements'", vec![json!({"count": statements})])
        .with_rows("extname = 'pg_wait_sampling'", vec![json!({"count": wait_sampling})])
        .with_rows("extname = 'pg_stat_monitor'", vec![json!({"count": monitor})])
}

#[tokio::test]
async fn slow_sample_correlates_to_anonymized_emission_and_literal_explain() {
    let source = capability_rows(MockQuerySource::new(), "PostgreSQL 14.2 on x86_64", 1, 0, 1)
        .with_rows(
            "pg_stat_statements pss",
            vec![json!({
                "query_id": 42,
                "query_text": "SELECT * FROM orders WHERE id=5",
                "database_name": "app",
                "schema_name": "public",
                "execution_count": 25,
                "avg_elapsed_time_ms": 982.123,
                "avg_cpu_time_ms": 982.123,
                "avg_disk_reads": 4.0,
                "avg_disk_writes": 0.0,
                "statement_type": "SELECT",
                "collection_timestamp": "2023-10-10T10:10:10Z"
            })],
        )
        .with_rows(
            "FROM pg_stat_monitor",
            vec![json!({
                "query_id": 42,
                "query_text": "SELECT * FROM orders WHERE id=5",
                "database_name": "app",
                "execution_timestamp": "2023-10-10T10:10:10Z",
                "avg_exec_time_ms": 812.5,
                "avg_cpu_time_ms": 500.25
            })],
        )
        .with_rows("pg_blocking_pids", vec![]);

    let explain_source = Arc::new(MockQuerySource::new().with_rows(
        "EXPLAIN (FORMAT JSON)",
        vec![json!({
            "QUERY PLAN": r#"[{"Plan": {"Node Type": "Index Scan", "Startup Cost": 0.29, "Total Cost": 8.31, "Plan Rows": 1}}]"#
        })],
    ));
    let provider = MockSourceProvider::new().with_source("app", Arc::clone(&explain_source));

    let transport = RecordingTransport::new();
    let client = test_telemetry_client(transport.clone());
    let settings = test_settings();

    let caps = detect_capabilities(&source, false).await.unwrap();
    assert_eq!(caps.version(), 14);

    let (slow, index) =
        slow_query_service::populate_slow_queries(&source, &caps, &settings, &client)
            .await
            .unwrap();

    // Wait events skip: the wait-sampling extension is disabled.
    let wait_result =
        wait_event_service::populate_wait_events(&source, &caps, &settings, &client).await;
    assert!(matches!(wait_result, Err(StageError::NotEligible)));

    blocking_session_service::populate_blocking_sessions(&source, &caps, &settings, &client)
        .await
        .unwrap();

    let individual = individual_query_service::populate_individual_queries(
        &source, &caps, &settings, &slow, &index, &client,
    )
    .await
    .unwrap();

    execution_plan_service::populate_execution_plans(&provider, &individual, &client)
        .await
        .unwrap();

    // The emitted individual metric carries the anonymized text...
    let payloads = transport.payloads();
    let individual_set = payloads
        .iter()
        .flat_map(|p| p.data.iter())
        .flat_map(|e| e.metric_sets.iter())
        .find(|set| set.event_type == "PostgresIndividualQueries")
        .expect("individual metric set emitted");
    assert_eq!(
        individual_set.metrics.get("individualquery.query_text").and_then(|v| v.as_str()),
        Some("SELECT * FROM orders WHERE id=?")
    );

    // ...while the flattener received the original literal text.
    assert_eq!(
        explain_source.executed_queries(),
        vec!["EXPLAIN (FORMAT JSON) SELECT * FROM orders WHERE id=5".to_string()]
    );

    // Plan rows inherit the synthetic plan id assigned during correlation.
    let plan_set = payloads
        .iter()
        .flat_map(|p| p.data.iter())
        .flat_map(|e| e.metric_sets.iter())
        .find(|set| set.event_type == "PostgresExecutionPlanMetrics")
        .expect("execution plan metric set emitted");
    assert_eq!(
        plan_set.metrics.get("executionplan.plan_id").and_then(|v| v.as_str()),
        individual[0].plan_id.as_deref()
    );
    assert_eq!(
        plan_set.metrics.get("executionplan.query_text").and_then(|v| v.as_str()),
        Some("SELECT * FROM orders WHERE id=?")
    );
}

#[tokio::test]
async fn disabled_sampling_extensions_skip_dependent_stages_only() {
    // pg_stat_statements present; both sampling extensions absent.
    let source = capability_rows(MockQuerySource::new(), "PostgreSQL 14.2 on x86_64", 1, 0, 0)
        .with_rows(
            "pg_stat_statements pss",
            vec![json!({
                "query_id": 1,
                "query_text": "SELECT 1",
                "database_name": "app"
            })],
        )
        .with_rows(
            "pg_blocking_pids",
            vec![json!({
                "blocked_pid": 10,
                "blocked_query": "SELECT 1",
                "database_name": "app",
                "blocking_pid": 20,
                "blocking_query": "SELECT 2",
                "blocking_database": "app"
            })],
        );

    let transport = RecordingTransport::new();
    let client = test_telemetry_client(transport.clone());
    let settings = test_settings();

    let caps = detect_capabilities(&source, false).await.unwrap();

    let (slow, index) =
        slow_query_service::populate_slow_queries(&source, &caps, &settings, &client)
            .await
            .unwrap();
    assert_eq!(slow.len(), 1);

    let wait_result =
        wait_event_service::populate_wait_events(&source, &caps, &settings, &client).await;
    assert!(matches!(wait_result, Err(StageError::NotEligible)));

    blocking_session_service::populate_blocking_sessions(&source, &caps, &settings, &client)
        .await
        .unwrap();

    let individual_result = individual_query_service::populate_individual_queries(
        &source, &caps, &settings, &slow, &index, &client,
    )
    .await;
    assert!(matches!(individual_result, Err(StageError::NotEligible)));

    // Slow-query and blocking-session stages still executed and published.
    let event_types = transport.event_types();
    assert!(event_types.contains(&"PostgresSlowQueries".to_string()));
    assert!(event_types.contains(&"PostgresBlockingSessions".to_string()));
    assert!(!event_types.contains(&"PostgresWaitEvents".to_string()));
    assert!(!event_types.contains(&"PostgresIndividualQueries".to_string()));
}
