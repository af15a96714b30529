use crate::models::capability::{PG_STAT_STATEMENTS, PG_WAIT_SAMPLING};
use crate::services::wait_event_service::populate_wait_events;
use crate::tests::common::{
    MockQuerySource, RecordingTransport, capability_set, test_settings, test_telemetry_client,
};
use crate::utils::StageError;
use serde_json::json;

fn wait_row() -> serde_json::Value {
    json!({
        "wait_event_name": "IO:DataFileRead",
        "wait_category": "Disk IO",
        "total_wait_time_ms": 823.45,
        "waiting_tasks_count": 12,
        "collection_timestamp": "2023-10-10T10:10:10Z",
        "query_id": 42,
        "query_text": "SELECT * FROM orders WHERE id = $1",
        "database_name": "app"
    })
}

#[tokio::test]
async fn collects_and_publishes_wait_events() {
    let source = MockQuerySource::new().with_rows("pg_wait_sampling_history", vec![wait_row()]);
    let transport = RecordingTransport::new();
    let client = test_telemetry_client(transport.clone());
    let caps = capability_set(14, &[PG_WAIT_SAMPLING, PG_STAT_STATEMENTS]);

    populate_wait_events(&source, &caps, &test_settings(), &client).await.unwrap();

    let executed = source.executed_queries();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].contains("database_name IN ('app')"));
    assert_eq!(transport.event_types(), vec!["PostgresWaitEvents".to_string()]);
}

#[tokio::test]
async fn requires_both_sampling_and_statement_extensions() {
    for extensions in [&[][..], &[PG_STAT_STATEMENTS][..], &[PG_WAIT_SAMPLING][..]] {
        let source = MockQuerySource::new();
        let transport = RecordingTransport::new();
        let client = test_telemetry_client(transport.clone());
        let caps = capability_set(14, extensions);

        let result = populate_wait_events(&source, &caps, &test_settings(), &client).await;

        assert!(matches!(result, Err(StageError::NotEligible)));
        assert!(source.executed_queries().is_empty());
    }
}

#[tokio::test]
async fn query_failure_aborts_the_stage() {
    let source = MockQuerySource::new().with_error("pg_wait_sampling_history", "timeout");
    let transport = RecordingTransport::new();
    let client = test_telemetry_client(transport.clone());
    let caps = capability_set(14, &[PG_WAIT_SAMPLING, PG_STAT_STATEMENTS]);

    let result = populate_wait_events(&source, &caps, &test_settings(), &client).await;

    assert!(matches!(result, Err(StageError::Query(_))));
    assert_eq!(transport.flush_count(), 0);
}

#[tokio::test]
async fn row_decode_failure_aborts_the_stage() {
    let source = MockQuerySource::new().with_rows(
        "pg_wait_sampling_history",
        vec![json!({"waiting_tasks_count": "twelve"})],
    );
    let transport = RecordingTransport::new();
    let client = test_telemetry_client(transport.clone());
    let caps = capability_set(14, &[PG_WAIT_SAMPLING, PG_STAT_STATEMENTS]);

    let result = populate_wait_events(&source, &caps, &test_settings(), &client).await;

    assert!(matches!(result, Err(StageError::RowDecode(_))));
}
