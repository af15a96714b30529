use crate::models::metrics::{IndividualQuerySample, SlowQuerySample};
use crate::services::publisher::{PUBLISH_THRESHOLD, publish_records};
use crate::tests::common::{FailingTransport, RecordingTransport, test_telemetry_client};
use crate::utils::StageError;
use std::sync::Arc;

fn slow_samples(count: usize) -> Vec<SlowQuerySample> {
    (0..count)
        .map(|i| SlowQuerySample {
            query_id: Some(i as i64),
            database_name: Some("app".to_string()),
            avg_elapsed_time_ms: Some(1.5 * i as f64),
            ..SlowQuerySample::default()
        })
        .collect()
}

#[tokio::test]
async fn flushes_once_per_full_window_plus_final_partial() {
    let transport = RecordingTransport::new();
    let client = test_telemetry_client(transport.clone());

    publish_records(&slow_samples(250), &client).await.unwrap();

    // ceil(250 / 100) flushes, last window holds the remainder.
    let payloads = transport.payloads();
    assert_eq!(payloads.len(), 3);
    let window_sizes: Vec<usize> =
        payloads.iter().map(|p| p.data[0].metric_sets.len()).collect();
    assert_eq!(window_sizes, vec![PUBLISH_THRESHOLD, PUBLISH_THRESHOLD, 50]);
}

#[tokio::test]
async fn exact_window_size_flushes_exactly_once() {
    let transport = RecordingTransport::new();
    let client = test_telemetry_client(transport.clone());

    publish_records(&slow_samples(100), &client).await.unwrap();

    assert_eq!(transport.flush_count(), 1);
}

#[tokio::test]
async fn small_batch_flushes_once() {
    let transport = RecordingTransport::new();
    let client = test_telemetry_client(transport.clone());

    publish_records(&slow_samples(3), &client).await.unwrap();

    assert_eq!(transport.flush_count(), 1);
    assert_eq!(transport.payloads()[0].data[0].metric_sets.len(), 3);
}

#[tokio::test]
async fn empty_input_never_touches_the_transport() {
    let transport = RecordingTransport::new();
    let client = test_telemetry_client(transport.clone());

    publish_records(&slow_samples(0), &client).await.unwrap();

    assert_eq!(transport.flush_count(), 0);
}

#[tokio::test]
async fn entity_identity_is_stamped_on_every_window() {
    let transport = RecordingTransport::new();
    let client = test_telemetry_client(transport.clone());

    publish_records(&slow_samples(150), &client).await.unwrap();

    for payload in transport.payloads() {
        assert_eq!(payload.data.len(), 1);
        assert_eq!(payload.data[0].name, "localhost:5432");
        assert_eq!(payload.data[0].entity_type, "pg-instance");
    }
}

#[tokio::test]
async fn gauges_and_attributes_follow_the_descriptor_table() {
    let transport = RecordingTransport::new();
    let client = test_telemetry_client(transport.clone());

    publish_records(&slow_samples(1), &client).await.unwrap();

    let payloads = transport.payloads();
    let metrics = &payloads[0].data[0].metric_sets[0].metrics;
    assert_eq!(metrics.get("event_type").and_then(|v| v.as_str()), Some("PostgresSlowQueries"));
    assert!(metrics.get("slowquery.query_id").map(|v| v.is_number()).unwrap_or(false));
    assert_eq!(metrics.get("slowquery.database_name").and_then(|v| v.as_str()), Some("app"));
    // None fields are omitted entirely, not emitted as nulls.
    assert!(!metrics.contains_key("slowquery.schema_name"));
}

#[tokio::test]
async fn non_ingested_fields_never_reach_the_transport() {
    let transport = RecordingTransport::new();
    let client = test_telemetry_client(transport.clone());

    let sample = IndividualQuerySample {
        query_id: Some(42),
        query_text: Some("SELECT * FROM orders WHERE id=?".to_string()),
        real_query_text: Some("SELECT * FROM orders WHERE id=5".to_string()),
        plan_id: Some("42-1-20231010101010".to_string()),
        database_name: Some("app".to_string()),
        ..IndividualQuerySample::default()
    };
    publish_records(&[sample], &client).await.unwrap();

    let payloads = transport.payloads();
    let metrics = &payloads[0].data[0].metric_sets[0].metrics;
    assert!(metrics.contains_key("individualquery.query_text"));
    assert!(!metrics.contains_key("individualquery.real_query_text"));
}

#[tokio::test]
async fn transport_failure_is_reported_to_the_caller() {
    let client = test_telemetry_client(Arc::new(FailingTransport));

    let result = publish_records(&slow_samples(5), &client).await;

    assert!(matches!(result, Err(StageError::Transport(_))));
}
