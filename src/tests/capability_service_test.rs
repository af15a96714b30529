use crate::models::capability::{PG_STAT_MONITOR, PG_STAT_STATEMENTS, PG_WAIT_SAMPLING};
use crate::services::capability_service::{
    detect_capabilities, fetch_version, is_extension_enabled,
};
use crate::tests::common::MockQuerySource;
use crate::utils::StageError;
use serde_json::json;

#[tokio::test]
async fn fetch_version_parses_major_version() {
    let source = MockQuerySource::new().with_rows(
        "SELECT version()",
        vec![json!({"version": "PostgreSQL 14.2 (Debian 14.2-1.pgdg110+1) on x86_64-pc-linux-gnu"})],
    );

    assert_eq!(fetch_version(&source).await.unwrap(), 14);
}

#[tokio::test]
async fn fetch_version_rejects_unparsable_string() {
    let source = MockQuerySource::new()
        .with_rows("SELECT version()", vec![json!({"version": "EnterpriseDB 9.x"})]);

    assert!(matches!(fetch_version(&source).await, Err(StageError::VersionParse(_))));
}

#[tokio::test]
async fn fetch_version_requires_a_row() {
    let source = MockQuerySource::new().with_rows("SELECT version()", vec![]);

    assert!(matches!(fetch_version(&source).await, Err(StageError::Query(_))));
}

#[tokio::test]
async fn extension_enabled_iff_count_positive() {
    let source = MockQuerySource::new()
        .with_rows("extname = 'pg_stat_statements'", vec![json!({"count": 1})])
        .with_rows("extname = 'pg_wait_sampling'", vec![json!({"count": 0})]);

    assert!(is_extension_enabled(&source, PG_STAT_STATEMENTS).await.unwrap());
    assert!(!is_extension_enabled(&source, PG_WAIT_SAMPLING).await.unwrap());
}

#[tokio::test]
async fn detect_capabilities_probes_every_tracked_extension() {
    let source = MockQuerySource::new()
        .with_rows("SELECT version()", vec![json!({"version": "PostgreSQL 13.7 on x86_64"})])
        .with_rows("extname = 'pg_stat_statements'", vec![json!({"count": 1})])
        .with_rows("extname = 'pg_wait_sampling'", vec![json!({"count": 0})])
        .with_rows("extname = 'pg_stat_monitor'", vec![json!({"count": 1})]);

    let caps = detect_capabilities(&source, false).await.unwrap();

    assert_eq!(caps.version(), 13);
    assert!(!caps.is_managed());
    assert!(caps.has_extension(PG_STAT_STATEMENTS));
    assert!(!caps.has_extension(PG_WAIT_SAMPLING));
    assert!(caps.has_extension(PG_STAT_MONITOR));
}

#[tokio::test]
async fn detect_capabilities_propagates_probe_failures() {
    let source = MockQuerySource::new()
        .with_rows("SELECT version()", vec![json!({"version": "PostgreSQL 14.0"})])
        .with_error("extname = 'pg_stat_statements'", "connection reset");

    assert!(matches!(detect_capabilities(&source, false).await, Err(StageError::Query(_))));
}
