// Blocking-session collector
// Single-shot query over the lock graph (v12/v13) or pg_blocking_pids
// (v14+), with query text anonymized only on the two legacy versions where
// the source view still returns literal statements.

use crate::config::CollectionConfig;
use crate::models::capability::{
    CapabilitySet, PG_STAT_STATEMENTS, POSTGRES_VERSION_12, POSTGRES_VERSION_13,
};
use crate::models::metrics::BlockingSessionSample;
use crate::services::pg_client::QuerySource;
use crate::services::publisher::publish_records;
use crate::services::query_catalog::{
    MAX_QUERY_COUNT_THRESHOLD, MetricFamily, TemplateArg, render_template, select_template,
};
use crate::services::telemetry_client::TelemetryClient;
use crate::utils::{StageError, StageResult, anonymize_query_text, quoted_list};

fn is_eligible(caps: &CapabilitySet) -> bool {
    // Lock-graph views are always queryable on v12/v13; newer servers need
    // pg_stat_statements for statement attribution.
    if caps.version() == POSTGRES_VERSION_12 || caps.version() == POSTGRES_VERSION_13 {
        return true;
    }
    caps.has_extension(PG_STAT_STATEMENTS)
}

/// Fetch blocking-session pairs. Any row-decode failure aborts the stage:
/// partial results are discarded, not partially emitted.
pub async fn get_blocking_sessions(
    source: &dyn QuerySource,
    caps: &CapabilitySet,
    settings: &CollectionConfig,
) -> StageResult<Vec<BlockingSessionSample>> {
    let template = select_template(MetricFamily::BlockingSessions, caps)?;
    let sql = render_template(
        template,
        &[
            TemplateArg::Str(&quoted_list(&settings.databases)),
            TemplateArg::Int(settings.query_count_threshold.min(MAX_QUERY_COUNT_THRESHOLD)),
        ],
    );

    let rows = source.query(&sql).await?;

    let legacy_version =
        caps.version() == POSTGRES_VERSION_12 || caps.version() == POSTGRES_VERSION_13;

    let mut samples = Vec::with_capacity(rows.len());
    for row in rows {
        let mut sample: BlockingSessionSample =
            serde_json::from_value(row).map_err(StageError::row_decode)?;

        if legacy_version {
            if let Some(text) = &sample.blocked_query {
                sample.blocked_query = Some(anonymize_query_text(text));
            }
            if let Some(text) = &sample.blocking_query {
                sample.blocking_query = Some(anonymize_query_text(text));
            }
        }

        samples.push(sample);
    }

    Ok(samples)
}

/// Collect and publish blocking-session samples for this cycle.
pub async fn populate_blocking_sessions(
    source: &dyn QuerySource,
    caps: &CapabilitySet,
    settings: &CollectionConfig,
    client: &TelemetryClient,
) -> StageResult<()> {
    if !is_eligible(caps) {
        return Err(StageError::NotEligible);
    }

    let samples = get_blocking_sessions(source, caps, settings).await?;
    if samples.is_empty() {
        tracing::debug!("No blocking sessions found");
        return Ok(());
    }

    publish_records(&samples, client).await
}
