// Wait-event collector
// Reads the pg_wait_sampling history joined to statement statistics. The
// stage requires both extensions; the selector additionally knows an
// activity-derived fallback for statements-only capability sets.

use crate::config::CollectionConfig;
use crate::models::capability::{CapabilitySet, PG_STAT_STATEMENTS, PG_WAIT_SAMPLING};
use crate::models::metrics::WaitEventSample;
use crate::services::pg_client::QuerySource;
use crate::services::publisher::publish_records;
use crate::services::query_catalog::{
    MAX_QUERY_COUNT_THRESHOLD, MetricFamily, TemplateArg, render_template, select_template,
};
use crate::services::telemetry_client::TelemetryClient;
use crate::utils::{StageError, StageResult, quoted_list};

fn is_eligible(caps: &CapabilitySet) -> bool {
    caps.has_extension(PG_WAIT_SAMPLING) && caps.has_extension(PG_STAT_STATEMENTS)
}

/// Fetch wait-event samples. Any row-decode failure aborts the stage.
pub async fn get_wait_events(
    source: &dyn QuerySource,
    caps: &CapabilitySet,
    settings: &CollectionConfig,
) -> StageResult<Vec<WaitEventSample>> {
    let template = select_template(MetricFamily::WaitEvents, caps)?;
    let sql = render_template(
        template,
        &[
            TemplateArg::Str(&quoted_list(&settings.databases)),
            TemplateArg::Int(settings.query_count_threshold.min(MAX_QUERY_COUNT_THRESHOLD)),
        ],
    );

    let rows = source.query(&sql).await?;

    let mut samples = Vec::with_capacity(rows.len());
    for row in rows {
        let sample: WaitEventSample =
            serde_json::from_value(row).map_err(StageError::row_decode)?;
        samples.push(sample);
    }

    Ok(samples)
}

/// Collect and publish wait-event samples for this cycle.
pub async fn populate_wait_events(
    source: &dyn QuerySource,
    caps: &CapabilitySet,
    settings: &CollectionConfig,
    client: &TelemetryClient,
) -> StageResult<()> {
    if !is_eligible(caps) {
        return Err(StageError::NotEligible);
    }

    let samples = get_wait_events(source, caps, settings).await?;
    if samples.is_empty() {
        tracing::debug!("No wait events found");
        return Ok(());
    }

    publish_records(&samples, client).await
}
