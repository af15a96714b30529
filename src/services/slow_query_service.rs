// Slow-query collector
// Runs the version-specific pg_stat_statements template, publishes the
// samples, and builds the correlation index consumed by the
// individual-query stage in the same pass.

use crate::config::CollectionConfig;
use crate::models::capability::{CapabilitySet, PG_STAT_STATEMENTS};
use crate::models::metrics::SlowQuerySample;
use crate::services::pg_client::QuerySource;
use crate::services::publisher::publish_records;
use crate::services::query_catalog::{
    MAX_QUERY_COUNT_THRESHOLD, MetricFamily, TemplateArg, render_template, select_template,
};
use crate::services::telemetry_client::TelemetryClient;
use crate::utils::{StageError, StageResult, anonymize_query_text, quoted_list};
use std::collections::HashMap;

/// Anonymized query text indexed by (database name, query id).
///
/// Built once from the full slow-query sample set and consumed read-only by
/// the correlator. A missing key yields an empty string: degraded output,
/// never an error.
#[derive(Debug, Default)]
pub struct CorrelationIndex {
    by_database: HashMap<String, HashMap<i64, String>>,
}

impl CorrelationIndex {
    pub fn insert(&mut self, database: &str, query_id: i64, anonymized_text: String) {
        self.by_database
            .entry(database.to_string())
            .or_default()
            .insert(query_id, anonymized_text);
    }

    pub fn lookup(&self, database: &str, query_id: i64) -> String {
        self.by_database
            .get(database)
            .and_then(|queries| queries.get(&query_id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_database.is_empty()
    }
}

/// Fetch slow-query samples and build the correlation index.
///
/// A failure decoding any row aborts the whole stage: a partially built
/// index would silently mis-correlate later samples.
pub async fn get_slow_queries(
    source: &dyn QuerySource,
    caps: &CapabilitySet,
    settings: &CollectionConfig,
) -> StageResult<(Vec<SlowQuerySample>, CorrelationIndex)> {
    let template = select_template(MetricFamily::SlowQueries, caps)?;
    let sql = render_template(
        template,
        &[
            TemplateArg::Str(&quoted_list(&settings.databases)),
            TemplateArg::Int(settings.query_count_threshold.min(MAX_QUERY_COUNT_THRESHOLD)),
        ],
    );

    let rows = source.query(&sql).await?;

    let mut samples = Vec::with_capacity(rows.len());
    let mut index = CorrelationIndex::default();
    for row in rows {
        let sample: SlowQuerySample =
            serde_json::from_value(row).map_err(StageError::row_decode)?;

        if let (Some(database), Some(query_id), Some(text)) =
            (&sample.database_name, sample.query_id, &sample.query_text)
        {
            index.insert(database, query_id, anonymize_query_text(text));
        }

        samples.push(sample);
    }

    Ok((samples, index))
}

/// Collect and publish slow-query samples for this cycle.
///
/// Returns the sample list and correlation index for the downstream
/// individual-query stage.
pub async fn populate_slow_queries(
    source: &dyn QuerySource,
    caps: &CapabilitySet,
    settings: &CollectionConfig,
    client: &TelemetryClient,
) -> StageResult<(Vec<SlowQuerySample>, CorrelationIndex)> {
    if !caps.has_extension(PG_STAT_STATEMENTS) {
        return Err(StageError::NotEligible);
    }

    let (samples, index) = get_slow_queries(source, caps, settings).await?;
    if samples.is_empty() {
        tracing::debug!("No slow-running queries found");
        return Ok((samples, index));
    }

    publish_records(&samples, client).await?;
    Ok((samples, index))
}
