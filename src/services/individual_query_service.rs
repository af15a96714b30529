// Individual-query correlator
// Re-queries per-call detail rows for the slow queries found this cycle,
// attaches anonymized text from the correlation index, and assigns each
// sample a synthetic plan id. The literal text is kept on the sample for
// the execution-plan stage only; the descriptor table excludes it from
// emission.

use crate::config::CollectionConfig;
use crate::models::capability::{CapabilitySet, PG_STAT_MONITOR};
use crate::models::metrics::{IndividualQuerySample, SlowQuerySample};
use crate::services::pg_client::QuerySource;
use crate::services::publisher::publish_records;
use crate::services::query_catalog::{
    MAX_INDIVIDUAL_QUERY_COUNT_THRESHOLD, MetricFamily, TemplateArg, render_template,
    select_template,
};
use crate::services::slow_query_service::CorrelationIndex;
use crate::services::telemetry_client::TelemetryClient;
use crate::utils::{StageError, StageResult, joined_ids};
use chrono::Utc;
use rand::Rng;

/// Exclusive upper bound for the random component of a plan id.
const RANDOM_INT_RANGE: i64 = 1_000_000;
/// Timestamp component layout of a plan id.
const PLAN_ID_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Build a synthetic plan id: `{query-id}-{random-integer}-{timestamp}`.
/// Collision-resistant within a cycle, no cryptographic requirement.
pub fn generate_plan_id(query_id: i64) -> String {
    let random_int = rand::thread_rng().gen_range(0..RANDOM_INT_RANGE);
    let timestamp = Utc::now().format(PLAN_ID_TIME_FORMAT);
    format!("{}-{}-{}", query_id, random_int, timestamp)
}

/// Fetch detail rows for the given slow queries and correlate them.
///
/// A row that fails to decode is logged and skipped; it does not abort the
/// stage. A query id absent from the index yields empty anonymized text by
/// design.
pub async fn get_individual_queries(
    source: &dyn QuerySource,
    caps: &CapabilitySet,
    settings: &CollectionConfig,
    slow_queries: &[SlowQuerySample],
    index: &CorrelationIndex,
) -> StageResult<Vec<IndividualQuerySample>> {
    let query_ids: Vec<i64> = slow_queries.iter().filter_map(|q| q.query_id).collect();
    if query_ids.is_empty() {
        tracing::debug!("No slow-query ids to correlate");
        return Ok(Vec::new());
    }

    let template = select_template(MetricFamily::IndividualQueries, caps)?;
    let sql = render_template(
        template,
        &[
            TemplateArg::Str(&joined_ids(&query_ids)),
            TemplateArg::Int(settings.query_response_time_threshold),
            TemplateArg::Int(MAX_INDIVIDUAL_QUERY_COUNT_THRESHOLD),
        ],
    );

    let rows = source.query(&sql).await?;

    let mut samples = Vec::with_capacity(rows.len());
    for row in rows {
        let mut sample: IndividualQuerySample = match serde_json::from_value(row) {
            Ok(sample) => sample,
            Err(e) => {
                tracing::error!("Could not decode individual query row: {}", e);
                continue;
            },
        };

        let anonymized = match (&sample.database_name, sample.query_id) {
            (Some(database), Some(query_id)) => index.lookup(database, query_id),
            _ => String::new(),
        };

        sample.real_query_text = sample.query_text.take();
        sample.query_text = Some(anonymized);
        sample.plan_id = sample.query_id.map(generate_plan_id);

        samples.push(sample);
    }

    Ok(samples)
}

/// Collect, publish and return individual-query samples for this cycle.
///
/// The returned samples still carry their literal text for the
/// execution-plan stage; the publisher never emits that field.
pub async fn populate_individual_queries(
    source: &dyn QuerySource,
    caps: &CapabilitySet,
    settings: &CollectionConfig,
    slow_queries: &[SlowQuerySample],
    index: &CorrelationIndex,
    client: &TelemetryClient,
) -> StageResult<Vec<IndividualQuerySample>> {
    if !caps.has_extension(PG_STAT_MONITOR) {
        return Err(StageError::NotEligible);
    }

    let samples = get_individual_queries(source, caps, settings, slow_queries, index).await?;
    if samples.is_empty() {
        tracing::debug!("No individual queries found");
        return Ok(samples);
    }

    publish_records(&samples, client).await?;
    Ok(samples)
}
