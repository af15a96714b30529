// Batch publisher
// Maps typed records to metric sets through their static field descriptor
// tables and flushes in fixed-size windows, rotating the entity container
// between windows.

use crate::models::metrics::MetricRecord;
use crate::services::telemetry_client::TelemetryClient;
use crate::utils::StageResult;

/// Records accumulated before one flush. Compatibility constant, not a
/// tuning knob.
pub const PUBLISH_THRESHOLD: usize = 100;

/// Publish `records` as metric sets of `T::EVENT_TYPE`.
///
/// Flushes every `PUBLISH_THRESHOLD` records and once more for the final
/// partial window, so N records produce ceil(N / threshold) flushes. A
/// transport failure aborts the remaining windows of this call and is
/// returned to the caller; records already flushed stay flushed.
pub async fn publish_records<T: MetricRecord + 'static>(
    records: &[T],
    client: &TelemetryClient,
) -> StageResult<()> {
    if records.is_empty() {
        return Ok(());
    }

    let total = records.len();
    let mut entity = client.entity();
    let mut window_count = 0;

    for (index, record) in records.iter().enumerate() {
        let metric_set = entity.new_metric_set(T::EVENT_TYPE);
        for spec in T::field_specs() {
            if !spec.ingest {
                continue;
            }
            if let Some(value) = (spec.read)(record) {
                metric_set.set_metric(spec.metric_name, spec.kind, value);
            }
        }

        window_count += 1;
        if window_count == PUBLISH_THRESHOLD || index + 1 == total {
            window_count = 0;
            client.publish(entity).await?;
            entity = client.entity();
        }
    }

    tracing::debug!("Ingested {} {} records", total, T::EVENT_TYPE);
    Ok(())
}
