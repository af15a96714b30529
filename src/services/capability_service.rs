// Capability detector
// Probes the extension catalog and the server version once per monitoring
// cycle. The resulting CapabilitySet is owned by the cycle; it is never
// cached across cycles, so a server upgrade or downgrade is picked up on
// the next run.

use crate::models::capability::{CapabilitySet, TRACKED_EXTENSIONS};
use crate::services::pg_client::QuerySource;
use crate::services::query_catalog::{TemplateArg, render_template};
use crate::utils::{StageError, StageResult};
use once_cell::sync::Lazy;
use regex::Regex;

pub const SERVER_VERSION_QUERY: &str = "SELECT version()";
pub const EXTENSION_COUNT_QUERY: &str =
    "SELECT count(*) FROM pg_extension WHERE extname = '%s'";

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"PostgreSQL (\d+)\.").expect("invalid version regex"));

/// Fetch the server major version, e.g. 14 for "PostgreSQL 14.2 on x86_64".
pub async fn fetch_version(source: &dyn QuerySource) -> StageResult<u64> {
    let rows = source.query(SERVER_VERSION_QUERY).await?;
    let version_str = rows
        .first()
        .and_then(|row| row.get("version"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| StageError::Query("no rows returned from version query".to_string()))?;

    let captures = VERSION_PATTERN
        .captures(version_str)
        .ok_or_else(|| StageError::VersionParse(version_str.to_string()))?;

    captures[1]
        .parse::<u64>()
        .map_err(|_| StageError::VersionParse(version_str.to_string()))
}

/// An extension is enabled iff its catalog count is > 0.
pub async fn is_extension_enabled(source: &dyn QuerySource, name: &str) -> StageResult<bool> {
    let sql = render_template(EXTENSION_COUNT_QUERY, &[TemplateArg::Str(name)]);
    let rows = source.query(&sql).await?;
    let count = rows
        .first()
        .and_then(|row| row.get("count"))
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    Ok(count > 0)
}

/// Build the capability set for one target database.
pub async fn detect_capabilities(
    source: &dyn QuerySource,
    managed: bool,
) -> StageResult<CapabilitySet> {
    let version = fetch_version(source).await?;
    tracing::debug!("Detected PostgreSQL major version {}", version);

    let mut caps = CapabilitySet::new(version, managed);
    for extension in TRACKED_EXTENSIONS {
        let enabled = is_extension_enabled(source, extension).await?;
        tracing::debug!("Extension '{}' enabled: {}", extension, enabled);
        caps.set_extension(extension, enabled);
    }

    Ok(caps)
}
