// Query catalog and selector
// Purpose: map (metric family, capability set) to the SQL template for this
// server, through a static rule table instead of cascading branches.
//
// Template text is a compatibility surface. Substitution points are
// positional printf-style markers: %s (string fragment) and %d (integer),
// rendered by `render_template`; %% is a literal percent.

use crate::models::capability::{
    CapabilitySet, PG_STAT_MONITOR, PG_STAT_STATEMENTS, PG_WAIT_SAMPLING, POSTGRES_VERSION_12,
    POSTGRES_VERSION_13, POSTGRES_VERSION_14,
};
use crate::utils::{StageError, StageResult};

/// Cap on the slow/blocking/wait row-count threshold a deployment may ask for.
pub const MAX_QUERY_COUNT_THRESHOLD: i64 = 30;
/// Cap on the individual-query detail rows fetched per cycle.
pub const MAX_INDIVIDUAL_QUERY_COUNT_THRESHOLD: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricFamily {
    SlowQueries,
    BlockingSessions,
    IndividualQueries,
    WaitEvents,
}

pub const SLOW_QUERIES_FOR_V12: &str = r#"SELECT
    pss.queryid AS query_id,
    LEFT(pss.query, 4095) AS query_text,
    pd.datname AS database_name,
    current_schema() AS schema_name,
    pss.calls AS execution_count,
    ROUND((pss.total_time / pss.calls)::numeric, 3) AS avg_elapsed_time_ms,
    ROUND((pss.total_time / pss.calls)::numeric, 3) AS avg_cpu_time_ms,
    pss.shared_blks_read / pss.calls AS avg_disk_reads,
    pss.shared_blks_written / pss.calls AS avg_disk_writes,
    CASE
        WHEN pss.query ILIKE 'SELECT%' THEN 'SELECT'
        WHEN pss.query ILIKE 'INSERT%' THEN 'INSERT'
        WHEN pss.query ILIKE 'UPDATE%' THEN 'UPDATE'
        WHEN pss.query ILIKE 'DELETE%' THEN 'DELETE'
        ELSE 'OTHER'
    END AS statement_type,
    to_char(NOW() AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS collection_timestamp
FROM
    pg_stat_statements pss
JOIN
    pg_database pd ON pss.dbid = pd.oid
WHERE
    pd.datname IN (%s)
    AND pss.query NOT LIKE 'EXPLAIN (FORMAT JSON) %'
ORDER BY
    avg_elapsed_time_ms DESC
LIMIT
    %d;"#;

pub const SLOW_QUERIES_FOR_V13_AND_ABOVE: &str = r#"SELECT
    pss.queryid AS query_id,
    LEFT(pss.query, 4095) AS query_text,
    pd.datname AS database_name,
    current_schema() AS schema_name,
    pss.calls AS execution_count,
    ROUND((pss.total_exec_time / pss.calls)::numeric, 3) AS avg_elapsed_time_ms,
    ROUND((pss.total_exec_time / pss.calls)::numeric, 3) AS avg_cpu_time_ms,
    pss.shared_blks_read / pss.calls AS avg_disk_reads,
    pss.shared_blks_written / pss.calls AS avg_disk_writes,
    CASE
        WHEN pss.query ILIKE 'SELECT%' THEN 'SELECT'
        WHEN pss.query ILIKE 'INSERT%' THEN 'INSERT'
        WHEN pss.query ILIKE 'UPDATE%' THEN 'UPDATE'
        WHEN pss.query ILIKE 'DELETE%' THEN 'DELETE'
        ELSE 'OTHER'
    END AS statement_type,
    to_char(NOW() AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS collection_timestamp
FROM
    pg_stat_statements pss
JOIN
    pg_database pd ON pss.dbid = pd.oid
WHERE
    pd.datname IN (%s)
    AND pss.query NOT LIKE 'EXPLAIN (FORMAT JSON) %'
ORDER BY
    avg_elapsed_time_ms DESC
LIMIT
    %d;"#;

/// Lock-catalog walk; the only way to pair blockers before pg_blocking_pids
/// gained query-id visibility.
pub const BLOCKING_QUERIES_FOR_V12_AND_V13: &str = r#"SELECT
    blocked_locks.pid AS blocked_pid,
    LEFT(blocked_activity.query, 4095) AS blocked_query,
    to_char(blocked_activity.query_start AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS blocked_query_start,
    blocked_activity.datname AS database_name,
    blocking_locks.pid AS blocking_pid,
    LEFT(blocking_activity.query, 4095) AS blocking_query,
    to_char(blocking_activity.query_start AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS blocking_query_start,
    blocking_activity.datname AS blocking_database
FROM pg_catalog.pg_locks blocked_locks
JOIN pg_catalog.pg_stat_activity blocked_activity ON blocked_activity.pid = blocked_locks.pid
JOIN pg_catalog.pg_locks blocking_locks ON blocking_locks.locktype = blocked_locks.locktype
    AND blocking_locks.database IS NOT DISTINCT FROM blocked_locks.database
    AND blocking_locks.relation IS NOT DISTINCT FROM blocked_locks.relation
    AND blocking_locks.page IS NOT DISTINCT FROM blocked_locks.page
    AND blocking_locks.tuple IS NOT DISTINCT FROM blocked_locks.tuple
    AND blocking_locks.virtualxid IS NOT DISTINCT FROM blocked_locks.virtualxid
    AND blocking_locks.transactionid IS NOT DISTINCT FROM blocked_locks.transactionid
    AND blocking_locks.classid IS NOT DISTINCT FROM blocked_locks.classid
    AND blocking_locks.objid IS NOT DISTINCT FROM blocked_locks.objid
    AND blocking_locks.objsubid IS NOT DISTINCT FROM blocked_locks.objsubid
    AND blocking_locks.pid != blocked_locks.pid
JOIN pg_catalog.pg_stat_activity blocking_activity ON blocking_activity.pid = blocking_locks.pid
WHERE NOT blocked_locks.granted
    AND blocked_activity.datname IN (%s)
LIMIT %d;"#;

pub const BLOCKING_QUERIES_FOR_V14_AND_ABOVE: &str = r#"SELECT
    blocked_activity.pid AS blocked_pid,
    LEFT(blocked_activity.query, 4095) AS blocked_query,
    blocked_activity.query_id AS blocked_query_id,
    to_char(blocked_activity.query_start AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS blocked_query_start,
    blocked_activity.datname AS database_name,
    blocking_activity.pid AS blocking_pid,
    LEFT(blocking_activity.query, 4095) AS blocking_query,
    blocking_activity.query_id AS blocking_query_id,
    to_char(blocking_activity.query_start AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS blocking_query_start,
    blocking_activity.datname AS blocking_database
FROM pg_stat_activity blocked_activity
JOIN pg_stat_activity blocking_activity
    ON blocking_activity.pid = ANY(pg_blocking_pids(blocked_activity.pid))
WHERE blocked_activity.wait_event_type = 'Lock'
    AND blocked_activity.datname IN (%s)
LIMIT %d;"#;

/// Managed/restricted deployments disable compute_query_id, so the query-id
/// columns are dropped rather than returned as NULL noise.
pub const BLOCKING_QUERIES_FOR_V14_AND_ABOVE_MANAGED: &str = r#"SELECT
    blocked_activity.pid AS blocked_pid,
    LEFT(blocked_activity.query, 4095) AS blocked_query,
    to_char(blocked_activity.query_start AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS blocked_query_start,
    blocked_activity.datname AS database_name,
    blocking_activity.pid AS blocking_pid,
    LEFT(blocking_activity.query, 4095) AS blocking_query,
    to_char(blocking_activity.query_start AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS blocking_query_start,
    blocking_activity.datname AS blocking_database
FROM pg_stat_activity blocked_activity
JOIN pg_stat_activity blocking_activity
    ON blocking_activity.pid = ANY(pg_blocking_pids(blocked_activity.pid))
WHERE blocked_activity.wait_event_type = 'Lock'
    AND blocked_activity.datname IN (%s)
LIMIT %d;"#;

pub const INDIVIDUAL_QUERY_SEARCH_V12: &str = r#"SELECT
    queryid AS query_id,
    LEFT(query, 4095) AS query_text,
    datname AS database_name,
    to_char(bucket_start_time AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS execution_timestamp,
    ROUND(mean_time::numeric, 3) AS avg_exec_time_ms,
    ROUND((cpu_user_time + cpu_sys_time)::numeric, 3) AS avg_cpu_time_ms
FROM pg_stat_monitor
WHERE queryid IN (%s)
    AND mean_time > %d
ORDER BY avg_exec_time_ms DESC
LIMIT %d;"#;

pub const INDIVIDUAL_QUERY_SEARCH_V13_AND_ABOVE: &str = r#"SELECT
    queryid AS query_id,
    LEFT(query, 4095) AS query_text,
    datname AS database_name,
    to_char(bucket_start_time AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS execution_timestamp,
    ROUND(mean_exec_time::numeric, 3) AS avg_exec_time_ms,
    ROUND((cpu_user_time + cpu_sys_time)::numeric, 3) AS avg_cpu_time_ms
FROM pg_stat_monitor
WHERE queryid IN (%s)
    AND mean_exec_time > %d
ORDER BY avg_exec_time_ms DESC
LIMIT %d;"#;

/// Wait-event history joined back to statement statistics.
pub const WAIT_EVENTS: &str = r#"WITH wait_history AS (
    SELECT
        wh.pid,
        wh.event_type,
        wh.event,
        wh.ts,
        pg_database.datname AS database_name,
        LEAD(wh.ts) OVER (PARTITION BY wh.pid ORDER BY wh.ts) - wh.ts AS duration,
        LEFT(sa.query, 4095) AS query_text,
        sa.queryid AS query_id
    FROM
        pg_wait_sampling_history wh
    LEFT JOIN
        pg_stat_statements sa ON wh.queryid = sa.queryid
    LEFT JOIN
        pg_database ON pg_database.oid = sa.dbid
)
SELECT
    event_type || ':' || event AS wait_event_name,
    CASE
        WHEN event_type IN ('LWLock', 'Lock') THEN 'Locks'
        WHEN event_type = 'IO' THEN 'Disk IO'
        WHEN event_type = 'CPU' THEN 'CPU'
        ELSE 'Other'
    END AS wait_category,
    EXTRACT(EPOCH FROM SUM(duration)) * 1000 AS total_wait_time_ms,
    COUNT(*) AS waiting_tasks_count,
    to_char(NOW() AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS collection_timestamp,
    query_id,
    query_text,
    database_name
FROM wait_history
WHERE duration IS NOT NULL
    AND query_id IS NOT NULL
    AND event_type IS NOT NULL
    AND database_name IN (%s)
GROUP BY event_type, event, query_id, query_text, database_name
ORDER BY total_wait_time_ms DESC
LIMIT %d;"#;

/// Fallback derived from live session activity when the wait-sampling
/// buffer is unavailable.
pub const WAIT_EVENTS_FROM_PG_STAT_ACTIVITY: &str = r#"SELECT
    wait_event_type || ':' || wait_event AS wait_event_name,
    CASE
        WHEN wait_event_type IN ('LWLock', 'Lock') THEN 'Locks'
        WHEN wait_event_type = 'IO' THEN 'Disk IO'
        WHEN wait_event_type = 'CPU' THEN 'CPU'
        ELSE 'Other'
    END AS wait_category,
    EXTRACT(EPOCH FROM SUM(NOW() - query_start)) * 1000 AS total_wait_time_ms,
    COUNT(*) AS waiting_tasks_count,
    to_char(NOW() AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS collection_timestamp,
    query_id,
    LEFT(query, 4095) AS query_text,
    datname AS database_name
FROM pg_stat_activity
WHERE wait_event IS NOT NULL
    AND query_id IS NOT NULL
    AND datname IN (%s)
GROUP BY wait_event_type, wait_event, query_id, query, datname
ORDER BY total_wait_time_ms DESC
LIMIT %d;"#;

/// One selector rule: a family plus the version window, required
/// extensions, and managed-deployment constraint under which `template`
/// applies. Rules are evaluated top to bottom, first match wins.
struct SelectorRule {
    family: MetricFamily,
    min_version: u64,
    max_version: u64,
    requires: &'static [&'static str],
    /// None matches both managed and self-hosted deployments.
    managed: Option<bool>,
    template: &'static str,
}

static SELECTOR_RULES: &[SelectorRule] = &[
    SelectorRule {
        family: MetricFamily::SlowQueries,
        min_version: POSTGRES_VERSION_12,
        max_version: POSTGRES_VERSION_12,
        requires: &[PG_STAT_STATEMENTS],
        managed: None,
        template: SLOW_QUERIES_FOR_V12,
    },
    SelectorRule {
        family: MetricFamily::SlowQueries,
        min_version: POSTGRES_VERSION_13,
        max_version: u64::MAX,
        requires: &[PG_STAT_STATEMENTS],
        managed: None,
        template: SLOW_QUERIES_FOR_V13_AND_ABOVE,
    },
    // Lock-graph views are always present, so v12/v13 blocking sessions
    // carry no extension requirement.
    SelectorRule {
        family: MetricFamily::BlockingSessions,
        min_version: POSTGRES_VERSION_12,
        max_version: POSTGRES_VERSION_13,
        requires: &[],
        managed: None,
        template: BLOCKING_QUERIES_FOR_V12_AND_V13,
    },
    SelectorRule {
        family: MetricFamily::BlockingSessions,
        min_version: POSTGRES_VERSION_14,
        max_version: u64::MAX,
        requires: &[],
        managed: Some(false),
        template: BLOCKING_QUERIES_FOR_V14_AND_ABOVE,
    },
    SelectorRule {
        family: MetricFamily::BlockingSessions,
        min_version: POSTGRES_VERSION_14,
        max_version: u64::MAX,
        requires: &[],
        managed: Some(true),
        template: BLOCKING_QUERIES_FOR_V14_AND_ABOVE_MANAGED,
    },
    SelectorRule {
        family: MetricFamily::IndividualQueries,
        min_version: POSTGRES_VERSION_12,
        max_version: POSTGRES_VERSION_12,
        requires: &[PG_STAT_MONITOR],
        managed: None,
        template: INDIVIDUAL_QUERY_SEARCH_V12,
    },
    SelectorRule {
        family: MetricFamily::IndividualQueries,
        min_version: POSTGRES_VERSION_13,
        max_version: u64::MAX,
        requires: &[PG_STAT_MONITOR],
        managed: None,
        template: INDIVIDUAL_QUERY_SEARCH_V13_AND_ABOVE,
    },
    SelectorRule {
        family: MetricFamily::WaitEvents,
        min_version: POSTGRES_VERSION_12,
        max_version: u64::MAX,
        requires: &[PG_WAIT_SAMPLING, PG_STAT_STATEMENTS],
        managed: None,
        template: WAIT_EVENTS,
    },
    SelectorRule {
        family: MetricFamily::WaitEvents,
        min_version: POSTGRES_VERSION_12,
        max_version: u64::MAX,
        requires: &[PG_STAT_STATEMENTS],
        managed: None,
        template: WAIT_EVENTS_FROM_PG_STAT_ACTIVITY,
    },
];

/// Pick the query template for `family` on the server described by `caps`.
///
/// Returns `UnsupportedVersion` when no rule covers the server version and
/// `NotEligible` when a version-matching rule exists but its required
/// extensions are missing. Callers treat both as "skip this family for the
/// cycle", never as fatal.
pub fn select_template(family: MetricFamily, caps: &CapabilitySet) -> StageResult<&'static str> {
    let mut version_matched = false;

    for rule in SELECTOR_RULES {
        if rule.family != family {
            continue;
        }
        if caps.version() < rule.min_version || caps.version() > rule.max_version {
            continue;
        }
        if let Some(managed) = rule.managed {
            if managed != caps.is_managed() {
                continue;
            }
        }
        version_matched = true;
        if rule.requires.iter().all(|ext| caps.has_extension(ext)) {
            return Ok(rule.template);
        }
    }

    if version_matched {
        Err(StageError::NotEligible)
    } else {
        Err(StageError::UnsupportedVersion)
    }
}

/// Positional template argument for `render_template`.
pub enum TemplateArg<'a> {
    Str(&'a str),
    Int(i64),
}

/// Substitute `%s`/`%d` markers left to right with `args`; `%%` renders a
/// literal percent. Bare percents (e.g. in `ILIKE 'SELECT%'`) pass through.
pub fn render_template(template: &str, args: &[TemplateArg<'_>]) -> String {
    let mut out = String::with_capacity(template.len() + 64);
    let mut arg_iter = args.iter();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
            },
            Some('s') | Some('d') => {
                chars.next();
                match arg_iter.next() {
                    Some(TemplateArg::Str(s)) => out.push_str(s),
                    Some(TemplateArg::Int(i)) => out.push_str(&i.to_string()),
                    None => {},
                }
            },
            _ => out.push('%'),
        }
    }

    out
}
