// Server capability model
// One CapabilitySet is built per monitoring cycle per target database and
// passed by reference into every stage; it never outlives the cycle.

use std::collections::HashMap;

pub const POSTGRES_VERSION_12: u64 = 12;
pub const POSTGRES_VERSION_13: u64 = 13;
pub const POSTGRES_VERSION_14: u64 = 14;

/// Statement-statistics extension, source of slow-query aggregates.
pub const PG_STAT_STATEMENTS: &str = "pg_stat_statements";
/// Wait-sampling extension, source of the wait-event history buffer.
pub const PG_WAIT_SAMPLING: &str = "pg_wait_sampling";
/// Per-call sampling extension, source of individual query samples.
pub const PG_STAT_MONITOR: &str = "pg_stat_monitor";

/// Extensions probed by the capability detector each cycle.
pub const TRACKED_EXTENSIONS: &[&str] = &[PG_STAT_STATEMENTS, PG_WAIT_SAMPLING, PG_STAT_MONITOR];

/// Which optional extensions are installed plus the server major version.
///
/// Read-only once built; a stale set across cycles would mask a server
/// upgrade or downgrade, so callers must rebuild it every cycle.
#[derive(Debug, Clone)]
pub struct CapabilitySet {
    version: u64,
    managed: bool,
    extensions: HashMap<String, bool>,
}

impl CapabilitySet {
    pub fn new(version: u64, managed: bool) -> Self {
        Self { version, managed, extensions: HashMap::new() }
    }

    /// Server major version, e.g. 14 for "PostgreSQL 14.2".
    pub fn version(&self) -> u64 {
        self.version
    }

    /// True when the monitored instance is a managed/restricted deployment
    /// (e.g. a cloud service that hides parts of the catalog).
    pub fn is_managed(&self) -> bool {
        self.managed
    }

    pub fn set_extension(&mut self, name: &str, enabled: bool) {
        self.extensions.insert(name.to_string(), enabled);
    }

    /// An extension missing from the map counts as disabled.
    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.get(name).copied().unwrap_or(false)
    }
}
