//! pgpulse Library
//!
//! This library contains all the core modules for the pgpulse collector:
//! capability detection, version-gated query selection, the collection
//! pipeline stages, and windowed metric publishing.

pub mod config;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::Config;
pub use models::{CapabilitySet, MetricRecord};
pub use services::{
    PgClient, PgPoolManager, QueryMonitorService, QuerySource, QuerySourceProvider,
    TelemetryClient,
};
pub use utils::{CollectorError, CollectorResult, StageError, StageResult};
