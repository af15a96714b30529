// Common test utilities and helpers

use crate::config::CollectionConfig;
use crate::models::capability::CapabilitySet;
use crate::services::pg_client::QuerySource;
use crate::services::pg_pool_manager::QuerySourceProvider;
use crate::services::telemetry_client::{IntegrationPayload, TelemetryClient, Transport};
use crate::utils::{StageError, StageResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

enum Outcome {
    Rows(Vec<Value>),
    Fail(String),
}

struct Expectation {
    needle: String,
    outcome: Outcome,
}

/// Canned query source: expectations are matched by substring against the
/// issued SQL, first match wins. Unexpected queries fail the stage so a
/// test never silently runs against empty data.
#[derive(Default)]
pub struct MockQuerySource {
    expectations: Mutex<Vec<Expectation>>,
    executed: Mutex<Vec<String>>,
}

impl MockQuerySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, needle: &str, rows: Vec<Value>) -> Self {
        self.expectations
            .lock()
            .unwrap()
            .push(Expectation { needle: needle.to_string(), outcome: Outcome::Rows(rows) });
        self
    }

    pub fn with_error(self, needle: &str, message: &str) -> Self {
        self.expectations
            .lock()
            .unwrap()
            .push(Expectation { needle: needle.to_string(), outcome: Outcome::Fail(message.to_string()) });
        self
    }

    /// Every SQL string issued against this source, in order.
    pub fn executed_queries(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuerySource for MockQuerySource {
    async fn query(&self, sql: &str) -> StageResult<Vec<Value>> {
        self.executed.lock().unwrap().push(sql.to_string());

        let expectations = self.expectations.lock().unwrap();
        for expectation in expectations.iter() {
            if sql.contains(&expectation.needle) {
                return match &expectation.outcome {
                    Outcome::Rows(rows) => Ok(rows.clone()),
                    Outcome::Fail(message) => Err(StageError::Query(message.clone())),
                };
            }
        }

        Err(StageError::Query(format!("unexpected query: {}", sql)))
    }
}

/// Source provider backed by a map of database name to mock source.
#[derive(Default)]
pub struct MockSourceProvider {
    sources: HashMap<String, Arc<MockQuerySource>>,
}

impl MockSourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, database: &str, source: Arc<MockQuerySource>) -> Self {
        self.sources.insert(database.to_string(), source);
        self
    }
}

#[async_trait]
impl QuerySourceProvider for MockSourceProvider {
    async fn source_for(&self, database: &str) -> StageResult<Arc<dyn QuerySource>> {
        match self.sources.get(database) {
            Some(source) => Ok(Arc::clone(source) as Arc<dyn QuerySource>),
            None => Err(StageError::Query(format!("no source for database '{}'", database))),
        }
    }
}

/// Transport that records every payload instead of emitting it.
#[derive(Default)]
pub struct RecordingTransport {
    payloads: Mutex<Vec<IntegrationPayload>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn payloads(&self) -> Vec<IntegrationPayload> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn flush_count(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    /// Event types of every metric set across all flushed payloads.
    pub fn event_types(&self) -> Vec<String> {
        self.payloads()
            .iter()
            .flat_map(|payload| payload.data.iter())
            .flat_map(|entity| entity.metric_sets.iter())
            .map(|set| set.event_type.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, payload: &IntegrationPayload) -> StageResult<()> {
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// Transport that rejects every flush.
pub struct FailingTransport;

#[async_trait]
impl Transport for FailingTransport {
    async fn send(&self, _payload: &IntegrationPayload) -> StageResult<()> {
        Err(StageError::Transport("sink unavailable".to_string()))
    }
}

pub fn test_telemetry_client(transport: Arc<dyn Transport>) -> TelemetryClient {
    TelemetryClient::new("com.pgpulse.postgresql", "1.0.0", "localhost:5432", transport)
}

pub fn capability_set(version: u64, extensions: &[&str]) -> CapabilitySet {
    let mut caps = CapabilitySet::new(version, false);
    for extension in extensions {
        caps.set_extension(extension, true);
    }
    caps
}

pub fn test_settings() -> CollectionConfig {
    CollectionConfig { databases: vec!["app".to_string()], ..CollectionConfig::default() }
}
