// Telemetry client
// The metric-set container and transport seam consumed by the batch
// publisher. The transport performs the actual emission: JSON payload to
// stdout by default (the integration-host contract), or an HTTP POST when
// an endpoint is configured.

use crate::models::metrics::{FieldValue, SourceKind};
use crate::utils::{StageError, StageResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

pub const ENTITY_TYPE: &str = "pg-instance";
pub const PROTOCOL_VERSION: &str = "3";

/// One flat mapping from metric name to value, tagged with its event type.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSet {
    pub event_type: String,
    pub metrics: Map<String, Value>,
}

impl MetricSet {
    pub fn new(event_type: &str) -> Self {
        let mut metrics = Map::new();
        metrics.insert("event_type".to_string(), Value::from(event_type));
        Self { event_type: event_type.to_string(), metrics }
    }

    /// Store one field according to its declared classification. A gauge
    /// carrying non-numeric text is dropped with a warning rather than
    /// corrupting the sample.
    pub fn set_metric(&mut self, name: &str, kind: SourceKind, value: FieldValue) {
        match (kind, value) {
            (SourceKind::Gauge, FieldValue::Numeric(v)) => {
                self.metrics.insert(name.to_string(), Value::from(v));
            },
            (SourceKind::Gauge, FieldValue::Text(s)) => match s.parse::<f64>() {
                Ok(v) => {
                    self.metrics.insert(name.to_string(), Value::from(v));
                },
                Err(_) => {
                    tracing::warn!("Gauge metric '{}' has non-numeric value '{}'", name, s);
                },
            },
            (SourceKind::Attribute, FieldValue::Text(s)) => {
                self.metrics.insert(name.to_string(), Value::from(s));
            },
            (SourceKind::Attribute, FieldValue::Numeric(v)) => {
                self.metrics.insert(name.to_string(), Value::from(v.to_string()));
            },
        }
    }
}

/// One monitored instance and its accumulated metric sets.
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub metric_sets: Vec<MetricSet>,
}

impl Entity {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), entity_type: ENTITY_TYPE.to_string(), metric_sets: Vec::new() }
    }

    /// Append an empty metric set and return it for population.
    pub fn new_metric_set(&mut self, event_type: &str) -> &mut MetricSet {
        self.metric_sets.push(MetricSet::new(event_type));
        self.metric_sets.last_mut().expect("metric set just pushed")
    }
}

/// The envelope handed to the transport on each flush.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrationPayload {
    pub name: String,
    pub protocol_version: String,
    pub integration_version: String,
    pub data: Vec<Entity>,
}

/// Emission backend. Implementations own delivery; the publisher only
/// decides when a window is full.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, payload: &IntegrationPayload) -> StageResult<()>;
}

/// Writes each payload as one JSON line on stdout, the contract expected by
/// an integration host process.
pub struct StdoutTransport;

#[async_trait]
impl Transport for StdoutTransport {
    async fn send(&self, payload: &IntegrationPayload) -> StageResult<()> {
        let body = serde_json::to_string(payload).map_err(StageError::transport)?;
        println!("{}", body);
        Ok(())
    }
}

/// POSTs each payload to a collector endpoint.
pub struct HttpTransport {
    http_client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: &str) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build HTTP client: {}. Using default configuration.", e);
                Client::default()
            });
        Self { http_client, endpoint: endpoint.to_string() }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &IntegrationPayload) -> StageResult<()> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(StageError::transport)?;

        if !response.status().is_success() {
            return Err(StageError::Transport(format!(
                "endpoint returned status {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Builds entities scoped to one monitored instance and flushes them
/// through the configured transport.
pub struct TelemetryClient {
    integration_name: String,
    integration_version: String,
    entity_name: String,
    transport: Arc<dyn Transport>,
}

impl TelemetryClient {
    pub fn new(
        integration_name: &str,
        integration_version: &str,
        entity_name: &str,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            integration_name: integration_name.to_string(),
            integration_version: integration_version.to_string(),
            entity_name: entity_name.to_string(),
            transport,
        }
    }

    /// A fresh entity container for the monitored instance.
    pub fn entity(&self) -> Entity {
        Entity::new(&self.entity_name)
    }

    /// Submit the entity's accumulated metric sets to the transport.
    pub async fn publish(&self, entity: Entity) -> StageResult<()> {
        let metric_count = entity.metric_sets.len();
        let payload = IntegrationPayload {
            name: self.integration_name.clone(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            integration_version: self.integration_version.clone(),
            data: vec![entity],
        };

        self.transport.send(&payload).await?;
        tracing::debug!("Published {} metric sets for entity '{}'", metric_count, self.entity_name);
        Ok(())
    }
}
