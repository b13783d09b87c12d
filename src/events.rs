//! Analytics event pipeline.
//!
//! Services report notable auth events (sign-in started, suspicious payload,
//! confirmation outcome) to an [`EventSink`]. The default sink forwards to
//! `tracing`; [`HttpSink`] ships events to a collector endpoint.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A single analytics event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEvent {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    pub detail: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl AuthEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            correlation_id: None,
            detail: serde_json::Value::Null,
            at: Utc::now(),
        }
    }

    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Sink for analytics events. Implementations must not block the caller.
pub trait EventSink: Send + Sync {
    fn log(&self, event: AuthEvent);
}

/// Default sink: forwards events to `tracing` at debug level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn log(&self, event: AuthEvent) {
        tracing::debug!(
            name = %event.name,
            correlation_id = ?event.correlation_id,
            detail = %event.detail,
            "auth event"
        );
    }
}

/// Sink that ships each event to a collector endpoint, fire-and-forget.
///
/// Delivery failures are logged and dropped; analytics must never disturb the
/// auth flow itself.
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl EventSink for HttpSink {
    fn log(&self, event: AuthEvent) {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            if let Err(err) = client.post(&endpoint).json(&event).send().await {
                tracing::debug!(error = %err, "failed to ship auth event");
            }
        });
    }
}

/// Shared sink handle used across services.
pub type SharedSink = Arc<dyn EventSink>;
