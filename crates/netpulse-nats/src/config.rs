//! Configuration for the NATS message bus.

use std::time::Duration;

/// Configuration for the NATS message bus.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// NATS server URLs (several for a cluster).
    pub urls: Vec<String>,
    /// JetStream stream holding jobs and telemetry.
    pub stream_name: String,
    /// Durable consumer name for the job subscription; derived from the
    /// hardware id so redelivery tracks this agent.
    pub consumer_name: String,
    /// Maximum reconnection attempts (`None` = unlimited).
    pub max_reconnect_attempts: Option<usize>,
    /// Connection timeout.
    pub connection_timeout: Duration,
    /// Request timeout for JetStream operations.
    pub request_timeout: Duration,
    /// Maximum delivery attempts for a job message.
    pub max_deliver: i64,
    /// Message retention period.
    pub max_age: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            urls: vec!["nats://localhost:4222".to_string()],
            stream_name: "NETPULSE".to_string(),
            consumer_name: "netpulse-agent".to_string(),
            max_reconnect_attempts: None,
            connection_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            max_deliver: 3,
            max_age: Duration::from_secs(86400 * 7),
        }
    }
}

impl BusConfig {
    /// Create a new config with a single URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Default::default()
        }
    }

    /// Set multiple server URLs for cluster support.
    pub fn with_urls(mut self, urls: Vec<String>) -> Self {
        self.urls = urls;
        self
    }

    /// Set the stream name.
    pub fn with_stream_name(mut self, name: impl Into<String>) -> Self {
        self.stream_name = name.into();
        self
    }

    /// Set the durable consumer name.
    pub fn with_consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_name = name.into();
        self
    }

    /// Set max reconnection attempts.
    pub fn with_max_reconnects(mut self, max: usize) -> Self {
        self.max_reconnect_attempts = Some(max);
        self
    }

    /// Set max delivery attempts for job messages.
    pub fn with_max_deliver(mut self, max: i64) -> Self {
        self.max_deliver = max;
        self
    }
}
