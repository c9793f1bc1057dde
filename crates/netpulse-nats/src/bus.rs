//! NATS-backed implementation of the message-bus port.

use async_nats::jetstream::{
    self, consumer::pull::Config as ConsumerConfig, stream::Config as StreamConfig,
};
use async_trait::async_trait;
use futures::StreamExt;
use netpulse_core::contracts::{SubnetJob, Telemetry, JOB_SUBJECT};
use netpulse_core::ports::{JobStream, MessageBus};
use netpulse_core::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::BusConfig;
use crate::health::HealthCheck;
use crate::metrics::BusMetrics;

/// NATS message bus using JetStream for durability.
///
/// One stream carries the inbound job subject and the outbound telemetry
/// subjects; the agent consumes jobs through a durable pull consumer so a
/// restart resumes where it left off.
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: BusConfig,
    metrics: Arc<BusMetrics>,
    shutdown: Arc<AtomicBool>,
}

impl NatsBus {
    /// Connect to a NATS server with default configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(BusConfig::new(url)).await
    }

    /// Connect with custom configuration and ensure the stream exists.
    pub async fn connect_with_config(config: BusConfig) -> Result<Self> {
        let urls = config.urls.join(",");
        info!("Connecting to NATS at {}", urls);

        let metrics = BusMetrics::new();

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(config.connection_timeout)
            .request_timeout(Some(config.request_timeout))
            .max_reconnects(config.max_reconnect_attempts)
            .retry_on_initial_connect()
            .connect(&urls)
            .await
            .map_err(|e| Error::EventBus(format!("Failed to connect to NATS: {}", e)))?;

        metrics.set_connected(true);

        let jetstream = jetstream::new(client.clone());

        let stream_config = StreamConfig {
            name: config.stream_name.clone(),
            subjects: vec![
                "job.>".to_string(),
                "agent.>".to_string(),
                "result.>".to_string(),
            ],
            retention: jetstream::stream::RetentionPolicy::Limits,
            max_age: config.max_age,
            storage: jetstream::stream::StorageType::File,
            ..Default::default()
        };

        jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| Error::EventBus(format!("Failed to create stream: {}", e)))?;

        info!("Connected to NATS and initialized JetStream");

        Ok(Self {
            client,
            jetstream,
            config,
            metrics,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get the underlying NATS client.
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    /// Get metrics.
    pub fn metrics(&self) -> &Arc<BusMetrics> {
        &self.metrics
    }

    /// Check connection health.
    pub fn health_check(&self) -> HealthCheck {
        HealthCheck::from_metrics(&self.metrics, self.is_connected())
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    /// Check if shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Graceful shutdown - drain the connection.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Draining NATS connection");
        self.shutdown.store(true, Ordering::SeqCst);

        if let Err(e) = self.client.drain().await {
            error!("Error draining NATS connection: {}", e);
        }

        self.metrics.set_connected(false);
        Ok(())
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, message: Telemetry) -> Result<()> {
        if self.is_shutdown() {
            return Err(Error::EventBus(
                "Cannot publish: shutdown in progress".to_string(),
            ));
        }

        let subject = message.subject();
        let payload =
            serde_json::to_vec(&message).map_err(|e| Error::Serialization(e.to_string()))?;
        let payload_len = payload.len() as u64;

        debug!("Publishing telemetry to {}", subject);

        match self
            .jetstream
            .publish(subject.clone(), payload.into())
            .await
        {
            Ok(ack_future) => {
                ack_future
                    .await
                    .map_err(|e| Error::EventBus(format!("Failed to confirm publish: {}", e)))?;
                self.metrics.record_publish(payload_len);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_publish_failure();
                Err(Error::EventBus(format!(
                    "Failed to publish to {}: {}",
                    subject, e
                )))
            }
        }
    }

    async fn subscribe_jobs(&self) -> Result<JobStream> {
        debug!(
            consumer = %self.config.consumer_name,
            "Subscribing to job stream"
        );

        let consumer = self
            .jetstream
            .create_consumer_on_stream(
                ConsumerConfig {
                    durable_name: Some(self.config.consumer_name.clone()),
                    filter_subject: JOB_SUBJECT.to_string(),
                    max_deliver: self.config.max_deliver,
                    ack_wait: Duration::from_secs(30),
                    ..Default::default()
                },
                &self.config.stream_name,
            )
            .await
            .map_err(|e| Error::EventBus(format!("Failed to create consumer: {}", e)))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| Error::EventBus(format!("Failed to get messages: {}", e)))?;

        let metrics = self.metrics.clone();
        let shutdown = self.shutdown.clone();

        let stream = messages.then(move |msg_result| {
            let metrics = metrics.clone();
            let shutdown = shutdown.clone();
            async move {
                if shutdown.load(Ordering::SeqCst) {
                    return Err(Error::EventBus("Shutdown in progress".to_string()));
                }

                match msg_result {
                    Ok(msg) => {
                        metrics.record_job(msg.payload.len() as u64);

                        // Ack before handing the job over, otherwise the
                        // server redelivers after ack_wait and a busy agent
                        // re-runs a job it already completed.
                        if let Err(e) = msg.ack().await {
                            warn!("Failed to ack job message: {}", e);
                        }

                        serde_json::from_slice::<SubnetJob>(&msg.payload)
                            .map_err(|e| Error::Serialization(e.to_string()))
                    }
                    Err(e) => Err(Error::EventBus(format!("Message error: {}", e))),
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = BusConfig::new("nats://localhost:4222")
            .with_stream_name("TEST_STREAM")
            .with_consumer_name("agent-hw-1")
            .with_max_reconnects(5)
            .with_max_deliver(5);

        assert_eq!(config.stream_name, "TEST_STREAM");
        assert_eq!(config.consumer_name, "agent-hw-1");
        assert_eq!(config.max_reconnect_attempts, Some(5));
        assert_eq!(config.max_deliver, 5);
    }

    #[tokio::test]
    #[ignore] // Requires NATS server
    async fn test_connect() {
        let bus = NatsBus::connect("nats://localhost:4222").await;
        assert!(bus.is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires NATS server; waits out ack_wait
    async fn test_job_is_acked_and_not_redelivered() {
        use futures::StreamExt;
        use netpulse_core::contracts::PingConfig;

        let suffix = std::process::id();
        let config = BusConfig::new("nats://localhost:4222")
            .with_stream_name(format!("NETPULSE_ACK_{suffix}"))
            .with_consumer_name(format!("ack-test-{suffix}"));
        let bus = NatsBus::connect_with_config(config).await.unwrap();
        let mut jobs = bus.subscribe_jobs().await.unwrap();

        let job = SubnetJob {
            job_id: "ack-1".to_string(),
            created_at: chrono::Utc::now(),
            ttl_seconds: 60,
            subnets: vec!["10.0.0.0/30".to_string()],
            mobile_operators: vec!["CarrierA".to_string()],
            ping_config: PingConfig {
                method: "icmp".to_string(),
                timeout_ms: 100,
                retries: 0,
                concurrency: 1,
                sampling_ratio: 1.0,
            },
        };
        bus.client()
            .publish(JOB_SUBJECT, serde_json::to_vec(&job).unwrap().into())
            .await
            .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), jobs.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(first.job_id, "ack-1");

        // Past ack_wait (30s) an unacked message would come around again.
        let redelivery = tokio::time::timeout(Duration::from_secs(35), jobs.next()).await;
        assert!(redelivery.is_err(), "job was redelivered, ack did not stick");
    }

    #[tokio::test]
    #[ignore] // Requires NATS server
    async fn test_health_check() {
        let bus = NatsBus::connect("nats://localhost:4222").await.unwrap();
        let health = bus.health_check();
        assert!(health.status.is_healthy());
        assert!(health.connected);
    }
}
