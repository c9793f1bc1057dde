//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the core domain and external
//! adapters: the message bus, the probe backend, durable state, and the
//! platform collaborators the agent consumes but does not implement.

use crate::contracts::{ChunkResult, ExecutionMetrics, SubnetJob, Telemetry};
use crate::sim::SimInfo;
use crate::state::AgentState;
use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Stream of inbound jobs.
pub type JobStream = Pin<Box<dyn Stream<Item = Result<SubnetJob>> + Send>>;

/// Publish/subscribe transport carrying jobs in and telemetry out.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish one telemetry record on its subject.
    async fn publish(&self, message: Telemetry) -> Result<()>;

    /// Subscribe to the inbound job stream.
    async fn subscribe_jobs(&self) -> Result<JobStream>;
}

/// Outcome of one reachability probe. Failures are data, never errors.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub ip: String,
    pub reachable: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn up(ip: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            ip: ip.into(),
            reachable: true,
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    pub fn down(ip: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            reachable: false,
            latency_ms: None,
            error: Some(error.into()),
        }
    }

    /// Whether the failure was a timeout rather than a transport error.
    pub fn is_timeout(&self) -> bool {
        self.error
            .as_deref()
            .is_some_and(|e| e.to_ascii_lowercase().contains("timeout"))
    }
}

/// One reachability probe against a single address.
///
/// Implementations must return within roughly `timeout_ms * (retries + 1)`
/// and own the retry loop: attempt until success or retries are exhausted,
/// waiting `timeout_ms` between attempts.
#[async_trait]
pub trait ProbeEngine: Send + Sync {
    async fn probe(&self, ip: &str, timeout_ms: u32, retries: u32) -> ProbeOutcome;
}

/// Durable storage for the lifecycle state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Last persisted state; `Init` when absent or unparsable.
    async fn load(&self) -> AgentState;

    async fn save(&self, state: AgentState) -> Result<()>;
}

/// Streaming sink for intermediate results during job execution.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn chunk_result(&self, chunk: ChunkResult);

    async fn execution_metrics(&self, metrics: ExecutionMetrics);
}

/// Credential/registration exchange with the backend.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Register the device. Failures carry the backend's reason.
    async fn register(&self, login: &str, password: &str) -> Result<()>;

    /// Authorize and obtain an access token.
    async fn authorize(&self, login: &str, password: &str) -> Result<String>;
}

/// Carrier/SIM enumeration, implemented by the embedding platform.
pub trait SimProvider: Send + Sync {
    fn sim_cards(&self) -> Vec<SimInfo>;
}

/// Host health readings for heartbeats.
pub trait DeviceMonitor: Send + Sync {
    /// Battery level in [0, 1].
    fn battery_level(&self) -> f64;

    /// Active transport, e.g. `wifi`, `ethernet`, `cellular`.
    fn network_type(&self) -> String;
}
