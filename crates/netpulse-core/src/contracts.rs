//! Wire contracts carried over the message bus.
//!
//! Inbound: [`SubnetJob`] on the job stream. Outbound: the [`Telemetry`]
//! enum, one variant per telemetry stream, each mapped to a bus subject.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An inbound unit of work: subnets to probe under which operators.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubnetJob {
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u32,
    pub subnets: Vec<String>,
    pub mobile_operators: Vec<String>,
    pub ping_config: PingConfig,
}

/// Probing parameters, fully specified by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PingConfig {
    /// Probe method, e.g. `icmp` or `tcp`.
    pub method: String,
    pub timeout_ms: u32,
    pub retries: u32,
    /// Maximum probes in flight at once.
    pub concurrency: u32,
    /// Fraction of hosts to probe, in [0, 1].
    pub sampling_ratio: f64,
}

/// Inclusive bounds over usable host addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IpRange {
    pub from: u32,
    pub to: u32,
}

/// Outcome of one probed address.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IpResult {
    pub ip: u32,
    /// `"up"` or `"down"`.
    pub status: String,
    pub latency: Option<u64>,
}

/// Batch-level report emitted after each completed chunk.
///
/// Chunk ids are zero-based and restart for every subnet.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChunkResult {
    pub job_id: String,
    pub hwid: String,
    pub operator: String,
    pub subnet: String,
    pub chunk_id: u32,
    pub range: IpRange,
    pub results: Vec<IpResult>,
}

/// Per-subnet aggregate emitted once all of its chunks complete.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionMetrics {
    pub job_id: String,
    pub hwid: String,
    pub operator: String,
    pub subnet: String,
    pub metrics: ExecutionMetricsDetails,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionMetricsDetails {
    /// Addresses in the candidate set after sampling.
    pub ips_total: u32,
    pub ips_tested: u32,
    pub ips_up: u32,
    pub avg_latency_ms: f64,
    /// Latency at rank `ceil(n * 0.95)` over reachable probes.
    pub p95_latency_ms: f64,
    pub timeouts: u32,
    pub errors: u32,
}

/// Per-job aggregate published once after the job completes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FinalResult {
    pub job_id: String,
    pub hwid: String,
    pub finished_at: DateTime<Utc>,
    pub summary: FinalSummary,
    pub operators: HashMap<String, OperatorSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FinalSummary {
    pub total_ips_tested: u32,
    pub total_ips_up: u32,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OperatorSummary {
    pub subnets: HashMap<String, SubnetSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubnetSummary {
    /// Reachable hosts, dotted-decimal.
    pub available_hosts: Vec<String>,
    pub total_available_hosts: u32,
}

/// Periodic health report.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Heartbeat {
    pub hwid: String,
    pub timestamp: DateTime<Utc>,
    /// Current lifecycle state name, e.g. `TESTING`.
    pub state: String,
    /// Battery level in [0, 1].
    pub battery_level: f64,
    pub network_type: String,
    /// Active SIM/operator label, empty when none.
    pub active_sim: String,
    pub current_job_id: Option<String>,
    pub progress: HeartbeatProgress,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct HeartbeatProgress {
    pub subnets_total: u32,
    pub subnets_completed: u32,
    pub ips_tested: u32,
}

/// Ad hoc error report, published independent of lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientErrorReport {
    pub hwid: String,
    pub job_id: Option<String>,
    pub error_type: String,
    pub message: String,
    pub fatal: bool,
    pub timestamp: DateTime<Utc>,
}

/// Subject carrying inbound jobs.
pub const JOB_SUBJECT: &str = "job.dispatch";

/// All outbound telemetry published by the agent.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Telemetry {
    Heartbeat(Heartbeat),
    ChunkResult(ChunkResult),
    ExecutionMetrics(ExecutionMetrics),
    FinalResult(FinalResult),
    ClientError(ClientErrorReport),
}

impl Telemetry {
    /// Returns the bus subject for this record.
    pub fn subject(&self) -> String {
        match self {
            Telemetry::Heartbeat(p) => format!("agent.{}.heartbeat", p.hwid),
            Telemetry::ChunkResult(p) => format!("result.chunk.{}", p.job_id),
            Telemetry::ExecutionMetrics(p) => format!("result.metrics.{}", p.job_id),
            Telemetry::FinalResult(p) => format!("result.final.{}", p.job_id),
            Telemetry::ClientError(p) => format!("agent.{}.error", p.hwid),
        }
    }
}
