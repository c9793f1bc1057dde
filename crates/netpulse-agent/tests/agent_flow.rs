//! End-to-end agent flow over the in-memory bus.

use async_trait::async_trait;
use chrono::Utc;
use netpulse_agent::config::BackendCredentials;
use netpulse_agent::backend::OfflineBackendClient;
use netpulse_agent::coordinator::AgentCoordinator;
use netpulse_agent::executor::JobExecutor;
use netpulse_core::contracts::{PingConfig, SubnetJob, Telemetry};
use netpulse_core::memory::{InMemoryBus, MemoryStateStore};
use netpulse_core::ports::{
    DeviceMonitor, MessageBus, ProbeEngine, ProbeOutcome, StateStore,
};
use netpulse_core::sim::{SimInfo, StaticSimProvider};
use netpulse_core::state::{AgentState, AgentStateMachine};
use std::sync::Arc;
use std::time::Duration;

struct UpEngine {
    delay: Duration,
}

#[async_trait]
impl ProbeEngine for UpEngine {
    async fn probe(&self, ip: &str, _timeout_ms: u32, _retries: u32) -> ProbeOutcome {
        tokio::time::sleep(self.delay).await;
        ProbeOutcome::up(ip, 7)
    }
}

struct FixedMonitor;

impl DeviceMonitor for FixedMonitor {
    fn battery_level(&self) -> f64 {
        1.0
    }

    fn network_type(&self) -> String {
        "ethernet".to_string()
    }
}

fn sims() -> Vec<SimInfo> {
    vec![
        SimInfo {
            subscription_id: 1,
            display_name: "SIM 1".to_string(),
            carrier_name: "CarrierA".to_string(),
            slot_index: 0,
            is_embedded: false,
        },
        SimInfo {
            subscription_id: 2,
            display_name: "eSIM".to_string(),
            carrier_name: "CarrierB".to_string(),
            slot_index: 1,
            is_embedded: true,
        },
    ]
}

fn job(job_id: &str, subnets: &[&str], operators: &[&str]) -> SubnetJob {
    SubnetJob {
        job_id: job_id.to_string(),
        created_at: Utc::now(),
        ttl_seconds: 600,
        subnets: subnets.iter().map(|s| s.to_string()).collect(),
        mobile_operators: operators.iter().map(|s| s.to_string()).collect(),
        ping_config: PingConfig {
            method: "icmp".to_string(),
            timeout_ms: 100,
            retries: 0,
            concurrency: 8,
            sampling_ratio: 1.0,
        },
    }
}

async fn running_agent(
    probe_delay: Duration,
    heartbeat_interval: Duration,
) -> (Arc<AgentCoordinator>, Arc<InMemoryBus>) {
    let bus = Arc::new(InMemoryBus::new());
    let store = Arc::new(MemoryStateStore::new(AgentState::Init));
    let machine = AgentStateMachine::load(store as Arc<dyn StateStore>).await;

    let coordinator = Arc::new(AgentCoordinator::new(
        "hw-flow".to_string(),
        Arc::clone(&bus) as Arc<dyn MessageBus>,
        JobExecutor::new(Arc::new(UpEngine { delay: probe_delay })),
        Arc::new(FixedMonitor),
        Arc::new(OfflineBackendClient),
        Arc::new(StaticSimProvider::new(sims())),
        Some(BackendCredentials {
            login: "agent".to_string(),
            password: "secret".to_string(),
        }),
        machine,
        heartbeat_interval,
    ));

    coordinator.bootstrap().await.expect("bootstrap");
    coordinator.start().await.expect("start");
    (coordinator, bus)
}

async fn wait_for<F>(bus: &InMemoryBus, predicate: F) -> Vec<Telemetry>
where
    F: Fn(&[Telemetry]) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let published = bus.published();
            if predicate(&published) {
                return published;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

fn final_results(published: &[Telemetry]) -> Vec<&str> {
    published
        .iter()
        .filter_map(|t| match t {
            Telemetry::FinalResult(result) => Some(result.job_id.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn job_streams_chunks_metrics_and_final_result() {
    let (coordinator, bus) = running_agent(Duration::ZERO, Duration::from_secs(3600)).await;

    bus.dispatch_job(job("job-1", &["10.0.0.0/30"], &["CarrierA", "CarrierB"]))
        .expect("dispatch");

    let published = wait_for(&bus, |p| !final_results(p).is_empty()).await;

    let chunks: Vec<_> = published
        .iter()
        .filter_map(|t| match t {
            Telemetry::ChunkResult(chunk) => Some(chunk),
            _ => None,
        })
        .collect();
    let metrics: Vec<_> = published
        .iter()
        .filter_map(|t| match t {
            Telemetry::ExecutionMetrics(m) => Some(m),
            _ => None,
        })
        .collect();

    // One subnet probed once per mapped operator.
    assert_eq!(chunks.len(), 2);
    assert_eq!(metrics.len(), 2);
    for chunk in &chunks {
        assert_eq!(chunk.hwid, "hw-flow");
        assert_eq!(chunk.results.len(), 2);
    }
    for m in &metrics {
        assert_eq!(m.metrics.ips_tested, 2);
        assert_eq!(m.metrics.ips_up, 2);
    }

    let finals: Vec<_> = published
        .iter()
        .filter_map(|t| match t {
            Telemetry::FinalResult(result) => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].job_id, "job-1");
    assert_eq!(finals[0].summary.total_ips_tested, 4);
    assert_eq!(finals[0].summary.total_ips_up, 4);
    assert_eq!(finals[0].operators.len(), 2);

    // Agent settled back to idle.
    let status = wait_for_idle(&coordinator).await;
    assert_eq!(status, AgentState::Idle);
}

#[tokio::test]
async fn heartbeats_keep_firing_during_job_execution() {
    let (coordinator, bus) =
        running_agent(Duration::from_millis(100), Duration::from_millis(20)).await;

    bus.dispatch_job(job("job-hb", &["10.0.0.0/28"], &["CarrierA"]))
        .expect("dispatch");

    wait_for_state(&coordinator, AgentState::Testing).await;
    let published = wait_for(&bus, |p| {
        p.iter().any(|t| match t {
            Telemetry::Heartbeat(heartbeat) => heartbeat.state == "TESTING",
            _ => false,
        })
    })
    .await;

    let mid_job = published
        .iter()
        .find_map(|t| match t {
            Telemetry::Heartbeat(heartbeat) if heartbeat.state == "TESTING" => Some(heartbeat),
            _ => None,
        })
        .expect("heartbeat while testing");
    assert_eq!(mid_job.current_job_id.as_deref(), Some("job-hb"));
    assert_eq!(mid_job.progress.subnets_total, 1);
}

#[tokio::test]
async fn job_arriving_while_testing_is_dropped() {
    let (coordinator, bus) =
        running_agent(Duration::from_millis(100), Duration::from_secs(3600)).await;

    bus.dispatch_job(job("job-slow", &["10.0.0.0/29"], &["CarrierA"]))
        .expect("dispatch");

    // Wait until the first job holds the TESTING state, then pile on.
    wait_for_state(&coordinator, AgentState::Testing).await;
    bus.dispatch_job(job("job-late", &["10.0.0.0/30"], &["CarrierA"]))
        .expect("dispatch");

    let published = wait_for(&bus, |p| !final_results(p).is_empty()).await;
    // Give the dropped job a moment to (incorrectly) produce anything.
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(final_results(&published), vec!["job-slow"]);
    let all = bus.published();
    assert!(
        !all.iter().any(|t| match t {
            Telemetry::ChunkResult(chunk) => chunk.job_id == "job-late",
            Telemetry::FinalResult(result) => result.job_id == "job-late",
            _ => false,
        }),
        "late job must be dropped, not queued"
    );
}

#[tokio::test]
async fn shutdown_mid_job_suppresses_final_result() {
    let (coordinator, bus) =
        running_agent(Duration::from_millis(20), Duration::from_secs(3600)).await;

    bus.dispatch_job(job("job-cancel", &["10.0.0.0/27"], &["CarrierA"]))
        .expect("dispatch");

    // Shut down while the first batch is still probing.
    wait_for_state(&coordinator, AgentState::Testing).await;
    coordinator.shutdown();

    // The in-flight batch finishes; nothing final is ever published.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(final_results(&bus.published()).is_empty());
    assert_eq!(wait_for_idle(&coordinator).await, AgentState::Idle);
}

async fn wait_for_idle(coordinator: &AgentCoordinator) -> AgentState {
    wait_for_state(coordinator, AgentState::Idle).await
}

async fn wait_for_state(coordinator: &AgentCoordinator, wanted: AgentState) -> AgentState {
    let mut status = coordinator.status();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let current = status.borrow().state;
        if current == wanted {
            return current;
        }
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .unwrap_or_default();
        if remaining.is_zero() {
            return current;
        }
        if tokio::time::timeout(remaining, status.changed()).await.is_err() {
            return status.borrow().state;
        }
    }
}
