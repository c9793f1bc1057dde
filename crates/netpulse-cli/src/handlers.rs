//! Command handlers.

use console::style;
use netpulse_agent::backend::{HttpBackendClient, OfflineBackendClient};
use netpulse_agent::config::AgentConfig;
use netpulse_agent::coordinator::AgentCoordinator;
use netpulse_agent::executor::JobExecutor;
use netpulse_agent::monitor::SystemMonitor;
use netpulse_agent::store::DeviceConfigStore;
use netpulse_core::ip;
use netpulse_core::ports::{BackendClient, MessageBus, StateStore};
use netpulse_core::sim::StaticSimProvider;
use netpulse_core::state::AgentStateMachine;
use netpulse_nats::{BusConfig, NatsBus};
use netpulse_probe::{build_engine, ProbeBackend};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Run the agent until interrupted.
pub async fn run(config_path: &Path) -> CliResult {
    let config = AgentConfig::from_file(config_path)?;
    info!(name = %config.name, "Loading agent");

    let store = Arc::new(DeviceConfigStore::open(&config.state_path).await);
    let hwid = store.hwid().await?;
    let machine = AgentStateMachine::load(Arc::clone(&store) as Arc<dyn StateStore>).await;

    let bus_config = BusConfig::new(&config.nats_url).with_consumer_name(format!("netpulse-{hwid}"));
    let bus = Arc::new(NatsBus::connect_with_config(bus_config).await?);

    let engine = build_engine(config.probe_backend, config.tcp_probe_port);
    let executor = JobExecutor::new(engine).with_chunk_size(config.chunk_size);

    let backend: Arc<dyn BackendClient> = match &config.backend_url {
        Some(url) => Arc::new(HttpBackendClient::new(url.clone())),
        None => Arc::new(OfflineBackendClient),
    };

    let coordinator = Arc::new(AgentCoordinator::new(
        hwid,
        Arc::clone(&bus) as Arc<dyn MessageBus>,
        executor,
        Arc::new(SystemMonitor::new()),
        backend,
        Arc::new(StaticSimProvider::new(config.sims.clone())),
        config.credentials.clone(),
        machine,
        Duration::from_secs(config.heartbeat_interval_secs),
    ));

    coordinator.bootstrap().await?;
    let tasks = coordinator.start().await?;
    println!(
        "{} Agent {} running, ctrl-c to stop",
        style("▶").cyan(),
        style(coordinator.hwid()).bold()
    );

    let health_bus = Arc::clone(&bus);
    let health_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let health = health_bus.health_check();
            if health.status.is_healthy() {
                tracing::debug!(
                    published = health.messages_published,
                    jobs = health.jobs_received,
                    "Bus healthy"
                );
            } else {
                tracing::warn!(status = ?health.status, "Bus unhealthy");
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    health_task.abort();
    coordinator.shutdown();
    for task in tasks {
        let _ = task.await;
    }
    bus.shutdown().await?;
    println!("{} Agent stopped", style("✓").green());
    Ok(())
}

/// Probe one address and print the outcome.
pub async fn probe(
    ip: &str,
    timeout_ms: u32,
    retries: u32,
    backend: ProbeBackend,
    port: u16,
) -> CliResult {
    // Reject garbage before handing it to the engine.
    ip::parse_ipv4(ip)?;

    let engine = build_engine(backend, port);
    let outcome = engine.probe(ip, timeout_ms, retries).await;

    if outcome.reachable {
        let latency = outcome
            .latency_ms
            .map(|ms| format!("{ms} ms"))
            .unwrap_or_else(|| "n/a".to_string());
        println!("{} {} up ({})", style("✓").green(), ip, latency);
    } else {
        let reason = outcome.error.unwrap_or_else(|| "unreachable".to_string());
        println!("{} {} down ({})", style("✗").red(), ip, reason);
    }
    Ok(())
}

/// Expand a CIDR and print its usable hosts.
pub fn expand(cidr: &str, limit: Option<usize>) -> CliResult {
    let range = ip::cidr_to_range(cidr)?;
    let hosts = ip::expand_range(&range);

    println!(
        "{} {} usable hosts in {}",
        style("▶").cyan(),
        style(hosts.len()).bold(),
        cidr
    );
    let shown = limit.unwrap_or(hosts.len()).min(hosts.len());
    for host in &hosts[..shown] {
        println!("  {}", ip::format_ipv4(*host));
    }
    if shown < hosts.len() {
        println!("  … {} more", hosts.len() - shown);
    }
    Ok(())
}

/// Print the JSON schema of the inbound job contract.
pub fn job_schema() -> CliResult {
    let schema = schemars::schema_for!(netpulse_core::contracts::SubnetJob);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Print the JSON schema of the outbound telemetry contract.
pub fn telemetry_schema() -> CliResult {
    let schema = schemars::schema_for!(netpulse_core::contracts::Telemetry);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
