//! Agent coordinator: bootstrap, heartbeats, job intake.
//!
//! One coordinator per process. It owns the lifecycle state machine, keeps
//! a status snapshot observable over a watch channel, and fans out into two
//! long-lived tasks: the heartbeat loop and the job loop.

use crate::config::BackendCredentials;
use crate::executor::JobExecutor;
use netpulse_core::contracts::{
    ChunkResult, ClientErrorReport, ExecutionMetrics, Heartbeat, HeartbeatProgress, SubnetJob,
    Telemetry,
};
use netpulse_core::ports::{BackendClient, DeviceMonitor, MessageBus, ResultSink, SimProvider};
use netpulse_core::sim::{operator_mappings, SimBinding};
use netpulse_core::state::{AgentProgress, AgentState, AgentStateMachine, AgentStatus};
use netpulse_core::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const MAX_RECENT_ERRORS: usize = 5;

pub struct AgentCoordinator {
    hwid: String,
    bus: Arc<dyn MessageBus>,
    executor: JobExecutor,
    monitor: Arc<dyn DeviceMonitor>,
    backend: Arc<dyn BackendClient>,
    sims: Arc<dyn SimProvider>,
    credentials: Option<BackendCredentials>,
    state: Mutex<AgentStateMachine>,
    mappings: RwLock<HashMap<String, SimBinding>>,
    status_tx: watch::Sender<AgentStatus>,
    shutdown_tx: watch::Sender<bool>,
    heartbeat_interval: Duration,
}

impl AgentCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hwid: String,
        bus: Arc<dyn MessageBus>,
        executor: JobExecutor,
        monitor: Arc<dyn DeviceMonitor>,
        backend: Arc<dyn BackendClient>,
        sims: Arc<dyn SimProvider>,
        credentials: Option<BackendCredentials>,
        state: AgentStateMachine,
        heartbeat_interval: Duration,
    ) -> Self {
        let (status_tx, _) = watch::channel(AgentStatus::new(state.current()));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            hwid,
            bus,
            executor,
            monitor,
            backend,
            sims,
            credentials,
            state: Mutex::new(state),
            mappings: RwLock::new(HashMap::new()),
            status_tx,
            shutdown_tx,
            heartbeat_interval,
        }
    }

    pub fn hwid(&self) -> &str {
        &self.hwid
    }

    /// Observe status snapshots as they change.
    pub fn status(&self) -> watch::Receiver<AgentStatus> {
        self.status_tx.subscribe()
    }

    /// Walk the lifecycle from wherever the persisted state left off up to
    /// `IDLE`, re-running only the steps that have not completed yet.
    ///
    /// Operator mappings are rebuilt from the SIM provider on every start,
    /// regardless of state: a restarted agent must not run with an empty
    /// table just because it mapped SIMs in a previous life.
    pub async fn bootstrap(&self) -> Result<()> {
        let sims = self.sims.sim_cards();
        let table = operator_mappings(&sims);
        info!(sims = sims.len(), operators = table.len(), "Mapped SIM cards");
        if let Ok(mut mappings) = self.mappings.write() {
            *mappings = table;
        }

        let mut state = self.state.lock().await;
        info!(state = %state.current(), hwid = %self.hwid, "Bootstrapping agent");

        if state.current() == AgentState::Init {
            let creds = self.require_credentials()?;
            self.backend.register(&creds.login, &creds.password).await?;
            state.transition(AgentState::Registered).await;
        }
        if state.current() == AgentState::Registered {
            let creds = self.require_credentials()?;
            let token = self.backend.authorize(&creds.login, &creds.password).await?;
            debug!(token_len = token.len(), "Authorized");
            state.transition(AgentState::Authorized).await;
        }
        if state.current() == AgentState::Authorized {
            // A host process needs no runtime permission grants.
            state.transition(AgentState::PermissionsGranted).await;
        }
        if state.current() == AgentState::PermissionsGranted {
            state.transition(AgentState::SimsMapped).await;
        }
        if state.current() == AgentState::SimsMapped {
            state.transition(AgentState::TransportRegistered).await;
        }
        if state.current() == AgentState::TransportRegistered {
            state.transition(AgentState::Idle).await;
        }

        // Crash recovery: a job that died mid-flight is settled, not resumed.
        if state.current() == AgentState::Testing {
            warn!("Recovered from a crash during testing, settling to idle");
            state.transition(AgentState::Reporting).await;
        }
        if state.current() == AgentState::Reporting {
            state.transition(AgentState::Idle).await;
        }

        let current = state.current();
        drop(state);
        if current != AgentState::Idle {
            return Err(Error::Internal(format!(
                "bootstrap stalled in state {current}"
            )));
        }
        self.update_status(|status| status.state = current);
        info!("Agent ready");
        Ok(())
    }

    /// Subscribe to the job stream and spawn the heartbeat and job loops.
    pub async fn start(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>> {
        let jobs = self.bus.subscribe_jobs().await?;

        let heartbeat = {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move { coordinator.heartbeat_loop().await })
        };
        let intake = {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move { coordinator.job_loop(jobs).await })
        };
        Ok(vec![heartbeat, intake])
    }

    /// Request shutdown: loops stop, the in-flight batch finishes, and no
    /// further results are published.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    async fn heartbeat_loop(&self) {
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_heartbeat().await {
                        warn!(error = %e, "Failed to publish heartbeat");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("Heartbeat loop stopped");
                        return;
                    }
                }
            }
        }
    }

    async fn publish_heartbeat(&self) -> Result<()> {
        let status = self.status_tx.borrow().clone();
        let heartbeat = Heartbeat {
            hwid: self.hwid.clone(),
            timestamp: Utc::now(),
            state: status.state.as_str().to_string(),
            battery_level: self.monitor.battery_level(),
            network_type: self.monitor.network_type(),
            active_sim: status.active_sim_label.unwrap_or_default(),
            current_job_id: status.job_id,
            progress: HeartbeatProgress {
                subnets_total: status.progress.subnets_total,
                subnets_completed: status.progress.subnets_completed,
                ips_tested: status.progress.ips_tested,
            },
        };
        self.bus.publish(Telemetry::Heartbeat(heartbeat)).await
    }

    async fn job_loop(self: Arc<Self>, mut jobs: netpulse_core::ports::JobStream) {
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                next = jobs.next() => {
                    match next {
                        Some(Ok(job)) => {
                            let coordinator = Arc::clone(&self);
                            tokio::spawn(async move { coordinator.handle_job(job).await });
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Dropping undecodable job");
                            self.report_error("job_decode", &e.to_string(), false).await;
                        }
                        None => {
                            info!("Job stream closed");
                            return;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("Job loop stopped");
                        return;
                    }
                }
            }
        }
    }

    /// Run one job end to end. A job arriving while another is testing is
    /// dropped at the state machine boundary, never queued.
    async fn handle_job(self: Arc<Self>, job: SubnetJob) {
        {
            let mut state = self.state.lock().await;
            if !state.transition(AgentState::Testing).await {
                info!(
                    job_id = %job.job_id,
                    state = %state.current(),
                    "Agent busy, dropping job"
                );
                return;
            }
        }

        let mappings = self
            .mappings
            .read()
            .map(|table| table.clone())
            .unwrap_or_default();
        let mapped_operators = job
            .mobile_operators
            .iter()
            .filter(|operator| mappings.contains_key(*operator))
            .count() as u32;

        self.update_status(|status| {
            status.state = AgentState::Testing;
            status.job_id = Some(job.job_id.clone());
            status.progress = AgentProgress {
                subnets_total: job.subnets.len() as u32 * mapped_operators,
                subnets_completed: 0,
                ips_tested: 0,
            };
        });

        let cancel = self.shutdown_tx.subscribe();
        let final_result = self
            .executor
            .execute(&job, &self.hwid, &mappings, &*self, cancel)
            .await;
        let cancelled = *self.shutdown_tx.borrow();

        {
            let mut state = self.state.lock().await;
            state.transition(AgentState::Reporting).await;
            if cancelled {
                info!(job_id = %job.job_id, "Cancelled, skipping final result");
            } else if let Err(e) = self.bus.publish(Telemetry::FinalResult(final_result)).await {
                error!(job_id = %job.job_id, error = %e, "Failed to publish final result");
                self.remember_error(format!("final result publish: {e}"));
            }
            state.transition(AgentState::Idle).await;
        }

        self.update_status(|status| {
            status.state = AgentState::Idle;
            status.job_id = None;
            status.active_operator = None;
            status.active_sim_label = None;
            status.progress = AgentProgress::default();
        });
    }

    /// Publish an error report. Best effort: a failure to publish is only
    /// logged, and the message is retained in the status snapshot either way.
    pub async fn report_error(&self, error_type: &str, message: &str, fatal: bool) {
        let report = ClientErrorReport {
            hwid: self.hwid.clone(),
            job_id: self.status_tx.borrow().job_id.clone(),
            error_type: error_type.to_string(),
            message: message.to_string(),
            fatal,
            timestamp: Utc::now(),
        };
        self.remember_error(format!("{error_type}: {message}"));
        if let Err(e) = self.bus.publish(Telemetry::ClientError(report)).await {
            warn!(error = %e, "Failed to publish error report");
        }
    }

    fn remember_error(&self, entry: String) {
        self.update_status(|status| {
            status.last_errors.push(entry);
            if status.last_errors.len() > MAX_RECENT_ERRORS {
                let excess = status.last_errors.len() - MAX_RECENT_ERRORS;
                status.last_errors.drain(..excess);
            }
        });
    }

    fn require_credentials(&self) -> Result<&BackendCredentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| Error::Config("registration credentials not configured".to_string()))
    }

    /// Atomic status update; readers always see a full snapshot. The
    /// snapshot is held even when nobody subscribed, so heartbeats built
    /// from it stay current.
    fn update_status(&self, apply: impl FnOnce(&mut AgentStatus)) {
        self.status_tx.send_modify(apply);
    }
}

#[async_trait]
impl ResultSink for AgentCoordinator {
    async fn chunk_result(&self, chunk: ChunkResult) {
        let tested = chunk.results.len() as u32;
        let operator = chunk.operator.clone();
        let label = self
            .mappings
            .read()
            .ok()
            .and_then(|table| table.get(&operator).map(|binding| binding.label.clone()));
        self.update_status(|status| {
            status.active_operator = Some(operator);
            status.active_sim_label = label;
            status.progress.ips_tested += tested;
        });
        if let Err(e) = self.bus.publish(Telemetry::ChunkResult(chunk)).await {
            warn!(error = %e, "Failed to publish chunk result");
            self.remember_error(format!("chunk publish: {e}"));
        }
    }

    async fn execution_metrics(&self, metrics: ExecutionMetrics) {
        self.update_status(|status| status.progress.subnets_completed += 1);
        if let Err(e) = self.bus.publish(Telemetry::ExecutionMetrics(metrics)).await {
            warn!(error = %e, "Failed to publish execution metrics");
            self.remember_error(format!("metrics publish: {e}"));
        }
    }
}
