//! In-memory adapters for tests and offline runs.

use crate::contracts::{SubnetJob, Telemetry};
use crate::ports::{JobStream, MessageBus, StateStore};
use crate::state::AgentState;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

/// Message bus that records published telemetry and hands jobs to a single
/// subscriber.
pub struct InMemoryBus {
    jobs_tx: mpsc::UnboundedSender<SubnetJob>,
    jobs_rx: Mutex<Option<mpsc::UnboundedReceiver<SubnetJob>>>,
    published: Mutex<Vec<Telemetry>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        Self {
            jobs_tx,
            jobs_rx: Mutex::new(Some(jobs_rx)),
            published: Mutex::new(Vec::new()),
        }
    }

    /// Deliver a job to the subscriber.
    pub fn dispatch_job(&self, job: SubnetJob) -> Result<()> {
        self.jobs_tx
            .send(job)
            .map_err(|_| Error::EventBus("Job subscriber gone".to_string()))
    }

    /// Everything published so far, in publish order.
    pub fn published(&self) -> Vec<Telemetry> {
        self.published.lock().expect("bus poisoned").clone()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, message: Telemetry) -> Result<()> {
        self.published.lock().expect("bus poisoned").push(message);
        Ok(())
    }

    async fn subscribe_jobs(&self) -> Result<JobStream> {
        let rx = self
            .jobs_rx
            .lock()
            .expect("bus poisoned")
            .take()
            .ok_or_else(|| Error::EventBus("Job stream already consumed".to_string()))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx).map(Ok)))
    }
}

/// Volatile state store for tests.
pub struct MemoryStateStore {
    state: Mutex<AgentState>,
}

impl MemoryStateStore {
    pub fn new(initial: AgentState) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    pub fn stored(&self) -> AgentState {
        *self.state.lock().expect("store poisoned")
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> AgentState {
        self.stored()
    }

    async fn save(&self, state: AgentState) -> Result<()> {
        *self.state.lock().expect("store poisoned") = state;
        Ok(())
    }
}
