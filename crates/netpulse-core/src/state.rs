//! Agent lifecycle state machine.
//!
//! The state machine is the only writer of the persisted lifecycle state.
//! Every state has exactly one allowed successor; the testing cycle
//! (`Idle -> Testing -> Reporting -> Idle`) is the only loop.

use crate::ports::StateStore;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Lifecycle states, in bootstrap order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    Init,
    Registered,
    Authorized,
    PermissionsGranted,
    SimsMapped,
    TransportRegistered,
    Idle,
    Testing,
    Reporting,
}

impl AgentState {
    /// Whether `target` is a legal move out of this state.
    pub fn allows(self, target: AgentState) -> bool {
        use AgentState::*;
        matches!(
            (self, target),
            (Init, Registered)
                | (Registered, Authorized)
                | (Authorized, PermissionsGranted)
                | (PermissionsGranted, SimsMapped)
                | (SimsMapped, TransportRegistered)
                | (TransportRegistered, Idle)
                | (Idle, Testing)
                | (Testing, Reporting)
                | (Reporting, Idle)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentState::Init => "INIT",
            AgentState::Registered => "REGISTERED",
            AgentState::Authorized => "AUTHORIZED",
            AgentState::PermissionsGranted => "PERMISSIONS_GRANTED",
            AgentState::SimsMapped => "SIMS_MAPPED",
            AgentState::TransportRegistered => "TRANSPORT_REGISTERED",
            AgentState::Idle => "IDLE",
            AgentState::Testing => "TESTING",
            AgentState::Reporting => "REPORTING",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentState {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(AgentState::Init),
            "REGISTERED" => Ok(AgentState::Registered),
            "AUTHORIZED" => Ok(AgentState::Authorized),
            "PERMISSIONS_GRANTED" => Ok(AgentState::PermissionsGranted),
            "SIMS_MAPPED" => Ok(AgentState::SimsMapped),
            "TRANSPORT_REGISTERED" => Ok(AgentState::TransportRegistered),
            "IDLE" => Ok(AgentState::Idle),
            "TESTING" => Ok(AgentState::Testing),
            "REPORTING" => Ok(AgentState::Reporting),
            _ => Err(()),
        }
    }
}

/// Strict, persisted lifecycle state machine.
pub struct AgentStateMachine {
    store: Arc<dyn StateStore>,
    current: AgentState,
}

impl AgentStateMachine {
    /// Construct with the last persisted state (`Init` when absent).
    pub async fn load(store: Arc<dyn StateStore>) -> Self {
        let current = store.load().await;
        Self { store, current }
    }

    pub fn current(&self) -> AgentState {
        self.current
    }

    /// Attempt a transition. On success the new state is persisted and
    /// `true` is returned; a disallowed move leaves everything untouched.
    ///
    /// Never fails: a persist error keeps the in-memory move and is only
    /// logged.
    pub async fn transition(&mut self, target: AgentState) -> bool {
        if !self.current.allows(target) {
            return false;
        }
        self.current = target;
        if let Err(e) = self.store.save(target).await {
            warn!(state = %target, error = %e, "Failed to persist agent state");
        }
        true
    }
}

/// Point-in-time agent status snapshot, replaced wholesale on update.
#[derive(Debug, Clone)]
pub struct AgentStatus {
    pub state: AgentState,
    pub active_operator: Option<String>,
    pub active_sim_label: Option<String>,
    pub job_id: Option<String>,
    pub progress: AgentProgress,
    pub last_errors: Vec<String>,
}

impl AgentStatus {
    pub fn new(state: AgentState) -> Self {
        Self {
            state,
            active_operator: None,
            active_sim_label: None,
            job_id: None,
            progress: AgentProgress::default(),
            last_errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentProgress {
    pub subnets_total: u32,
    pub subnets_completed: u32,
    pub ips_tested: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStateStore;

    #[tokio::test]
    async fn initial_state_loads_from_store() {
        let store = Arc::new(MemoryStateStore::new(AgentState::PermissionsGranted));
        let machine = AgentStateMachine::load(store).await;
        assert_eq!(machine.current(), AgentState::PermissionsGranted);
    }

    #[tokio::test]
    async fn transition_moves_to_allowed_state_and_persists() {
        let store = Arc::new(MemoryStateStore::new(AgentState::Init));
        let mut machine = AgentStateMachine::load(Arc::clone(&store) as Arc<dyn StateStore>).await;

        assert!(machine.transition(AgentState::Registered).await);
        assert_eq!(machine.current(), AgentState::Registered);
        assert_eq!(store.stored(), AgentState::Registered);
    }

    #[tokio::test]
    async fn transition_rejects_non_adjacent_states() {
        let store = Arc::new(MemoryStateStore::new(AgentState::Init));
        let mut machine = AgentStateMachine::load(Arc::clone(&store) as Arc<dyn StateStore>).await;

        assert!(!machine.transition(AgentState::Authorized).await);
        assert!(!machine.transition(AgentState::Testing).await);
        assert!(!machine.transition(AgentState::Init).await);
        assert_eq!(machine.current(), AgentState::Init);
        assert_eq!(store.stored(), AgentState::Init);
    }

    #[tokio::test]
    async fn happy_path_succeeds_at_every_step() {
        let store = Arc::new(MemoryStateStore::new(AgentState::Init));
        let mut machine = AgentStateMachine::load(store).await;

        let steps = [
            AgentState::Registered,
            AgentState::Authorized,
            AgentState::PermissionsGranted,
            AgentState::SimsMapped,
            AgentState::TransportRegistered,
            AgentState::Idle,
            AgentState::Testing,
            AgentState::Reporting,
            AgentState::Idle,
        ];
        for target in steps {
            assert!(machine.transition(target).await, "rejected {target}");
            assert_eq!(machine.current(), target);
        }
    }

    #[test]
    fn state_names_round_trip() {
        for state in [
            AgentState::Init,
            AgentState::TransportRegistered,
            AgentState::Reporting,
        ] {
            assert_eq!(state.as_str().parse::<AgentState>(), Ok(state));
        }
        assert!("NOT_A_STATE".parse::<AgentState>().is_err());
    }
}
