//! Probe engines for the Netpulse fleet agent.
//!
//! Two implementations of the [`ProbeEngine`] port: a subprocess `ping(8)`
//! engine (ICMP, the primary) and a TCP connect engine (the fallback for
//! hosts where raw ICMP is unavailable). The backend is selected at
//! construction time through [`ProbeBackend`].

pub mod system;
pub mod tcp;

pub use system::SystemPingEngine;
pub use tcp::TcpConnectEngine;

use netpulse_core::ports::ProbeEngine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which probe implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeBackend {
    Icmp,
    Tcp,
}

impl Default for ProbeBackend {
    fn default() -> Self {
        ProbeBackend::Icmp
    }
}

/// Build the configured engine.
pub fn build_engine(backend: ProbeBackend, tcp_port: u16) -> Arc<dyn ProbeEngine> {
    match backend {
        ProbeBackend::Icmp => Arc::new(SystemPingEngine::new()),
        ProbeBackend::Tcp => Arc::new(TcpConnectEngine::new(tcp_port)),
    }
}
