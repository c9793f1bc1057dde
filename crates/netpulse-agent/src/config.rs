//! Agent configuration.

use netpulse_core::sim::SimInfo;
use netpulse_core::{Error, Result};
use netpulse_probe::ProbeBackend;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Agent configuration, loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent name, for logs only.
    #[serde(default = "default_name")]
    pub name: String,
    /// NATS server URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,
    /// Heartbeat interval in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Addresses probed per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Where the lifecycle state and hardware id live.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Probe implementation to use.
    #[serde(default)]
    pub probe_backend: ProbeBackend,
    /// Port probed by the TCP fallback engine.
    #[serde(default = "default_tcp_probe_port")]
    pub tcp_probe_port: u16,
    /// Backend base URL; absent means offline registration.
    #[serde(default)]
    pub backend_url: Option<String>,
    /// Registration credentials.
    #[serde(default)]
    pub credentials: Option<BackendCredentials>,
    /// SIM table for hosts without platform enumeration.
    #[serde(default)]
    pub sims: Vec<SimInfo>,
}

/// Credentials for the registration/authorization exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendCredentials {
    pub login: String,
    pub password: String,
}

fn default_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "netpulse-agent".to_string())
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_heartbeat_interval() -> u64 {
    45
}

fn default_chunk_size() -> usize {
    256
}

fn default_state_path() -> PathBuf {
    PathBuf::from("/var/lib/netpulse/device.json")
}

fn default_tcp_probe_port() -> u16 {
    80
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            nats_url: default_nats_url(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            chunk_size: default_chunk_size(),
            state_path: default_state_path(),
            probe_backend: ProbeBackend::default(),
            tcp_probe_port: default_tcp_probe_port(),
            backend_url: None,
            credentials: None,
            sims: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_fills_defaults() {
        let config: AgentConfig = serde_yaml::from_str("nats_url: nats://bus:4222\n").unwrap();
        assert_eq!(config.nats_url, "nats://bus:4222");
        assert_eq!(config.heartbeat_interval_secs, 45);
        assert_eq!(config.chunk_size, 256);
        assert_eq!(config.probe_backend, ProbeBackend::Icmp);
        assert!(config.credentials.is_none());
    }

    #[test]
    fn sims_and_backend_parse() {
        let yaml = r#"
probe_backend: tcp
tcp_probe_port: 443
sims:
  - subscription_id: 1
    display_name: "SIM 1"
    carrier_name: "CarrierA"
    slot_index: 0
    is_embedded: false
"#;
        let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.probe_backend, ProbeBackend::Tcp);
        assert_eq!(config.tcp_probe_port, 443);
        assert_eq!(config.sims.len(), 1);
        assert_eq!(config.sims[0].carrier_name, "CarrierA");
    }
}
