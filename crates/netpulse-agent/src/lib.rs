//! Netpulse fleet agent: lifecycle coordination and job execution.

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod executor;
pub mod monitor;
pub mod store;

pub use config::{AgentConfig, BackendCredentials};
pub use coordinator::AgentCoordinator;
pub use executor::JobExecutor;
pub use store::DeviceConfigStore;
