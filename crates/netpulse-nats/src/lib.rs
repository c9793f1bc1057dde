//! NATS message bus implementation for the Netpulse fleet agent.

mod bus;
pub mod config;
pub mod health;
pub mod metrics;

pub use bus::NatsBus;
pub use config::BusConfig;
pub use health::{HealthCheck, HealthStatus};
pub use metrics::{BusMetrics, MetricsSnapshot};
