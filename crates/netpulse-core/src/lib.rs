//! Netpulse Core
//!
//! Core domain types, wire contracts, and port traits for the Netpulse
//! fleet agent. This crate has minimal dependencies and defines the shared
//! vocabulary used across all other crates.

pub mod contracts;
pub mod error;
pub mod ip;
pub mod memory;
pub mod ports;
pub mod sampling;
pub mod sim;
pub mod state;

pub use error::{Error, Result};
pub use state::{AgentProgress, AgentState, AgentStateMachine, AgentStatus};
