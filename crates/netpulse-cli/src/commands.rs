//! CLI command definitions.

use clap::{Subcommand, ValueEnum};
use netpulse_probe::ProbeBackend;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the agent
    Run {
        /// Path to the agent configuration file
        #[arg(short, long, default_value = "netpulse.yaml")]
        config: PathBuf,
    },

    /// Probe a single address
    Probe {
        /// IPv4 address to probe
        ip: String,

        /// Probe timeout in milliseconds
        #[arg(short, long, default_value_t = 1000)]
        timeout_ms: u32,

        /// Extra attempts after the first failure
        #[arg(short, long, default_value_t = 0)]
        retries: u32,

        /// Probe implementation
        #[arg(short, long, value_enum, default_value_t = BackendArg::Icmp)]
        backend: BackendArg,

        /// Port probed by the TCP backend
        #[arg(short, long, default_value_t = 80)]
        port: u16,
    },

    /// Expand a CIDR into its usable host addresses
    Expand {
        /// Subnet in CIDR notation, e.g. 10.0.0.0/24
        cidr: String,

        /// Print at most this many addresses
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print the JSON schema of a wire contract
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
}

#[derive(Subcommand)]
pub enum SchemaCommands {
    /// Inbound job schema
    Job,

    /// Outbound telemetry schema
    Telemetry,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BackendArg {
    Icmp,
    Tcp,
}

impl From<BackendArg> for ProbeBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Icmp => ProbeBackend::Icmp,
            BackendArg::Tcp => ProbeBackend::Tcp,
        }
    }
}
