//! Runtime wiring and process-level concerns.
//!
//! This module turns a [`DeployConfig`](crate::config::DeployConfig) into running
//! collaborators:
//!
//! - **Observability setup**: [`setup_tracing`] installs the log subscriber.
//! - **Network access**: [`network::connect`] builds the signing JSON-RPC client.
//! - **Commands**: [`commands::deploy`] and [`commands::accounts`] back the CLI.

pub mod commands;
pub mod network;
pub mod telemetry;

pub use commands::*;
pub use telemetry::*;
