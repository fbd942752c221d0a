//! # Proxy Deployer
//!
//! > **Deploys an upgradeable contract behind an ERC-1967 proxy, once, and reports
//! > where it landed.**
//!
//! A run resolves the compiled contract, deploys its implementation and the proxy in
//! front of it, waits for the proxy to confirm and logs how long that took. Nothing is
//! retried and nothing is persisted: the log output is the only record.
//!
//! ## 🏗️ Design
//!
//! The [`DeploymentOrchestrator`](orchestrator::DeploymentOrchestrator) owns the
//! sequence and nothing else. Everything that touches the outside world sits behind a
//! trait so the sequence can be tested without a node:
//!
//! | Seam | Production | Tests |
//! |------|------------|-------|
//! | [`ArtifactStore`](artifacts::ArtifactStore) | [`HardhatArtifacts`](artifacts::HardhatArtifacts) | [`MockArtifactStore`](mock::MockArtifactStore) |
//! | [`ProxyDeployer`](proxy::ProxyDeployer) | [`EthersProxyDeployer`](proxy::EthersProxyDeployer) | [`MockProxyDeployer`](mock::MockProxyDeployer) |
//! | [`Clock`](clock::Clock) | [`TokioClock`](clock::TokioClock) | `TokioClock` under paused time |
//!
//! ## 🗺️ Module Tour
//!
//! - [`orchestrator`]: the deployment sequence and its [`DeploymentRecord`](orchestrator::DeploymentRecord).
//! - [`artifacts`]: contract name to ABI and bytecode.
//! - [`proxy`]: proxy deployment, initializer encoding, the `ethers` backend.
//! - [`config`]: `deploy.toml` loading with `${VAR}` interpolation and env overrides.
//! - [`runtime`]: tracing setup, network connection and the CLI commands.
//! - [`error`]: every failure a run can end with.
//! - [`mock`]: expectation-style test doubles.
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Deploy the configured contract to the default network
//! proxy-deployer deploy
//!
//! # Pick the network and contract explicitly, with debug logs
//! RUST_LOG=debug proxy-deployer --network ropsten deploy --contract Controller
//! ```

pub mod artifacts;
pub mod clock;
pub mod config;
pub mod error;
pub mod mock;
pub mod orchestrator;
pub mod proxy;
pub mod runtime;

pub use config::DeployConfig;
pub use error::{ConfirmationError, DeployError, ResolveError};
pub use orchestrator::{DeploySettings, DeploymentOrchestrator, DeploymentRecord};
