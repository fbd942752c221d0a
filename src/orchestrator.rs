//! # Deployment Orchestrator
//!
//! Runs one upgradeable deployment from start to finish:
//!
//! 1. **Resolve** the contract bundle by name.
//! 2. **Initiate** the proxy deployment (exactly once).
//! 3. **Await** confirmation of the proxy creation transaction.
//! 4. **Measure** the elapsed time on the injected [`Clock`].
//! 5. **Report** each stage and the final proxy address through `tracing`.
//!
//! Each step suspends on a single collaborator call and the next step only starts
//! once it settles. Any error is returned to the caller exactly as the collaborator
//! produced it: there are no retries and nothing is rolled back. If confirmation
//! fails after initiation succeeded, the proxy transaction may still be pending or
//! mined; the returned error carries the hash, but the chain has to be inspected by
//! hand.
//!
//! ## Log Output
//!
//! ```text
//! INFO Initializing Controller for deployment..
//! INFO Deploying Controller Proxy..
//! INFO Waiting for Controller Proxy confirmation..
//! INFO Controller Contract & Proxy deployed successfully in 2.013 seconds.
//! INFO Deployment Details
//! INFO Implementation Contract: -
//! INFO Proxy Contract: 0x5FbDB2315678afecb367f032d93F642f64180aa3
//! ```
//!
//! The implementation address is reported as unavailable (`-`): callers interact
//! with the proxy address only.

use crate::artifacts::ArtifactStore;
use crate::clock::{Clock, Timestamp, TokioClock};
use crate::config::DeploySection;
use crate::error::{ConfirmationError, DeployError};
use crate::proxy::{DeployedProxy, PendingProxy, ProxyDeployer, ProxyOptions};
use ethers::types::{Address, TxHash};
use ethers::utils::to_checksum;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Placeholder printed for values a deployment deliberately does not report.
pub const UNAVAILABLE: &str = "-";

/// What to deploy and how.
#[derive(Clone, Debug, PartialEq)]
pub struct DeploySettings {
    /// Bare or fully qualified contract name.
    pub contract: String,
    /// Arguments forwarded to the initializer.
    pub args: Vec<serde_json::Value>,
    pub options: ProxyOptions,
    /// Upper bound on the confirmation wait; `None` waits indefinitely.
    pub confirmation_timeout: Option<Duration>,
}

impl DeploySettings {
    /// Deploys `contract` behind an uninitialized proxy with no arguments.
    pub fn uninitialized(contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            args: Vec::new(),
            options: ProxyOptions::uninitialized(),
            confirmation_timeout: None,
        }
    }
}

impl From<&DeploySection> for DeploySettings {
    fn from(section: &DeploySection) -> Self {
        Self {
            contract: section.contract.clone(),
            args: section.args.clone(),
            options: section.proxy_options(),
            confirmation_timeout: section.confirmation_timeout,
        }
    }
}

/// Outcome of one deployment run. Lives only as long as the process.
#[derive(Clone, Debug, PartialEq)]
pub struct DeploymentRecord {
    pub contract_name: String,
    /// Known once the proxy creation is broadcast.
    pub proxy_address: Option<Address>,
    pub tx_hash: Option<TxHash>,
    pub started_at: Timestamp,
    /// Set only after confirmation resolved.
    pub finished_at: Option<Timestamp>,
    pub elapsed: Duration,
}

impl DeploymentRecord {
    fn start(contract_name: impl Into<String>, started_at: Timestamp) -> Self {
        Self {
            contract_name: contract_name.into(),
            proxy_address: None,
            tx_hash: None,
            started_at,
            finished_at: None,
            elapsed: Duration::ZERO,
        }
    }

    fn complete(&mut self, deployed: &DeployedProxy, finished_at: Timestamp) {
        self.proxy_address = Some(deployed.address);
        if deployed.tx_hash.is_some() {
            self.tx_hash = deployed.tx_hash;
        }
        // A monotonic clock never goes backwards; clamp anyway so elapsed stays >= 0.
        self.elapsed = finished_at.since(self.started_at).unwrap_or_default();
        self.finished_at = Some(finished_at);
    }

    pub fn is_complete(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Elapsed wall time in fractional seconds.
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Sequences a single upgradeable deployment.
pub struct DeploymentOrchestrator<A, D, C = TokioClock> {
    artifacts: A,
    deployer: D,
    clock: C,
    settings: DeploySettings,
}

impl<A, D, C> DeploymentOrchestrator<A, D, C>
where
    A: ArtifactStore,
    D: ProxyDeployer,
    C: Clock,
{
    pub fn new(artifacts: A, deployer: D, clock: C, settings: DeploySettings) -> Self {
        Self {
            artifacts,
            deployer,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &DeploySettings {
        &self.settings
    }

    /// Runs the deployment once.
    #[instrument(skip(self), fields(contract = %self.settings.contract))]
    pub async fn run(&self) -> Result<DeploymentRecord, DeployError> {
        let contract = self.settings.contract.as_str();
        let mut record = DeploymentRecord::start(contract, self.clock.now());

        info!("Initializing {contract} for deployment..");
        let bundle = self
            .artifacts
            .contract_bundle(contract)
            .await
            .inspect_err(|e| warn!(error = %e, "Bundle resolution failed"))?;
        debug!(fqn = %bundle.fully_qualified_name(), "Bundle resolved");

        info!("Deploying {contract} Proxy..");
        let pending = self
            .deployer
            .deploy_proxy(&bundle, &self.settings.args, &self.settings.options)
            .await
            .inspect_err(|e| warn!(error = %e, "Proxy deployment rejected"))?;
        record.proxy_address = Some(pending.address());
        record.tx_hash = pending.tx_hash();
        debug!(address = ?pending.address(), tx_hash = ?record.tx_hash, "Proxy deployment broadcast");

        info!("Waiting for {contract} Proxy confirmation..");
        let deployed = self
            .await_confirmation(&pending)
            .await
            .inspect_err(|e| warn!(error = %e, tx_hash = ?record.tx_hash, "Proxy confirmation failed"))?;
        record.complete(&deployed, self.clock.now());

        info!(
            "{contract} Contract & Proxy deployed successfully in {} seconds.",
            record.elapsed_seconds()
        );
        info!("Deployment Details");
        info!("Implementation Contract: {UNAVAILABLE}");
        info!("Proxy Contract: {}", to_checksum(&deployed.address, None));

        Ok(record)
    }

    async fn await_confirmation(
        &self,
        pending: &D::Pending,
    ) -> Result<DeployedProxy, ConfirmationError> {
        match self.settings.confirmation_timeout {
            Some(limit) => tokio::time::timeout(limit, pending.deployed())
                .await
                .map_err(|_| ConfirmationError::Timeout(limit))?,
            None => pending.deployed().await,
        }
    }
}
