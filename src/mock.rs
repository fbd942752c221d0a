//! # Mock Collaborators
//!
//! In-memory stand-ins for the orchestrator's collaborators, for deterministic tests
//! without a node or an artifacts directory.
//!
//! The API follows an expectation style: queue what the next call should return with
//! `expect_*().return_ok(..)` / `return_err(..)`, run the code under test, then call
//! `verify()` to assert every expectation was consumed. Each mock also records the
//! calls it received, so tests can assert on ordering and counts.
//!
//! Mocks are cheap to clone and clones share state. Hand one clone to the orchestrator
//! and keep another for assertions.
//!
//! ```rust,ignore
//! let mut artifacts = MockArtifactStore::new();
//! artifacts.expect_bundle("Controller").return_ok(bundle);
//!
//! let mut deployer = MockProxyDeployer::new();
//! deployer
//!     .expect_deploy()
//!     .return_ok(MockPendingProxy::confirming(address).after(Duration::from_secs(2)));
//!
//! let orchestrator = DeploymentOrchestrator::new(
//!     artifacts.clone(), deployer.clone(), TokioClock, settings);
//! orchestrator.run().await?;
//!
//! artifacts.verify();
//! deployer.verify();
//! ```

use crate::artifacts::{ArtifactStore, ContractBundle};
use crate::error::{ConfirmationError, DeployError, ResolveError};
use crate::proxy::{DeployedProxy, PendingProxy, ProxyDeployer, ProxyOptions};
use async_trait::async_trait;
use ethers::abi::Abi;
use ethers::types::{Address, Bytes, TxHash, U64};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A deployable bundle with an empty ABI and a two-byte body.
pub fn sample_bundle(name: &str) -> ContractBundle {
    ContractBundle {
        name: name.to_owned(),
        source_name: format!("contracts/{name}.sol"),
        abi: Abi::default(),
        bytecode: Bytes::from(vec![0x60, 0x80]),
    }
}

// =============================================================================
// ARTIFACT STORE
// =============================================================================

struct BundleExpectation {
    name: String,
    response: Result<ContractBundle, ResolveError>,
}

/// Mock [`ArtifactStore`] answering lookups from a queue of expectations.
#[derive(Clone, Default)]
pub struct MockArtifactStore {
    expectations: Arc<Mutex<VecDeque<BundleExpectation>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects a lookup of `name`.
    pub fn expect_bundle(&mut self, name: impl Into<String>) -> BundleExpectationBuilder {
        BundleExpectationBuilder {
            name: name.into(),
            expectations: self.expectations.clone(),
        }
    }

    /// Names looked up so far, in call order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let exps = self.expectations.lock().unwrap();
        if !exps.is_empty() {
            panic!("Not all bundle expectations were met. {} remaining", exps.len());
        }
    }
}

#[async_trait]
impl ArtifactStore for MockArtifactStore {
    async fn contract_bundle(&self, name: &str) -> Result<ContractBundle, ResolveError> {
        self.requests.lock().unwrap().push(name.to_owned());
        let expectation = self.expectations.lock().unwrap().pop_front();
        match expectation {
            Some(exp) => {
                assert_eq!(exp.name, name, "Unexpected contract lookup");
                exp.response
            }
            None => panic!("Unexpected contract lookup: {name}"),
        }
    }
}

/// Builder for bundle lookup expectations.
pub struct BundleExpectationBuilder {
    name: String,
    expectations: Arc<Mutex<VecDeque<BundleExpectation>>>,
}

impl BundleExpectationBuilder {
    pub fn return_ok(self, bundle: ContractBundle) {
        self.push(Ok(bundle));
    }

    pub fn return_err(self, error: ResolveError) {
        self.push(Err(error));
    }

    fn push(self, response: Result<ContractBundle, ResolveError>) {
        self.expectations.lock().unwrap().push_back(BundleExpectation {
            name: self.name,
            response,
        });
    }
}

// =============================================================================
// PROXY DEPLOYER
// =============================================================================

/// A deploy request as seen by [`MockProxyDeployer`].
#[derive(Clone, Debug, PartialEq)]
pub struct DeployRequest {
    pub contract: String,
    pub args: Vec<serde_json::Value>,
    pub options: ProxyOptions,
}

/// Mock [`ProxyDeployer`] handing out queued [`MockPendingProxy`] handles.
#[derive(Clone, Default)]
pub struct MockProxyDeployer {
    expectations: Arc<Mutex<VecDeque<Result<MockPendingProxy, DeployError>>>>,
    requests: Arc<Mutex<Vec<DeployRequest>>>,
    confirmations: Arc<AtomicUsize>,
}

impl MockProxyDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects one `deploy_proxy` call.
    pub fn expect_deploy(&mut self) -> DeployExpectationBuilder {
        DeployExpectationBuilder {
            expectations: self.expectations.clone(),
        }
    }

    /// Deploy requests received so far.
    pub fn requests(&self) -> Vec<DeployRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn deploy_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of `deployed()` calls made on handles from this deployer.
    pub fn confirmation_count(&self) -> usize {
        self.confirmations.load(Ordering::SeqCst)
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let exps = self.expectations.lock().unwrap();
        if !exps.is_empty() {
            panic!("Not all deploy expectations were met. {} remaining", exps.len());
        }
    }
}

#[async_trait]
impl ProxyDeployer for MockProxyDeployer {
    type Pending = MockPendingProxy;

    async fn deploy_proxy(
        &self,
        bundle: &ContractBundle,
        args: &[serde_json::Value],
        options: &ProxyOptions,
    ) -> Result<MockPendingProxy, DeployError> {
        self.requests.lock().unwrap().push(DeployRequest {
            contract: bundle.name.clone(),
            args: args.to_vec(),
            options: options.clone(),
        });
        let expectation = self.expectations.lock().unwrap().pop_front();
        match expectation {
            Some(Ok(mut pending)) => {
                pending.confirmations = self.confirmations.clone();
                Ok(pending)
            }
            Some(Err(e)) => Err(e),
            None => panic!("Unexpected deploy_proxy call for {}", bundle.name),
        }
    }
}

/// Builder for deploy expectations.
pub struct DeployExpectationBuilder {
    expectations: Arc<Mutex<VecDeque<Result<MockPendingProxy, DeployError>>>>,
}

impl DeployExpectationBuilder {
    pub fn return_ok(self, pending: MockPendingProxy) {
        self.expectations.lock().unwrap().push_back(Ok(pending));
    }

    pub fn return_err(self, error: DeployError) {
        self.expectations.lock().unwrap().push_back(Err(error));
    }
}

/// Scripted pending deployment: waits `delay` (tokio time), then yields `outcome`.
#[derive(Clone, Debug)]
pub struct MockPendingProxy {
    address: Address,
    tx_hash: Option<TxHash>,
    delay: Duration,
    outcome: Result<DeployedProxy, ConfirmationError>,
    confirmations: Arc<AtomicUsize>,
}

impl MockPendingProxy {
    /// A deployment that confirms immediately at `address`.
    pub fn confirming(address: Address) -> Self {
        Self {
            address,
            tx_hash: None,
            delay: Duration::ZERO,
            outcome: Ok(DeployedProxy {
                address,
                tx_hash: None,
                block_number: Some(U64::one()),
            }),
            confirmations: Arc::default(),
        }
    }

    /// A deployment broadcast at `address` whose confirmation fails with `error`.
    pub fn failing(address: Address, error: ConfirmationError) -> Self {
        Self {
            outcome: Err(error),
            ..Self::confirming(address)
        }
    }

    /// Delays confirmation by `delay`.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_tx_hash(mut self, tx_hash: TxHash) -> Self {
        self.tx_hash = Some(tx_hash);
        if let Ok(deployed) = &mut self.outcome {
            deployed.tx_hash = Some(tx_hash);
        }
        self
    }
}

#[async_trait]
impl PendingProxy for MockPendingProxy {
    fn address(&self) -> Address {
        self.address
    }

    fn tx_hash(&self) -> Option<TxHash> {
        self.tx_hash
    }

    async fn deployed(&self) -> Result<DeployedProxy, ConfirmationError> {
        self.confirmations.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_artifact_store() {
        let mut store = MockArtifactStore::new();
        store.expect_bundle("Controller").return_ok(sample_bundle("Controller"));
        store
            .expect_bundle("Missing")
            .return_err(ResolveError::NotFound("Missing".into()));

        let bundle = store.contract_bundle("Controller").await.unwrap();
        assert_eq!(bundle.name, "Controller");
        let err = store.contract_bundle("Missing").await.unwrap_err();
        assert_eq!(err, ResolveError::NotFound("Missing".into()));

        assert_eq!(store.requests(), vec!["Controller".to_owned(), "Missing".to_owned()]);
        store.verify();
    }

    #[tokio::test]
    async fn test_mock_deployer_counts_confirmations() {
        let address = Address::repeat_byte(0x42);
        let mut deployer = MockProxyDeployer::new();
        deployer.expect_deploy().return_ok(MockPendingProxy::confirming(address));

        let pending = deployer
            .deploy_proxy(&sample_bundle("Controller"), &[], &ProxyOptions::uninitialized())
            .await
            .unwrap();
        assert_eq!(deployer.confirmation_count(), 0);

        let deployed = pending.deployed().await.unwrap();
        assert_eq!(deployed.address, address);
        assert_eq!(deployer.confirmation_count(), 1);
        assert_eq!(deployer.requests()[0].options, ProxyOptions::uninitialized());
        deployer.verify();
    }

    #[test]
    #[should_panic(expected = "Not all deploy expectations were met")]
    fn test_verify_panics_on_leftovers() {
        let mut deployer = MockProxyDeployer::new();
        deployer
            .expect_deploy()
            .return_err(DeployError::DeploymentInitiation("unused".into()));
        deployer.verify();
    }
}
