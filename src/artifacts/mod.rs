//! Contract artifact lookup.
//!
//! A deployment starts by turning a contract name into a [`ContractBundle`]: the ABI
//! and creation bytecode the deployer needs. [`ArtifactStore`] is the seam; the
//! production implementation reads a Hardhat artifacts directory
//! ([`HardhatArtifacts`]), tests use [`crate::mock::MockArtifactStore`].

pub mod hardhat;

pub use hardhat::HardhatArtifacts;

use crate::error::ResolveError;
use async_trait::async_trait;
use ethers::abi::Abi;
use ethers::types::Bytes;
use std::sync::Arc;

/// Compiled contract ready to be deployed.
#[derive(Clone, Debug, PartialEq)]
pub struct ContractBundle {
    /// Contract name as declared in source (e.g. `Controller`).
    pub name: String,
    /// Source file the contract was compiled from (e.g. `contracts/Controller.sol`).
    pub source_name: String,
    pub abi: Abi,
    /// Creation bytecode, without constructor arguments.
    pub bytecode: Bytes,
}

impl ContractBundle {
    /// `<source_name>:<name>`, unique across a project.
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.name)
    }
}

/// Resolves contract names to deployable bundles.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Looks up `name`, which is either a bare contract name or a fully qualified
    /// `source:Contract` name.
    async fn contract_bundle(&self, name: &str) -> Result<ContractBundle, ResolveError>;
}

#[async_trait]
impl<T: ArtifactStore + ?Sized> ArtifactStore for Arc<T> {
    async fn contract_bundle(&self, name: &str) -> Result<ContractBundle, ResolveError> {
        (**self).contract_bundle(name).await
    }
}
