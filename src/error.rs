//! # Deployment Errors
//!
//! Every failure a deployment run can hit, grouped by where it originates:
//!
//! - [`ResolveError`]: the requested contract has no usable compiled artifact.
//! - [`DeployError::DeploymentInitiation`]: the deployment was rejected before the
//!   proxy transaction was broadcast (signer, RPC, implementation deployment).
//! - [`ConfirmationError`]: the broadcast proxy transaction did not confirm.
//!
//! The orchestrator never catches or rewrites these. Whatever a collaborator returns
//! is what the binary prints before exiting with [`DeployError::exit_code`].

use ethers::types::TxHash;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while resolving a contract name to a deployable bundle.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    /// No artifact matches the requested name.
    #[error("Artifact for contract \"{0}\" not found")]
    NotFound(String),

    /// A bare contract name matched several artifacts.
    #[error("Contract name \"{name}\" is ambiguous, use one of: {}", candidates.join(", "))]
    Ambiguous {
        name: String,
        candidates: Vec<String>,
    },

    /// The artifact has no creation bytecode (abstract contract or interface).
    #[error("Contract \"{0}\" is abstract and can't be deployed")]
    NotDeployable(String),

    /// The bytecode still references libraries that were never linked.
    #[error("Contract \"{name}\" requires linking libraries: {}", libraries.join(", "))]
    UnlinkedLibraries {
        name: String,
        libraries: Vec<String>,
    },

    /// The artifact file could not be read or parsed.
    #[error("Malformed artifact {path}: {reason}")]
    Malformed { path: String, reason: String },
}

/// Errors raised while waiting for a broadcast transaction to confirm.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfirmationError {
    /// The transaction was mined but execution reverted.
    #[error("Transaction {0:?} reverted")]
    Reverted(TxHash),

    /// The transaction disappeared from the mempool without being mined.
    #[error("Transaction {0:?} was dropped")]
    Dropped(TxHash),

    /// The configured confirmation timeout elapsed.
    #[error("Confirmation timed out after {0:?}")]
    Timeout(Duration),

    /// The provider failed while polling for the receipt.
    #[error("Provider error while awaiting confirmation: {0}")]
    Provider(String),
}

/// Top-level error for a deployment run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeployError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error(transparent)]
    Resolution(#[from] ResolveError),

    #[error("Deployment initiation failed: {0}")]
    DeploymentInitiation(String),

    #[error("Invalid initializer: {0}")]
    Initializer(String),

    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),
}

impl DeployError {
    /// Process exit status signalled to the host shell for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            DeployError::Config(_) => 2,
            _ => 1,
        }
    }
}

impl From<crate::config::ConfigError> for DeployError {
    fn from(e: crate::config::ConfigError) -> Self {
        DeployError::Config(e.to_string())
    }
}
