//! JSON-RPC connection and signer setup for a configured network.

use crate::config::NetworkConfig;
use crate::error::DeployError;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Provider wrapped with the network's first configured account.
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Builds an HTTP provider honouring the network's request timeout and polling interval.
pub fn provider(network: &NetworkConfig) -> Result<Provider<Http>, DeployError> {
    let url: reqwest::Url = network
        .url
        .parse()
        .map_err(|e| DeployError::Config(format!("invalid network url: {e}")))?;

    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = network.timeout {
        builder = builder.timeout(timeout);
    }
    let http = builder
        .build()
        .map_err(|e| DeployError::Network(format!("failed to build HTTP client: {e}")))?;

    Ok(Provider::new(Http::new_with_client(url, http)).interval(network.polling_interval))
}

/// Parses every configured private key.
pub fn wallets(network: &NetworkConfig) -> Result<Vec<LocalWallet>, DeployError> {
    network
        .accounts
        .iter()
        .enumerate()
        .map(|(i, key)| {
            key.parse::<LocalWallet>().map_err(|e| {
                DeployError::Config(format!("account #{i} is not a valid private key: {e}"))
            })
        })
        .collect()
}

/// Connects to `network`, checks its chain id and attaches the first account as signer.
#[instrument(skip(network))]
pub async fn connect(name: &str, network: &NetworkConfig) -> Result<Arc<SignerClient>, DeployError> {
    let wallet = wallets(network)?.into_iter().next().ok_or_else(|| {
        DeployError::Config(format!("network \"{name}\" has no accounts configured"))
    })?;

    let provider = provider(network)?;
    let remote = provider
        .get_chainid()
        .await
        .map_err(|e| DeployError::Network(format!("{name}: {e}")))?;
    debug!(%remote, "Chain id reported by node");

    if let Some(expected) = network.chain_id {
        if remote != U256::from(expected) {
            return Err(DeployError::Network(format!(
                "network \"{name}\" is configured with chain id {expected}, but the node reports {remote}"
            )));
        }
    }

    let wallet = wallet.with_chain_id(remote.as_u64());
    info!(
        network = name,
        chain_id = remote.as_u64(),
        signer = %to_checksum(&wallet.address(), None),
        "Connected"
    );
    Ok(Arc::new(SignerMiddleware::new(provider, wallet)))
}

/// Addresses usable on `network`.
///
/// Configured private keys are authoritative; without any, the node's own unlocked
/// accounts are listed.
#[instrument(skip(network))]
pub async fn accounts(name: &str, network: &NetworkConfig) -> Result<Vec<Address>, DeployError> {
    let wallets = wallets(network)?;
    if !wallets.is_empty() {
        return Ok(wallets.iter().map(|w| w.address()).collect());
    }

    debug!("No accounts configured, asking the node");
    provider(network)?
        .get_accounts()
        .await
        .map_err(|e| DeployError::Network(format!("{name}: {e}")))
}
