//! Entry points behind the command line.
//!
//! Each command takes a loaded [`DeployConfig`], builds the production collaborators
//! for the selected network and runs to completion once.

use super::network;
use crate::artifacts::HardhatArtifacts;
use crate::clock::TokioClock;
use crate::config::DeployConfig;
use crate::error::DeployError;
use crate::orchestrator::{DeploySettings, DeploymentOrchestrator, DeploymentRecord};
use crate::proxy::EthersProxyDeployer;
use ethers::types::Address;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Deploys the configured contract (or `contract`, when given) behind a proxy on
/// `network`, falling back to the configured default network.
#[instrument(skip(config))]
pub async fn deploy(
    config: &DeployConfig,
    network: Option<&str>,
    contract: Option<String>,
) -> Result<DeploymentRecord, DeployError> {
    let (name, network_config) = config.network(network)?;
    let client = network::connect(&name, &network_config).await?;

    let artifacts = Arc::new(HardhatArtifacts::new(config.artifacts_dir()));
    debug!(root = %artifacts.root().display(), "Using artifacts directory");

    let deployer = EthersProxyDeployer::new(
        client,
        artifacts.clone(),
        &config.deploy.proxy_contract,
        config.deploy.confirmations,
    );

    let mut settings = DeploySettings::from(&config.deploy);
    if let Some(contract) = contract {
        settings.contract = contract;
    }

    DeploymentOrchestrator::new(artifacts, deployer, TokioClock, settings)
        .run()
        .await
}

/// Lists the addresses available on `network`.
#[instrument(skip(config))]
pub async fn accounts(
    config: &DeployConfig,
    network: Option<&str>,
) -> Result<Vec<Address>, DeployError> {
    let (name, network_config) = config.network(network)?;
    network::accounts(&name, &network_config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[tokio::test]
    async fn test_unknown_network_is_a_config_error() {
        let config = DeployConfig::default();
        let err = deploy(&config, Some("mainnet"), None).await.unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_accounts_for_configured_network() {
        let config = DeployConfig::parse(&format!(
            r#"
            [networks.dev]
            url = "http://127.0.0.1:8545"
            accounts = ["{DEV_KEY}"]
            "#
        ))
        .unwrap();

        let addresses = accounts(&config, Some("dev")).await.unwrap();
        assert_eq!(addresses.len(), 1);
    }
}
