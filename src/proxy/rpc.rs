//! JSON-RPC proxy deployer built on `ethers`.
//!
//! Deployment order:
//! 1. resolve the proxy artifact and encode the initializer call, so nothing is sent
//!    when either is wrong;
//! 2. deploy the implementation and wait for its receipt;
//! 3. broadcast the ERC-1967 proxy creation `(address logic, bytes data)`.
//!
//! Step 3 returns as soon as the node accepts the transaction. The proxy address is
//! derived from the sender and its nonce, so it is known before mining.
//!
//! The deployer works over any [`Middleware`] that knows its sender. Production uses
//! [`SignerClient`](crate::runtime::network::SignerClient).

use super::{initializer_calldata, DeployedProxy, PendingProxy, ProxyDeployer, ProxyOptions};
use crate::artifacts::{ArtifactStore, ContractBundle};
use crate::error::{ConfirmationError, DeployError};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::providers::{Middleware, PendingTransaction};
use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, TransactionReceipt, TransactionRequest,
    TxHash, U64,
};
use ethers::utils::get_contract_address;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// [`ProxyDeployer`] that broadcasts through an `ethers` middleware stack.
pub struct EthersProxyDeployer<M> {
    client: Arc<M>,
    artifacts: Arc<dyn ArtifactStore>,
    proxy_contract: String,
    confirmations: usize,
}

impl<M: Middleware + 'static> EthersProxyDeployer<M> {
    pub fn new(
        client: Arc<M>,
        artifacts: Arc<dyn ArtifactStore>,
        proxy_contract: impl Into<String>,
        confirmations: usize,
    ) -> Self {
        Self {
            client,
            artifacts,
            proxy_contract: proxy_contract.into(),
            confirmations,
        }
    }

    /// Fills and broadcasts a contract creation. Returns the future contract address
    /// and the transaction hash.
    async fn send_creation(
        &self,
        bundle: &ContractBundle,
        constructor_args: &[Token],
    ) -> Result<(Address, TxHash), DeployError> {
        let initiation =
            |e: String| DeployError::DeploymentInitiation(format!("{}: {e}", bundle.name));

        let sender = self
            .client
            .default_sender()
            .ok_or_else(|| initiation("no sender account".to_owned()))?;
        let data = creation_data(bundle, constructor_args).map_err(initiation)?;
        let nonce = self
            .client
            .get_transaction_count(sender, None)
            .await
            .map_err(|e| initiation(e.to_string()))?;

        let mut tx: TypedTransaction = TransactionRequest::new()
            .from(sender)
            .nonce(nonce)
            .data(data)
            .into();
        self.client
            .fill_transaction(&mut tx, None)
            .await
            .map_err(|e| initiation(e.to_string()))?;

        let address = get_contract_address(sender, nonce);
        debug!(contract = %bundle.name, %nonce, gas = ?tx.gas(), "Sending creation transaction");

        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| initiation(e.to_string()))?;
        Ok((address, pending.tx_hash()))
    }
}

#[async_trait]
impl<M: Middleware + 'static> ProxyDeployer for EthersProxyDeployer<M> {
    type Pending = EthersPendingProxy<M>;

    #[instrument(skip_all, fields(contract = %bundle.name))]
    async fn deploy_proxy(
        &self,
        bundle: &ContractBundle,
        args: &[serde_json::Value],
        options: &ProxyOptions,
    ) -> Result<Self::Pending, DeployError> {
        debug!(?args, ?options, "deploy_proxy called");
        // The requested contract is already resolved; a missing proxy artifact is a
        // setup problem of this step.
        let proxy_bundle = self
            .artifacts
            .contract_bundle(&self.proxy_contract)
            .await
            .map_err(|e| DeployError::DeploymentInitiation(format!("proxy artifact: {e}")))?;
        let init_data = initializer_calldata(&bundle.abi, &options.initializer, args)?;

        let (implementation, impl_tx) = self.send_creation(bundle, &[]).await?;
        info!(tx_hash = ?impl_tx, "Implementation deployment sent");
        wait_for_receipt(self.client.as_ref(), impl_tx, self.confirmations)
            .await
            .map_err(|e| {
                DeployError::DeploymentInitiation(format!(
                    "{}: implementation deployment failed: {e}",
                    bundle.name
                ))
            })?;

        let proxy_args = [Token::Address(implementation), Token::Bytes(init_data.to_vec())];
        let (address, tx_hash) = self.send_creation(&proxy_bundle, &proxy_args).await?;
        info!(?tx_hash, "Proxy deployment sent");

        Ok(EthersPendingProxy {
            client: self.client.clone(),
            address,
            tx_hash,
            confirmations: self.confirmations,
        })
    }
}

/// Broadcast proxy creation awaiting confirmation.
pub struct EthersPendingProxy<M> {
    client: Arc<M>,
    address: Address,
    tx_hash: TxHash,
    confirmations: usize,
}

#[async_trait]
impl<M: Middleware + 'static> PendingProxy for EthersPendingProxy<M> {
    fn address(&self) -> Address {
        self.address
    }

    fn tx_hash(&self) -> Option<TxHash> {
        Some(self.tx_hash)
    }

    async fn deployed(&self) -> Result<DeployedProxy, ConfirmationError> {
        let receipt =
            wait_for_receipt(self.client.as_ref(), self.tx_hash, self.confirmations).await?;
        let address = match receipt.contract_address {
            Some(mined) if mined != self.address => {
                warn!(expected = ?self.address, ?mined, "Proxy mined at an unexpected address");
                mined
            }
            Some(mined) => mined,
            None => self.address,
        };
        Ok(DeployedProxy {
            address,
            tx_hash: Some(self.tx_hash),
            block_number: receipt.block_number,
        })
    }
}

async fn wait_for_receipt<M: Middleware>(
    client: &M,
    tx_hash: TxHash,
    confirmations: usize,
) -> Result<TransactionReceipt, ConfirmationError> {
    let receipt = PendingTransaction::new(tx_hash, client.provider())
        .confirmations(confirmations)
        .await
        .map_err(|e| ConfirmationError::Provider(e.to_string()))?
        .ok_or(ConfirmationError::Dropped(tx_hash))?;

    if receipt.status == Some(U64::zero()) {
        return Err(ConfirmationError::Reverted(tx_hash));
    }
    Ok(receipt)
}

/// Creation bytecode followed by ABI-encoded constructor arguments.
fn creation_data(bundle: &ContractBundle, args: &[Token]) -> Result<Bytes, String> {
    match bundle.abi.constructor() {
        Some(constructor) => constructor
            .encode_input(bundle.bytecode.to_vec(), args)
            .map(Bytes::from)
            .map_err(|e| format!("constructor arguments: {e}")),
        None if args.is_empty() => Ok(bundle.bytecode.clone()),
        None => Err(format!(
            "no constructor, but {} argument(s) were given",
            args.len()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::mock::{sample_bundle, MockArtifactStore};
    use ethers::abi::Abi;
    use ethers::providers::{JsonRpcClient, MockError, Provider};
    use ethers::types::{Transaction, H256, U256};
    use ethers::utils::hex;
    use serde::de::DeserializeOwned;
    use serde::Serialize;
    use std::collections::{HashMap, VecDeque};
    use std::fmt::Debug;
    use std::sync::Mutex;
    use std::time::Duration;

    const PROXY_ABI: &str = r#"[{"type":"constructor","stateMutability":"payable",
        "inputs":[{"name":"_logic","type":"address"},{"name":"_data","type":"bytes"}]}]"#;

    /// JSON-RPC transport answering by method name. The last queued answer for a
    /// method is repeated, so polling calls need a single entry.
    #[derive(Clone, Debug, Default)]
    struct ScriptedRpc {
        answers: Arc<Mutex<HashMap<String, VecDeque<serde_json::Value>>>>,
        calls: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    }

    impl ScriptedRpc {
        fn answer(&self, method: &str, value: impl Serialize) -> &Self {
            self.answers
                .lock()
                .unwrap()
                .entry(method.to_owned())
                .or_default()
                .push_back(serde_json::to_value(value).unwrap());
            self
        }

        fn methods(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
        }

        fn params_of(&self, method: &str) -> Vec<serde_json::Value> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(m, _)| m == method)
                .map(|(_, p)| p.clone())
                .collect()
        }
    }

    #[async_trait]
    impl JsonRpcClient for ScriptedRpc {
        type Error = MockError;

        async fn request<T, R>(&self, method: &str, params: T) -> Result<R, MockError>
        where
            T: Debug + Serialize + Send + Sync,
            R: DeserializeOwned + Send,
        {
            let params = serde_json::to_value(params)?;
            self.calls.lock().unwrap().push((method.to_owned(), params));
            let answer = {
                let mut answers = self.answers.lock().unwrap();
                answers.get_mut(method).and_then(|queue| {
                    if queue.len() > 1 {
                        queue.pop_front()
                    } else {
                        queue.front().cloned()
                    }
                })
            };
            let answer = answer.ok_or(MockError::EmptyResponses)?;
            Ok(serde_json::from_value(answer)?)
        }
    }

    fn sender() -> Address {
        Address::repeat_byte(0x11)
    }

    fn mined_tx() -> Transaction {
        Transaction {
            hash: H256::repeat_byte(0x0a),
            block_hash: Some(H256::repeat_byte(0x0b)),
            block_number: Some(U64::one()),
            ..Default::default()
        }
    }

    fn receipt(status: u64, contract_address: Address) -> TransactionReceipt {
        TransactionReceipt {
            status: Some(U64::from(status)),
            contract_address: Some(contract_address),
            block_number: Some(U64::one()),
            ..Default::default()
        }
    }

    /// Node that accepts two creations from `sender()` at nonces 5 and 6.
    fn scripted_node(impl_status: u64, proxy_status: u64) -> ScriptedRpc {
        let rpc = ScriptedRpc::default();
        rpc.answer("eth_chainId", U256::from(31337))
            .answer("eth_gasPrice", U256::one())
            .answer("eth_estimateGas", U256::from(500_000))
            .answer("eth_getTransactionCount", U256::from(5))
            .answer("eth_getTransactionCount", U256::from(6))
            .answer("eth_sendTransaction", H256::repeat_byte(0x01))
            .answer("eth_sendTransaction", H256::repeat_byte(0x02))
            .answer("eth_getTransactionByHash", mined_tx())
            .answer(
                "eth_getTransactionReceipt",
                receipt(impl_status, get_contract_address(sender(), 5u64)),
            )
            .answer(
                "eth_getTransactionReceipt",
                receipt(proxy_status, get_contract_address(sender(), 6u64)),
            );
        rpc
    }

    fn deployer(
        rpc: &ScriptedRpc,
        artifacts: MockArtifactStore,
    ) -> EthersProxyDeployer<Provider<ScriptedRpc>> {
        let provider = Provider::new(rpc.clone())
            .interval(Duration::from_millis(5))
            .with_sender(sender());
        EthersProxyDeployer::new(Arc::new(provider), Arc::new(artifacts), "ERC1967Proxy", 1)
    }

    fn proxy_artifacts() -> MockArtifactStore {
        let mut artifacts = MockArtifactStore::new();
        artifacts.expect_bundle("ERC1967Proxy").return_ok(ContractBundle {
            name: "ERC1967Proxy".into(),
            source_name: "@openzeppelin/contracts/proxy/ERC1967/ERC1967Proxy.sol".into(),
            abi: serde_json::from_str::<Abi>(PROXY_ABI).unwrap(),
            bytecode: Bytes::from(vec![0x60, 0x80]),
        });
        artifacts
    }

    async fn within_limit<F: std::future::Future>(fut: F) -> F::Output {
        tokio::time::timeout(Duration::from_secs(10), fut)
            .await
            .expect("scripted node never settled")
    }

    #[tokio::test]
    async fn test_deploys_implementation_then_proxy() {
        let rpc = scripted_node(1, 1);
        let artifacts = proxy_artifacts();
        let deployer = deployer(&rpc, artifacts.clone());

        let pending = within_limit(deployer.deploy_proxy(
            &sample_bundle("Controller"),
            &[],
            &ProxyOptions::uninitialized(),
        ))
        .await
        .unwrap();

        let implementation = get_contract_address(sender(), 5u64);
        let proxy = get_contract_address(sender(), 6u64);
        assert_eq!(pending.address(), proxy);
        assert_eq!(pending.tx_hash(), Some(H256::repeat_byte(0x02)));

        // The implementation receipt is awaited before the proxy is broadcast.
        let methods = rpc.methods();
        let sends: Vec<usize> = methods
            .iter()
            .enumerate()
            .filter(|(_, m)| *m == "eth_sendTransaction")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(sends.len(), 2);
        let first_receipt = methods
            .iter()
            .position(|m| m == "eth_getTransactionReceipt")
            .unwrap();
        assert!(sends[0] < first_receipt && first_receipt < sends[1]);

        // The proxy constructor receives the implementation address.
        let sent = rpc.params_of("eth_sendTransaction");
        let proxy_data = sent[1][0]["data"].as_str().unwrap();
        assert!(proxy_data.starts_with("0x6080"));
        assert!(proxy_data.contains(&hex::encode(implementation.as_bytes())));

        let deployed = within_limit(pending.deployed()).await.unwrap();
        assert_eq!(deployed.address, proxy);
        assert_eq!(deployed.tx_hash, Some(H256::repeat_byte(0x02)));
        artifacts.verify();
    }

    #[tokio::test]
    async fn test_reverted_proxy_creation() {
        let rpc = scripted_node(1, 0);
        let deployer = deployer(&rpc, proxy_artifacts());

        let pending = within_limit(deployer.deploy_proxy(
            &sample_bundle("Controller"),
            &[],
            &ProxyOptions::uninitialized(),
        ))
        .await
        .unwrap();

        let err = within_limit(pending.deployed()).await.unwrap_err();
        assert_eq!(err, ConfirmationError::Reverted(H256::repeat_byte(0x02)));
    }

    #[tokio::test]
    async fn test_reverted_implementation_stops_before_proxy() {
        let rpc = scripted_node(0, 1);
        let deployer = deployer(&rpc, proxy_artifacts());

        let err = within_limit(deployer.deploy_proxy(
            &sample_bundle("Controller"),
            &[],
            &ProxyOptions::uninitialized(),
        ))
        .await
        .err()
        .unwrap();

        assert!(matches!(&err, DeployError::DeploymentInitiation(msg)
            if msg.contains("implementation deployment failed")));
        assert_eq!(rpc.params_of("eth_sendTransaction").len(), 1);
    }

    #[tokio::test]
    async fn test_transaction_missing_from_node_is_dropped() {
        let rpc = ScriptedRpc::default();
        rpc.answer("eth_getTransactionByHash", serde_json::Value::Null);
        let provider = Provider::new(rpc.clone()).interval(Duration::from_millis(5));

        let tx_hash = H256::repeat_byte(0x03);
        let err = within_limit(wait_for_receipt(&provider, tx_hash, 1))
            .await
            .unwrap_err();
        assert_eq!(err, ConfirmationError::Dropped(tx_hash));
        assert!(!rpc.methods().contains(&"eth_getTransactionReceipt".to_owned()));
    }

    #[tokio::test]
    async fn test_missing_proxy_artifact_is_an_initiation_failure() {
        let rpc = scripted_node(1, 1);
        let mut artifacts = MockArtifactStore::new();
        artifacts
            .expect_bundle("ERC1967Proxy")
            .return_err(ResolveError::NotFound("ERC1967Proxy".into()));
        let deployer = deployer(&rpc, artifacts);

        let err = deployer
            .deploy_proxy(&sample_bundle("Controller"), &[], &ProxyOptions::uninitialized())
            .await
            .err()
            .unwrap();

        assert!(matches!(&err, DeployError::DeploymentInitiation(msg) if msg.contains("ERC1967Proxy")));
        assert!(rpc.methods().is_empty(), "nothing may be sent");
    }

    #[test]
    fn test_creation_data_appends_constructor_args() {
        let proxy = ContractBundle {
            name: "ERC1967Proxy".into(),
            source_name: "ERC1967Proxy.sol".into(),
            abi: serde_json::from_str::<Abi>(PROXY_ABI).unwrap(),
            bytecode: Bytes::from(vec![0x60, 0x80]),
        };
        let logic = Address::repeat_byte(0x11);
        let data = creation_data(&proxy, &[Token::Address(logic), Token::Bytes(vec![])]).unwrap();

        assert_eq!(&data[..2], &[0x60, 0x80]);
        // address word + bytes offset word + bytes length word
        assert_eq!(data.len(), 2 + 32 * 3);
        assert_eq!(&data[2 + 12..2 + 32], logic.as_bytes());
    }

    #[test]
    fn test_creation_data_without_constructor() {
        let implementation = sample_bundle("Controller");
        assert_eq!(creation_data(&implementation, &[]).unwrap(), implementation.bytecode);

        let err = creation_data(&implementation, &[Token::Bool(true)]).unwrap_err();
        assert!(err.contains("no constructor"));
    }
}
