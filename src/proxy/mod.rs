//! Upgradeable proxy deployment.
//!
//! Deploying an upgradeable contract is a two-phase affair: the deployer broadcasts
//! the proxy creation (after putting the implementation on chain), hands back a
//! [`PendingProxy`] whose address is already known, and the caller then awaits
//! [`PendingProxy::deployed`] for confirmation.
//!
//! # Initializers
//!
//! Proxies cannot run the implementation's constructor, so setup happens through an
//! initializer function called in the proxy's own constructor. [`Initializer`] picks
//! which one, if any:
//!
//! | Variant | Behaviour |
//! |---------|-----------|
//! | `Default` | call `initialize` when the ABI has it; with no args and no `initialize`, call nothing |
//! | `Skip` | call nothing, the proxy is left uninitialized |
//! | `Call(name)` | call `name`, matched by name and argument count |

pub mod initializer;
pub mod rpc;

pub use initializer::initializer_calldata;
pub use rpc::{EthersPendingProxy, EthersProxyDeployer};

use crate::artifacts::ContractBundle;
use crate::error::{ConfirmationError, DeployError};
use async_trait::async_trait;
use ethers::types::{Address, TxHash, U64};
use serde::Deserialize;

/// Which initializer the proxy calls on construction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "InitializerRepr")]
pub enum Initializer {
    #[default]
    Default,
    Skip,
    Call(String),
}

/// Accepted config forms: `false`/`"none"` skip, `true`/`"default"` use the
/// default, anything else names a function.
#[derive(Deserialize)]
#[serde(untagged)]
enum InitializerRepr {
    Flag(bool),
    Name(String),
}

impl TryFrom<InitializerRepr> for Initializer {
    type Error = String;

    fn try_from(repr: InitializerRepr) -> Result<Self, Self::Error> {
        match repr {
            InitializerRepr::Flag(false) => Ok(Initializer::Skip),
            InitializerRepr::Flag(true) => Ok(Initializer::Default),
            InitializerRepr::Name(name) => match name.trim() {
                "" => Err("initializer name must not be empty".to_owned()),
                "none" => Ok(Initializer::Skip),
                "default" => Ok(Initializer::Default),
                other => Ok(Initializer::Call(other.to_owned())),
            },
        }
    }
}

/// Options for a single proxy deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProxyOptions {
    pub initializer: Initializer,
}

impl ProxyOptions {
    /// Options for a proxy deployed without running any initializer.
    pub fn uninitialized() -> Self {
        Self {
            initializer: Initializer::Skip,
        }
    }
}

/// A confirmed proxy deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployedProxy {
    pub address: Address,
    pub tx_hash: Option<TxHash>,
    pub block_number: Option<U64>,
}

/// A broadcast proxy deployment that has not been confirmed yet.
#[async_trait]
pub trait PendingProxy: Send + Sync {
    /// Address the proxy lives at once mined.
    fn address(&self) -> Address;

    /// Hash of the proxy creation transaction, when there is one to report.
    fn tx_hash(&self) -> Option<TxHash>;

    /// Waits until the creation transaction is mined and confirmed.
    async fn deployed(&self) -> Result<DeployedProxy, ConfirmationError>;
}

/// Deploys upgradeable proxies.
#[async_trait]
pub trait ProxyDeployer: Send + Sync {
    type Pending: PendingProxy;

    /// Starts deploying a proxy for `bundle`. `args` go to the initializer.
    ///
    /// Returns once the proxy creation transaction is broadcast; call
    /// [`PendingProxy::deployed`] to wait for it.
    async fn deploy_proxy(
        &self,
        bundle: &ContractBundle,
        args: &[serde_json::Value],
        options: &ProxyOptions,
    ) -> Result<Self::Pending, DeployError>;
}
