//! Deployment configuration with layered loading and environment variable interpolation.
//!
//! One [`DeployConfig`] describes the whole project: where artifacts live, the compiler
//! and documentation settings the artifacts were built with, the networks a deployment
//! can target, and what the deployment itself should do. Secrets (RPC URLs, private
//! keys, API keys) are pulled in with `${VAR}` placeholders or `DEPLOY_`-prefixed
//! environment variables, then handed to the orchestrator as plain values.

use crate::proxy::{Initializer, ProxyOptions};
use figment::{
    providers::{Env, Format, Toml},
    value::{Dict, Map, Value},
    Error as FigmentError, Figment, Metadata, Profile, Provider,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File read when no configuration path is given explicitly.
pub const DEFAULT_CONFIG_FILE: &str = "deploy.toml";

/// Name of the network that exists even when the file does not define it.
pub const LOCALHOST_NETWORK: &str = "localhost";

/// Errors that can occur when loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error from the Figment configuration library.
    #[error("Configuration error: {0}")]
    Figment(Box<FigmentError>),

    /// The specified configuration file was not found.
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// The configuration is invalid or incomplete.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<FigmentError> for ConfigError {
    fn from(err: FigmentError) -> Self {
        Self::Figment(Box::new(err))
    }
}

/// Top-level deployment configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeployConfig {
    /// Network used when the command line does not name one.
    #[serde(default)]
    pub default_network: Option<String>,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub docgen: DocgenConfig,

    #[serde(default)]
    pub solidity: SolidityConfig,

    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,

    #[serde(default)]
    pub gas_reporter: GasReporterConfig,

    #[serde(default)]
    pub etherscan: EtherscanConfig,

    #[serde(default)]
    pub deploy: DeploySection,

    #[serde(default)]
    pub log: LogConfig,
}

impl DeployConfig {
    /// Loads configuration from the specified file path.
    ///
    /// Environment variables prefixed with `DEPLOY_` override file settings.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let figment = Figment::new()
            .merge(InterpolatingToml::file(path)?)
            .merge(env_overrides());

        let config = figment.extract::<Self>()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration for a command line run.
    ///
    /// An explicit path must exist. Without one, [`DEFAULT_CONFIG_FILE`] in the current
    /// directory is used when present, otherwise defaults plus environment overrides.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_from(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::load_from(DEFAULT_CONFIG_FILE),
            None => Self::load_env_only(),
        }
    }

    /// Loads defaults overridden only by `DEPLOY_` environment variables.
    pub fn load_env_only() -> Result<Self, ConfigError> {
        let config = Figment::new().merge(env_overrides()).extract::<Self>()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new().merge(InterpolatingToml::string(content));
        let config = figment.extract::<Self>()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.solidity.version.trim().is_empty() {
            return Err(ConfigError::Invalid("solidity.version must not be empty".into()));
        }
        if self.solidity.optimizer.enabled && self.solidity.optimizer.runs == 0 {
            return Err(ConfigError::Invalid(
                "solidity.optimizer.runs must be positive when the optimizer is enabled".into(),
            ));
        }
        if self.deploy.contract.trim().is_empty() {
            return Err(ConfigError::Invalid("deploy.contract must not be empty".into()));
        }
        if self.deploy.confirmations == 0 {
            return Err(ConfigError::Invalid("deploy.confirmations must be at least 1".into()));
        }
        for (name, network) in &self.networks {
            if network.polling_interval.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "networks.{name}.polling_interval must be positive"
                )));
            }
        }
        Ok(())
    }

    /// Selects a network by name, falling back to `default_network` and then `localhost`.
    ///
    /// The selected network must have a non-empty URL.
    pub fn network(&self, name: Option<&str>) -> Result<(String, NetworkConfig), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_network.clone())
            .unwrap_or_else(|| LOCALHOST_NETWORK.to_owned());

        let network = match self.networks.get(&name) {
            Some(network) => network.clone(),
            None if name == LOCALHOST_NETWORK => NetworkConfig::localhost(),
            None => {
                let known: Vec<&str> = self.networks.keys().map(String::as_str).collect();
                return Err(ConfigError::Invalid(format!(
                    "unknown network \"{name}\" (configured: {})",
                    if known.is_empty() { "none".to_owned() } else { known.join(", ") }
                )));
            }
        };

        if network.url.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("network \"{name}\" has no url")));
        }
        Ok((name, network))
    }

    /// Artifacts directory resolved against the project root.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.paths.root.join(&self.paths.artifacts)
    }
}

fn env_overrides() -> Env {
    Env::prefixed("DEPLOY_").split("__").lowercase(true)
}

/// Project layout.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default = "default_sources")]
    pub sources: PathBuf,

    #[serde(default = "default_tests")]
    pub tests: PathBuf,

    /// Where compiled contract artifacts are read from.
    #[serde(default = "default_artifacts")]
    pub artifacts: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            sources: default_sources(),
            tests: default_tests(),
            artifacts: default_artifacts(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_sources() -> PathBuf {
    PathBuf::from("./contracts")
}

fn default_tests() -> PathBuf {
    PathBuf::from("./tests")
}

fn default_artifacts() -> PathBuf {
    PathBuf::from("./dist/artifacts")
}

/// Documentation generation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DocgenConfig {
    #[serde(default = "default_docs_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub pages: DocPages,
}

impl Default for DocgenConfig {
    fn default() -> Self {
        Self {
            output_dir: default_docs_dir(),
            pages: DocPages::default(),
        }
    }
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("./docs")
}

/// How generated documentation is split into pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocPages {
    /// One page for the whole project.
    #[default]
    Single,
    /// One page per contract item.
    Items,
    /// One page per source file.
    Files,
}

/// Compiler settings the artifacts were produced with.
#[derive(Debug, Clone, Deserialize)]
pub struct SolidityConfig {
    #[serde(default = "default_solc_version")]
    pub version: String,

    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

impl Default for SolidityConfig {
    fn default() -> Self {
        Self {
            version: default_solc_version(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

fn default_solc_version() -> String {
    "0.8.4".to_owned()
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_optimizer_runs")]
    pub runs: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            runs: default_optimizer_runs(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_optimizer_runs() -> u32 {
    10
}

/// A JSON-RPC network a deployment can target.
#[derive(Clone, Deserialize)]
pub struct NetworkConfig {
    /// Expected chain id; checked against the node when set.
    #[serde(default)]
    pub chain_id: Option<u64>,

    #[serde(default)]
    pub url: String,

    /// Hex-encoded private keys. Empty entries (unset variables) are dropped.
    #[serde(default, deserialize_with = "deserialize_accounts")]
    pub accounts: Vec<String>,

    /// HTTP request timeout. A bare number is read as milliseconds.
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub timeout: Option<Duration>,

    #[serde(
        default = "default_polling_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub polling_interval: Duration,
}

impl NetworkConfig {
    fn localhost() -> Self {
        Self {
            chain_id: None,
            url: "http://127.0.0.1:8545".to_owned(),
            accounts: Vec::new(),
            timeout: None,
            polling_interval: default_polling_interval(),
        }
    }
}

impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("chain_id", &self.chain_id)
            .field("url", &self.url)
            .field("accounts", &format_args!("[{} redacted]", self.accounts.len()))
            .field("timeout", &self.timeout)
            .field("polling_interval", &self.polling_interval)
            .finish()
    }
}

const fn default_polling_interval() -> Duration {
    Duration::from_secs(4)
}

#[derive(Debug, Clone, Deserialize)]
pub struct GasReporterConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for GasReporterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            currency: default_currency(),
        }
    }
}

fn default_currency() -> String {
    "USD".to_owned()
}

#[derive(Clone, Default, Deserialize)]
pub struct EtherscanConfig {
    #[serde(default)]
    pub api_key: Option<String>,
}

impl fmt::Debug for EtherscanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EtherscanConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// What a deployment run does.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploySection {
    #[serde(default = "default_contract")]
    pub contract: String,

    /// Artifact name of the ERC-1967 proxy placed in front of the implementation.
    #[serde(default = "default_proxy_contract")]
    pub proxy_contract: String,

    /// Defaults to [`Initializer::Skip`]: the proxy is left uninitialized unless a
    /// config opts in.
    #[serde(default = "default_initializer")]
    pub initializer: Initializer,

    /// Arguments forwarded to the initializer call.
    #[serde(default)]
    pub args: Vec<serde_json::Value>,

    #[serde(default = "default_confirmations")]
    pub confirmations: usize,

    /// Upper bound on the confirmation wait. Unset means wait as long as the node does.
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub confirmation_timeout: Option<Duration>,
}

impl Default for DeploySection {
    fn default() -> Self {
        Self {
            contract: default_contract(),
            proxy_contract: default_proxy_contract(),
            initializer: default_initializer(),
            args: Vec::new(),
            confirmations: default_confirmations(),
            confirmation_timeout: None,
        }
    }
}

impl DeploySection {
    pub fn proxy_options(&self) -> ProxyOptions {
        ProxyOptions {
            initializer: self.initializer.clone(),
        }
    }
}

fn default_contract() -> String {
    "Controller".to_owned()
}

fn default_initializer() -> Initializer {
    Initializer::Skip
}

fn default_proxy_contract() -> String {
    "ERC1967Proxy".to_owned()
}

const fn default_confirmations() -> usize {
    1
}

/// Logger settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,

    /// When false, log output is discarded.
    #[serde(default = "default_true")]
    pub console: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            console: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
    All,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace | LogLevel::All => "trace",
        }
    }
}

fn deserialize_accounts<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let keys = Vec::<String>::deserialize(deserializer)?;
    Ok(keys
        .into_iter()
        .map(|k| k.trim().to_owned())
        .filter(|k| !k.is_empty())
        .collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationRepr {
    Millis(u64),
    Text(String),
}

impl DurationRepr {
    fn into_duration(self) -> Result<Duration, String> {
        match self {
            DurationRepr::Millis(ms) => Ok(Duration::from_millis(ms)),
            DurationRepr::Text(s) => parse_duration(&s),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    DurationRepr::deserialize(deserializer)?
        .into_duration()
        .map_err(serde::de::Error::custom)
}

fn deserialize_optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<DurationRepr>::deserialize(deserializer)? {
        // An interpolated variable that was unset leaves an empty string behind.
        Some(DurationRepr::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(repr) => repr.into_duration().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let invalid = || format!("Invalid duration: {s}");
    if let Some(stripped) = s.strip_suffix("ms") {
        let ms: u64 = stripped.trim().parse().map_err(|_| invalid())?;
        Ok(Duration::from_millis(ms))
    } else if let Some(stripped) = s.strip_suffix('s') {
        let secs: u64 = stripped.trim().parse().map_err(|_| invalid())?;
        Ok(Duration::from_secs(secs))
    } else if let Some(stripped) = s.strip_suffix('m') {
        let mins: u64 = stripped.trim().parse().map_err(|_| invalid())?;
        Ok(Duration::from_secs(mins * 60))
    } else {
        let secs: u64 = s.parse().map_err(|_| invalid())?;
        Ok(Duration::from_secs(secs))
    }
}

/// Expands `${VAR}` and `${VAR:-fallback}` placeholders in every string of a document.
///
/// An unset or empty variable expands to its fallback, or to nothing. A `${` without a
/// closing brace is left as written.
fn expand_placeholders(value: Value) -> Value {
    match value {
        Value::String(_, s) => Value::from(expand_env(&s)),
        Value::Dict(tag, dict) => Value::Dict(tag, expand_dict(dict)),
        Value::Array(tag, items) => {
            Value::Array(tag, items.into_iter().map(expand_placeholders).collect())
        }
        other => other,
    }
}

fn expand_dict(dict: Dict) -> Dict {
    dict.into_iter()
        .map(|(key, value)| (key, expand_placeholders(value)))
        .collect()
}

fn expand_env(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let body = &rest[open + 2..];
        let Some(close) = body.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let (name, fallback) = match body[..close].split_once(":-") {
            Some((name, fallback)) => (name, fallback),
            None => (&body[..close], ""),
        };
        match std::env::var(name.trim()) {
            Ok(value) if !value.is_empty() => out.push_str(&value),
            _ => out.push_str(fallback),
        }
        rest = &body[close + 1..];
    }

    out.push_str(rest);
    out
}

/// TOML provider that expands environment placeholders before figment sees the values.
pub struct InterpolatingToml {
    content: String,
}

impl InterpolatingToml {
    pub fn file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        Ok(Self { content })
    }

    pub fn string(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

impl Provider for InterpolatingToml {
    fn metadata(&self) -> Metadata {
        Metadata::named("deploy.toml (env expanded)")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, FigmentError> {
        Ok(Toml::string(&self.content)
            .data()?
            .into_iter()
            .map(|(profile, dict)| (profile, expand_dict(dict)))
            .collect())
    }
}
