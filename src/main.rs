//! Command line entry point.
//!
//! ```text
//! proxy-deployer [--config deploy.toml] [--network NAME] [deploy [--contract NAME] | accounts]
//! ```
//!
//! Variables from a `.env` file in the working directory are loaded before the
//! configuration is read.
//!
//! Exit status is 0 on success, 2 when the configuration is unusable and 1 for any
//! other failure.

use clap::{Parser, Subcommand};
use ethers::utils::to_checksum;
use proxy_deployer::config::DeployConfig;
use proxy_deployer::runtime::{self, setup_tracing};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "proxy-deployer", version, about = "Deploy an upgradeable contract behind a proxy")]
struct Cli {
    /// Configuration file; must exist when given. Without it, `deploy.toml` is read
    /// when present, otherwise defaults and DEPLOY_* variables are used.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Network to target; defaults to `default_network`, then `localhost`.
    #[arg(short, long, global = true)]
    network: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy the contract and its proxy (default).
    Deploy {
        /// Contract to deploy instead of `deploy.contract`.
        #[arg(long)]
        contract: Option<String>,
    },
    /// Print the accounts available on the network.
    Accounts,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Secrets referenced as `${VAR}` usually live in a local `.env`.
    let dotenv = dotenvy::dotenv().ok();

    let config = match DeployConfig::discover(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(2);
        }
    };

    setup_tracing(&config.log);
    info!(config = ?cli.config, ?dotenv, "Configuration loaded");

    let network = cli.network.as_deref();
    let outcome = match cli.command.unwrap_or(Command::Deploy { contract: None }) {
        Command::Deploy { contract } => runtime::deploy(&config, network, contract)
            .await
            .map(|_| ()),
        Command::Accounts => runtime::accounts(&config, network).await.map(|addresses| {
            for address in addresses {
                println!("{}", to_checksum(&address, None));
            }
        }),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Deployment run failed");
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
