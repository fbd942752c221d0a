use crate::config::LogConfig;
use tracing_subscriber::EnvFilter;

/// Initializes the tracing/logging infrastructure for the application.
///
/// This sets up structured logging using the `tracing` crate with:
/// - **Configured verbosity**: `log.level` from the configuration file
/// - **Environment override**: `RUST_LOG`, when set, wins over the configured level
/// - **Console toggle**: with `log.console = false` all output is discarded
///
/// # Environment Variables
///
/// - `RUST_LOG=info` - Stage messages only (the default)
/// - `RUST_LOG=debug` - Also show payloads and transaction details
/// - `RUST_LOG=proxy_deployer=debug,ethers=warn` - Debug only for this crate
///
/// # Example
///
/// ```ignore
/// setup_tracing(&config.log);
/// tracing::info!("Application started");
/// ```
pub fn setup_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    if config.console {
        builder.init();
    } else {
        builder.with_writer(std::io::sink).init();
    }
}
