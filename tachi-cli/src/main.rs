//! Pay-per-crawl command-line client.
//!
//! # Usage
//!
//! ```bash
//! # Fetch a page, paying if the publisher answers 402
//! tachi fetch https://publisher.example/article
//!
//! # Show the USDC balance of the configured account
//! tachi balance
//!
//! # Check that the RPC endpoint serves the configured network
//! tachi --network base-sepolia --rpc-url https://sepolia.base.org check
//! ```
//!
//! # Environment Variables
//!
//! - `TACHI_CONFIG`: path to the TOML configuration file (default: `tachi.toml`)
//! - `TACHI_NETWORK`, `TACHI_RPC_URL`, `TACHI_PRIVATE_KEY`, ...: override file values
//! - `RUST_LOG`: log level filter (default: `info`)
//!
//! A `.env` file in the working directory is loaded before anything else.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tachi_cli::{Cli, CliError};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!(code = e.exit_code(), "{e}");
        std::process::exit(e.exit_code());
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    tracing::info!(
        network = %config.network,
        rpc_url = %config.rpc_url,
        signer = config.can_sign(),
        "Loaded configuration"
    );
    let mut stdout = std::io::stdout().lock();
    tachi_cli::commands::execute(cli.command, config, &mut stdout).await
}
