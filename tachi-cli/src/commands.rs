//! Subcommand implementations.

use std::io::Write;

use http::header::{HeaderName, HeaderValue};
use serde_json::json;
use tachi::config::TachiConfig;
use tachi::ledger::Ledger;
use tachi_evm::Eip155Ledger;
use tachi_http::{FetchRequest, TachiClient};

use crate::cli::Command;
use crate::error::CliError;

/// Runs `command` against `config`, writing JSON results to `out`.
///
/// # Errors
///
/// Returns [`CliError`] if the command fails or its output cannot be written.
pub async fn execute<W: Write>(
    command: Command,
    config: TachiConfig,
    out: &mut W,
) -> Result<(), CliError> {
    let ledger = Eip155Ledger::connect(&config)?;
    match command {
        Command::Fetch {
            url,
            method,
            headers,
            data,
        } => {
            let mut request = FetchRequest::new(method, url);
            for raw in &headers {
                let (name, value) = parse_header(raw)?;
                request = request.header(name, value);
            }
            if let Some(data) = data {
                request = request.body(data);
            }
            let client = TachiClient::new(config, ledger)?;
            let result = client.send(request).await?;
            if let Some(payment) = &result.payment {
                tracing::info!(
                    amount = %payment.amount,
                    tx = %payment.transaction_hash,
                    "Paid for content"
                );
            }
            serde_json::to_writer_pretty(&mut *out, &result)?;
        }
        Command::Balance => {
            let account = ledger.account();
            let client = TachiClient::new(config, ledger)?;
            let balance = client.usdc_balance().await?;
            serde_json::to_writer_pretty(
                &mut *out,
                &json!({ "account": account, "balance": balance }),
            )?;
        }
        Command::Check => {
            ledger.check_connection().await?;
            serde_json::to_writer_pretty(
                &mut *out,
                &json!({
                    "network": config.network,
                    "chainId": config.chain_id(),
                    "rpcUrl": config.rpc_url,
                    "status": "ok",
                }),
            )?;
        }
    }
    writeln!(out)?;
    Ok(())
}

/// Splits a `Name: value` header argument.
fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue), CliError> {
    let invalid = || CliError::InvalidHeader(raw.to_owned());
    let (name, value) = raw.split_once(':').ok_or_else(invalid)?;
    let name = HeaderName::try_from(name.trim()).map_err(|_| invalid())?;
    let value = HeaderValue::try_from(value.trim()).map_err(|_| invalid())?;
    Ok((name, value))
}
