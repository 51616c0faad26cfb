//! Advancing the deployer's L2 nonce with self-transfers.
//!
//! The bridge deploy script deploys the L1 and L2 contracts from the same key. Burning
//! L2 nonces first keeps the resulting L2 addresses from colliding with addresses
//! already taken on L1.

use anyhow::{Context, Result};

use crate::chain::{ChainClient, FeeEstimate, Transfer};
use crate::log::StepLog;
use crate::settings::NonceSettings;

/// Fees for the `attempt`-th try (1-based): both fees doubled per retry, with the max fee
/// also covering the priority fee.
pub fn bumped_fees(base: FeeEstimate, attempt: u32) -> FeeEstimate {
    let factor = 1u128 << attempt.saturating_sub(1).min(64);
    FeeEstimate {
        max_fee_per_gas: base
            .max_fee_per_gas
            .saturating_add(base.max_priority_fee_per_gas)
            .saturating_mul(factor),
        max_priority_fee_per_gas: base.max_priority_fee_per_gas.saturating_mul(factor),
    }
}

/// Send `settings.count` zero-value self-transfers, each mined before the next is sent.
pub async fn burn_nonces<C: ChainClient>(
    client: &C,
    settings: &NonceSettings,
    log: &StepLog<'_>,
) -> Result<()> {
    let deployer = client.deployer();
    let base = client.fee_estimate().await?;
    log.milestone(format!(
        "Burning {} nonces from L2 deployer {deployer} to prevent L1 and L2 addresses collision...",
        settings.count
    ));

    for index in 0..settings.count {
        burn_one(client, index, base, settings, log).await?;
    }
    Ok(())
}

async fn burn_one<C: ChainClient>(
    client: &C,
    index: u64,
    base: FeeEstimate,
    settings: &NonceSettings,
    log: &StepLog<'_>,
) -> Result<()> {
    let max_tries = settings.max_tries.max(1);
    let mut attempt = 1;
    loop {
        let fees = bumped_fees(base, attempt);
        log.milestone(format!(
            "Burning {index} tx, try num: {attempt} maxFeePerGas: {} maxPriorityFeePerGas: {}",
            fees.max_fee_per_gas, fees.max_priority_fee_per_gas
        ));

        let result = async {
            // Re-read every try: a timed-out transaction may still have been mined.
            let nonce = client.nonce().await?;
            let transfer = Transfer {
                to: client.deployer(),
                nonce,
                fees,
            };
            tokio::time::timeout(settings.tx_timeout(), client.send_transfer(transfer))
                .await
                .context("Operation timeout")?
        }
        .await;

        match result {
            Ok(hash) => {
                log.detail(format!("Burn tx {index} mined: {hash}"));
                return Ok(());
            }
            Err(e) if attempt < max_tries => {
                tracing::debug!(index, attempt, error = %e, "Nonce burn attempt failed");
                log.milestone(format!("Burn tx {index} try {attempt} failed: {e:#}"));
                attempt += 1;
            }
            Err(e) => {
                return Err(e.context(format!(
                    "Failed to burn nonce {index} after {max_tries} tries"
                )));
            }
        }
    }
}
