//! Signed transaction access to a chain on behalf of the deployer key.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use alloy_core::primitives::{Address, Bytes, TxHash, U256};
use alloy_network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{TransactionReceipt, TransactionRequest};
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use url::Url;

/// Fallback max fee when the node reports none, in wei.
pub const FALLBACK_MAX_FEE_PER_GAS: u128 = 1_500_000;

/// Fallback priority fee when the node reports none, in wei.
pub const FALLBACK_MAX_PRIORITY_FEE_PER_GAS: u128 = 1_000_000;

/// EIP-1559 fee parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl Default for FeeEstimate {
    fn default() -> Self {
        Self {
            max_fee_per_gas: FALLBACK_MAX_FEE_PER_GAS,
            max_priority_fee_per_gas: FALLBACK_MAX_PRIORITY_FEE_PER_GAS,
        }
    }
}

/// A zero-value transfer with explicit nonce and fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub to: Address,
    pub nonce: u64,
    pub fees: FeeEstimate,
}

/// Operations the pipeline performs with the deployer key.
pub trait ChainClient {
    /// Address of the signing key.
    fn deployer(&self) -> Address;

    /// Transaction count of the deployer at the latest block.
    fn nonce(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Current fee suggestion, falling back to [`FeeEstimate::default`].
    fn fee_estimate(&self) -> impl Future<Output = Result<FeeEstimate>> + Send;

    /// Send `transfer` and wait until it is mined.
    fn send_transfer(&self, transfer: Transfer) -> impl Future<Output = Result<TxHash>> + Send;

    /// Send a contract creation with `init_code` and return the created address.
    fn deploy(&self, init_code: Bytes) -> impl Future<Output = Result<Address>> + Send;
}

/// [`ChainClient`] over an HTTP JSON-RPC endpoint.
#[derive(Clone)]
pub struct AlloyChainClient {
    provider: DynProvider,
    deployer: Address,
    receipt_timeout: Duration,
}

impl AlloyChainClient {
    /// Connect to `rpc_url`, signing with the hex `private_key`.
    pub fn connect(rpc_url: &Url, private_key: &str, receipt_timeout: Duration) -> Result<Self> {
        let signer = PrivateKeySigner::from_str(private_key.trim())
            .context("Failed to parse deployer private key")?;
        let deployer = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(rpc_url.clone())
            .erased();

        Ok(Self {
            provider,
            deployer,
            receipt_timeout,
        })
    }

    async fn send_and_wait(&self, request: TransactionRequest) -> Result<TransactionReceipt> {
        let receipt = self
            .provider
            .send_transaction(request)
            .await
            .context("Failed to send transaction")?
            .with_timeout(Some(self.receipt_timeout))
            .get_receipt()
            .await
            .context("Failed to get transaction receipt")?;

        anyhow::ensure!(
            ReceiptResponse::status(&receipt),
            "Transaction {} reverted",
            receipt.transaction_hash
        );
        Ok(receipt)
    }
}

impl ChainClient for AlloyChainClient {
    fn deployer(&self) -> Address {
        self.deployer
    }

    async fn nonce(&self) -> Result<u64> {
        self.provider
            .get_transaction_count(self.deployer)
            .await
            .context("Failed to fetch deployer nonce")
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate> {
        match self.provider.estimate_eip1559_fees().await {
            Ok(estimate) => Ok(FeeEstimate {
                max_fee_per_gas: estimate.max_fee_per_gas,
                max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Fee estimation failed, using fallback fees");
                Ok(FeeEstimate::default())
            }
        }
    }

    async fn send_transfer(&self, transfer: Transfer) -> Result<TxHash> {
        let request = TransactionRequest::default()
            .with_from(self.deployer)
            .with_to(transfer.to)
            .with_value(U256::ZERO)
            .with_nonce(transfer.nonce)
            .with_max_fee_per_gas(transfer.fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(transfer.fees.max_priority_fee_per_gas);

        let receipt = self.send_and_wait(request).await?;
        Ok(receipt.transaction_hash)
    }

    async fn deploy(&self, init_code: Bytes) -> Result<Address> {
        let request = TransactionRequest::default()
            .with_from(self.deployer)
            .with_deploy_code(init_code);

        let receipt = self.send_and_wait(request).await?;
        receipt
            .contract_address
            .context("Deployment receipt carries no contract address")
    }
}
