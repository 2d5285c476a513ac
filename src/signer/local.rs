//! Local private key signer implementation

use super::{TransactionSigner, TxReceipt, TxRequest};
use crate::error::RemoteError;
use alloy::eips::BlockNumberOrTag;
use alloy::network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use eyre::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Receipt polling: 60 attempts * 2 seconds = 2 minutes
const RECEIPT_POLL_ATTEMPTS: u32 = 60;
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Local signer using a private key
pub struct LocalSigner {
    /// Provider with wallet filler - handles nonce, gas, chain_id, and signing
    provider: Arc<dyn Provider<Ethereum>>,
    address: Address,
}

impl LocalSigner {
    /// Create a new LocalSigner from a private key hex string
    ///
    /// # Arguments
    ///
    /// * `private_key` - Hex-encoded private key (with or without 0x prefix)
    /// * `rpc_url` - RPC endpoint URL
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let signer = LocalSigner::from_private_key("0x...", "https://eth.llamarpc.com").await?;
    /// ```
    pub async fn from_private_key(
        private_key: impl AsRef<str>,
        rpc_url: impl AsRef<str>,
    ) -> Result<Self> {
        let key = private_key.as_ref();
        let key = key.strip_prefix("0x").unwrap_or(key);

        let signer: PrivateKeySigner = key.parse().context("Failed to parse private key")?;

        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let url: Url = rpc_url.as_ref().parse().context("Invalid RPC URL")?;

        // Build provider with wallet filler - this handles nonce, gas, and signing
        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);

        Ok(Self {
            provider: Arc::new(provider),
            address,
        })
    }

    fn request(&self, tx: TxRequest) -> TransactionRequest {
        let mut request = TransactionRequest::default()
            .with_from(self.address)
            .with_to(tx.to)
            .with_value(tx.value)
            .with_input(tx.data);

        if let Some(gas_limit) = tx.gas_limit {
            request = request.with_gas_limit(gas_limit);
        }

        request
    }
}

impl TransactionSigner for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn call(&self, tx: TxRequest) -> Result<Bytes> {
        let request = self.request(tx);
        self.provider
            .call(request)
            .await
            .map_err(|err| RemoteError::from_transport(&err).into())
    }

    async fn sign_and_send(&self, tx: TxRequest) -> Result<TxHash> {
        let request = self.request(tx);

        // Provider fills nonce, gas and chain_id, then signs. Gas estimation
        // surfaces reverts here, so keep the revert data.
        let pending_tx = self
            .provider
            .send_transaction(request)
            .await
            .map_err(|err| eyre::Report::new(RemoteError::from_transport(&err)))
            .context("Failed to send transaction")?;

        Ok(*pending_tx.tx_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt> {
        for _ in 0..RECEIPT_POLL_ATTEMPTS {
            let receipt: Option<TransactionReceipt> = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .context("Failed to get transaction receipt")?;

            if let Some(receipt) = receipt {
                return Ok(TxReceipt {
                    transaction_hash: receipt.transaction_hash,
                    success: receipt.status(),
                    block_number: receipt.block_number,
                });
            }

            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }

        eyre::bail!("Transaction receipt not found after timeout: {}", tx_hash)
    }

    async fn block_timestamp(&self) -> Result<u64> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .context("Failed to get latest block")?
            .ok_or_else(|| eyre::eyre!("Latest block not available"))?;

        Ok(block.header.timestamp)
    }

    async fn get_balance(&self) -> Result<U256> {
        let balance: U256 = self
            .provider
            .get_balance(self.address)
            .await
            .context("Failed to get balance")?;

        Ok(balance)
    }
}
