//! Remote-call transport abstraction for the vault SDK
//!
//! Every component in this crate reaches the chain through
//! [`TransactionSigner`]: reads and dry-runs go through `call`, state
//! changes through `sign_and_send` followed by `wait_for_receipt`.
//! Failed calls are reported as an `eyre::Report` wrapping a
//! [`RemoteError`](crate::error::RemoteError) so revert data survives.

mod local;

pub use local::LocalSigner;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use eyre::Result;
use serde::{Deserialize, Serialize};

/// Transaction request parameters
#[derive(Debug, Clone)]
pub struct TxRequest {
    /// Target contract address
    pub to: Address,
    /// Transaction value in wei
    pub value: U256,
    /// Encoded calldata
    pub data: Bytes,
    /// Optional gas limit override
    pub gas_limit: Option<u64>,
}

impl TxRequest {
    /// Create a new transaction request
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data: data.into(),
            gas_limit: None,
        }
    }

    /// Set transaction value
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Set gas limit
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

/// Outcome of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub transaction_hash: TxHash,
    /// False when the transaction was mined but reverted
    pub success: bool,
    pub block_number: Option<u64>,
}

/// Trait for reading from and sending transactions to an EVM chain
///
/// The only implementation shipped is [`LocalSigner`]; tests drive the
/// crate through an in-memory chain implementing the same trait.
pub trait TransactionSigner: Send + Sync {
    /// Returns the signer's EVM address
    fn address(&self) -> Address;

    /// Executes a call without committing it (`eth_call` from the signer's address)
    fn call(&self, tx: TxRequest) -> impl std::future::Future<Output = Result<Bytes>> + Send;

    /// Signs and sends a transaction, returning the transaction hash
    fn sign_and_send(
        &self,
        tx: TxRequest,
    ) -> impl std::future::Future<Output = Result<TxHash>> + Send;

    /// Waits for a transaction to be confirmed and returns the receipt
    fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
    ) -> impl std::future::Future<Output = Result<TxReceipt>> + Send;

    /// Timestamp of the latest block, the clock timelocks are measured against
    fn block_timestamp(&self) -> impl std::future::Future<Output = Result<u64>> + Send;

    /// Gets the native token balance
    fn get_balance(&self) -> impl std::future::Future<Output = Result<U256>> + Send;
}
