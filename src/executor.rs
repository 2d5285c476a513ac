//! Single remote call with pre-flight simulation and error decoding
//!
//! No retries happen here. State-changing calls are dry-run first; a failed
//! dry-run still gets one real attempt, and whichever of the two errors
//! decodes more specifically is reported.

use crate::error::{Context, Report, Result, VaultError};
use crate::signer::{TransactionSigner, TxReceipt, TxRequest};
use alloy::primitives::{Address, Bytes};
use alloy::sol_types::SolCall;
use std::future::Future;
use std::sync::Arc;

/// Short operation name from a call's signature, e.g. `setIsAdapter`
pub fn operation_name<C: SolCall>() -> &'static str {
    let signature = C::SIGNATURE;
    signature.split('(').next().unwrap_or(signature)
}

pub struct CallExecutor<S> {
    signer: Arc<S>,
}

impl<S> Clone for CallExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            signer: Arc::clone(&self.signer),
        }
    }
}

impl<S: TransactionSigner> CallExecutor<S> {
    pub fn new(signer: Arc<S>) -> Self {
        Self { signer }
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    /// Address transactions are sent from
    pub fn sender(&self) -> Address {
        self.signer.address()
    }

    /// Read call against a contract
    ///
    /// Calldata is encoded up front, so the returned future only borrows
    /// `self` and can be built from a temporary call.
    pub fn read<C: SolCall>(
        &self,
        to: Address,
        call: &C,
    ) -> impl Future<Output = Result<C::Return>> + '_ {
        let data: Bytes = call.abi_encode().into();
        async move {
            let operation = operation_name::<C>();
            let output = self.call_raw(to, data, operation).await?;

            C::abi_decode_returns(&output)
                .with_context(|| format!("Failed to decode {} result from {}", operation, to))
        }
    }

    /// Dry-run a state-changing call and return what it would return
    pub fn simulate<C: SolCall>(
        &self,
        to: Address,
        call: &C,
    ) -> impl Future<Output = Result<C::Return>> + '_ {
        self.read(to, call)
    }

    /// Dry-run raw calldata
    pub async fn call_raw(&self, to: Address, data: Bytes, operation: &str) -> Result<Bytes> {
        self.signer
            .call(TxRequest::new(to, data))
            .await
            .map_err(|err| VaultError::call_failed(operation, to, &err).into())
    }

    /// State-changing call, confirmed
    pub async fn send<C: SolCall>(&self, to: Address, call: &C) -> Result<TxReceipt> {
        self.send_raw(to, call.abi_encode().into(), operation_name::<C>())
            .await
    }

    /// State-changing call from raw calldata, confirmed
    pub async fn send_raw(&self, to: Address, data: Bytes, operation: &str) -> Result<TxReceipt> {
        let tx = TxRequest::new(to, data);

        let dry_run = match self.signer.call(tx.clone()).await {
            Ok(_) => None,
            Err(err) => {
                let failure = VaultError::call_failed(operation, to, &err);
                tracing::warn!("Dry run of {} failed, attempting anyway: {}", operation, failure);
                Some(failure)
            }
        };

        match self.commit(tx, operation).await {
            Ok(receipt) => {
                if dry_run.is_some() {
                    tracing::info!(
                        "{} succeeded despite failed dry run: {}",
                        operation,
                        receipt.transaction_hash
                    );
                }
                Ok(receipt)
            }
            Err(committed) => {
                // a broadcast transaction outranks any dry-run reason
                let reported = match dry_run {
                    Some(dry)
                        if committed.unconfirmed_tx().is_none()
                            && dry.specificity() > committed.specificity() =>
                    {
                        dry
                    }
                    _ => committed,
                };
                Err(Report::new(reported))
            }
        }
    }

    async fn commit(
        &self,
        tx: TxRequest,
        operation: &str,
    ) -> std::result::Result<TxReceipt, VaultError> {
        let to = tx.to;

        let tx_hash = self
            .signer
            .sign_and_send(tx)
            .await
            .map_err(|err| VaultError::call_failed(operation, to, &err))?;
        tracing::debug!("Sent {} to {}: {}", operation, to, tx_hash);

        let receipt = self
            .signer
            .wait_for_receipt(tx_hash)
            .await
            .map_err(|err| VaultError::Unconfirmed {
                operation: operation.to_string(),
                target: to,
                tx_hash,
                message: format!("{err:#}"),
            })?;

        if !receipt.success {
            let err = eyre::eyre!("transaction {} reverted on-chain", tx_hash);
            return Err(VaultError::call_failed(operation, to, &err));
        }

        tracing::info!("{} confirmed on {}: {}", operation, to, tx_hash);
        Ok(receipt)
    }
}
