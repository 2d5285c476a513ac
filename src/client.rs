//! VaultClient - main entry point for the SDK

use crate::caps::{CapResolution, CapResolver};
use crate::config::ChainConfig;
use crate::constants::{percent_from_wad, MAX_MANAGEMENT_FEE, MAX_PERFORMANCE_FEE};
use crate::contracts::{IERC20, IVaultV2, IVaultV2Factory, MarketParams};
use crate::error::{Context, Result, VaultError};
use crate::executor::CallExecutor;
use crate::registry::{AdapterKind, AdapterRegistry, DeployedAdapter};
use crate::signer::{TransactionSigner, TxReceipt};
use crate::snapshot::{SnapshotReader, VaultSnapshot};
use crate::timelock::{ApplyOutcome, ApplyPath, ExecutionMode, Timelock};
use crate::types::{DepositParams, RedeemParams, VaultPosition, WithdrawParams};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::sol_types::SolCall;
use std::sync::Arc;

/// Main client for curating and using vaults
///
/// Every component shares one signer and one chain configuration.
pub struct VaultClient<S: TransactionSigner> {
    signer: Arc<S>,
    config: ChainConfig,
    executor: CallExecutor<S>,
    timelock: Timelock<S>,
    registry: AdapterRegistry<S>,
    caps: CapResolver<S>,
    snapshots: SnapshotReader<S>,
}

impl<S: TransactionSigner> VaultClient<S> {
    /// Create a new VaultClient
    pub fn new(signer: S, config: ChainConfig) -> Self {
        Self::from_shared(Arc::new(signer), config)
    }

    /// Create a client over a signer shared with other code
    pub fn from_shared(signer: Arc<S>, config: ChainConfig) -> Self {
        let executor = CallExecutor::new(Arc::clone(&signer));
        let timelock = Timelock::new(executor.clone(), config.poll_interval());
        let registry = AdapterRegistry::new(executor.clone(), config.adapters.clone());
        let caps = CapResolver::new(executor.clone(), timelock.clone());
        let snapshots = SnapshotReader::new(executor.clone(), registry.clone());

        Self {
            signer,
            config,
            executor,
            timelock,
            registry,
            caps,
            snapshots,
        }
    }

    /// Get the signer's address
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Get the chain configuration
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn executor(&self) -> &CallExecutor<S> {
        &self.executor
    }

    pub fn timelock(&self) -> &Timelock<S> {
        &self.timelock
    }

    pub fn registry(&self) -> &AdapterRegistry<S> {
        &self.registry
    }

    pub fn caps(&self) -> &CapResolver<S> {
        &self.caps
    }

    // ========== Token Operations ==========

    /// Underlying asset of a vault
    pub async fn asset(&self, vault: Address) -> Result<Address> {
        self.executor.read(vault, &IVaultV2::assetCall {}).await
    }

    /// Signer's balance of a vault's underlying asset
    pub async fn asset_balance(&self, vault: Address) -> Result<U256> {
        let asset = self.asset(vault).await?;
        self.executor
            .read(asset, &IERC20::balanceOfCall { account: self.address() })
            .await
    }

    /// Approve token spending (raw amount)
    pub async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxReceipt> {
        self.executor
            .send(token, &IERC20::approveCall { spender, amount })
            .await
            .context("Failed to approve token")
    }

    /// Approve `spender` for unlimited spending if the allowance is below `amount`
    ///
    /// Returns the approval receipt, or `None` when the allowance already suffices.
    pub async fn ensure_allowance(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<Option<TxReceipt>> {
        let allowance = self
            .executor
            .read(
                token,
                &IERC20::allowanceCall {
                    owner: self.address(),
                    spender,
                },
            )
            .await
            .context("Failed to check allowance")?;

        if allowance >= amount {
            return Ok(None);
        }

        // Approve max uint256 for convenience
        self.approve(token, spender, U256::MAX).await.map(Some)
    }

    // ========== Vault Operations ==========

    /// Deposit assets into a vault, approving it first if needed
    pub async fn deposit(&self, vault: Address, params: DepositParams) -> Result<TxReceipt> {
        let asset = self.asset(vault).await?;
        self.ensure_allowance(asset, vault, params.assets).await?;

        let call = IVaultV2::depositCall {
            assets: params.assets,
            onBehalf: params.on_behalf.unwrap_or_else(|| self.address()),
        };
        self.executor
            .send(vault, &call)
            .await
            .context("Failed to deposit to vault")
    }

    /// Withdraw an amount of assets
    pub async fn withdraw(&self, vault: Address, params: WithdrawParams) -> Result<TxReceipt> {
        let call = IVaultV2::withdrawCall {
            assets: params.assets,
            receiver: params.receiver.unwrap_or_else(|| self.address()),
            onBehalf: self.address(),
        };
        self.executor
            .send(vault, &call)
            .await
            .context("Failed to withdraw from vault")
    }

    /// Redeem shares for assets
    pub async fn redeem(&self, vault: Address, params: RedeemParams) -> Result<TxReceipt> {
        let call = IVaultV2::redeemCall {
            shares: params.shares,
            receiver: params.receiver.unwrap_or_else(|| self.address()),
            onBehalf: self.address(),
        };
        self.executor
            .send(vault, &call)
            .await
            .context("Failed to redeem from vault")
    }

    /// Share balance and its asset value (defaults to the signer)
    pub async fn position(
        &self,
        vault: Address,
        account: Option<Address>,
    ) -> Result<VaultPosition> {
        let account = account.unwrap_or_else(|| self.address());
        let shares = self
            .executor
            .read(vault, &IVaultV2::balanceOfCall { account })
            .await?;
        let assets = self
            .executor
            .read(vault, &IVaultV2::convertToAssetsCall { shares })
            .await?;

        Ok(VaultPosition::new(shares, assets))
    }

    /// Whether `account` is a vault deployed by the configured vault factory
    pub async fn is_vault(&self, account: Address) -> Result<bool> {
        self.executor
            .read(self.config.vault_factory, &IVaultV2Factory::isVaultV2Call { account })
            .await
    }

    /// Full state of a vault, with the signer's roles
    pub async fn snapshot(&self, vault: Address) -> Result<VaultSnapshot> {
        self.snapshots.snapshot(vault, self.address()).await
    }

    // ========== Allocator Operations ==========

    pub async fn allocate(
        &self,
        vault: Address,
        adapter: Address,
        data: Bytes,
        assets: U256,
    ) -> Result<TxReceipt> {
        self.executor
            .send(vault, &IVaultV2::allocateCall { adapter, data, assets })
            .await
            .with_context(|| format!("Failed to allocate {} to {}", assets, adapter))
    }

    pub async fn deallocate(
        &self,
        vault: Address,
        adapter: Address,
        data: Bytes,
        assets: U256,
    ) -> Result<TxReceipt> {
        self.executor
            .send(vault, &IVaultV2::deallocateCall { adapter, data, assets })
            .await
            .with_context(|| format!("Failed to deallocate {} from {}", assets, adapter))
    }

    /// Adapter receiving deposits and serving withdrawals
    pub async fn set_liquidity_adapter(
        &self,
        vault: Address,
        adapter: Address,
        data: Bytes,
    ) -> Result<TxReceipt> {
        let call = IVaultV2::setLiquidityAdapterAndDataCall {
            newLiquidityAdapter: adapter,
            newLiquidityData: data,
        };
        self.executor
            .send(vault, &call)
            .await
            .context("Failed to set liquidity adapter")
    }

    /// Cap on the rate at which total assets may grow
    pub async fn set_max_rate(&self, vault: Address, max_rate: U256) -> Result<TxReceipt> {
        self.executor
            .send(vault, &IVaultV2::setMaxRateCall { newMaxRate: max_rate })
            .await
            .context("Failed to set max rate")
    }

    // ========== Governance ==========

    /// Owner only, immediate
    pub async fn set_owner(&self, vault: Address, owner: Address) -> Result<ApplyOutcome> {
        let current = self.executor.read(vault, &IVaultV2::ownerCall {}).await?;
        if current == owner {
            return Ok(ApplyOutcome::Unchanged);
        }
        self.direct(vault, &IVaultV2::setOwnerCall { newOwner: owner })
            .await
    }

    /// Owner only, immediate
    pub async fn set_curator(&self, vault: Address, curator: Address) -> Result<ApplyOutcome> {
        let current = self.executor.read(vault, &IVaultV2::curatorCall {}).await?;
        if current == curator {
            return Ok(ApplyOutcome::Unchanged);
        }
        self.direct(vault, &IVaultV2::setCuratorCall { newCurator: curator })
            .await
    }

    /// Owner only, immediate
    pub async fn set_is_sentinel(
        &self,
        vault: Address,
        account: Address,
        is_sentinel: bool,
    ) -> Result<ApplyOutcome> {
        let current = self
            .executor
            .read(vault, &IVaultV2::isSentinelCall { account })
            .await?;
        if current == is_sentinel {
            return Ok(ApplyOutcome::Unchanged);
        }
        let call = IVaultV2::setIsSentinelCall {
            account,
            newIsSentinel: is_sentinel,
        };
        self.direct(vault, &call).await
    }

    pub async fn set_is_allocator(
        &self,
        vault: Address,
        account: Address,
        is_allocator: bool,
        mode: ExecutionMode,
    ) -> Result<ApplyOutcome> {
        let current = self
            .executor
            .read(vault, &IVaultV2::isAllocatorCall { account })
            .await?;
        if current == is_allocator {
            tracing::debug!("{} already has allocator={} on {}", account, is_allocator, vault);
            return Ok(ApplyOutcome::Unchanged);
        }
        let call = IVaultV2::setIsAllocatorCall {
            account,
            newIsAllocator: is_allocator,
        };
        self.timelock.apply(vault, &call, mode).await
    }

    pub async fn set_is_adapter(
        &self,
        vault: Address,
        adapter: Address,
        is_adapter: bool,
        mode: ExecutionMode,
    ) -> Result<ApplyOutcome> {
        let current = self
            .executor
            .read(vault, &IVaultV2::isAdapterCall { account: adapter })
            .await?;
        if current == is_adapter {
            return Ok(ApplyOutcome::Unchanged);
        }
        let call = IVaultV2::setIsAdapterCall {
            account: adapter,
            newIsAdapter: is_adapter,
        };
        self.timelock.apply(vault, &call, mode).await
    }

    /// WAD-scaled, at most [`MAX_PERFORMANCE_FEE`]
    pub async fn set_performance_fee(
        &self,
        vault: Address,
        fee: U256,
        mode: ExecutionMode,
    ) -> Result<ApplyOutcome> {
        if fee > MAX_PERFORMANCE_FEE {
            return Err(VaultError::precondition(format!(
                "performance fee {:.2}% exceeds the {:.2}% ceiling",
                percent_from_wad(fee),
                percent_from_wad(MAX_PERFORMANCE_FEE)
            ))
            .into());
        }
        let current = self.executor.read(vault, &IVaultV2::performanceFeeCall {}).await?;
        if current == fee {
            return Ok(ApplyOutcome::Unchanged);
        }
        self.timelock
            .apply(vault, &IVaultV2::setPerformanceFeeCall { newPerformanceFee: fee }, mode)
            .await
    }

    /// WAD-scaled per second, at most [`MAX_MANAGEMENT_FEE`]
    pub async fn set_management_fee(
        &self,
        vault: Address,
        fee: U256,
        mode: ExecutionMode,
    ) -> Result<ApplyOutcome> {
        if fee > MAX_MANAGEMENT_FEE {
            return Err(VaultError::precondition(format!(
                "management fee {} per second exceeds the ceiling of {}",
                fee, MAX_MANAGEMENT_FEE
            ))
            .into());
        }
        let current = self.executor.read(vault, &IVaultV2::managementFeeCall {}).await?;
        if current == fee {
            return Ok(ApplyOutcome::Unchanged);
        }
        self.timelock
            .apply(vault, &IVaultV2::setManagementFeeCall { newManagementFee: fee }, mode)
            .await
    }

    async fn direct<C: SolCall>(&self, vault: Address, call: &C) -> Result<ApplyOutcome> {
        let receipt = self.executor.send(vault, call).await?;
        Ok(ApplyOutcome::Applied {
            receipt,
            path: ApplyPath::Direct,
        })
    }

    // ========== Adapters and Caps ==========

    /// Find or deploy the adapter for `underlying`, then enable it on the vault
    pub async fn enable_adapter(
        &self,
        vault: Address,
        kind: AdapterKind,
        underlying: Address,
        extra: Option<Address>,
        mode: ExecutionMode,
    ) -> Result<(DeployedAdapter, ApplyOutcome)> {
        let adapter = self
            .registry
            .find_or_deploy(kind, vault, underlying, extra)
            .await?;
        let outcome = self
            .set_is_adapter(vault, adapter.address, true, mode)
            .await?;
        Ok((adapter, outcome))
    }

    /// Converge an adapter's caps; multi-market adapters default to their first market
    pub async fn set_adapter_caps(
        &self,
        vault: Address,
        adapter: Address,
        kind: AdapterKind,
        market: Option<&MarketParams>,
        relative: Option<U256>,
        absolute: Option<U256>,
        mode: ExecutionMode,
    ) -> Result<CapResolution> {
        let id = self
            .registry
            .allocation_id_for(adapter, kind, market)
            .await?;
        self.caps
            .resolve_cap(vault, &id, relative, absolute, mode)
            .await
    }

    // ========== Utility Methods ==========

    /// Wait for transaction confirmation
    pub async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt> {
        self.signer.wait_for_receipt(tx_hash).await
    }

    /// Get native token (ETH) balance
    pub async fn get_eth_balance(&self) -> Result<U256> {
        self.signer.get_balance().await
    }
}
