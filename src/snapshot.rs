//! Read-only aggregate of a vault's governed state
//!
//! Vault-level reads must all succeed. Everything below the vault (one
//! adapter, one allocation id, one timelock entry) degrades to an entry
//! carrying an error instead of failing the whole snapshot.

use crate::constants::{percent_from_wad, u256_to_u64};
use crate::contracts::{IERC20, IVaultV2};
use crate::error::Result;
use crate::executor::CallExecutor;
use crate::registry::{AdapterKind, AdapterRegistry};
use crate::signer::TransactionSigner;
use crate::timelock::GovernedFunction;
use crate::types::AllocationId;
use alloy::primitives::{Address, Bytes, FixedBytes, B256, U256};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Vault roles, plus memberships of the queried account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRoles {
    pub owner: Address,
    pub curator: Address,
    pub account: Address,
    pub is_sentinel: bool,
    pub is_allocator: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    pub performance_fee: U256,
    pub performance_fee_recipient: Address,
    /// Per second, WAD-scaled
    pub management_fee: U256,
    pub management_fee_recipient: Address,
    pub max_rate: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSnapshot {
    pub id: B256,
    pub relative_cap: Option<U256>,
    pub absolute_cap: Option<U256>,
    pub allocation: Option<U256>,
    /// Why the values above are missing
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterSnapshot {
    pub address: Address,
    /// `None` when the adapter's factory is not in the configured family
    pub kind: Option<AdapterKind>,
    pub underlying: Option<Address>,
    pub allocations: Vec<AllocationSnapshot>,
    pub error: Option<String>,
}

impl AdapterSnapshot {
    pub fn is_classified(&self) -> bool {
        self.kind.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelockEntry {
    pub function: GovernedFunction,
    pub selector: FixedBytes<4>,
    /// `None` when the delay could not be read
    pub delay: Option<u64>,
}

/// Point-in-time view of a vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    pub vault: Address,
    pub name: String,
    pub symbol: String,
    pub asset: Address,
    pub total_assets: U256,
    pub total_supply: U256,
    pub virtual_shares: U256,
    pub roles: AccountRoles,
    pub fees: FeeConfig,
    pub adapter_registry: Address,
    pub adapters: Vec<AdapterSnapshot>,
    pub liquidity_adapter: Address,
    pub liquidity_data: Bytes,
    /// Asset balance held by the vault itself
    pub idle_assets: U256,
    pub timelocks: Vec<TimelockEntry>,
}

impl VaultSnapshot {
    pub fn adapter(&self, address: Address) -> Option<&AdapterSnapshot> {
        self.adapters.iter().find(|adapter| adapter.address == address)
    }

    pub fn delay(&self, function: GovernedFunction) -> Option<u64> {
        self.timelocks
            .iter()
            .find(|entry| entry.function == function)
            .and_then(|entry| entry.delay)
    }
}

fn or_unavailable(value: Option<impl fmt::Display>) -> String {
    value
        .map(|value| value.to_string())
        .unwrap_or_else(|| "unavailable".to_string())
}

impl fmt::Display for VaultSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}) at {}", self.name, self.symbol, self.vault)?;
        writeln!(f, "  asset:          {}", self.asset)?;
        writeln!(f, "  total assets:   {}", self.total_assets)?;
        writeln!(f, "  total supply:   {}", self.total_supply)?;
        writeln!(f, "  idle assets:    {}", self.idle_assets)?;
        writeln!(f, "  owner:          {}", self.roles.owner)?;
        writeln!(f, "  curator:        {}", self.roles.curator)?;
        writeln!(
            f,
            "  {}: sentinel={} allocator={}",
            self.roles.account, self.roles.is_sentinel, self.roles.is_allocator
        )?;
        writeln!(
            f,
            "  performance fee: {:.2}% -> {}",
            percent_from_wad(self.fees.performance_fee),
            self.fees.performance_fee_recipient
        )?;
        writeln!(
            f,
            "  management fee:  {}/s -> {}",
            self.fees.management_fee, self.fees.management_fee_recipient
        )?;
        writeln!(f, "  liquidity adapter: {}", self.liquidity_adapter)?;

        writeln!(f, "  adapters ({}):", self.adapters.len())?;
        for adapter in &self.adapters {
            let kind = adapter
                .kind
                .map(|kind| kind.to_string())
                .unwrap_or_else(|| "unclassified".to_string());
            writeln!(
                f,
                "    {} [{}] underlying {}",
                adapter.address,
                kind,
                or_unavailable(adapter.underlying)
            )?;
            if let Some(error) = &adapter.error {
                writeln!(f, "      error: {}", error)?;
            }
            for allocation in &adapter.allocations {
                writeln!(
                    f,
                    "      {} relative {} absolute {} allocated {}",
                    allocation.id,
                    allocation
                        .relative_cap
                        .map(|cap| format!("{:.2}%", percent_from_wad(cap)))
                        .unwrap_or_else(|| "unavailable".to_string()),
                    or_unavailable(allocation.absolute_cap),
                    or_unavailable(allocation.allocation)
                )?;
            }
        }

        writeln!(f, "  timelocks:")?;
        for entry in &self.timelocks {
            let delay = entry
                .delay
                .map(|delay| format!("{}s", delay))
                .unwrap_or_else(|| "unavailable".to_string());
            writeln!(f, "    {:<28} {}", entry.function.name(), delay)?;
        }
        Ok(())
    }
}

pub struct SnapshotReader<S> {
    executor: CallExecutor<S>,
    registry: AdapterRegistry<S>,
}

impl<S> Clone for SnapshotReader<S> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<S: TransactionSigner> SnapshotReader<S> {
    pub fn new(executor: CallExecutor<S>, registry: AdapterRegistry<S>) -> Self {
        Self { executor, registry }
    }

    /// Read everything about `vault`, with role memberships of `account`
    pub async fn snapshot(&self, vault: Address, account: Address) -> Result<VaultSnapshot> {
        let executor = &self.executor;
        let (
            name,
            symbol,
            asset,
            total_assets,
            total_supply,
            virtual_shares,
            owner,
            curator,
            is_sentinel,
            is_allocator,
            performance_fee,
            performance_fee_recipient,
            management_fee,
            management_fee_recipient,
            max_rate,
            adapter_registry,
            liquidity_adapter,
            liquidity_data,
            adapter_addresses,
        ) = tokio::try_join!(
            executor.read(vault, &IVaultV2::nameCall {}),
            executor.read(vault, &IVaultV2::symbolCall {}),
            executor.read(vault, &IVaultV2::assetCall {}),
            executor.read(vault, &IVaultV2::totalAssetsCall {}),
            executor.read(vault, &IVaultV2::totalSupplyCall {}),
            executor.read(vault, &IVaultV2::virtualSharesCall {}),
            executor.read(vault, &IVaultV2::ownerCall {}),
            executor.read(vault, &IVaultV2::curatorCall {}),
            executor.read(vault, &IVaultV2::isSentinelCall { account }),
            executor.read(vault, &IVaultV2::isAllocatorCall { account }),
            executor.read(vault, &IVaultV2::performanceFeeCall {}),
            executor.read(vault, &IVaultV2::performanceFeeRecipientCall {}),
            executor.read(vault, &IVaultV2::managementFeeCall {}),
            executor.read(vault, &IVaultV2::managementFeeRecipientCall {}),
            executor.read(vault, &IVaultV2::maxRateCall {}),
            executor.read(vault, &IVaultV2::adapterRegistryCall {}),
            executor.read(vault, &IVaultV2::liquidityAdapterCall {}),
            executor.read(vault, &IVaultV2::liquidityDataCall {}),
            self.adapter_addresses(vault),
        )?;

        let (idle_assets, adapters, timelocks) = tokio::join!(
            executor.read(asset, &IERC20::balanceOfCall { account: vault }),
            join_all(
                adapter_addresses
                    .into_iter()
                    .map(|adapter| self.adapter_snapshot(vault, adapter))
            ),
            self.timelocks(vault),
        );

        Ok(VaultSnapshot {
            vault,
            name,
            symbol,
            asset,
            total_assets,
            total_supply,
            virtual_shares,
            roles: AccountRoles {
                owner,
                curator,
                account,
                is_sentinel,
                is_allocator,
            },
            fees: FeeConfig {
                performance_fee,
                performance_fee_recipient,
                management_fee,
                management_fee_recipient,
                max_rate,
            },
            adapter_registry,
            adapters,
            liquidity_adapter,
            liquidity_data,
            idle_assets: idle_assets?,
            timelocks,
        })
    }

    async fn adapter_addresses(&self, vault: Address) -> Result<Vec<Address>> {
        let length = self.executor.read(vault, &IVaultV2::adaptersLengthCall {}).await?;
        let reads = (0..u256_to_u64(length)).map(|index| {
            self.executor.read(
                vault,
                &IVaultV2::adaptersCall {
                    index: U256::from(index),
                },
            )
        });
        join_all(reads).await.into_iter().collect()
    }

    async fn timelocks(&self, vault: Address) -> Vec<TimelockEntry> {
        let reads = GovernedFunction::ALL.into_iter().map(|function| async move {
            let selector = function.selector();
            let call = IVaultV2::timelockCall { selector };
            let delay = match self.executor.read(vault, &call).await {
                Ok(delay) => Some(u256_to_u64(delay)),
                Err(err) => {
                    tracing::warn!("Cannot read timelock of {} on {}: {:#}", function, vault, err);
                    None
                }
            };
            TimelockEntry {
                function,
                selector,
                delay,
            }
        });
        join_all(reads).await
    }

    async fn adapter_snapshot(&self, vault: Address, adapter: Address) -> AdapterSnapshot {
        let mut snapshot = AdapterSnapshot {
            address: adapter,
            kind: None,
            underlying: None,
            allocations: Vec::new(),
            error: None,
        };

        let Some(kind) = self.registry.classify(adapter).await else {
            tracing::warn!("Adapter {} of {} is unclassified", adapter, vault);
            snapshot.error =
                Some("unclassified: factory not in the configured adapter family".to_string());
            return snapshot;
        };
        snapshot.kind = Some(kind);

        let (underlying, ids) = tokio::join!(
            self.registry.underlying(adapter, kind),
            self.registry.allocation_ids(adapter, kind),
        );

        let mut errors = Vec::new();
        match underlying {
            Ok(underlying) => snapshot.underlying = Some(underlying),
            Err(err) => errors.push(format!("underlying: {:#}", err)),
        }
        match ids {
            Ok(ids) => {
                snapshot.allocations =
                    join_all(ids.iter().map(|id| self.allocation_snapshot(vault, id))).await;
            }
            Err(err) => errors.push(format!("allocation ids: {:#}", err)),
        }

        if !errors.is_empty() {
            let error = errors.join("; ");
            tracing::warn!("Adapter {} of {} partially unavailable: {}", adapter, vault, error);
            snapshot.error = Some(error);
        }
        snapshot
    }

    async fn allocation_snapshot(&self, vault: Address, id: &AllocationId) -> AllocationSnapshot {
        let read = tokio::try_join!(
            self.executor.read(vault, &IVaultV2::relativeCapCall { id: id.id }),
            self.executor.read(vault, &IVaultV2::absoluteCapCall { id: id.id }),
            self.executor.read(vault, &IVaultV2::allocationCall { id: id.id }),
        );

        match read {
            Ok((relative, absolute, allocation)) => AllocationSnapshot {
                id: id.id,
                relative_cap: Some(relative),
                absolute_cap: Some(absolute),
                allocation: Some(allocation),
                error: None,
            },
            Err(err) => {
                tracing::warn!("Cannot read caps of {} on {}: {:#}", id, vault, err);
                AllocationSnapshot {
                    id: id.id,
                    relative_cap: None,
                    absolute_cap: None,
                    allocation: None,
                    error: Some(format!("{:#}", err)),
                }
            }
        }
    }
}
