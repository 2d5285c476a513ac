//! Adapter resolution and idempotent deployment
//!
//! One registry serves every product line: the [`AdapterFamily`] in the
//! chain configuration says which adapter types exist and which factory
//! deploys each, and [`AdapterKind::shape`] says how to talk to them.

use crate::config::AdapterFamily;
use crate::contracts::{
    IAdapter, ICompoundV3AdapterFactory, ICompoundV3Adapter, IERC4626AdapterFactory, IERC4626Adapter,
    IERC4626AutoCompoundAdapterFactory, IMorphoMarketV1Adapter, IMorphoMarketV1AdapterFactory,
    IMorphoVaultV1Adapter, IMorphoVaultV1AdapterFactory, MarketParams,
};
use crate::error::{Context, Result, VaultError};
use crate::executor::{operation_name, CallExecutor};
use crate::signer::TransactionSigner;
use crate::types::AllocationId;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::sol_types::abi::TokenSeq;
use alloy::sol_types::{SolCall, SolType, SolValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported adapter types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdapterKind {
    MorphoVaultV1,
    Erc4626,
    Erc4626WithAutoCompoundRewards,
    CompoundV3,
    MorphoMarketV1,
}

/// A contract function by name and selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionRef {
    pub name: &'static str,
    pub selector: [u8; 4],
}

impl FunctionRef {
    fn of<C: SolCall>() -> Self {
        Self {
            name: operation_name::<C>(),
            selector: C::SELECTOR,
        }
    }

    /// Calldata for this function with ABI-encoded params
    pub fn encode<T>(&self, params: T) -> Bytes
    where
        T: SolValue,
        for<'a> <T::SolType as SolType>::Token<'a>: TokenSeq<'a>,
    {
        let mut data = self.selector.to_vec();
        data.extend(params.abi_encode_params());
        data.into()
    }

    /// Calldata for a function without parameters
    pub fn encode_empty(&self) -> Bytes {
        Bytes::copy_from_slice(&self.selector)
    }
}

/// How a type's factory and adapters are called
///
/// Factory lookups and creation all take `(parentVault, underlying)`;
/// creation appends the extra parameter for types that need one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterShape {
    /// Deterministic lookup, zero address when not deployed
    pub lookup: FunctionRef,
    pub is_adapter: FunctionRef,
    pub create: FunctionRef,
    /// Adapter getter for its underlying protocol address
    pub underlying: FunctionRef,
}

impl AdapterKind {
    pub const ALL: [Self; 5] = [
        Self::MorphoVaultV1,
        Self::Erc4626,
        Self::Erc4626WithAutoCompoundRewards,
        Self::CompoundV3,
        Self::MorphoMarketV1,
    ];

    pub fn shape(self) -> AdapterShape {
        match self {
            Self::MorphoVaultV1 => AdapterShape {
                lookup: FunctionRef::of::<IMorphoVaultV1AdapterFactory::morphoVaultV1AdapterCall>(),
                is_adapter: FunctionRef::of::<IMorphoVaultV1AdapterFactory::isMorphoVaultV1AdapterCall>(),
                create: FunctionRef::of::<IMorphoVaultV1AdapterFactory::createMorphoVaultV1AdapterCall>(),
                underlying: FunctionRef::of::<IMorphoVaultV1Adapter::morphoVaultV1Call>(),
            },
            Self::Erc4626 => AdapterShape {
                lookup: FunctionRef::of::<IERC4626AdapterFactory::erc4626AdapterCall>(),
                is_adapter: FunctionRef::of::<IERC4626AdapterFactory::isERC4626AdapterCall>(),
                create: FunctionRef::of::<IERC4626AdapterFactory::createERC4626AdapterCall>(),
                underlying: FunctionRef::of::<IERC4626Adapter::erc4626VaultCall>(),
            },
            Self::Erc4626WithAutoCompoundRewards => AdapterShape {
                lookup: FunctionRef::of::<IERC4626AutoCompoundAdapterFactory::erc4626AutoCompoundAdapterCall>(),
                is_adapter: FunctionRef::of::<IERC4626AutoCompoundAdapterFactory::isERC4626AutoCompoundAdapterCall>(),
                create: FunctionRef::of::<IERC4626AutoCompoundAdapterFactory::createERC4626AutoCompoundAdapterCall>(),
                underlying: FunctionRef::of::<IERC4626Adapter::erc4626VaultCall>(),
            },
            Self::CompoundV3 => AdapterShape {
                lookup: FunctionRef::of::<ICompoundV3AdapterFactory::compoundV3AdapterCall>(),
                is_adapter: FunctionRef::of::<ICompoundV3AdapterFactory::isCompoundV3AdapterCall>(),
                create: FunctionRef::of::<ICompoundV3AdapterFactory::createCompoundV3AdapterCall>(),
                underlying: FunctionRef::of::<ICompoundV3Adapter::cometCall>(),
            },
            Self::MorphoMarketV1 => AdapterShape {
                lookup: FunctionRef::of::<IMorphoMarketV1AdapterFactory::morphoMarketV1AdapterCall>(),
                is_adapter: FunctionRef::of::<IMorphoMarketV1AdapterFactory::isMorphoMarketV1AdapterCall>(),
                create: FunctionRef::of::<IMorphoMarketV1AdapterFactory::createMorphoMarketV1AdapterCall>(),
                underlying: FunctionRef::of::<IMorphoMarketV1Adapter::morphoCall>(),
            },
        }
    }

    /// Name used in configuration files
    pub fn name(self) -> &'static str {
        match self {
            Self::MorphoVaultV1 => "morphoVaultV1",
            Self::Erc4626 => "erc4626",
            Self::Erc4626WithAutoCompoundRewards => "erc4626WithAutoCompoundRewards",
            Self::CompoundV3 => "compoundV3",
            Self::MorphoMarketV1 => "morphoMarketV1",
        }
    }

    /// Prefix of the `<PREFIX>_ADAPTER_FACTORY` environment variable
    pub fn env_prefix(self) -> &'static str {
        match self {
            Self::MorphoVaultV1 => "MORPHO_VAULT_V1",
            Self::Erc4626 => "ERC4626",
            Self::Erc4626WithAutoCompoundRewards => "ERC4626_AUTO_COMPOUND",
            Self::CompoundV3 => "COMPOUND_V3",
            Self::MorphoMarketV1 => "MORPHO_MARKET_V1",
        }
    }

    /// Whether deployment needs an extra address (Compound V3: the rewards contract)
    pub fn requires_extra(self) -> bool {
        matches!(self, Self::CompoundV3)
    }

    /// Multi-market adapters carry one allocation id per configured market
    pub fn is_multi_market(self) -> bool {
        matches!(self, Self::MorphoMarketV1)
    }

    /// Calldata deploying an adapter for `(vault, underlying)`
    pub fn encode_create(
        self,
        vault: Address,
        underlying: Address,
        extra: Option<Address>,
    ) -> Result<Bytes> {
        let create = self.shape().create;
        if !self.requires_extra() {
            return Ok(create.encode((vault, underlying)));
        }

        match extra {
            Some(extra) => Ok(create.encode((vault, underlying, extra))),
            None => Err(VaultError::precondition(format!(
                "deploying a {} adapter requires an extra parameter (rewards contract)",
                self
            ))
            .into()),
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of [`AdapterRegistry::deploy`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedAdapter {
    pub kind: AdapterKind,
    pub address: Address,
    /// False when the address is only the dry-run prediction and the
    /// deployment could not be confirmed
    pub confirmed: bool,
    /// Deployment transaction, absent when the adapter already existed
    pub tx_hash: Option<TxHash>,
}

impl DeployedAdapter {
    pub fn newly_deployed(&self) -> bool {
        self.tx_hash.is_some()
    }
}

fn decode_address(output: &[u8], operation: &str) -> Result<Address> {
    Address::abi_decode(output).with_context(|| format!("Failed to decode {} result", operation))
}

pub struct AdapterRegistry<S> {
    executor: CallExecutor<S>,
    family: AdapterFamily,
}

impl<S> Clone for AdapterRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            family: self.family.clone(),
        }
    }
}

impl<S: TransactionSigner> AdapterRegistry<S> {
    pub fn new(executor: CallExecutor<S>, family: AdapterFamily) -> Self {
        Self { executor, family }
    }

    pub fn family(&self) -> &AdapterFamily {
        &self.family
    }

    fn factory(&self, kind: AdapterKind) -> Result<Address> {
        self.family.factory(kind).ok_or_else(|| {
            VaultError::precondition(format!(
                "no {} adapter factory configured for this product line",
                kind
            ))
            .into()
        })
    }

    /// Adapter of a type for `(vault, underlying)`; zero address if not deployed
    async fn lookup(
        &self,
        kind: AdapterKind,
        vault: Address,
        underlying: Address,
    ) -> Result<Address> {
        let factory = self.factory(kind)?;
        let lookup = kind.shape().lookup;
        let output = self
            .executor
            .call_raw(factory, lookup.encode((vault, underlying)), lookup.name)
            .await?;
        decode_address(&output, lookup.name)
    }

    /// Find the adapter linking `vault` to `underlying`
    ///
    /// With a type, asks that type's factory. Without one, probes every type
    /// in priority order and returns the first hit. Returns the zero address
    /// when nothing is deployed.
    pub async fn find(
        &self,
        vault: Address,
        underlying: Address,
        kind: Option<AdapterKind>,
    ) -> Result<Address> {
        match kind {
            Some(kind) => self.lookup(kind, vault, underlying).await,
            None => Ok(self
                .find_any(vault, underlying)
                .await
                .map(|(_, adapter)| adapter)
                .unwrap_or(Address::ZERO)),
        }
    }

    /// Type-agnostic lookup that also reports the matching type
    ///
    /// A failed probe counts as "not found" for that type and the next type
    /// is tried, so an intermittent transport error can change which type
    /// matches first.
    pub async fn find_any(
        &self,
        vault: Address,
        underlying: Address,
    ) -> Option<(AdapterKind, Address)> {
        for &kind in &self.family.priority {
            match self.lookup(kind, vault, underlying).await {
                Ok(adapter) if adapter != Address::ZERO => return Some((kind, adapter)),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(
                        "Lookup of {} adapter for {} / {} failed, treating as not found: {:#}",
                        kind,
                        vault,
                        underlying,
                        err
                    );
                }
            }
        }
        None
    }

    /// Deploy an adapter, converging on the existing one if already deployed
    ///
    /// The deployment is dry-run first to learn the deterministic address.
    /// If the factory refuses because the pair already has an adapter, or
    /// someone else deploys it between dry run and send, the existing
    /// adapter is returned.
    pub async fn deploy(
        &self,
        kind: AdapterKind,
        vault: Address,
        underlying: Address,
        extra: Option<Address>,
    ) -> Result<DeployedAdapter> {
        let factory = self.factory(kind)?;
        let data = kind.encode_create(vault, underlying, extra)?;
        let create = kind.shape().create;

        let predicted = match self.executor.call_raw(factory, data.clone(), create.name).await {
            Ok(output) => decode_address(&output, create.name)?,
            Err(err) => {
                if let Some(existing) = self.existing(kind, vault, underlying).await {
                    tracing::info!(
                        "{} adapter for {} already deployed at {}",
                        kind,
                        vault,
                        existing
                    );
                    return Ok(DeployedAdapter {
                        kind,
                        address: existing,
                        confirmed: true,
                        tx_hash: None,
                    });
                }
                return Err(err)
                    .with_context(|| format!("Failed to deploy {} adapter for {}", kind, vault));
            }
        };

        match self.executor.send_raw(factory, data, create.name).await {
            Ok(receipt) => {
                let address = match self.existing(kind, vault, underlying).await {
                    Some(address) if address != predicted => {
                        tracing::warn!(
                            "{} adapter deployed at {} but dry run predicted {}",
                            kind,
                            address,
                            predicted
                        );
                        address
                    }
                    _ => predicted,
                };
                tracing::info!("Deployed {} adapter for {} at {}", kind, vault, address);
                Ok(DeployedAdapter {
                    kind,
                    address,
                    confirmed: true,
                    tx_hash: Some(receipt.transaction_hash),
                })
            }
            Err(err) => {
                if let Some(existing) = self.existing(kind, vault, underlying).await {
                    tracing::warn!(
                        "{} adapter for {} was deployed concurrently at {}",
                        kind,
                        vault,
                        existing
                    );
                    return Ok(DeployedAdapter {
                        kind,
                        address: existing,
                        confirmed: true,
                        tx_hash: None,
                    });
                }

                // broadcast without a receipt: the transaction may still land
                if let Some(tx_hash) = VaultError::find(&err).and_then(VaultError::unconfirmed_tx) {
                    tracing::warn!(
                        "Could not confirm {} adapter deployment for {}, predicted {}: {:#}",
                        kind,
                        vault,
                        predicted,
                        err
                    );
                    return Ok(DeployedAdapter {
                        kind,
                        address: predicted,
                        confirmed: false,
                        tx_hash: Some(tx_hash),
                    });
                }

                Err(err).with_context(|| format!("Failed to deploy {} adapter for {}", kind, vault))
            }
        }
    }

    async fn existing(
        &self,
        kind: AdapterKind,
        vault: Address,
        underlying: Address,
    ) -> Option<Address> {
        self.lookup(kind, vault, underlying)
            .await
            .ok()
            .filter(|address| *address != Address::ZERO)
    }

    /// `find` with a type, then `deploy` if nothing is there
    pub async fn find_or_deploy(
        &self,
        kind: AdapterKind,
        vault: Address,
        underlying: Address,
        extra: Option<Address>,
    ) -> Result<DeployedAdapter> {
        let existing = self.find(vault, underlying, Some(kind)).await?;
        if existing != Address::ZERO {
            return Ok(DeployedAdapter {
                kind,
                address: existing,
                confirmed: true,
                tx_hash: None,
            });
        }
        self.deploy(kind, vault, underlying, extra).await
    }

    /// Whether `account` was deployed by this type's factory
    pub async fn is_adapter(&self, kind: AdapterKind, account: Address) -> Result<bool> {
        let factory = self.factory(kind)?;
        let is_adapter = kind.shape().is_adapter;
        let output = self
            .executor
            .call_raw(factory, is_adapter.encode((account,)), is_adapter.name)
            .await?;
        bool::abi_decode(&output)
            .with_context(|| format!("Failed to decode {} result", is_adapter.name))
    }

    /// Type of an adapter, by reverse lookup of the factory that deployed it
    ///
    /// `None` when the factory is unknown or the adapter cannot be queried.
    pub async fn classify(&self, adapter: Address) -> Option<AdapterKind> {
        let factory = match self.executor.read(adapter, &IAdapter::factoryCall {}).await {
            Ok(factory) => factory,
            Err(err) => {
                tracing::debug!("Cannot classify {}: {:#}", adapter, err);
                return None;
            }
        };

        let kind = self.family.kind_of_factory(factory);
        if kind.is_none() {
            tracing::debug!("Adapter {} comes from unknown factory {}", adapter, factory);
        }
        kind
    }

    /// Underlying protocol address of an adapter
    pub async fn underlying(&self, adapter: Address, kind: AdapterKind) -> Result<Address> {
        let getter = kind.shape().underlying;
        let output = self
            .executor
            .call_raw(adapter, getter.encode_empty(), getter.name)
            .await?;
        decode_address(&output, getter.name)
    }

    /// Markets configured on a multi-market adapter
    pub async fn markets(&self, adapter: Address) -> Result<Vec<MarketParams>> {
        let length = self
            .executor
            .read(adapter, &IMorphoMarketV1Adapter::marketParamsListLengthCall {})
            .await?;
        let length: usize = length.try_into().context("Market list length overflow")?;

        let reads = (0..length).map(|index| {
            self.executor.read(
                adapter,
                &IMorphoMarketV1Adapter::marketParamsListCall {
                    index: U256::from(index),
                },
            )
        });
        futures::future::join_all(reads).await.into_iter().collect()
    }

    /// Every allocation id an adapter exposes
    pub async fn allocation_ids(
        &self,
        adapter: Address,
        kind: AdapterKind,
    ) -> Result<Vec<AllocationId>> {
        if kind.is_multi_market() {
            let markets = self.markets(adapter).await?;
            return Ok(markets
                .iter()
                .map(|market| AllocationId::market(adapter, market))
                .collect());
        }

        let reported = self.executor.read(adapter, &IAdapter::adapterIdCall {}).await?;
        let id = AllocationId::adapter(adapter);
        eyre::ensure!(
            id.id == reported,
            "Adapter {} reports id {} but its id data hashes to {}",
            adapter,
            reported,
            id.id
        );
        Ok(vec![id])
    }

    /// The allocation id to cap for an adapter
    ///
    /// Multi-market adapters use `market` when given, else their first
    /// configured market.
    pub async fn allocation_id_for(
        &self,
        adapter: Address,
        kind: AdapterKind,
        market: Option<&MarketParams>,
    ) -> Result<AllocationId> {
        match (kind.is_multi_market(), market) {
            (true, Some(market)) => Ok(AllocationId::market(adapter, market)),
            (true, None) => {
                let markets = self.markets(adapter).await?;
                let first = markets.first().ok_or_else(|| {
                    VaultError::precondition(format!("{} adapter {} has no configured market", kind, adapter))
                })?;
                Ok(AllocationId::market(adapter, first))
            }
            (false, Some(_)) => Err(VaultError::precondition(format!(
                "{} adapters have a single allocation id, no market applies",
                kind
            ))
            .into()),
            (false, None) => {
                let mut ids = self.allocation_ids(adapter, kind).await?;
                Ok(ids.remove(0))
            }
        }
    }
}
