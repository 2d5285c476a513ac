//! In-memory chain for unit tests
//!
//! Implements [`TransactionSigner`] over a single process-local state: vaults
//! with their timelock, an ERC20 asset per vault, adapter factories for every
//! [`AdapterKind`] and the adapters they deploy. Every call runs against a
//! copy of the state which is only committed when a sent transaction succeeds.

use crate::config::AdapterFamily;
use crate::constants::{MAX_MANAGEMENT_FEE, MAX_PERFORMANCE_FEE, WAD};
use crate::contracts::{
    IAdapter, ICompoundV3Adapter, IERC20, IMorphoMarketV1Adapter, IVaultErrors, IVaultV2,
    IVaultV2Factory, MarketParams,
};
use crate::error::RemoteError;
use crate::registry::AdapterKind;
use crate::signer::{TransactionSigner, TxReceipt, TxRequest};
use crate::timelock::GovernedFunction;
use crate::types::AllocationId;
use alloy::primitives::{keccak256, Address, Bytes, TxHash, B256, U256};
use alloy::sol_types::{Panic, Revert, SolCall, SolError, SolInterface, SolValue};
use eyre::Result;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

type Outcome = std::result::Result<Vec<u8>, Vec<u8>>;

fn ret<T: SolValue>(value: T) -> Outcome {
    Ok(value.abi_encode())
}

fn fail<E: SolError>(error: E) -> Outcome {
    Err(error.abi_encode())
}

fn reason(message: &str) -> Vec<u8> {
    Revert {
        reason: message.to_string(),
    }
    .abi_encode()
}

fn out_of_bounds() -> Vec<u8> {
    Panic {
        code: U256::from(0x32u64),
    }
    .abi_encode()
}

fn done() -> Outcome {
    Ok(Vec::new())
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Debug, Clone, Default)]
struct MockToken {
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
}

#[derive(Debug, Clone)]
struct MockAdapter {
    /// `None` for adapters from a factory outside every family
    kind: Option<AdapterKind>,
    factory: Address,
    parent_vault: Address,
    underlying: Address,
    extra: Address,
    markets: Vec<MarketParams>,
    assets: U256,
}

#[derive(Debug, Clone)]
struct MockVault {
    asset: Address,
    owner: Address,
    curator: Address,
    sentinels: HashSet<Address>,
    allocators: HashSet<Address>,
    shares: HashMap<Address, U256>,
    total_supply: U256,
    adapters: Vec<Address>,
    adapter_registry: Address,
    liquidity_adapter: Address,
    liquidity_data: Bytes,
    performance_fee: U256,
    performance_fee_recipient: Address,
    management_fee: U256,
    management_fee_recipient: Address,
    max_rate: U256,
    timelocks: HashMap<[u8; 4], u64>,
    executable_at: HashMap<Vec<u8>, u64>,
    abdicated: HashSet<[u8; 4]>,
    relative_caps: HashMap<B256, U256>,
    absolute_caps: HashMap<B256, U256>,
    allocations: HashMap<B256, U256>,
    force_deallocate_penalties: HashMap<Address, U256>,
}

impl MockVault {
    fn new(owner: Address, asset: Address) -> Self {
        Self {
            asset,
            owner,
            curator: owner,
            sentinels: HashSet::new(),
            allocators: HashSet::new(),
            shares: HashMap::new(),
            total_supply: U256::ZERO,
            adapters: Vec::new(),
            adapter_registry: Address::ZERO,
            liquidity_adapter: Address::ZERO,
            liquidity_data: Bytes::new(),
            performance_fee: U256::ZERO,
            performance_fee_recipient: Address::ZERO,
            management_fee: U256::ZERO,
            management_fee_recipient: Address::ZERO,
            max_rate: U256::ZERO,
            timelocks: HashMap::new(),
            executable_at: HashMap::new(),
            abdicated: HashSet::new(),
            relative_caps: HashMap::new(),
            absolute_caps: HashMap::new(),
            allocations: HashMap::new(),
            force_deallocate_penalties: HashMap::new(),
        }
    }

    fn delay_of(&self, selector: [u8; 4]) -> u64 {
        self.timelocks.get(&selector).copied().unwrap_or(0)
    }

    fn get(map: &HashMap<B256, U256>, id: B256) -> U256 {
        map.get(&id).copied().unwrap_or(U256::ZERO)
    }
}

#[derive(Debug, Clone, Default)]
struct ChainState {
    now: u64,
    clock_skew: i64,
    auto_advance: u64,
    block_number: u64,
    nonce: u64,
    vault_factory: Address,
    vaults: HashMap<Address, MockVault>,
    tokens: HashMap<Address, MockToken>,
    factories: HashMap<Address, AdapterKind>,
    /// (factory, parent vault, underlying) -> adapter
    deployments: HashMap<(Address, Address, Address), Address>,
    adapters: HashMap<Address, MockAdapter>,
}

impl ChainState {
    fn next_address(&mut self) -> Address {
        self.nonce += 1;
        Address::from_word(keccak256(self.nonce.to_be_bytes()))
    }

    /// Clock the vault checks timelocks against
    fn vault_clock(&self) -> u64 {
        self.now.saturating_add_signed(self.clock_skew)
    }

    fn vault(&mut self, address: Address) -> &mut MockVault {
        self.vaults
            .get_mut(&address)
            .unwrap_or_else(|| panic!("no mock vault at {}", address))
    }

    fn balance_of(&self, token: Address, account: Address) -> U256 {
        self.tokens
            .get(&token)
            .and_then(|token| token.balances.get(&account).copied())
            .unwrap_or(U256::ZERO)
    }

    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> std::result::Result<(), Vec<u8>> {
        let token = self.tokens.entry(token).or_default();
        let balance = token.balances.get(&from).copied().unwrap_or(U256::ZERO);
        if balance < amount {
            return Err(IVaultErrors::TransferReverted {}.abi_encode());
        }
        token.balances.insert(from, balance - amount);
        *token.balances.entry(to).or_default() += amount;
        Ok(())
    }

    fn total_assets(&self, vault: Address) -> U256 {
        let Some(state) = self.vaults.get(&vault) else {
            return U256::ZERO;
        };
        let allocated = self
            .adapters
            .values()
            .filter(|adapter| adapter.parent_vault == vault)
            .fold(U256::ZERO, |total, adapter| total + adapter.assets);
        self.balance_of(state.asset, vault) + allocated
    }

    fn deploy_adapter(
        &mut self,
        factory: Address,
        kind: AdapterKind,
        vault: Address,
        underlying: Address,
        extra: Address,
    ) -> Outcome {
        if self.deployments.contains_key(&(factory, vault, underlying)) {
            return fail(IVaultErrors::AdapterAlreadyDeployed {});
        }
        let address = Address::from_word(keccak256((factory, vault, underlying).abi_encode()));
        self.deployments.insert((factory, vault, underlying), address);
        self.adapters.insert(
            address,
            MockAdapter {
                kind: Some(kind),
                factory,
                parent_vault: vault,
                underlying,
                extra,
                markets: Vec::new(),
                assets: U256::ZERO,
            },
        );
        ret(address)
    }

    fn execute(&mut self, sender: Address, to: Address, data: &[u8]) -> Outcome {
        if self.vaults.contains_key(&to) {
            self.call_vault(sender, to, data)
        } else if self.tokens.contains_key(&to) {
            self.call_token(sender, to, data)
        } else if let Some(&kind) = self.factories.get(&to) {
            self.call_factory(to, kind, data)
        } else if self.adapters.contains_key(&to) {
            self.call_adapter(to, data)
        } else if to == self.vault_factory {
            self.call_vault_factory(data)
        } else {
            // no code
            done()
        }
    }

    fn call_token(&mut self, sender: Address, to: Address, data: &[u8]) -> Outcome {
        use IERC20::IERC20Calls as Call;

        let call = Call::abi_decode(data).map_err(|_| Vec::new())?;
        let token = self.tokens.entry(to).or_default();
        match call {
            Call::name(_) => ret("Mock Asset".to_string()),
            Call::symbol(_) => ret("MOCK".to_string()),
            Call::decimals(_) => ret(U256::from(18u64)),
            Call::balanceOf(call) => ret(token.balances.get(&call.account).copied().unwrap_or_default()),
            Call::allowance(call) => ret(token
                .allowances
                .get(&(call.owner, call.spender))
                .copied()
                .unwrap_or_default()),
            Call::approve(call) => {
                token.allowances.insert((sender, call.spender), call.amount);
                ret(true)
            }
        }
    }

    fn call_factory(&mut self, factory: Address, kind: AdapterKind, data: &[u8]) -> Outcome {
        let shape = kind.shape();
        let (selector, params) = data.split_at(4.min(data.len()));

        if selector == shape.lookup.selector {
            let (vault, underlying) = <(Address, Address)>::abi_decode_params(params).map_err(|_| Vec::new())?;
            ret(self
                .deployments
                .get(&(factory, vault, underlying))
                .copied()
                .unwrap_or(Address::ZERO))
        } else if selector == shape.is_adapter.selector {
            let (account,) = <(Address,)>::abi_decode_params(params).map_err(|_| Vec::new())?;
            ret(self
                .adapters
                .get(&account)
                .is_some_and(|adapter| adapter.factory == factory))
        } else if selector == shape.create.selector {
            let (vault, underlying, extra) = if kind.requires_extra() {
                <(Address, Address, Address)>::abi_decode_params(params).map_err(|_| Vec::new())?
            } else {
                let (vault, underlying) =
                    <(Address, Address)>::abi_decode_params(params).map_err(|_| Vec::new())?;
                (vault, underlying, Address::ZERO)
            };
            self.deploy_adapter(factory, kind, vault, underlying, extra)
        } else {
            Err(Vec::new())
        }
    }

    fn call_adapter(&mut self, address: Address, data: &[u8]) -> Outcome {
        let adapter = &self.adapters[&address];
        let selector = data.get(..4).ok_or_else(Vec::new)?;

        if selector == IAdapter::factoryCall::SELECTOR {
            ret(adapter.factory)
        } else if selector == IAdapter::parentVaultCall::SELECTOR {
            ret(adapter.parent_vault)
        } else if selector == IAdapter::adapterIdCall::SELECTOR {
            ret(AllocationId::adapter(address).id)
        } else if selector == IAdapter::realAssetsCall::SELECTOR {
            ret(adapter.assets)
        } else if adapter
            .kind
            .is_some_and(|kind| selector == kind.shape().underlying.selector)
        {
            ret(adapter.underlying)
        } else if selector == ICompoundV3Adapter::cometRewardsCall::SELECTOR {
            ret(adapter.extra)
        } else if selector == IMorphoMarketV1Adapter::marketParamsListLengthCall::SELECTOR {
            ret(U256::from(adapter.markets.len()))
        } else if selector == IMorphoMarketV1Adapter::marketParamsListCall::SELECTOR {
            let call = IMorphoMarketV1Adapter::marketParamsListCall::abi_decode(data).map_err(|_| Vec::new())?;
            let index: usize = call.index.try_into().map_err(|_| out_of_bounds())?;
            let market = adapter.markets.get(index).cloned().ok_or_else(out_of_bounds)?;
            ret(market)
        } else {
            Err(Vec::new())
        }
    }

    fn call_vault_factory(&mut self, data: &[u8]) -> Outcome {
        use IVaultV2Factory::IVaultV2FactoryCalls as Call;

        match Call::abi_decode(data).map_err(|_| Vec::new())? {
            Call::isVaultV2(call) => ret(self.vaults.contains_key(&call.account)),
        }
    }

    /// Ids an allocation touches
    fn allocation_ids(
        &self,
        adapter: Address,
        data: &[u8],
    ) -> std::result::Result<Vec<B256>, Vec<u8>> {
        let adapter_state = self.adapters.get(&adapter).ok_or_else(Vec::new)?;
        match adapter_state.kind {
            Some(AdapterKind::MorphoMarketV1) => {
                let market = MarketParams::abi_decode(data).map_err(|_| reason("invalid market"))?;
                Ok(vec![AllocationId::market(adapter, &market).id])
            }
            _ => Ok(vec![AllocationId::adapter(adapter).id]),
        }
    }

    fn call_vault(&mut self, sender: Address, to: Address, data: &[u8]) -> Outcome {
        use IVaultV2::IVaultV2Calls as Call;

        let call = Call::abi_decode(data).map_err(|_| Vec::new())?;
        let clock = self.vault_clock();

        if let Some(function) = GovernedFunction::of_calldata(data) {
            let vault = self.vault(to);
            if vault.abdicated.contains(&function.selector().0) {
                return fail(IVaultErrors::Abdicated {});
            }
            match vault.executable_at.get(data) {
                None => return fail(IVaultErrors::DataNotTimelocked {}),
                Some(&at) if clock < at => return fail(IVaultErrors::TimelockNotExpired {}),
                Some(_) => {
                    vault.executable_at.remove(data);
                }
            }
        }

        let total_assets = self.total_assets(to);
        let vault = self.vault(to);
        let is_curator = sender == vault.curator;
        let is_sentinel = vault.sentinels.contains(&sender);
        let is_allocator = vault.allocators.contains(&sender);
        let is_owner = sender == vault.owner;

        match call {
            Call::asset(_) => ret(vault.asset),
            Call::totalAssets(_) => ret(total_assets),
            Call::totalSupply(_) => ret(vault.total_supply),
            Call::virtualShares(_) => ret(U256::from(1u64)),
            Call::name(_) => ret("Mock Vault".to_string()),
            Call::symbol(_) => ret("mVLT".to_string()),
            Call::decimals(_) => ret(U256::from(18u64)),
            Call::balanceOf(call) => ret(vault.shares.get(&call.account).copied().unwrap_or_default()),
            Call::convertToAssets(call) => ret(to_assets(call.shares, total_assets, vault.total_supply)),

            Call::deposit(call) => {
                let asset = vault.asset;
                let shares = to_shares(call.assets, total_assets, vault.total_supply);
                let token = self.tokens.entry(asset).or_default();
                let allowance = token.allowances.get(&(sender, to)).copied().unwrap_or_default();
                if allowance < call.assets {
                    return fail(IVaultErrors::TransferFromReverted {});
                }
                token.allowances.insert((sender, to), allowance - call.assets);
                self.transfer(asset, sender, to, call.assets)
                    .map_err(|_| IVaultErrors::TransferFromReverted {}.abi_encode())?;
                let vault = self.vault(to);
                *vault.shares.entry(call.onBehalf).or_default() += shares;
                vault.total_supply += shares;
                ret(shares)
            }
            Call::withdraw(call) => {
                let shares = to_shares(call.assets, total_assets, vault.total_supply);
                self.exit(to, sender, call.onBehalf, call.receiver, shares, call.assets)?;
                ret(shares)
            }
            Call::redeem(call) => {
                let assets = to_assets(call.shares, total_assets, vault.total_supply);
                self.exit(to, sender, call.onBehalf, call.receiver, call.shares, assets)?;
                ret(assets)
            }

            Call::owner(_) => ret(vault.owner),
            Call::curator(_) => ret(vault.curator),
            Call::isSentinel(call) => ret(vault.sentinels.contains(&call.account)),
            Call::isAllocator(call) => ret(vault.allocators.contains(&call.account)),
            Call::setOwner(call) => {
                if !is_owner {
                    return fail(IVaultErrors::Unauthorized {});
                }
                vault.owner = call.newOwner;
                done()
            }
            Call::setCurator(call) => {
                if !is_owner {
                    return fail(IVaultErrors::Unauthorized {});
                }
                vault.curator = call.newCurator;
                done()
            }
            Call::setIsSentinel(call) => {
                if !is_owner {
                    return fail(IVaultErrors::Unauthorized {});
                }
                set_membership(&mut vault.sentinels, call.account, call.newIsSentinel);
                done()
            }

            Call::performanceFee(_) => ret(vault.performance_fee),
            Call::managementFee(_) => ret(vault.management_fee),
            Call::performanceFeeRecipient(_) => ret(vault.performance_fee_recipient),
            Call::managementFeeRecipient(_) => ret(vault.management_fee_recipient),
            Call::maxRate(_) => ret(vault.max_rate),

            Call::adaptersLength(_) => ret(U256::from(vault.adapters.len())),
            Call::adapters(call) => {
                let index: usize = call.index.try_into().map_err(|_| out_of_bounds())?;
                vault.adapters.get(index).copied().map(|a| a.abi_encode()).ok_or_else(out_of_bounds)
            }
            Call::isAdapter(call) => ret(vault.adapters.contains(&call.account)),
            Call::adapterRegistry(_) => ret(vault.adapter_registry),
            Call::liquidityAdapter(_) => ret(vault.liquidity_adapter),
            Call::liquidityData(_) => ret(vault.liquidity_data.clone()),
            Call::absoluteCap(call) => ret(MockVault::get(&vault.absolute_caps, call.id)),
            Call::relativeCap(call) => ret(MockVault::get(&vault.relative_caps, call.id)),
            Call::allocation(call) => ret(MockVault::get(&vault.allocations, call.id)),

            Call::allocate(call) => {
                if !is_allocator {
                    return fail(IVaultErrors::Unauthorized {});
                }
                if !vault.adapters.contains(&call.adapter) {
                    return fail(IVaultErrors::NotAdapter {});
                }
                let asset = vault.asset;
                let ids = self.allocation_ids(call.adapter, &call.data)?;
                self.transfer(asset, to, call.adapter, call.assets)?;
                if let Some(adapter) = self.adapters.get_mut(&call.adapter) {
                    adapter.assets += call.assets;
                }

                let vault = self.vault(to);
                for id in ids {
                    let allocation = MockVault::get(&vault.allocations, id) + call.assets;
                    let absolute = MockVault::get(&vault.absolute_caps, id);
                    let relative = MockVault::get(&vault.relative_caps, id);
                    if absolute.is_zero() {
                        return fail(IVaultErrors::ZeroAbsoluteCap {});
                    }
                    if allocation > absolute {
                        return fail(IVaultErrors::AbsoluteCapExceeded {});
                    }
                    if relative != WAD && allocation > total_assets * relative / WAD {
                        return fail(IVaultErrors::RelativeCapExceeded {});
                    }
                    vault.allocations.insert(id, allocation);
                }
                done()
            }
            Call::deallocate(call) => {
                if !is_allocator && !is_sentinel {
                    return fail(IVaultErrors::Unauthorized {});
                }
                if !vault.adapters.contains(&call.adapter) {
                    return fail(IVaultErrors::NotAdapter {});
                }
                let asset = vault.asset;
                let ids = self.allocation_ids(call.adapter, &call.data)?;
                let vault = self.vault(to);
                for id in ids {
                    let allocation = MockVault::get(&vault.allocations, id);
                    if allocation < call.assets {
                        return fail(IVaultErrors::ZeroAllocation {});
                    }
                    vault.allocations.insert(id, allocation - call.assets);
                }
                self.transfer(asset, call.adapter, to, call.assets)?;
                if let Some(adapter) = self.adapters.get_mut(&call.adapter) {
                    adapter.assets -= call.assets;
                }
                done()
            }
            Call::setLiquidityAdapterAndData(call) => {
                if !is_allocator {
                    return fail(IVaultErrors::Unauthorized {});
                }
                vault.liquidity_adapter = call.newLiquidityAdapter;
                vault.liquidity_data = call.newLiquidityData;
                done()
            }
            Call::setMaxRate(call) => {
                if !is_allocator {
                    return fail(IVaultErrors::Unauthorized {});
                }
                vault.max_rate = call.newMaxRate;
                done()
            }

            Call::timelock(call) => ret(U256::from(vault.delay_of(call.selector.0))),
            Call::executableAt(call) => ret(U256::from(
                vault.executable_at.get(&call.data[..]).copied().unwrap_or(0),
            )),
            Call::submit(call) => {
                if !is_curator {
                    return fail(IVaultErrors::Unauthorized {});
                }
                if vault.executable_at.contains_key(&call.data[..]) {
                    return fail(IVaultErrors::DataAlreadyPending {});
                }
                let selector: [u8; 4] = call
                    .data
                    .get(..4)
                    .and_then(|selector| selector.try_into().ok())
                    .ok_or_else(Vec::new)?;
                let delay = if selector == IVaultV2::decreaseTimelockCall::SELECTOR {
                    let target = IVaultV2::decreaseTimelockCall::abi_decode(&call.data).map_err(|_| Vec::new())?;
                    vault.delay_of(target.selector.0)
                } else {
                    vault.delay_of(selector)
                };
                vault.executable_at.insert(call.data.to_vec(), clock + delay);
                done()
            }
            Call::revoke(call) => {
                if !is_curator && !is_sentinel {
                    return fail(IVaultErrors::Unauthorized {});
                }
                if vault.executable_at.remove(&call.data[..]).is_none() {
                    return fail(IVaultErrors::DataNotTimelocked {});
                }
                done()
            }
            Call::multicall(call) => {
                for item in &call.data {
                    self.execute(sender, to, item)?;
                }
                done()
            }

            Call::setIsAllocator(call) => {
                set_membership(&mut vault.allocators, call.account, call.newIsAllocator);
                done()
            }
            Call::setAdapterRegistry(call) => {
                vault.adapter_registry = call.newAdapterRegistry;
                done()
            }
            Call::setIsAdapter(call) => {
                let listed = vault.adapters.contains(&call.account);
                if call.newIsAdapter && !listed {
                    vault.adapters.push(call.account);
                } else if !call.newIsAdapter {
                    vault.adapters.retain(|adapter| *adapter != call.account);
                }
                done()
            }
            Call::setPerformanceFee(call) => {
                if call.newPerformanceFee > MAX_PERFORMANCE_FEE {
                    return fail(IVaultErrors::FeeTooHigh {});
                }
                vault.performance_fee = call.newPerformanceFee;
                done()
            }
            Call::setManagementFee(call) => {
                if call.newManagementFee > MAX_MANAGEMENT_FEE {
                    return fail(IVaultErrors::FeeTooHigh {});
                }
                vault.management_fee = call.newManagementFee;
                done()
            }
            Call::setPerformanceFeeRecipient(call) => {
                vault.performance_fee_recipient = call.newPerformanceFeeRecipient;
                done()
            }
            Call::setManagementFeeRecipient(call) => {
                vault.management_fee_recipient = call.newManagementFeeRecipient;
                done()
            }
            Call::increaseAbsoluteCap(call) => {
                let id = keccak256(&call.idData);
                if call.newAbsoluteCap < MockVault::get(&vault.absolute_caps, id) {
                    return fail(IVaultErrors::AbsoluteCapNotIncreasing {});
                }
                vault.absolute_caps.insert(id, call.newAbsoluteCap);
                done()
            }
            Call::increaseRelativeCap(call) => {
                let id = keccak256(&call.idData);
                if call.newRelativeCap > WAD {
                    return fail(IVaultErrors::RelativeCapAboveOne {});
                }
                if call.newRelativeCap < MockVault::get(&vault.relative_caps, id) {
                    return fail(IVaultErrors::RelativeCapNotIncreasing {});
                }
                vault.relative_caps.insert(id, call.newRelativeCap);
                done()
            }
            Call::setForceDeallocatePenalty(call) => {
                vault
                    .force_deallocate_penalties
                    .insert(call.adapter, call.newForceDeallocatePenalty);
                done()
            }
            Call::abdicate(call) => {
                vault.abdicated.insert(call.selector.0);
                done()
            }
            Call::decreaseTimelock(call) => {
                let new_delay: u64 = call.newDuration.try_into().map_err(|_| Vec::new())?;
                if new_delay > vault.delay_of(call.selector.0) {
                    return fail(IVaultErrors::TimelockNotDecreasing {});
                }
                vault.timelocks.insert(call.selector.0, new_delay);
                done()
            }
            Call::increaseTimelock(call) => {
                if !is_curator {
                    return fail(IVaultErrors::Unauthorized {});
                }
                let new_delay: u64 = call.newDuration.try_into().map_err(|_| Vec::new())?;
                if new_delay < vault.delay_of(call.selector.0) {
                    return fail(IVaultErrors::TimelockNotIncreasing {});
                }
                vault.timelocks.insert(call.selector.0, new_delay);
                done()
            }
            Call::decreaseAbsoluteCap(call) => {
                if !is_curator && !is_sentinel {
                    return fail(IVaultErrors::Unauthorized {});
                }
                let id = keccak256(&call.idData);
                if call.newAbsoluteCap > MockVault::get(&vault.absolute_caps, id) {
                    return fail(IVaultErrors::AbsoluteCapNotDecreasing {});
                }
                vault.absolute_caps.insert(id, call.newAbsoluteCap);
                done()
            }
            Call::decreaseRelativeCap(call) => {
                if !is_curator && !is_sentinel {
                    return fail(IVaultErrors::Unauthorized {});
                }
                let id = keccak256(&call.idData);
                if call.newRelativeCap > MockVault::get(&vault.relative_caps, id) {
                    return fail(IVaultErrors::RelativeCapNotDecreasing {});
                }
                vault.relative_caps.insert(id, call.newRelativeCap);
                done()
            }
        }
    }

    /// Burn `shares` of `on_behalf` and pay `assets` to `receiver`
    fn exit(
        &mut self,
        vault_address: Address,
        sender: Address,
        on_behalf: Address,
        receiver: Address,
        shares: U256,
        assets: U256,
    ) -> std::result::Result<(), Vec<u8>> {
        let vault = self.vault(vault_address);
        if sender != on_behalf {
            return Err(IVaultErrors::Unauthorized {}.abi_encode());
        }
        let balance = vault.shares.get(&on_behalf).copied().unwrap_or_default();
        if balance < shares {
            return Err(reason("insufficient shares"));
        }
        vault.shares.insert(on_behalf, balance - shares);
        vault.total_supply -= shares;
        let asset = vault.asset;
        self.transfer(asset, vault_address, receiver, assets)
    }
}

fn to_shares(assets: U256, total_assets: U256, total_supply: U256) -> U256 {
    if total_supply.is_zero() || total_assets.is_zero() {
        assets
    } else {
        assets * total_supply / total_assets
    }
}

fn to_assets(shares: U256, total_assets: U256, total_supply: U256) -> U256 {
    if total_supply.is_zero() {
        shares
    } else {
        shares * total_assets / total_supply
    }
}

fn set_membership(set: &mut HashSet<Address>, account: Address, member: bool) {
    if member {
        set.insert(account);
    } else {
        set.remove(&account);
    }
}

#[derive(Default)]
struct Faults {
    /// Transport failures on `call`
    calls: HashSet<(Address, [u8; 4])>,
    /// Revert data returned by `call`
    simulations: HashMap<(Address, [u8; 4]), Vec<u8>>,
    /// Revert data returned by `sign_and_send`
    sends: HashMap<(Address, [u8; 4]), Vec<u8>>,
    /// Sends of these are mined with a failed receipt
    mined_reverts: HashSet<(Address, [u8; 4])>,
    /// Sends of these are broadcast but never mined
    dropped: HashSet<(Address, [u8; 4])>,
    /// Deployments landed by someone else right before our next send
    front_runs: Vec<(AdapterKind, Address, Address)>,
}

struct Inner {
    state: ChainState,
    faults: Faults,
    sent: usize,
    receipts: HashMap<TxHash, TxReceipt>,
}

/// In-memory chain, shared by every component under test
pub struct MockChain {
    sender: Address,
    inner: Mutex<Inner>,
}

fn selector_of(data: &[u8]) -> [u8; 4] {
    data.get(..4)
        .and_then(|selector| selector.try_into().ok())
        .unwrap_or_default()
}

impl MockChain {
    pub const INITIAL_BALANCE: U256 = U256::from_limbs([0, 1, 0, 0]);

    pub fn new() -> Arc<Self> {
        init_tracing();
        let state = ChainState {
            now: GENESIS_TIMESTAMP,
            block_number: 1,
            vault_factory: Address::repeat_byte(0xfa),
            ..Default::default()
        };
        Arc::new(Self {
            sender: Address::repeat_byte(0x5e),
            inner: Mutex::new(Inner {
                state,
                faults: Faults::default(),
                sent: 0,
                receipts: HashMap::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    fn state<R>(&self, f: impl FnOnce(&mut ChainState) -> R) -> R {
        f(&mut self.lock().state)
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn vault_factory(&self) -> Address {
        self.state(|state| state.vault_factory)
    }

    /// New vault owned and curated by the sender, who also holds
    /// `INITIAL_BALANCE` of its asset
    pub fn create_vault(&self) -> Address {
        let sender = self.sender;
        self.state(|state| {
            let asset = state.next_address();
            let vault = state.next_address();
            state
                .tokens
                .entry(asset)
                .or_default()
                .balances
                .insert(sender, Self::INITIAL_BALANCE);
            state.vaults.insert(vault, MockVault::new(sender, asset));
            vault
        })
    }

    pub fn asset_of(&self, vault: Address) -> Address {
        self.state(|state| state.vault(vault).asset)
    }

    pub fn token_balance(&self, token: Address, account: Address) -> U256 {
        self.state(|state| state.balance_of(token, account))
    }

    /// Deploy a factory for every type in the family and record it there
    pub fn deploy_factories(&self, family: AdapterFamily) -> AdapterFamily {
        self.state(|state| {
            family.priority.clone().into_iter().fold(family, |family, kind| {
                let factory = state.next_address();
                state.factories.insert(factory, kind);
                family.with_factory(kind, factory)
            })
        })
    }

    pub fn adapter_count(&self) -> usize {
        self.state(|state| state.adapters.len())
    }

    /// Adapter from a factory that belongs to no family, already enabled on the vault
    pub fn add_foreign_adapter(&self, vault: Address) -> Address {
        self.state(|state| {
            let factory = state.next_address();
            let adapter = state.next_address();
            state.adapters.insert(
                adapter,
                MockAdapter {
                    kind: None,
                    factory,
                    parent_vault: vault,
                    underlying: Address::ZERO,
                    extra: Address::ZERO,
                    markets: Vec::new(),
                    assets: U256::ZERO,
                },
            );
            state.vault(vault).adapters.push(adapter);
            adapter
        })
    }

    pub fn add_market(&self, adapter: Address, market: MarketParams) {
        self.state(|state| {
            if let Some(adapter) = state.adapters.get_mut(&adapter) {
                adapter.markets.push(market);
            }
        })
    }

    /// Enable an adapter on a vault, bypassing the timelock
    pub fn register_adapter(&self, vault: Address, adapter: Address) {
        self.state(|state| {
            let vault = state.vault(vault);
            if !vault.adapters.contains(&adapter) {
                vault.adapters.push(adapter);
            }
        })
    }

    /// Make the next send to `kind`'s factory race against the same deployment
    pub fn front_run_deploy(&self, kind: AdapterKind, vault: Address, underlying: Address) {
        self.lock().faults.front_runs.push((kind, vault, underlying));
    }

    pub fn vault_has_adapter(&self, vault: Address, adapter: Address) -> bool {
        self.state(|state| state.vault(vault).adapters.contains(&adapter))
    }

    pub fn is_allocator(&self, vault: Address, account: Address) -> bool {
        self.state(|state| state.vault(vault).allocators.contains(&account))
    }

    pub fn set_timelock(&self, vault: Address, function: GovernedFunction, delay: u64) {
        self.state(|state| {
            state.vault(vault).timelocks.insert(function.selector().0, delay);
        })
    }

    pub fn set_relative_cap(&self, vault: Address, id: &AllocationId, cap: U256) {
        self.state(|state| {
            state.vault(vault).relative_caps.insert(id.id, cap);
        })
    }

    pub fn set_absolute_cap(&self, vault: Address, id: &AllocationId, cap: U256) {
        self.state(|state| {
            state.vault(vault).absolute_caps.insert(id.id, cap);
        })
    }

    pub fn relative_cap(&self, vault: Address, id: &AllocationId) -> U256 {
        self.state(|state| MockVault::get(&state.vault(vault).relative_caps, id.id))
    }

    pub fn allocation(&self, vault: Address, id: &AllocationId) -> U256 {
        self.state(|state| MockVault::get(&state.vault(vault).allocations, id.id))
    }

    pub fn now(&self) -> u64 {
        self.state(|state| state.now)
    }

    pub fn advance(&self, seconds: u64) {
        self.state(|state| state.now += seconds)
    }

    /// Offset of the vault's clock from the latest block timestamp
    pub fn set_clock_skew(&self, skew: i64) {
        self.state(|state| state.clock_skew = skew)
    }

    /// Advance time by `seconds` every time the latest block is queried
    pub fn set_auto_advance(&self, seconds: u64) {
        self.state(|state| state.auto_advance = seconds)
    }

    /// Transport error for every `call` of `selector` on `to`
    pub fn fail_call(&self, to: Address, selector: impl Into<[u8; 4]>) {
        self.lock().faults.calls.insert((to, selector.into()));
    }

    /// Revert with `data` on every `call` of `selector` on `to`
    pub fn fail_simulation_with(&self, to: Address, selector: impl Into<[u8; 4]>, data: Vec<u8>) {
        self.lock().faults.simulations.insert((to, selector.into()), data);
    }

    /// Revert with `data` on every send of `selector` to `to`
    pub fn fail_send_with(&self, to: Address, selector: impl Into<[u8; 4]>, data: Vec<u8>) {
        self.lock().faults.sends.insert((to, selector.into()), data);
    }

    /// Mine every send of `selector` to `to` as a reverted transaction
    pub fn revert_on_chain(&self, to: Address, selector: impl Into<[u8; 4]>) {
        self.lock().faults.mined_reverts.insert((to, selector.into()));
    }

    /// Accept every send of `selector` to `to` without ever mining it
    pub fn drop_receipt(&self, to: Address, selector: impl Into<[u8; 4]>) {
        self.lock().faults.dropped.insert((to, selector.into()));
    }

    /// Number of transactions handed to `sign_and_send`, failed ones included
    pub fn sent_transactions(&self) -> usize {
        self.lock().sent
    }
}

impl TransactionSigner for MockChain {
    fn address(&self) -> Address {
        self.sender
    }

    async fn call(&self, tx: TxRequest) -> Result<Bytes> {
        let inner = self.lock();
        let key = (tx.to, selector_of(&tx.data));
        if inner.faults.calls.contains(&key) {
            return Err(RemoteError::new("connection reset by peer").into());
        }
        if let Some(data) = inner.faults.simulations.get(&key) {
            return Err(RemoteError::reverted(data.clone()).into());
        }

        let mut state = inner.state.clone();
        state
            .execute(self.sender, tx.to, &tx.data)
            .map(Bytes::from)
            .map_err(|data| RemoteError::reverted(data).into())
    }

    async fn sign_and_send(&self, tx: TxRequest) -> Result<TxHash> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.sent += 1;

        if let Some(kind) = inner.state.factories.get(&tx.to).copied() {
            for (raced, vault, underlying) in std::mem::take(&mut inner.faults.front_runs) {
                if raced == kind {
                    let _ = inner.state.deploy_adapter(tx.to, kind, vault, underlying, Address::ZERO);
                } else {
                    inner.faults.front_runs.push((raced, vault, underlying));
                }
            }
        }

        let key = (tx.to, selector_of(&tx.data));
        if let Some(data) = inner.faults.sends.get(&key) {
            return Err(RemoteError::reverted(data.clone()).into());
        }

        let transaction_hash = keccak256((inner.sent as u64).to_be_bytes());
        if inner.faults.dropped.contains(&key) {
            return Ok(transaction_hash);
        }

        let success = !inner.faults.mined_reverts.contains(&key);
        if success {
            let mut state = inner.state.clone();
            state
                .execute(self.sender, tx.to, &tx.data)
                .map_err(|data| eyre::Report::new(RemoteError::reverted(data)))?;
            inner.state = state;
        }

        inner.state.block_number += 1;
        inner.receipts.insert(
            transaction_hash,
            TxReceipt {
                transaction_hash,
                success,
                block_number: Some(inner.state.block_number),
            },
        );
        Ok(transaction_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt> {
        self.lock()
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| eyre::eyre!("Transaction receipt not found: {}", tx_hash))
    }

    async fn block_timestamp(&self) -> Result<u64> {
        Ok(self.state(|state| {
            let now = state.now;
            state.now += state.auto_advance;
            now
        }))
    }

    async fn get_balance(&self) -> Result<U256> {
        Ok(U256::from(10u64).pow(U256::from(18u64)))
    }
}
