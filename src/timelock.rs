//! Timelock orchestration for governed vault functions
//!
//! A governed change is identified by its full calldata. It reaches the
//! vault through one of three paths:
//!
//! - **submit** then, once `executableAt` has passed, **execute**
//! - **instant**: submit and execute bundled in one `multicall`, only when
//!   the guarding delay is zero
//!
//! `decreaseTimelock(selector, duration)` is guarded by the current delay of
//! the function it shortens. `increaseTimelock` is never guarded.

use crate::constants::u256_to_u64;
use crate::contracts::IVaultV2;
use crate::error::{is_timelock_pending, Context, Result, VaultError};
use crate::executor::{operation_name, CallExecutor};
use crate::signer::{TransactionSigner, TxReceipt};
use alloy::primitives::{Address, Bytes, FixedBytes, TxHash, U256};
use alloy::sol_types::SolCall;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A timelock-guarded vault function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GovernedFunction {
    SetIsAllocator,
    SetAdapterRegistry,
    SetIsAdapter,
    SetPerformanceFee,
    SetManagementFee,
    SetPerformanceFeeRecipient,
    SetManagementFeeRecipient,
    IncreaseAbsoluteCap,
    IncreaseRelativeCap,
    SetForceDeallocatePenalty,
    Abdicate,
    DecreaseTimelock,
}

impl GovernedFunction {
    pub const ALL: [Self; 12] = [
        Self::SetIsAllocator,
        Self::SetAdapterRegistry,
        Self::SetIsAdapter,
        Self::SetPerformanceFee,
        Self::SetManagementFee,
        Self::SetPerformanceFeeRecipient,
        Self::SetManagementFeeRecipient,
        Self::IncreaseAbsoluteCap,
        Self::IncreaseRelativeCap,
        Self::SetForceDeallocatePenalty,
        Self::Abdicate,
        Self::DecreaseTimelock,
    ];

    fn signature(self) -> ([u8; 4], &'static str) {
        fn of<C: SolCall>() -> ([u8; 4], &'static str) {
            (C::SELECTOR, operation_name::<C>())
        }

        match self {
            Self::SetIsAllocator => of::<IVaultV2::setIsAllocatorCall>(),
            Self::SetAdapterRegistry => of::<IVaultV2::setAdapterRegistryCall>(),
            Self::SetIsAdapter => of::<IVaultV2::setIsAdapterCall>(),
            Self::SetPerformanceFee => of::<IVaultV2::setPerformanceFeeCall>(),
            Self::SetManagementFee => of::<IVaultV2::setManagementFeeCall>(),
            Self::SetPerformanceFeeRecipient => of::<IVaultV2::setPerformanceFeeRecipientCall>(),
            Self::SetManagementFeeRecipient => of::<IVaultV2::setManagementFeeRecipientCall>(),
            Self::IncreaseAbsoluteCap => of::<IVaultV2::increaseAbsoluteCapCall>(),
            Self::IncreaseRelativeCap => of::<IVaultV2::increaseRelativeCapCall>(),
            Self::SetForceDeallocatePenalty => of::<IVaultV2::setForceDeallocatePenaltyCall>(),
            Self::Abdicate => of::<IVaultV2::abdicateCall>(),
            Self::DecreaseTimelock => of::<IVaultV2::decreaseTimelockCall>(),
        }
    }

    /// Canonical 4-byte selector, used both in calldata and as the timelock key
    pub fn selector(self) -> FixedBytes<4> {
        self.signature().0.into()
    }

    /// Contract function name, e.g. `setIsAdapter`
    pub fn name(self) -> &'static str {
        self.signature().1
    }

    pub fn from_selector(selector: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|function| function.selector().as_slice() == selector)
    }

    /// Governed function targeted by encoded calldata
    pub fn of_calldata(data: &[u8]) -> Option<Self> {
        data.get(..4).and_then(Self::from_selector)
    }
}

impl fmt::Display for GovernedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GovernedFunction {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|function| function.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| eyre::eyre!("Unknown governed function: {}", s))
    }
}

/// A submitted change that has not been executed yet
///
/// Serializable so a caller can persist it and execute after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub vault: Address,
    pub function: GovernedFunction,
    /// Full calldata of the governed call
    pub data: Bytes,
    /// Chain timestamp from which the change can be executed
    pub executable_at: u64,
    /// Submission transaction, absent when an existing submission was resumed
    pub submitted_in: Option<TxHash>,
}

impl PendingChange {
    pub fn is_executable(&self, now: u64) -> bool {
        now >= self.executable_at
    }

    /// Seconds left until executable
    pub fn remaining(&self, now: u64) -> u64 {
        self.executable_at.saturating_sub(now)
    }
}

/// What to do when a change cannot be applied instantly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Submit and hand the pending change back to the caller
    SubmitOnly,
    /// Submit, wait out the delay, then execute
    WaitAndExecute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyPath {
    /// Submit and execute bundled in one multicall
    Instant,
    /// Executed after its delay elapsed
    AfterDelay,
    /// Unguarded call
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { receipt: TxReceipt, path: ApplyPath },
    Pending(PendingChange),
    /// Already in the desired state, nothing sent
    Unchanged,
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn pending(&self) -> Option<&PendingChange> {
        match self {
            Self::Pending(pending) => Some(pending),
            _ => None,
        }
    }
}

fn governed_function(data: &[u8]) -> Result<GovernedFunction> {
    GovernedFunction::of_calldata(data).ok_or_else(|| {
        VaultError::precondition(format!(
            "calldata 0x{} does not target a timelocked function",
            alloy::primitives::hex::encode(data.get(..4).unwrap_or(data))
        ))
        .into()
    })
}

/// Submit / execute / instant protocol over a vault's timelock
pub struct Timelock<S> {
    executor: CallExecutor<S>,
    poll_interval: Duration,
}

impl<S> Clone for Timelock<S> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            poll_interval: self.poll_interval,
        }
    }
}

impl<S: TransactionSigner> Timelock<S> {
    pub fn new(executor: CallExecutor<S>, poll_interval: Duration) -> Self {
        Self {
            executor,
            poll_interval,
        }
    }

    /// Canonical selector of a governed function
    pub fn selector_of(function: GovernedFunction) -> FixedBytes<4> {
        function.selector()
    }

    /// Current delay of a governed function, in seconds
    pub async fn get_delay(&self, vault: Address, function: GovernedFunction) -> Result<u64> {
        self.delay_of_selector(vault, function.selector()).await
    }

    async fn delay_of_selector(&self, vault: Address, selector: FixedBytes<4>) -> Result<u64> {
        let delay = self
            .executor
            .read(vault, &IVaultV2::timelockCall { selector })
            .await?;
        Ok(u256_to_u64(delay))
    }

    /// When submitted calldata becomes executable; 0 if it is not pending
    pub async fn get_executable_at(&self, vault: Address, data: &Bytes) -> Result<u64> {
        let executable_at = self
            .executor
            .read(vault, &IVaultV2::executableAtCall { data: data.clone() })
            .await?;
        Ok(u256_to_u64(executable_at))
    }

    /// Current chain time
    pub async fn now(&self) -> Result<u64> {
        self.executor.signer().block_timestamp().await
    }

    /// Delay a submission of this calldata would wait
    ///
    /// `decreaseTimelock` waits for the current delay of its target function.
    pub async fn guarding_delay(
        &self,
        vault: Address,
        data: &[u8],
    ) -> Result<(GovernedFunction, u64)> {
        let function = governed_function(data)?;

        let delay = if function == GovernedFunction::DecreaseTimelock {
            let call = IVaultV2::decreaseTimelockCall::abi_decode(data)
                .context("Failed to decode decreaseTimelock calldata")?;
            self.delay_of_selector(vault, call.selector).await?
        } else {
            self.get_delay(vault, function).await?
        };

        Ok((function, delay))
    }

    /// Start the timelock for a governed call
    pub async fn submit<C: SolCall>(&self, vault: Address, call: &C) -> Result<PendingChange> {
        self.submit_data(vault, call.abi_encode().into()).await
    }

    pub async fn submit_data(&self, vault: Address, data: Bytes) -> Result<PendingChange> {
        let function = governed_function(&data)?;

        let receipt = self
            .executor
            .send(vault, &IVaultV2::submitCall { data: data.clone() })
            .await
            .with_context(|| format!("Failed to submit {} on {}", function, vault))?;

        let executable_at = self.get_executable_at(vault, &data).await?;
        tracing::info!(
            "Submitted {} on {}, executable at {}",
            function,
            vault,
            executable_at
        );

        Ok(PendingChange {
            vault,
            function,
            data,
            executable_at,
            submitted_in: Some(receipt.transaction_hash),
        })
    }

    /// Execute a previously submitted governed call
    ///
    /// Fails with [`VaultError::TimelockPending`] if called before the
    /// change is executable; test with [`is_timelock_pending`].
    pub async fn execute_after_delay<C: SolCall>(
        &self,
        vault: Address,
        call: &C,
    ) -> Result<TxReceipt> {
        self.execute_data(vault, call.abi_encode().into()).await
    }

    pub async fn execute_pending(&self, pending: &PendingChange) -> Result<TxReceipt> {
        self.execute_data(pending.vault, pending.data.clone()).await
    }

    async fn execute_data(&self, vault: Address, data: Bytes) -> Result<TxReceipt> {
        let function = governed_function(&data)?;
        let (executable_at, now) =
            tokio::try_join!(self.get_executable_at(vault, &data), self.now())?;

        if executable_at == 0 {
            return Err(VaultError::precondition(format!(
                "{} on {} was never submitted",
                function, vault
            ))
            .into());
        }

        let pending = VaultError::TimelockPending {
            function,
            vault,
            executable_at,
            now,
        };
        if now < executable_at {
            return Err(pending.into());
        }

        match self.executor.send_raw(vault, data, function.name()).await {
            Ok(receipt) => {
                tracing::info!("Executed {} on {}", function, vault);
                Ok(receipt)
            }
            // Chain time moved differently than the latest block suggested
            Err(err)
                if VaultError::find(&err)
                    .and_then(VaultError::reason)
                    .is_some_and(|reason| reason.is_custom("TimelockNotExpired")) =>
            {
                Err(pending.into())
            }
            Err(err) => Err(err),
        }
    }

    /// Submit and execute in one transaction; the guarding delay must be zero
    pub async fn instant<C: SolCall>(&self, vault: Address, call: &C) -> Result<TxReceipt> {
        let data: Bytes = call.abi_encode().into();
        let (function, delay) = self.guarding_delay(vault, &data).await?;
        if delay > 0 {
            return Err(VaultError::DelayNotZero { function, delay }.into());
        }
        self.instant_unchecked(vault, data, function).await
    }

    async fn instant_unchecked(
        &self,
        vault: Address,
        data: Bytes,
        function: GovernedFunction,
    ) -> Result<TxReceipt> {
        if self.get_executable_at(vault, &data).await? != 0 {
            tracing::debug!("{} already pending on {}, executing it", function, vault);
            return self.execute_data(vault, data).await;
        }

        let submit: Bytes = IVaultV2::submitCall { data: data.clone() }.abi_encode().into();
        let multicall = IVaultV2::multicallCall {
            data: vec![submit, data],
        };

        let receipt = self
            .executor
            .send(vault, &multicall)
            .await
            .with_context(|| format!("Failed to apply {} instantly on {}", function, vault))?;
        tracing::info!("Applied {} instantly on {}", function, vault);
        Ok(receipt)
    }

    /// Cancel a pending governed call
    pub async fn revoke<C: SolCall>(&self, vault: Address, call: &C) -> Result<TxReceipt> {
        let data: Bytes = call.abi_encode().into();
        let function = governed_function(&data)?;

        self.executor
            .send(vault, &IVaultV2::revokeCall { data })
            .await
            .with_context(|| format!("Failed to revoke {} on {}", function, vault))
    }

    /// Poll chain time until the pending change is executable
    pub async fn wait_until_executable(&self, pending: &PendingChange) -> Result<()> {
        loop {
            let now = self.now().await?;
            if pending.is_executable(now) {
                return Ok(());
            }
            tracing::debug!(
                "Waiting {}s for {} on {}",
                pending.remaining(now),
                pending.function,
                pending.vault
            );
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Wait for a pending change and execute it
    pub async fn finish(&self, pending: &PendingChange) -> Result<ApplyOutcome> {
        loop {
            self.wait_until_executable(pending).await?;
            match self.execute_pending(pending).await {
                Ok(receipt) => {
                    return Ok(ApplyOutcome::Applied {
                        receipt,
                        path: ApplyPath::AfterDelay,
                    })
                }
                Err(err) if is_timelock_pending(&err) => {
                    tracing::debug!("{}; retrying", err);
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Apply a governed call by the cheapest path available
    ///
    /// A fresh call with zero delay goes through `instant`. Otherwise the
    /// call is submitted (or an existing submission resumed) and, depending
    /// on `mode`, returned as pending or waited out and executed. A resumed
    /// submission keeps the executable-at it was given, even if the delay
    /// has since dropped.
    pub async fn apply<C: SolCall>(
        &self,
        vault: Address,
        call: &C,
        mode: ExecutionMode,
    ) -> Result<ApplyOutcome> {
        self.apply_data(vault, call.abi_encode().into(), mode).await
    }

    pub async fn apply_data(
        &self,
        vault: Address,
        data: Bytes,
        mode: ExecutionMode,
    ) -> Result<ApplyOutcome> {
        let (function, delay) = self.guarding_delay(vault, &data).await?;
        let executable_at = self.get_executable_at(vault, &data).await?;

        if executable_at == 0 && delay == 0 {
            let receipt = self.instant_unchecked(vault, data, function).await?;
            return Ok(ApplyOutcome::Applied {
                receipt,
                path: ApplyPath::Instant,
            });
        }

        let resumed = executable_at != 0;
        let pending = if resumed {
            tracing::info!("Resuming pending {} on {}", function, vault);
            PendingChange {
                vault,
                function,
                data,
                executable_at,
                submitted_in: None,
            }
        } else {
            self.submit_data(vault, data).await?
        };

        match mode {
            ExecutionMode::WaitAndExecute => self.finish(&pending).await,
            ExecutionMode::SubmitOnly if resumed && pending.is_executable(self.now().await?) => {
                let receipt = self.execute_pending(&pending).await?;
                Ok(ApplyOutcome::Applied {
                    receipt,
                    path: ApplyPath::AfterDelay,
                })
            }
            ExecutionMode::SubmitOnly => Ok(ApplyOutcome::Pending(pending)),
        }
    }

    /// Lengthen a function's delay; unguarded and immediate
    pub async fn increase_timelock(
        &self,
        vault: Address,
        function: GovernedFunction,
        new_delay: u64,
    ) -> Result<ApplyOutcome> {
        let current = self.get_delay(vault, function).await?;
        if new_delay < current {
            return Err(VaultError::precondition(format!(
                "increase_timelock for {} would shorten {}s to {}s, use decrease_timelock",
                function, current, new_delay
            ))
            .into());
        }
        if new_delay == current {
            return Ok(ApplyOutcome::Unchanged);
        }

        let call = IVaultV2::increaseTimelockCall {
            selector: function.selector(),
            newDuration: U256::from(new_delay),
        };
        let receipt = self
            .executor
            .send(vault, &call)
            .await
            .with_context(|| format!("Failed to increase timelock of {} on {}", function, vault))?;

        Ok(ApplyOutcome::Applied {
            receipt,
            path: ApplyPath::Direct,
        })
    }

    /// Shorten a function's delay; guarded by that function's current delay
    pub async fn decrease_timelock(
        &self,
        vault: Address,
        function: GovernedFunction,
        new_delay: u64,
        mode: ExecutionMode,
    ) -> Result<ApplyOutcome> {
        let current = self.get_delay(vault, function).await?;
        if new_delay > current {
            return Err(VaultError::precondition(format!(
                "decrease_timelock for {} would lengthen {}s to {}s, use increase_timelock",
                function, current, new_delay
            ))
            .into());
        }
        if new_delay == current {
            return Ok(ApplyOutcome::Unchanged);
        }

        self.apply(vault, &Self::decrease_timelock_call(function, new_delay), mode)
            .await
    }

    /// Calldata-level form of a delay decrease, for use with `submit` / `execute_after_delay`
    pub fn decrease_timelock_call(
        function: GovernedFunction,
        new_delay: u64,
    ) -> IVaultV2::decreaseTimelockCall {
        IVaultV2::decreaseTimelockCall {
            selector: function.selector(),
            newDuration: U256::from(new_delay),
        }
    }
}
