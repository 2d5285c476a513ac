//! Exposure-cap convergence for allocation ids
//!
//! Raising a cap is timelocked and goes through [`Timelock::apply`];
//! lowering one is unguarded and sent directly. Which path applies is
//! decided by diffing the desired value against the on-chain one.

use crate::constants::{percent_from_wad, WAD};
use crate::contracts::IVaultV2;
use crate::error::{Result, VaultError};
use crate::executor::CallExecutor;
use crate::signer::TransactionSigner;
use crate::timelock::{ApplyOutcome, ApplyPath, ExecutionMode, PendingChange, Timelock};
use crate::types::AllocationId;
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current caps and allocation of one id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Caps {
    /// WAD-scaled fraction of total assets
    pub relative: U256,
    /// Asset amount
    pub absolute: U256,
    pub allocation: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapKind {
    Relative,
    Absolute,
}

impl fmt::Display for CapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relative => f.write_str("relative cap"),
            Self::Absolute => f.write_str("absolute cap"),
        }
    }
}

/// What happened to one cap
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapOutcome {
    Unchanged,
    Decreased { from: U256, to: U256 },
    Increased { from: U256, to: U256, path: ApplyPath },
    /// Increase submitted, executable later
    Pending { from: U256, to: U256, pending: PendingChange },
    Failed { reason: String },
}

impl CapOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Per-field outcome of [`CapResolver::resolve_cap`]; `None` where no target was given
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapResolution {
    pub relative: Option<CapOutcome>,
    pub absolute: Option<CapOutcome>,
}

impl CapResolution {
    pub fn has_failures(&self) -> bool {
        [&self.relative, &self.absolute]
            .into_iter()
            .flatten()
            .any(CapOutcome::is_failed)
    }
}

/// Desired caps for one id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapTarget {
    pub id: AllocationId,
    pub relative: Option<U256>,
    pub absolute: Option<U256>,
}

impl CapTarget {
    pub fn new(id: AllocationId) -> Self {
        Self {
            id,
            relative: None,
            absolute: None,
        }
    }

    pub fn with_relative(mut self, relative: U256) -> Self {
        self.relative = Some(relative);
        self
    }

    pub fn with_absolute(mut self, absolute: U256) -> Self {
        self.absolute = Some(absolute);
        self
    }
}

/// Result for one id of a batch
#[derive(Debug)]
pub struct CapReport {
    pub id: AllocationId,
    pub result: Result<CapResolution>,
}

pub struct CapResolver<S> {
    executor: CallExecutor<S>,
    timelock: Timelock<S>,
}

impl<S> Clone for CapResolver<S> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            timelock: self.timelock.clone(),
        }
    }
}

impl<S: TransactionSigner> CapResolver<S> {
    pub fn new(executor: CallExecutor<S>, timelock: Timelock<S>) -> Self {
        Self { executor, timelock }
    }

    pub async fn read_caps(&self, vault: Address, id: &AllocationId) -> Result<Caps> {
        let (relative, absolute, allocation) = tokio::try_join!(
            self.executor.read(vault, &IVaultV2::relativeCapCall { id: id.id }),
            self.executor.read(vault, &IVaultV2::absoluteCapCall { id: id.id }),
            self.executor.read(vault, &IVaultV2::allocationCall { id: id.id }),
        )?;

        Ok(Caps {
            relative,
            absolute,
            allocation,
        })
    }

    /// Converge the caps of one id to the desired values
    ///
    /// Decreases are sent before increases. A field that fails is reported
    /// as [`CapOutcome::Failed`] without stopping the other field.
    pub async fn resolve_cap(
        &self,
        vault: Address,
        id: &AllocationId,
        relative: Option<U256>,
        absolute: Option<U256>,
        mode: ExecutionMode,
    ) -> Result<CapResolution> {
        if relative.is_none() && absolute.is_none() {
            return Err(VaultError::precondition(format!("no cap target given for {}", id)).into());
        }
        if let Some(relative) = relative {
            if relative > WAD {
                return Err(VaultError::precondition(format!(
                    "relative cap {:.2}% for {} is above 100%",
                    percent_from_wad(relative),
                    id
                ))
                .into());
            }
        }

        let current = self.read_caps(vault, id).await?;
        let mut steps = Vec::new();
        if let Some(desired) = relative {
            steps.push((CapKind::Relative, current.relative, desired));
        }
        if let Some(desired) = absolute {
            steps.push((CapKind::Absolute, current.absolute, desired));
        }
        // decreases first
        steps.sort_by_key(|(_, from, to)| to >= from);

        let mut resolution = CapResolution::default();
        for (kind, from, to) in steps {
            let outcome = self.converge(vault, id, kind, from, to, mode).await;
            match kind {
                CapKind::Relative => resolution.relative = Some(outcome),
                CapKind::Absolute => resolution.absolute = Some(outcome),
            }
        }
        Ok(resolution)
    }

    async fn converge(
        &self,
        vault: Address,
        id: &AllocationId,
        kind: CapKind,
        from: U256,
        to: U256,
        mode: ExecutionMode,
    ) -> CapOutcome {
        let result = if to == from {
            Ok(CapOutcome::Unchanged)
        } else if to < from {
            self.decrease(vault, id, kind, to)
                .await
                .map(|_| CapOutcome::Decreased { from, to })
        } else {
            self.increase(vault, id, kind, to, mode)
                .await
                .map(|outcome| match outcome {
                    ApplyOutcome::Applied { path, .. } => CapOutcome::Increased { from, to, path },
                    ApplyOutcome::Pending(pending) => CapOutcome::Pending { from, to, pending },
                    ApplyOutcome::Unchanged => CapOutcome::Unchanged,
                })
        };

        result.unwrap_or_else(|err| {
            tracing::warn!("Failed to move {} of {} on {} to {}: {:#}", kind, id, vault, to, err);
            CapOutcome::Failed {
                reason: format!("{:#}", err),
            }
        })
    }

    async fn decrease(
        &self,
        vault: Address,
        id: &AllocationId,
        kind: CapKind,
        to: U256,
    ) -> Result<()> {
        let data = id.data.clone();
        match kind {
            CapKind::Relative => {
                let call = IVaultV2::decreaseRelativeCapCall {
                    idData: data,
                    newRelativeCap: to,
                };
                self.executor.send(vault, &call).await?;
            }
            CapKind::Absolute => {
                let call = IVaultV2::decreaseAbsoluteCapCall {
                    idData: data,
                    newAbsoluteCap: to,
                };
                self.executor.send(vault, &call).await?;
            }
        }
        tracing::info!("Lowered {} of {} on {} to {}", kind, id, vault, to);
        Ok(())
    }

    async fn increase(
        &self,
        vault: Address,
        id: &AllocationId,
        kind: CapKind,
        to: U256,
        mode: ExecutionMode,
    ) -> Result<ApplyOutcome> {
        let data = id.data.clone();
        match kind {
            CapKind::Relative => {
                let call = IVaultV2::increaseRelativeCapCall {
                    idData: data,
                    newRelativeCap: to,
                };
                self.timelock.apply(vault, &call, mode).await
            }
            CapKind::Absolute => {
                let call = IVaultV2::increaseAbsoluteCapCall {
                    idData: data,
                    newAbsoluteCap: to,
                };
                self.timelock.apply(vault, &call, mode).await
            }
        }
    }

    /// Resolve several ids; each id's result is independent of the others
    pub async fn resolve_caps(
        &self,
        vault: Address,
        targets: Vec<CapTarget>,
        mode: ExecutionMode,
    ) -> Vec<CapReport> {
        let mut reports = Vec::with_capacity(targets.len());
        for target in targets {
            let result = self
                .resolve_cap(vault, &target.id, target.relative, target.absolute, mode)
                .await;
            if let Err(err) = &result {
                tracing::warn!("Cap resolution for {} on {} failed: {:#}", target.id, vault, err);
            }
            reports.push(CapReport {
                id: target.id,
                result,
            });
        }
        reports
    }
}
