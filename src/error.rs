//! Error types for the vault SDK
//!
//! Uses `eyre` for ergonomic error handling with context. Failures that
//! callers need to branch on travel inside the report as a [`VaultError`],
//! recovered with [`VaultError::find`] or [`is_timelock_pending`].

use crate::contracts::IVaultErrors;
use crate::timelock::GovernedFunction;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::sol_types::{Panic, Revert, SolError};
use alloy::transports::TransportError;
use std::fmt;

pub use eyre::{eyre, Context, Report, Result};

/// Raw failure reported by a transport for a single remote call
#[derive(Debug, Clone)]
pub struct RemoteError {
    /// Node or transport message
    pub message: String,
    /// ABI-encoded revert payload, when the node returned one
    pub revert_data: Option<Bytes>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            revert_data: None,
        }
    }

    /// A call that reverted with the given payload
    pub fn reverted(data: impl Into<Bytes>) -> Self {
        Self {
            message: "execution reverted".to_string(),
            revert_data: Some(data.into()),
        }
    }

    pub(crate) fn from_transport(err: &TransportError) -> Self {
        match err.as_error_resp() {
            Some(payload) => Self {
                message: payload.message.to_string(),
                revert_data: payload.as_revert_data(),
            },
            None => Self::new(err.to_string()),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.revert_data {
            Some(data) => write!(f, "{} (data: {})", self.message, data),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Decoded reason for a failed remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertReason {
    /// `Error(string)` reason
    Message(String),
    /// Custom error whose selector is in the known table
    Custom(&'static str),
    /// Solidity panic code
    Panic(U256),
    /// Revert payload that matched nothing we know
    Raw(Bytes),
    /// No revert payload at all
    Unknown(String),
}

impl RevertReason {
    /// Decode the most specific reason available anywhere in the report chain
    pub fn decode(err: &Report) -> Self {
        let remote = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<RemoteError>());

        match remote {
            Some(RemoteError {
                revert_data: Some(data),
                message,
            }) if !data.is_empty() => match Self::from_revert_data(data) {
                Self::Raw(raw) => Self::from_message(message).unwrap_or(Self::Raw(raw)),
                decoded => decoded,
            },
            Some(remote) => {
                Self::from_message(&remote.message)
                    .unwrap_or_else(|| Self::Unknown(remote.message.clone()))
            }
            None => Self::Unknown(format!("{err:#}")),
        }
    }

    /// Decode an ABI revert payload
    pub fn from_revert_data(data: &[u8]) -> Self {
        if data.len() < 4 {
            return if data.is_empty() {
                Self::Unknown("empty revert data".to_string())
            } else {
                Self::Raw(Bytes::copy_from_slice(data))
            };
        }

        let selector: [u8; 4] = [data[0], data[1], data[2], data[3]];
        if selector == Revert::SELECTOR {
            if let Ok(revert) = Revert::abi_decode(data) {
                return Self::Message(revert.reason);
            }
        }
        if selector == Panic::SELECTOR {
            if let Ok(panic) = Panic::abi_decode(data) {
                return Self::Panic(panic.code);
            }
        }

        match known_error_name(selector) {
            Some(name) => Self::Custom(name),
            None => Self::Raw(Bytes::copy_from_slice(data)),
        }
    }

    /// Nodes often flatten `Error(string)` into the message as `execution reverted: <reason>`
    fn from_message(message: &str) -> Option<Self> {
        message
            .strip_prefix("execution reverted: ")
            .map(|reason| reason.trim())
            .filter(|reason| !reason.is_empty())
            .map(|reason| Self::Message(reason.to_string()))
    }

    /// Higher is more useful to a human
    pub fn specificity(&self) -> u8 {
        match self {
            Self::Message(_) => 4,
            Self::Custom(_) | Self::Panic(_) => 3,
            Self::Raw(_) => 2,
            Self::Unknown(_) => 1,
        }
    }

    pub fn is_custom(&self, name: &str) -> bool {
        matches!(self, Self::Custom(known) if *known == name)
    }
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(reason) => write!(f, "reverted: {reason}"),
            Self::Custom(name) => write!(f, "reverted with {name}()"),
            Self::Panic(code) => write!(f, "panicked with code {code:#x}"),
            Self::Raw(data) => write!(f, "reverted with data {data}"),
            Self::Unknown(message) => write!(f, "unknown error: {message}"),
        }
    }
}

macro_rules! known_errors {
    ($($name:ident),* $(,)?) => {
        &[$((IVaultErrors::$name::SELECTOR, stringify!($name))),*]
    };
}

const KNOWN_ERRORS: &[([u8; 4], &str)] = known_errors![
    Abdicated,
    AbsoluteCapExceeded,
    AbsoluteCapNotDecreasing,
    AbsoluteCapNotIncreasing,
    AutomaticallyTimelocked,
    CannotReceiveAssets,
    CannotReceiveShares,
    CannotSendAssets,
    CannotSendShares,
    CastOverflow,
    DataAlreadyPending,
    DataNotTimelocked,
    FeeInvariantBroken,
    FeeTooHigh,
    MaxRateTooHigh,
    NoCode,
    NotAdapter,
    NotInAdapterRegistry,
    PenaltyTooHigh,
    RelativeCapAboveOne,
    RelativeCapExceeded,
    RelativeCapNotDecreasing,
    RelativeCapNotIncreasing,
    TimelockNotDecreasing,
    TimelockNotExpired,
    TimelockNotIncreasing,
    TransferFromReturnedFalse,
    TransferFromReverted,
    TransferReturnedFalse,
    TransferReverted,
    Unauthorized,
    ZeroAbsoluteCap,
    ZeroAddress,
    ZeroAllocation,
    AdapterAlreadyDeployed,
];

/// Map a custom error selector to its name
pub fn known_error_name(selector: [u8; 4]) -> Option<&'static str> {
    KNOWN_ERRORS
        .iter()
        .find(|(known, _)| *known == selector)
        .map(|(_, name)| *name)
}

/// Failures the SDK classifies for its callers
#[derive(Debug)]
pub enum VaultError {
    /// Caller misuse detected before any remote call
    Precondition(String),
    /// `instant` was requested while the guarding delay is non-zero
    DelayNotZero {
        function: GovernedFunction,
        delay: u64,
    },
    /// A remote call failed
    CallFailed {
        operation: String,
        target: Address,
        reason: RevertReason,
    },
    /// A transaction was broadcast but no receipt arrived; it may still land
    Unconfirmed {
        operation: String,
        target: Address,
        tx_hash: TxHash,
        message: String,
    },
    /// A governed change was executed before its executable-at timestamp
    TimelockPending {
        function: GovernedFunction,
        vault: Address,
        executable_at: u64,
        now: u64,
    },
}

impl VaultError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// Classify a failed remote call
    pub fn call_failed(operation: &str, target: Address, err: &Report) -> Self {
        Self::CallFailed {
            operation: operation.to_string(),
            target,
            reason: RevertReason::decode(err),
        }
    }

    /// First `VaultError` in the report chain
    pub fn find(err: &Report) -> Option<&VaultError> {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<VaultError>())
    }

    pub fn reason(&self) -> Option<&RevertReason> {
        match self {
            Self::CallFailed { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Hash of a broadcast transaction whose outcome is unknown
    pub fn unconfirmed_tx(&self) -> Option<TxHash> {
        match self {
            Self::Unconfirmed { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }

    pub fn specificity(&self) -> u8 {
        self.reason().map(RevertReason::specificity).unwrap_or(0)
    }
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Precondition(message) => write!(f, "precondition violated: {message}"),
            Self::DelayNotZero { function, delay } => write!(
                f,
                "delay is non-zero: {function} is timelocked for {delay}s, instant path unavailable"
            ),
            Self::CallFailed {
                operation,
                target,
                reason,
            } => write!(f, "{operation} on {target} {reason}"),
            Self::Unconfirmed {
                operation,
                target,
                tx_hash,
                message,
            } => write!(
                f,
                "{operation} on {target} sent as {tx_hash} but not confirmed: {message}"
            ),
            Self::TimelockPending {
                function,
                vault,
                executable_at,
                now,
            } => write!(
                f,
                "{function} on {vault} not yet executable: executable at {executable_at}, now {now} ({}s left)",
                executable_at.saturating_sub(*now)
            ),
        }
    }
}

impl std::error::Error for VaultError {}

/// Whether the report is an early execution of a pending change
///
/// Callers use this to wait and retry instead of aborting.
pub fn is_timelock_pending(err: &Report) -> bool {
    matches!(
        VaultError::find(err),
        Some(VaultError::TimelockPending { .. })
    )
}
