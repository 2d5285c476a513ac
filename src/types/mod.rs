//! Types for the vault SDK

mod allocation;
mod vault;

pub use allocation::AllocationId;
pub use vault::{DepositParams, RedeemParams, VaultPosition, WithdrawParams};
