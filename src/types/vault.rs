//! Vault types for user-facing API

use crate::constants::unscale_from_decimals;
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Parameters for depositing into a vault
#[derive(Debug, Clone)]
pub struct DepositParams {
    /// Raw amount of the underlying asset
    pub assets: U256,
    /// Account credited with the shares (defaults to sender)
    pub on_behalf: Option<Address>,
}

impl DepositParams {
    pub fn new(assets: U256) -> Self {
        Self {
            assets,
            on_behalf: None,
        }
    }

    pub fn on_behalf(mut self, account: Address) -> Self {
        self.on_behalf = Some(account);
        self
    }
}

/// Parameters for withdrawing a given amount of assets
#[derive(Debug, Clone)]
pub struct WithdrawParams {
    /// Raw amount of the underlying asset
    pub assets: U256,
    /// Receiver of the assets (defaults to sender)
    pub receiver: Option<Address>,
}

impl WithdrawParams {
    pub fn new(assets: U256) -> Self {
        Self {
            assets,
            receiver: None,
        }
    }

    pub fn to(mut self, receiver: Address) -> Self {
        self.receiver = Some(receiver);
        self
    }
}

/// Parameters for redeeming a given amount of shares
#[derive(Debug, Clone)]
pub struct RedeemParams {
    pub shares: U256,
    /// Receiver of the assets (defaults to sender)
    pub receiver: Option<Address>,
}

impl RedeemParams {
    pub fn new(shares: U256) -> Self {
        Self {
            shares,
            receiver: None,
        }
    }

    pub fn to(mut self, receiver: Address) -> Self {
        self.receiver = Some(receiver);
        self
    }
}

/// An account's share balance and what it is worth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultPosition {
    pub shares: U256,
    /// Shares converted to underlying assets
    pub assets: U256,
}

impl VaultPosition {
    pub fn new(shares: U256, assets: U256) -> Self {
        Self { shares, assets }
    }

    /// Asset value in whole units of a token with `decimals`
    pub fn assets_f64(&self, decimals: u8) -> f64 {
        unscale_from_decimals(self.assets, decimals)
    }
}
