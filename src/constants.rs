//! Constants and precision values for the vault SDK

use alloy::primitives::U256;

/// Relative caps and fees are WAD-scaled: 1e18 = 100%
pub const WAD_DECIMALS: u8 = 18;

/// 1e18
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Performance fee ceiling (50%)
pub const MAX_PERFORMANCE_FEE: U256 = U256::from_limbs([500_000_000_000_000_000, 0, 0, 0]);

/// Management fee ceiling (5% per year, expressed per second)
pub const MAX_MANAGEMENT_FEE: U256 = U256::from_limbs([1_585_489_599, 0, 0, 0]);

/// Default interval between chain-time polls while waiting out a timelock
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Scale a floating point value to U256 with specified decimals
pub fn scale_to_decimals(value: f64, decimals: u8) -> U256 {
    let multiplier = 10f64.powi(decimals as i32);
    let scaled = (value * multiplier) as u128;
    U256::from(scaled)
}

/// Unscale a U256 value to floating point with specified decimals
pub fn unscale_from_decimals(value: U256, decimals: u8) -> f64 {
    let divisor = 10f64.powi(decimals as i32);
    let value_u128: u128 = value.try_into().unwrap_or(u128::MAX);
    value_u128 as f64 / divisor
}

/// Relative cap (or fee) from a percentage, e.g. 30.0 -> 0.3e18
pub fn wad_from_percent(percent: f64) -> U256 {
    scale_to_decimals(percent, WAD_DECIMALS - 2)
}

/// Percentage from a WAD-scaled value
pub fn percent_from_wad(value: U256) -> f64 {
    unscale_from_decimals(value, WAD_DECIMALS) * 100.0
}

/// Saturating conversion for on-chain durations and timestamps
pub fn u256_to_u64(value: U256) -> u64 {
    value.try_into().unwrap_or(u64::MAX)
}
