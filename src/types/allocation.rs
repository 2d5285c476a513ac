//! Allocation identifiers scoping caps and allocations inside a vault

use crate::contracts::MarketParams;
use alloy::primitives::{keccak256, Address, Bytes, B256};
use alloy::sol_types::SolValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an allocation bucket: `id = keccak256(data)`
///
/// Cap setters take the preimage `data`, cap getters take `id`, so both
/// travel together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocationId {
    pub id: B256,
    pub data: Bytes,
}

impl AllocationId {
    /// Build from an id preimage
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            id: keccak256(&data),
            data,
        }
    }

    /// Whole-adapter id, the only id of single-asset adapters
    pub fn adapter(adapter: Address) -> Self {
        Self::from_data(("this".to_string(), adapter).abi_encode_params())
    }

    /// One market of a multi-market adapter
    pub fn market(adapter: Address, market: &MarketParams) -> Self {
        let data = ("this/marketParams".to_string(), adapter, market.clone()).abi_encode_params();
        Self::from_data(data)
    }

    /// Exposure to a collateral token across markets
    pub fn collateral(token: Address) -> Self {
        Self::from_data(("collateralToken".to_string(), token).abi_encode_params())
    }
}

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
