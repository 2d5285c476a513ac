//! Contract bindings for the vault, its factory, and its adapters

pub mod adapters;
pub mod erc20;
pub mod vault;

pub use adapters::*;
pub use erc20::*;
pub use vault::*;
