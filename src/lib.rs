//! Vault V2 SDK for Rust
//!
//! A Rust SDK for curating timelocked multi-adapter lending vaults.
//!
//! # Features
//!
//! - Submit, wait out and execute timelocked governance changes
//! - Find or deploy adapters through their factories
//! - Converge allocation caps (decreases now, increases through the timelock)
//! - Read a full vault snapshot that degrades per adapter
//! - Deposit, withdraw, redeem and allocate
//!
//! # Example
//!
//! ```rust,ignore
//! use vault_v2_sdk::{AdapterKind, ChainConfig, ExecutionMode, LocalSigner, VaultClient};
//! use vault_v2_sdk::constants::wad_from_percent;
//!
//! #[tokio::main]
//! async fn main() -> eyre::Result<()> {
//!     let config = ChainConfig::from_env()?;
//!     let signer = LocalSigner::from_private_key("0x...", &config.rpc_url).await?;
//!     let client = VaultClient::new(signer, config);
//!
//!     let vault = "0x...".parse()?;
//!     let morpho_vault = "0x...".parse()?;
//!
//!     // Enable an adapter and cap it at 50% of the vault
//!     let (adapter, _) = client
//!         .enable_adapter(
//!             vault,
//!             AdapterKind::MorphoVaultV1,
//!             morpho_vault,
//!             None,
//!             ExecutionMode::WaitAndExecute,
//!         )
//!         .await?;
//!     client
//!         .set_adapter_caps(
//!             vault,
//!             adapter.address,
//!             adapter.kind,
//!             None,
//!             Some(wad_from_percent(50.0)),
//!             None,
//!             ExecutionMode::WaitAndExecute,
//!         )
//!         .await?;
//!
//!     println!("{}", client.snapshot(vault).await?);
//!     Ok(())
//! }
//! ```

pub mod caps;
pub mod client;
pub mod config;
pub mod constants;
pub mod contracts;
pub mod error;
pub mod executor;
pub mod registry;
pub mod signer;
pub mod snapshot;
pub mod timelock;
pub mod types;

#[cfg(test)]
mod mock;

// Re-export main types for convenience
pub use caps::{CapOutcome, CapResolution, CapResolver, CapTarget, Caps};
pub use client::VaultClient;
pub use config::{AdapterFamily, ChainConfig};
pub use error::{eyre, Context, Report, Result, RevertReason, VaultError};
pub use executor::CallExecutor;
pub use registry::{AdapterKind, AdapterRegistry, DeployedAdapter};
pub use signer::{LocalSigner, TransactionSigner, TxReceipt, TxRequest};
pub use snapshot::{SnapshotReader, VaultSnapshot};
pub use timelock::{
    ApplyOutcome, ApplyPath, ExecutionMode, GovernedFunction, PendingChange, Timelock,
};
pub use types::{AllocationId, DepositParams, RedeemParams, VaultPosition, WithdrawParams};
