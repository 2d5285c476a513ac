//! Chain configuration for the vault SDK
//!
//! Factory addresses are threaded into every component at construction;
//! nothing is looked up from process-wide state.

use crate::constants::DEFAULT_POLL_INTERVAL_MS;
use crate::registry::AdapterKind;
use alloy::primitives::Address;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// The adapter types a product line supports, in lookup priority order,
/// and the factory that deploys each of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterFamily {
    /// Probe order for type-agnostic lookups
    pub priority: Vec<AdapterKind>,
    /// Factory address per adapter type
    #[serde(default)]
    pub factories: BTreeMap<AdapterKind, Address>,
}

impl Default for AdapterFamily {
    fn default() -> Self {
        Self::multi_protocol()
    }
}

impl AdapterFamily {
    /// Two-type line: Morpho vault V1 and Morpho market V1 adapters
    pub fn morpho() -> Self {
        Self {
            priority: vec![AdapterKind::MorphoVaultV1, AdapterKind::MorphoMarketV1],
            factories: BTreeMap::new(),
        }
    }

    /// Four-type line: ERC-4626, auto-compounding ERC-4626, Compound V3, Morpho market V1
    pub fn multi_protocol() -> Self {
        Self {
            priority: vec![
                AdapterKind::Erc4626,
                AdapterKind::Erc4626WithAutoCompoundRewards,
                AdapterKind::CompoundV3,
                AdapterKind::MorphoMarketV1,
            ],
            factories: BTreeMap::new(),
        }
    }

    /// Set the factory for an adapter type
    pub fn with_factory(mut self, kind: AdapterKind, factory: Address) -> Self {
        if !self.priority.contains(&kind) {
            self.priority.push(kind);
        }
        self.factories.insert(kind, factory);
        self
    }

    pub fn supports(&self, kind: AdapterKind) -> bool {
        self.priority.contains(&kind)
    }

    /// Factory for a supported type, if configured
    pub fn factory(&self, kind: AdapterKind) -> Option<Address> {
        if !self.supports(kind) {
            return None;
        }
        self.factories.get(&kind).copied()
    }

    /// Reverse lookup: which supported type a factory deploys
    pub fn kind_of_factory(&self, factory: Address) -> Option<AdapterKind> {
        self.priority
            .iter()
            .copied()
            .find(|kind| self.factories.get(kind) == Some(&factory))
    }
}

/// Network configuration containing the RPC URL and factory addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain ID
    pub chain_id: u64,
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Vault factory address
    pub vault_factory: Address,
    /// Adapter types and their factories
    #[serde(default)]
    pub adapters: AdapterFamily,
    /// How often to poll chain time while waiting out a timelock
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl ChainConfig {
    /// Create configuration for a chain with no adapter factories yet
    pub fn new(chain_id: u64, rpc_url: impl Into<String>, vault_factory: Address) -> Self {
        Self {
            chain_id,
            rpc_url: rpc_url.into(),
            vault_factory,
            adapters: AdapterFamily::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    /// Parse configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse chain configuration")
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read chain configuration {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Load configuration from environment variables (and `.env` if present)
    ///
    /// Reads `CHAIN_ID`, `RPC_URL`, `VAULT_FACTORY`, optional `ADAPTER_FAMILY`
    /// (`morpho` or `multi-protocol`), and one `<TYPE>_ADAPTER_FACTORY`
    /// per adapter type, e.g. `MORPHO_MARKET_V1_ADAPTER_FACTORY`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let chain_id = env_var("CHAIN_ID")?
            .parse()
            .context("CHAIN_ID must be an integer")?;
        let rpc_url = env_var("RPC_URL")?;
        let vault_factory = env_var("VAULT_FACTORY")?
            .parse()
            .context("VAULT_FACTORY must be an address")?;

        let mut adapters = match std::env::var("ADAPTER_FAMILY").as_deref() {
            Ok("morpho") => AdapterFamily::morpho(),
            Ok("multi-protocol") | Err(_) => AdapterFamily::multi_protocol(),
            Ok(other) => eyre::bail!("Unknown ADAPTER_FAMILY: {}", other),
        };
        for kind in adapters.priority.clone() {
            let key = format!("{}_ADAPTER_FACTORY", kind.env_prefix());
            if let Ok(value) = std::env::var(&key) {
                let factory: Address = value
                    .parse()
                    .with_context(|| format!("{} must be an address", key))?;
                adapters.factories.insert(kind, factory);
            }
        }

        let mut config = Self::new(chain_id, rpc_url, vault_factory).with_adapters(adapters);
        if let Ok(value) = std::env::var("TIMELOCK_POLL_INTERVAL_MS") {
            config.poll_interval_ms = value
                .parse()
                .context("TIMELOCK_POLL_INTERVAL_MS must be an integer")?;
        }
        Ok(config)
    }

    /// Create custom configuration with specific RPC URL
    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = rpc_url.into();
        self
    }

    /// Replace the adapter family
    pub fn with_adapters(mut self, adapters: AdapterFamily) -> Self {
        self.adapters = adapters;
        self
    }

    /// Set the factory for one adapter type
    pub fn with_adapter_factory(mut self, kind: AdapterKind, factory: Address) -> Self {
        self.adapters = self.adapters.with_factory(kind, factory);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{} environment variable must be set", key))
}
