//! Dashboard configuration

use alloy_primitives::{address, Address};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Contract addresses and admin for one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub chain_id: u64,
    pub name: String,
    /// Wallet granted the admin role on this network
    pub admin: Address,
    pub vault_factory: Address,
    pub usdc: Address,
    /// Absent in older configs; policy reads stay disabled without it
    #[serde(default)]
    pub policy_registry: Address,
    #[serde(default)]
    pub claim_receipt: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// JSON-RPC endpoint of the backing chain
    pub rpc_url: String,

    /// Network the session runs against
    pub chain_id: u64,

    /// Standard read polling interval in milliseconds
    pub poll_interval_ms: u64,

    /// High-frequency ticker interval in milliseconds
    pub ticker_interval_ms: u64,

    /// Age after which a cached read is reported stale
    pub staleness_ms: u64,

    /// Per-network addresses
    pub chains: Vec<ChainEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainAddresses {
    pub vault_factory: Address,
    pub usdc: Address,
    pub policy_registry: Address,
    pub claim_receipt: Address,
}

impl ChainAddresses {
    pub const ZERO: Self = Self {
        vault_factory: Address::ZERO,
        usdc: Address::ZERO,
        policy_registry: Address::ZERO,
        claim_receipt: Address::ZERO,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Investor,
}

/// Per-session view of the configuration, resolved once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainContext {
    pub chain_id: u64,
    pub admin: Address,
    pub addresses: ChainAddresses,
}

impl ChainContext {
    /// Role of the connected account, `None` when disconnected
    pub fn role(&self, account: Option<Address>) -> Option<Role> {
        let account = account?;
        if !self.admin.is_zero() && account == self.admin {
            Some(Role::Admin)
        } else {
            Some(Role::Investor)
        }
    }
}

const TESTNET_ADMIN: Address = address!("35cE744bc6b5CE979fA3251b8008b64C35aa8505");

impl Config {
    /// Load configuration from TOML file
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DASHBOARD_CONFIG")
            .unwrap_or_else(|_| "dashboard-config.toml".to_string());
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let expanded = shellexpand::tilde(path);
        let config_str = std::fs::read_to_string(expanded.as_ref())
            .context(format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse config TOML")?;

        Ok(config)
    }

    /// Create default configuration
    pub fn default_testnet() -> Self {
        Self {
            rpc_url: "https://sepolia.base.org".to_string(),
            chain_id: 84532,
            poll_interval_ms: 10_000,
            ticker_interval_ms: 1_000,
            staleness_ms: 30_000,
            chains: vec![
                ChainEntry {
                    chain_id: 84532,
                    name: "Base Sepolia".to_string(),
                    admin: TESTNET_ADMIN,
                    vault_factory: Address::ZERO,
                    usdc: Address::ZERO,
                    policy_registry: Address::ZERO,
                    claim_receipt: Address::ZERO,
                },
                ChainEntry {
                    chain_id: 11155111,
                    name: "Ethereum Sepolia".to_string(),
                    admin: TESTNET_ADMIN,
                    vault_factory: Address::ZERO,
                    usdc: Address::ZERO,
                    policy_registry: Address::ZERO,
                    claim_receipt: Address::ZERO,
                },
                ChainEntry {
                    chain_id: 5042002,
                    name: "Arc Testnet".to_string(),
                    admin: TESTNET_ADMIN,
                    vault_factory: Address::ZERO,
                    usdc: Address::ZERO,
                    policy_registry: Address::ZERO,
                    claim_receipt: Address::ZERO,
                },
            ],
        }
    }

    /// Write default config to file
    pub fn write_default(path: &str) -> Result<()> {
        let config = Self::default_testnet();
        let toml_str = toml::to_string_pretty(&config)
            .context("Failed to serialize config")?;

        std::fs::write(path, toml_str)
            .context(format!("Failed to write config to {}", path))?;

        log::info!("Created default config at {}", path);
        Ok(())
    }

    /// Addresses for a network; unknown networks resolve to zero addresses,
    /// which keeps every address-gated query disabled.
    pub fn resolve(&self, chain_id: u64) -> ChainContext {
        match self.chains.iter().find(|c| c.chain_id == chain_id) {
            Some(entry) => ChainContext {
                chain_id,
                admin: entry.admin,
                addresses: ChainAddresses {
                    vault_factory: entry.vault_factory,
                    usdc: entry.usdc,
                    policy_registry: entry.policy_registry,
                    claim_receipt: entry.claim_receipt,
                },
            },
            None => {
                log::warn!("No addresses configured for chain {}", chain_id);
                ChainContext {
                    chain_id,
                    admin: Address::ZERO,
                    addresses: ChainAddresses::ZERO,
                }
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ticker_interval(&self) -> Duration {
        Duration::from_millis(self.ticker_interval_ms)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_millis(self.staleness_ms)
    }
}
