//! Runtime configuration assembled from the environment.

use alloy::primitives::Address;
use std::env;
use std::str::FromStr;

pub const BASE_MAINNET: u64 = 8453;
pub const BASE_SEPOLIA: u64 = 84532;

pub const USDC_BASE_MAINNET: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
pub const USDC_BASE_SEPOLIA: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";

/// EIP-712 domain of the USDC token contract.
pub const USDC_DOMAIN_NAME: &str = "USD Coin";
pub const USDC_DOMAIN_VERSION: &str = "2";

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(name) => write!(f, "{} must be set", name),
            ConfigError::Invalid(name, value) => write!(f, "invalid {}: {}", name, value),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Active chain parameters shared by the oracle and both settlement strategies.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Network key used by the facilitator and deposit-address lookups.
    pub network: &'static str,
    pub usdc: Address,
}

impl ChainConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let is_mainnet = env::var("CHAIN_ENV").map(|v| v == "mainnet").unwrap_or(false);
        let (chain_id, network, usdc) = if is_mainnet {
            (BASE_MAINNET, "base", USDC_BASE_MAINNET)
        } else {
            (BASE_SEPOLIA, "base-sepolia", USDC_BASE_SEPOLIA)
        };
        let usdc = Address::from_str(usdc)
            .map_err(|e| ConfigError::Invalid("USDC address", e.to_string()))?;
        Ok(Self { chain_id, network, usdc })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementMode {
    Facilitator,
    Stripe,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rpc_url: String,
    pub engine_url: String,
    pub engine_secret: String,
    pub chain: ChainConfig,
    pub settlement_mode: SettlementMode,
    pub facilitator_url: Option<String>,
    pub settlement_address: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_account_id: Option<String>,
    pub shop_domain: String,
    pub shop_access_token: String,
    pub shop_storefront_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let settlement_mode = match env::var("SETTLEMENT_MODE").as_deref() {
            Ok("stripe") => SettlementMode::Stripe,
            Ok("facilitator") | Err(_) => SettlementMode::Facilitator,
            Ok(other) => {
                return Err(ConfigError::Invalid("SETTLEMENT_MODE", other.to_string()));
            }
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            rpc_url: env::var("RPC_URL").map_err(|_| ConfigError::Missing("RPC_URL"))?,
            engine_url: env::var("ENGINE_URL").map_err(|_| ConfigError::Missing("ENGINE_URL"))?,
            engine_secret: env::var("ENGINE_SECRET")
                .map_err(|_| ConfigError::Missing("ENGINE_SECRET"))?,
            chain: ChainConfig::from_env()?,
            settlement_mode,
            facilitator_url: env::var("FACILITATOR_URL").ok(),
            settlement_address: env::var("SETTLEMENT_ADDRESS").ok(),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").ok(),
            stripe_account_id: env::var("STRIPE_ACCOUNT_ID").ok(),
            shop_domain: env::var("SHOP_DOMAIN").map_err(|_| ConfigError::Missing("SHOP_DOMAIN"))?,
            shop_access_token: env::var("SHOP_ACCESS_TOKEN")
                .map_err(|_| ConfigError::Missing("SHOP_ACCESS_TOKEN"))?,
            shop_storefront_token: env::var("SHOP_STOREFRONT_TOKEN").ok(),
        })
    }

    pub fn store_url(&self) -> String {
        format!("https://{}", self.shop_domain)
    }
}
