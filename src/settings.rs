//! Runtime configuration
//!
//! Layered settings: built-in defaults overridable through `MARKET_*`
//! environment variables (e.g. `MARKET_ORACLE_TIMEOUT_MS=500`). The loaded
//! settings fan out into the per-component config structs.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::MarketResult;
use crate::auth::ChallengeStoreConfig;
use crate::error::MarketError;
use crate::lifecycle::TransactionManagerConfig;
use crate::oracle::BalanceGateConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Bound on a single balance oracle call, milliseconds
    pub oracle_timeout_ms: u64,
    /// Maximum transaction amount, whole asset units
    pub max_amount: u64,
    /// Auth nonce lifetime, seconds
    pub nonce_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            oracle_timeout_ms: 3_000,
            max_amount: 10_000,
            nonce_ttl_secs: 300,
        }
    }
}

impl Settings {
    /// Load defaults overlaid with `MARKET_*` environment variables
    pub fn load() -> MarketResult<Self> {
        Self::load_from(config::Environment::with_prefix("MARKET").try_parsing(true))
    }

    fn load_from(env: config::Environment) -> MarketResult<Self> {
        let defaults = Settings::default();
        let loaded = config::Config::builder()
            .set_default("oracle_timeout_ms", defaults.oracle_timeout_ms)
            .map_err(|e| MarketError::config(e.to_string()))?
            .set_default("max_amount", defaults.max_amount)
            .map_err(|e| MarketError::config(e.to_string()))?
            .set_default("nonce_ttl_secs", defaults.nonce_ttl_secs)
            .map_err(|e| MarketError::config(e.to_string()))?
            .add_source(env)
            .build()
            .map_err(|e| MarketError::config(e.to_string()))?;

        loaded
            .try_deserialize()
            .map_err(|e| MarketError::config(e.to_string()))
    }

    pub fn balance_gate(&self) -> BalanceGateConfig {
        BalanceGateConfig {
            oracle_timeout_ms: self.oracle_timeout_ms,
        }
    }

    pub fn transaction_manager(&self) -> TransactionManagerConfig {
        TransactionManagerConfig {
            max_amount: Decimal::from(self.max_amount),
        }
    }

    pub fn challenge_store(&self) -> ChallengeStoreConfig {
        ChallengeStoreConfig {
            nonce_ttl_secs: self.nonce_ttl_secs,
        }
    }
}
