//! Balance Oracle - external balance checks behind a bounded timeout
//!
//! The oracle answers "does principal P hold at least amount A of asset X".
//! It is an untrusted external dependency, so every call goes through
//! `BalanceGate`, which applies an explicit timeout and keeps a timeout
//! distinct from a negative balance answer. The check is point-in-time,
//! never a reservation: funds can still be insufficient at `fund` time, and
//! that failure belongs to the escrow side, not this gate.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::warn;

use crate::MarketResult;
use crate::{error::MarketError, models::AssetType};

/// External balance lookup
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    /// Whether `principal` holds at least `amount` of `asset`
    async fn check_balance(
        &self,
        principal: &str,
        asset: AssetType,
        amount: Decimal,
    ) -> MarketResult<bool>;
}

/// Configuration for the balance gate
#[derive(Debug, Clone)]
pub struct BalanceGateConfig {
    /// Upper bound on a single oracle call, in milliseconds
    pub oracle_timeout_ms: u64,
}

impl Default for BalanceGateConfig {
    fn default() -> Self {
        Self {
            oracle_timeout_ms: 3_000,
        }
    }
}

/// Timeout wrapper over any `BalanceOracle`
pub struct BalanceGate {
    config: BalanceGateConfig,
    oracle: Arc<dyn BalanceOracle>,
}

impl BalanceGate {
    pub fn new(oracle: Arc<dyn BalanceOracle>, config: BalanceGateConfig) -> Self {
        Self { config, oracle }
    }

    /// Precondition check for transaction creation.
    ///
    /// Returns `Ok(())` on a positive answer, `InsufficientFunds` on a
    /// negative one, and `OracleTimeout` if the oracle does not answer in
    /// time. A timeout must never be read as "insufficient funds".
    pub async fn ensure_funds(
        &self,
        principal: &str,
        asset: AssetType,
        amount: Decimal,
    ) -> MarketResult<()> {
        let bound = Duration::from_millis(self.config.oracle_timeout_ms);
        let check = self.oracle.check_balance(principal, asset, amount);

        match tokio::time::timeout(bound, check).await {
            Err(_) => {
                warn!(
                    principal,
                    %asset,
                    "balance oracle timed out after {} ms",
                    self.config.oracle_timeout_ms
                );
                Err(MarketError::OracleTimeout(self.config.oracle_timeout_ms))
            }
            Ok(Err(e)) => Err(e),
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(MarketError::InsufficientFunds {
                principal: principal.to_string(),
                asset,
                amount,
            }),
        }
    }
}

/// Deterministic in-memory oracle: a plain balance table per (principal, asset).
///
/// Any real wallet/chain query satisfies the same contract.
#[derive(Default)]
pub struct StaticBalanceOracle {
    balances: RwLock<HashMap<(String, AssetType), Decimal>>,
}

impl StaticBalanceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seeding for wiring and tests
    pub fn with_balance(mut self, principal: &str, asset: AssetType, amount: Decimal) -> Self {
        self.balances
            .get_mut()
            .insert((principal.to_lowercase(), asset), amount);
        self
    }

    pub async fn set_balance(&self, principal: &str, asset: AssetType, amount: Decimal) {
        self.balances
            .write()
            .await
            .insert((principal.to_lowercase(), asset), amount);
    }
}

#[async_trait]
impl BalanceOracle for StaticBalanceOracle {
    async fn check_balance(
        &self,
        principal: &str,
        asset: AssetType,
        amount: Decimal,
    ) -> MarketResult<bool> {
        let balances = self.balances.read().await;
        let held = balances
            .get(&(principal.to_lowercase(), asset))
            .copied()
            .unwrap_or(Decimal::ZERO);
        Ok(held >= amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowOracle;

    #[async_trait]
    impl BalanceOracle for SlowOracle {
        async fn check_balance(
            &self,
            _principal: &str,
            _asset: AssetType,
            _amount: Decimal,
        ) -> MarketResult<bool> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(true)
        }
    }

    struct BrokenOracle;

    #[async_trait]
    impl BalanceOracle for BrokenOracle {
        async fn check_balance(
            &self,
            _principal: &str,
            _asset: AssetType,
            _amount: Decimal,
        ) -> MarketResult<bool> {
            Err(MarketError::oracle_unavailable("rpc connection refused"))
        }
    }

    fn gate(oracle: Arc<dyn BalanceOracle>, timeout_ms: u64) -> BalanceGate {
        BalanceGate::new(
            oracle,
            BalanceGateConfig {
                oracle_timeout_ms: timeout_ms,
            },
        )
    }

    #[tokio::test]
    async fn sufficient_balance_passes() {
        let oracle = StaticBalanceOracle::new();
        oracle
            .set_balance("0xbuyer", AssetType::Eth, Decimal::from(5))
            .await;
        let gate = gate(Arc::new(oracle), 1_000);

        gate.ensure_funds("0xbuyer", AssetType::Eth, Decimal::ONE)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn shortfall_is_insufficient_funds() {
        let oracle = StaticBalanceOracle::new();
        oracle
            .set_balance("0xbuyer", AssetType::Usdc, Decimal::from(10))
            .await;
        let gate = gate(Arc::new(oracle), 1_000);

        let err = gate
            .ensure_funds("0xbuyer", AssetType::Usdc, Decimal::from(100))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InsufficientFunds { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unknown_principal_holds_nothing() {
        let gate = gate(Arc::new(StaticBalanceOracle::new()), 1_000);
        let err = gate
            .ensure_funds("0xghost", AssetType::Eth, Decimal::ONE)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn timeout_is_not_insufficient_funds() {
        let gate = gate(Arc::new(SlowOracle), 10);
        let err = gate
            .ensure_funds("0xbuyer", AssetType::Eth, Decimal::ONE)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::OracleTimeout(10)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn oracle_failure_passes_through() {
        let gate = gate(Arc::new(BrokenOracle), 1_000);
        let err = gate
            .ensure_funds("0xbuyer", AssetType::Eth, Decimal::ONE)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::OracleUnavailable(_)));
        assert!(err.is_retryable());
    }
}
