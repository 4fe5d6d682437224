//! Escrow Issuer - external fund custody behind a narrow interface
//!
//! The issuer allocates a unique escrow handle per transaction and later
//! releases custody to a recipient. The core only records the handle and the
//! final outcome; cryptographic settlement lives outside this crate. Release
//! is idempotent per handle+recipient so a crash between a state transition
//! and a confirmed release acknowledgment is recoverable by replaying the
//! release without double-paying.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

use crate::MarketResult;
use crate::{error::MarketError, models::AssetType};

/// External custody capability consumed by the lifecycle core
#[async_trait]
pub trait EscrowIssuer: Send + Sync {
    /// Allocate a unique handle holding `amount` of `asset` between the
    /// two principals. Called exactly once per transaction, before the
    /// transaction is persisted.
    async fn allocate(
        &self,
        buyer: &str,
        seller: &str,
        amount: Decimal,
        asset: AssetType,
    ) -> MarketResult<String>;

    /// Release held funds to `recipient`. Idempotent: replaying the same
    /// handle+recipient acknowledges without paying twice; a conflicting
    /// recipient for an already-released handle is an error.
    async fn release(&self, handle: &str, recipient: &str) -> MarketResult<()>;
}

/// Funds held under one escrow handle
#[derive(Debug, Clone)]
pub struct EscrowHold {
    pub buyer: String,
    pub seller: String,
    pub amount: Decimal,
    pub asset: AssetType,
    pub released_to: Option<String>,
}

/// In-memory issuer, swappable for a real custody contract without touching
/// the state machine
#[derive(Default)]
pub struct SimulatedIssuer {
    holds: RwLock<HashMap<String, EscrowHold>>,
}

impl SimulatedIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect a hold; test and reconciliation helper
    pub async fn hold(&self, handle: &str) -> Option<EscrowHold> {
        self.holds.read().await.get(handle).cloned()
    }
}

#[async_trait]
impl EscrowIssuer for SimulatedIssuer {
    async fn allocate(
        &self,
        buyer: &str,
        seller: &str,
        amount: Decimal,
        asset: AssetType,
    ) -> MarketResult<String> {
        if amount <= Decimal::ZERO {
            return Err(MarketError::allocation("amount must be greater than 0"));
        }

        let handle = format!("escrow_{}", hex::encode(rand::random::<[u8; 8]>()));
        self.holds.write().await.insert(
            handle.clone(),
            EscrowHold {
                buyer: buyer.to_string(),
                seller: seller.to_string(),
                amount,
                asset,
                released_to: None,
            },
        );

        info!(%handle, %asset, "allocated escrow hold for {} {}", amount, asset);

        Ok(handle)
    }

    async fn release(&self, handle: &str, recipient: &str) -> MarketResult<()> {
        let mut holds = self.holds.write().await;
        let hold = holds
            .get_mut(handle)
            .ok_or_else(|| MarketError::not_found("escrow hold", handle))?;

        match &hold.released_to {
            None => {
                hold.released_to = Some(recipient.to_string());
                info!(%handle, recipient, "released escrow hold");
                Ok(())
            }
            // Replay of the same release: acknowledge, do not pay again
            Some(prior) if prior.eq_ignore_ascii_case(recipient) => Ok(()),
            Some(prior) => Err(MarketError::internal(format!(
                "escrow hold {handle} already released to {prior}"
            ))),
        }
    }
}
