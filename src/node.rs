//! Marketplace facade - wires the components together
//!
//! One construction point for the escrow core: balance gate over the caller's
//! oracle, escrow issuer, transaction lifecycle manager, dispute resolver,
//! and the wallet-auth challenge store. The marketplace API surface consumes
//! this and nothing deeper.

use std::sync::Arc;
use uuid::Uuid;

use crate::MarketResult;
use crate::{
    auth::{ChallengeStore, ChallengeStoreConfig},
    dispute::{ArbiterPolicy, DisputeResolver, ResolveDisputeRequest},
    escrow::EscrowIssuer,
    lifecycle::{CreateTransactionRequest, TransactionManager, TransactionManagerConfig},
    models::{AuditEvent, Dispute, Transaction},
    oracle::{BalanceGate, BalanceGateConfig, BalanceOracle},
    settings::Settings,
};

/// Configuration for the marketplace core
#[derive(Debug, Clone, Default)]
pub struct MarketplaceConfig {
    pub gate: BalanceGateConfig,
    pub manager: TransactionManagerConfig,
    pub challenges: ChallengeStoreConfig,
}

impl MarketplaceConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            gate: settings.balance_gate(),
            manager: settings.transaction_manager(),
            challenges: settings.challenge_store(),
        }
    }
}

/// The escrow-backed marketplace core
pub struct Marketplace {
    manager: Arc<TransactionManager>,
    resolver: DisputeResolver,
    challenges: ChallengeStore,
}

impl Marketplace {
    pub fn new(
        config: MarketplaceConfig,
        oracle: Arc<dyn BalanceOracle>,
        issuer: Arc<dyn EscrowIssuer>,
        arbiters: Arc<dyn ArbiterPolicy>,
    ) -> Self {
        let gate = BalanceGate::new(oracle, config.gate);
        let manager = Arc::new(TransactionManager::new(config.manager, gate, issuer));
        let resolver = DisputeResolver::new(Arc::clone(&manager), arbiters);

        Self {
            manager,
            resolver,
            challenges: ChallengeStore::new(config.challenges),
        }
    }

    // Transaction lifecycle

    pub async fn create_transaction(
        &self,
        request: CreateTransactionRequest,
    ) -> MarketResult<Transaction> {
        self.manager.create(request).await
    }

    pub async fn fund(&self, tx_id: Uuid, actor: &str) -> MarketResult<Transaction> {
        self.manager.fund(tx_id, actor).await
    }

    pub async fn mark_shipped(&self, tx_id: Uuid, actor: &str) -> MarketResult<Transaction> {
        self.manager.mark_shipped(tx_id, actor).await
    }

    pub async fn confirm_delivery(&self, tx_id: Uuid, actor: &str) -> MarketResult<Transaction> {
        self.manager.confirm_delivery(tx_id, actor).await
    }

    pub async fn open_dispute(
        &self,
        tx_id: Uuid,
        actor: &str,
        reason: &str,
    ) -> MarketResult<Transaction> {
        self.manager.open_dispute(tx_id, actor, reason).await
    }

    pub async fn retry_release(&self, tx_id: Uuid) -> MarketResult<Transaction> {
        self.manager.retry_release(tx_id).await
    }

    // Dispute resolution

    pub async fn resolve_dispute(&self, request: ResolveDisputeRequest) -> MarketResult<Dispute> {
        self.resolver.resolve(request).await
    }

    // Queries

    pub async fn transaction(&self, tx_id: Uuid) -> MarketResult<Transaction> {
        self.manager.transaction(tx_id).await
    }

    pub async fn dispute(&self, dispute_id: Uuid) -> MarketResult<Dispute> {
        self.manager.dispute(dispute_id).await
    }

    pub async fn dispute_for(&self, tx_id: Uuid) -> MarketResult<Option<Dispute>> {
        self.manager.dispute_for(tx_id).await
    }

    pub async fn transactions_for(&self, principal: &str) -> Vec<Transaction> {
        self.manager.transactions_for(principal).await
    }

    pub async fn events_for(&self, tx_id: Uuid) -> Vec<AuditEvent> {
        self.manager.events_for(tx_id).await
    }

    // Wallet authentication

    pub async fn auth_challenge(&self, address: &str) -> String {
        self.challenges.issue(address).await
    }

    pub async fn auth_verify(&self, address: &str, nonce: &str) -> bool {
        self.challenges.consume(address, nonce).await
    }
}
