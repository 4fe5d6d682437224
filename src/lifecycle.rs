//! Transaction Lifecycle Manager - owns the transaction state machine
//!
//! Every transition is both state-gated and role-gated so neither party can
//! unilaterally advance past the other's required action. All
//! read-validate-write sequences run under the store's writer lock, so two
//! concurrent requests against the same transaction cannot both move it out
//! of the same source state: exactly one wins, the other observes
//! `InvalidTransition`.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::MarketResult;
use crate::{
    error::MarketError,
    escrow::EscrowIssuer,
    models::{AssetType, AuditEvent, Dispute, DisputeStatus, Resolution, Transaction, TransactionStatus},
    oracle::BalanceGate,
};

/// Configuration for the transaction manager
#[derive(Debug, Clone)]
pub struct TransactionManagerConfig {
    /// Upper bound on a single transaction amount
    pub max_amount: Decimal,
}

impl Default for TransactionManagerConfig {
    fn default() -> Self {
        Self {
            max_amount: Decimal::from(10_000),
        }
    }
}

/// Transaction creation request
#[derive(Debug, Clone)]
pub struct CreateTransactionRequest {
    pub listing_id: Uuid,
    pub buyer: String,
    pub seller: String,
    pub asset: AssetType,
    pub amount: Decimal,
}

/// Owns the transaction store and the 1:1 dispute store (disputes cascade
/// with their transaction, so both live behind the same component).
pub struct TransactionManager {
    config: TransactionManagerConfig,
    /// In-memory transaction storage (a database in production)
    transactions: RwLock<HashMap<Uuid, Transaction>>,
    /// In-memory dispute storage, keyed by dispute id
    disputes: RwLock<HashMap<Uuid, Dispute>>,
    /// Append-only audit trail
    events: RwLock<Vec<AuditEvent>>,
    /// Balance gate over the external oracle
    gate: BalanceGate,
    /// External fund custody
    issuer: Arc<dyn EscrowIssuer>,
}

impl TransactionManager {
    pub fn new(
        config: TransactionManagerConfig,
        gate: BalanceGate,
        issuer: Arc<dyn EscrowIssuer>,
    ) -> Self {
        Self {
            config,
            transactions: RwLock::new(HashMap::new()),
            disputes: RwLock::new(HashMap::new()),
            events: RwLock::new(Vec::new()),
            gate,
            issuer,
        }
    }

    /// Create a transaction in AWAITING_PAYMENT.
    ///
    /// Order matters: validate, consult the balance oracle, allocate the
    /// escrow handle, and only then persist. A crash between allocation and
    /// persistence orphans an external handle (reconcilable out of band) but
    /// never leaves a persisted transaction without custody backing it. No
    /// failure path persists partial state.
    pub async fn create(&self, request: CreateTransactionRequest) -> MarketResult<Transaction> {
        info!(
            listing = %request.listing_id,
            buyer = %request.buyer,
            seller = %request.seller,
            "creating transaction for {} {}",
            request.amount,
            request.asset
        );

        self.validate_create(&request)?;

        // Point-in-time check; a timeout is surfaced as such, never as
        // insufficient funds.
        self.gate
            .ensure_funds(&request.buyer, request.asset, request.amount)
            .await?;

        let handle = self
            .issuer
            .allocate(&request.buyer, &request.seller, request.amount, request.asset)
            .await
            .map_err(|e| match e {
                MarketError::EscrowAllocationFailed(_) => e,
                other => MarketError::allocation(other.to_string()),
            })?;

        let tx = Transaction::new(
            request.listing_id,
            request.buyer,
            request.seller,
            request.asset,
            request.amount,
            handle,
        );
        self.transactions.write().await.insert(tx.id, tx.clone());

        self.record_event(
            "transaction.created",
            Some(tx.id),
            None,
            Some(tx.buyer.clone()),
            Some(json!({
                "listing_id": tx.listing_id,
                "asset": tx.asset,
                "amount": tx.amount,
                "escrow_handle": tx.escrow_handle,
            })),
        )
        .await;

        info!("created transaction {} ({})", tx.id, tx.escrow_handle);

        Ok(tx)
    }

    /// Buyer pays into escrow: AWAITING_PAYMENT -> FUNDED
    pub async fn fund(&self, tx_id: Uuid, actor: &str) -> MarketResult<Transaction> {
        let tx = {
            let mut transactions = self.transactions.write().await;
            let tx = Self::get_mut(&mut transactions, tx_id)?;

            if !tx.is_buyer(actor) {
                return Err(MarketError::forbidden(actor, "fund this transaction"));
            }
            tx.validate_transition(TransactionStatus::Funded)?;

            tx.status = TransactionStatus::Funded;
            tx.updated_at = Utc::now();
            tx.clone()
        };

        self.record_event("transaction.funded", Some(tx_id), None, Some(actor.to_string()), None)
            .await;
        info!("funded transaction {}", tx_id);

        Ok(tx)
    }

    /// Seller ships the item: FUNDED -> AWAITING_DELIVERY
    pub async fn mark_shipped(&self, tx_id: Uuid, actor: &str) -> MarketResult<Transaction> {
        let tx = {
            let mut transactions = self.transactions.write().await;
            let tx = Self::get_mut(&mut transactions, tx_id)?;

            if !tx.is_seller(actor) {
                return Err(MarketError::forbidden(actor, "mark this transaction shipped"));
            }
            tx.validate_transition(TransactionStatus::AwaitingDelivery)?;

            tx.status = TransactionStatus::AwaitingDelivery;
            tx.updated_at = Utc::now();
            tx.clone()
        };

        self.record_event("transaction.shipped", Some(tx_id), None, Some(actor.to_string()), None)
            .await;
        info!("marked transaction {} shipped", tx_id);

        Ok(tx)
    }

    /// Buyer confirms receipt: AWAITING_DELIVERY -> DELIVERED, then the held
    /// amount is released to the seller. This is the only point funds leave
    /// escrow on the happy path.
    pub async fn confirm_delivery(&self, tx_id: Uuid, actor: &str) -> MarketResult<Transaction> {
        let seller = {
            let mut transactions = self.transactions.write().await;
            let tx = Self::get_mut(&mut transactions, tx_id)?;

            if !tx.is_buyer(actor) {
                return Err(MarketError::forbidden(actor, "confirm delivery"));
            }
            tx.validate_transition(TransactionStatus::Delivered)?;

            tx.status = TransactionStatus::Delivered;
            tx.updated_at = Utc::now();
            tx.seller.clone()
        };

        self.record_event(
            "transaction.delivered",
            Some(tx_id),
            None,
            Some(actor.to_string()),
            None,
        )
        .await;

        // The transition above is single-shot, so this fires at most once per
        // transaction; the issuer tolerates replays (see retry_release).
        self.release_escrow(tx_id, &seller).await?;

        info!("confirmed delivery for transaction {}", tx_id);

        self.transaction(tx_id).await
    }

    /// Either party contests while awaiting delivery:
    /// AWAITING_DELIVERY -> DISPUTED, creating the transaction's one dispute.
    /// This is the only sanctioned path into DISPUTED.
    pub async fn open_dispute(
        &self,
        tx_id: Uuid,
        actor: &str,
        reason: &str,
    ) -> MarketResult<Transaction> {
        if reason.trim().is_empty() {
            return Err(MarketError::invalid_request("dispute reason cannot be empty"));
        }

        let (tx, dispute) = {
            let mut transactions = self.transactions.write().await;
            let mut disputes = self.disputes.write().await;
            let tx = Self::get_mut(&mut transactions, tx_id)?;

            if !tx.is_party(actor) {
                return Err(MarketError::forbidden(actor, "open a dispute"));
            }
            if tx.dispute_id.is_some() {
                return Err(MarketError::DisputeAlreadyExists(tx_id));
            }
            tx.validate_transition(TransactionStatus::Disputed)?;

            let dispute = Dispute::new(tx_id, reason.trim().to_string());
            tx.status = TransactionStatus::Disputed;
            tx.dispute_id = Some(dispute.id);
            tx.updated_at = Utc::now();
            disputes.insert(dispute.id, dispute.clone());
            (tx.clone(), dispute)
        };

        self.record_event(
            "dispute.opened",
            Some(tx_id),
            Some(dispute.id),
            Some(actor.to_string()),
            Some(json!({ "reason": dispute.reason })),
        )
        .await;
        warn!("opened dispute {} on transaction {}", dispute.id, tx_id);

        Ok(tx)
    }

    /// Finalize an adjudicated dispute: DISPUTED -> RESOLVED on the parent
    /// transaction, funds released to the winner. Invoked only by the
    /// dispute resolver; the dispute mutation and the transaction transition
    /// commit under the same critical section.
    pub(crate) async fn apply_resolution(
        &self,
        dispute_id: Uuid,
        resolution: Resolution,
        notes: Option<String>,
    ) -> MarketResult<(Dispute, Transaction)> {
        let (dispute, winner, tx_id) = {
            let mut transactions = self.transactions.write().await;
            let mut disputes = self.disputes.write().await;

            let dispute = disputes
                .get_mut(&dispute_id)
                .ok_or_else(|| MarketError::not_found("dispute", dispute_id))?;
            if dispute.status == DisputeStatus::Resolved {
                // Resolution is immutable once set
                return Err(MarketError::invalid_transition(
                    "RESOLVED",
                    "RESOLVED",
                    "dispute is already resolved",
                ));
            }

            let tx = Self::get_mut(&mut transactions, dispute.tx_id)?;
            tx.validate_transition(TransactionStatus::Resolved)?;

            let now = Utc::now();
            dispute.status = DisputeStatus::Resolved;
            dispute.resolution = Some(resolution);
            dispute.resolution_notes = notes;
            dispute.resolved_at = Some(now);

            tx.status = TransactionStatus::Resolved;
            tx.updated_at = now;

            (dispute.clone(), resolution.winner(tx).to_string(), tx.id)
        };

        self.record_event(
            "dispute.resolved",
            Some(tx_id),
            Some(dispute_id),
            None,
            Some(json!({ "resolution": resolution })),
        )
        .await;

        self.release_escrow(tx_id, &winner).await?;

        info!(
            "resolved transaction {} via dispute {} ({:?})",
            tx_id, dispute_id, resolution
        );

        Ok((dispute, self.transaction(tx_id).await?))
    }

    /// Replay the funds release for a transaction whose state already
    /// committed but whose release acknowledgment may have been lost. Safe
    /// under retry: the issuer is idempotent per handle+recipient.
    pub async fn retry_release(&self, tx_id: Uuid) -> MarketResult<Transaction> {
        let tx = self.transaction(tx_id).await?;
        let recipient = match tx.status {
            TransactionStatus::Delivered => tx.seller.clone(),
            TransactionStatus::Resolved => {
                let dispute_id = tx
                    .dispute_id
                    .ok_or_else(|| MarketError::internal("resolved transaction has no dispute"))?;
                let dispute = self.dispute(dispute_id).await?;
                let resolution = dispute.resolution.ok_or(MarketError::ResolutionRequired)?;
                resolution.winner(&tx).to_string()
            }
            other => {
                return Err(MarketError::invalid_transition(
                    other.as_str(),
                    other.as_str(),
                    "funds are only released from DELIVERED or RESOLVED",
                ));
            }
        };

        self.release_escrow(tx_id, &recipient).await?;
        self.transaction(tx_id).await
    }

    /// Get a transaction by id
    pub async fn transaction(&self, tx_id: Uuid) -> MarketResult<Transaction> {
        self.transactions
            .read()
            .await
            .get(&tx_id)
            .cloned()
            .ok_or_else(|| MarketError::not_found("transaction", tx_id))
    }

    /// Get a dispute by id
    pub async fn dispute(&self, dispute_id: Uuid) -> MarketResult<Dispute> {
        self.disputes
            .read()
            .await
            .get(&dispute_id)
            .cloned()
            .ok_or_else(|| MarketError::not_found("dispute", dispute_id))
    }

    /// Get the dispute attached to a transaction, if any
    pub async fn dispute_for(&self, tx_id: Uuid) -> MarketResult<Option<Dispute>> {
        let tx = self.transaction(tx_id).await?;
        match tx.dispute_id {
            Some(dispute_id) => Ok(Some(self.dispute(dispute_id).await?)),
            None => Ok(None),
        }
    }

    /// All transactions where the principal is buyer or seller
    pub async fn transactions_for(&self, principal: &str) -> Vec<Transaction> {
        self.transactions
            .read()
            .await
            .values()
            .filter(|tx| tx.is_party(principal))
            .cloned()
            .collect()
    }

    /// Audit events for one transaction, in append order
    pub async fn events_for(&self, tx_id: Uuid) -> Vec<AuditEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|event| event.tx_id == Some(tx_id))
            .cloned()
            .collect()
    }

    /// Release the escrow hold and record the recipient. Skips the issuer
    /// call entirely when this store already saw the acknowledgment.
    async fn release_escrow(&self, tx_id: Uuid, recipient: &str) -> MarketResult<()> {
        let handle = {
            let transactions = self.transactions.read().await;
            let tx = transactions
                .get(&tx_id)
                .ok_or_else(|| MarketError::not_found("transaction", tx_id))?;
            if tx
                .funds_released_to
                .as_deref()
                .is_some_and(|r| r.eq_ignore_ascii_case(recipient))
            {
                return Ok(());
            }
            tx.escrow_handle.clone()
        };

        self.issuer.release(&handle, recipient).await?;

        {
            let mut transactions = self.transactions.write().await;
            if let Some(tx) = transactions.get_mut(&tx_id) {
                tx.funds_released_to = Some(recipient.to_string());
                tx.updated_at = Utc::now();
            }
        }

        self.record_event(
            "escrow.released",
            Some(tx_id),
            None,
            None,
            Some(json!({ "recipient": recipient })),
        )
        .await;

        Ok(())
    }

    fn get_mut(
        transactions: &mut HashMap<Uuid, Transaction>,
        tx_id: Uuid,
    ) -> MarketResult<&mut Transaction> {
        transactions
            .get_mut(&tx_id)
            .ok_or_else(|| MarketError::not_found("transaction", tx_id))
    }

    fn validate_create(&self, request: &CreateTransactionRequest) -> MarketResult<()> {
        if request.buyer.trim().is_empty() {
            return Err(MarketError::invalid_request("buyer cannot be empty"));
        }
        if request.seller.trim().is_empty() {
            return Err(MarketError::invalid_request("seller cannot be empty"));
        }
        if request.buyer.eq_ignore_ascii_case(&request.seller) {
            return Err(MarketError::invalid_request(
                "buyer can't be the same as seller",
            ));
        }
        if request.amount <= Decimal::ZERO {
            return Err(MarketError::invalid_request(
                "amount must be greater than 0",
            ));
        }
        if request.amount > self.config.max_amount {
            return Err(MarketError::invalid_request(format!(
                "amount {} exceeds maximum {}",
                request.amount, self.config.max_amount
            )));
        }
        Ok(())
    }

    async fn record_event(
        &self,
        event_type: &str,
        tx_id: Option<Uuid>,
        dispute_id: Option<Uuid>,
        actor: Option<String>,
        detail: Option<serde_json::Value>,
    ) {
        self.events
            .write()
            .await
            .push(AuditEvent::new(event_type, tx_id, dispute_id, actor, detail));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::SimulatedIssuer;
    use crate::models::DisputeStatus;
    use crate::oracle::{BalanceGateConfig, StaticBalanceOracle};

    const BUYER: &str = "0xbuyer";
    const SELLER: &str = "0xseller";

    fn manager() -> (TransactionManager, Arc<SimulatedIssuer>) {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let oracle = StaticBalanceOracle::new()
            .with_balance(BUYER, AssetType::Eth, Decimal::from(100))
            .with_balance(BUYER, AssetType::Usdc, Decimal::from(500));
        let issuer = Arc::new(SimulatedIssuer::new());
        let gate = BalanceGate::new(Arc::new(oracle), BalanceGateConfig::default());
        let manager = TransactionManager::new(
            TransactionManagerConfig::default(),
            gate,
            Arc::clone(&issuer) as Arc<dyn EscrowIssuer>,
        );
        (manager, issuer)
    }

    fn request(amount: Decimal) -> CreateTransactionRequest {
        CreateTransactionRequest {
            listing_id: Uuid::new_v4(),
            buyer: BUYER.to_string(),
            seller: SELLER.to_string(),
            asset: AssetType::Eth,
            amount,
        }
    }

    async fn create_shipped(manager: &TransactionManager) -> Transaction {
        let tx = manager.create(request(Decimal::ONE)).await.unwrap();
        manager.fund(tx.id, BUYER).await.unwrap();
        manager.mark_shipped(tx.id, SELLER).await.unwrap()
    }

    #[tokio::test]
    async fn create_starts_awaiting_payment_with_handle() {
        let (manager, issuer) = manager();
        let tx = manager.create(request(Decimal::ONE)).await.unwrap();

        assert_eq!(tx.status, TransactionStatus::AwaitingPayment);
        assert!(tx.escrow_handle.starts_with("escrow_"));
        assert!(issuer.hold(&tx.escrow_handle).await.is_some());

        let other = manager.create(request(Decimal::ONE)).await.unwrap();
        assert_ne!(tx.escrow_handle, other.escrow_handle);
    }

    #[tokio::test]
    async fn create_rejects_structural_violations() {
        let (manager, _) = manager();

        let mut same_parties = request(Decimal::ONE);
        same_parties.seller = BUYER.to_string();
        let err = manager.create(same_parties).await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransactionRequest(_)));

        let err = manager.create(request(Decimal::ZERO)).await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransactionRequest(_)));
    }

    #[tokio::test]
    async fn create_with_shortfall_persists_nothing() {
        let (manager, _) = manager();

        let mut broke = request(Decimal::from(1_000));
        broke.buyer = "0xpauper".to_string();
        let err = manager.create(broke).await.unwrap_err();
        assert!(matches!(err, MarketError::InsufficientFunds { .. }));
        assert!(manager.transactions_for("0xpauper").await.is_empty());
    }

    #[tokio::test]
    async fn allocation_failure_persists_nothing() {
        struct RefusingIssuer;

        #[async_trait::async_trait]
        impl EscrowIssuer for RefusingIssuer {
            async fn allocate(
                &self,
                _buyer: &str,
                _seller: &str,
                _amount: Decimal,
                _asset: AssetType,
            ) -> MarketResult<String> {
                Err(MarketError::allocation("issuer offline"))
            }

            async fn release(&self, _handle: &str, _recipient: &str) -> MarketResult<()> {
                unreachable!("nothing was allocated")
            }
        }

        let oracle = StaticBalanceOracle::new().with_balance(BUYER, AssetType::Eth, Decimal::TEN);
        let manager = TransactionManager::new(
            TransactionManagerConfig::default(),
            BalanceGate::new(Arc::new(oracle), BalanceGateConfig::default()),
            Arc::new(RefusingIssuer),
        );

        let err = manager.create(request(Decimal::ONE)).await.unwrap_err();
        assert!(matches!(err, MarketError::EscrowAllocationFailed(_)));
        assert!(err.is_retryable());
        assert!(manager.transactions_for(BUYER).await.is_empty());
    }

    #[tokio::test]
    async fn fund_is_buyer_only_and_single_shot() {
        let (manager, _) = manager();
        let tx = manager.create(request(Decimal::ONE)).await.unwrap();

        let err = manager.fund(tx.id, SELLER).await.unwrap_err();
        assert!(matches!(err, MarketError::Forbidden { .. }));
        assert_eq!(
            manager.transaction(tx.id).await.unwrap().status,
            TransactionStatus::AwaitingPayment
        );

        manager.fund(tx.id, BUYER).await.unwrap();

        // Direct second call: already FUNDED
        let err = manager.fund(tx.id, BUYER).await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
        assert_eq!(
            manager.transaction(tx.id).await.unwrap().status,
            TransactionStatus::Funded
        );
    }

    #[tokio::test]
    async fn ship_is_seller_only() {
        let (manager, _) = manager();
        let tx = manager.create(request(Decimal::ONE)).await.unwrap();
        manager.fund(tx.id, BUYER).await.unwrap();

        let err = manager.mark_shipped(tx.id, BUYER).await.unwrap_err();
        assert!(matches!(err, MarketError::Forbidden { .. }));

        let tx = manager.mark_shipped(tx.id, SELLER).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::AwaitingDelivery);
    }

    #[tokio::test]
    async fn confirm_delivery_is_buyer_only() {
        let (manager, issuer) = manager();
        let tx = create_shipped(&manager).await;

        let err = manager.confirm_delivery(tx.id, SELLER).await.unwrap_err();
        assert!(matches!(err, MarketError::Forbidden { .. }));

        // State untouched, funds still held
        let tx = manager.transaction(tx.id).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::AwaitingDelivery);
        assert!(issuer.hold(&tx.escrow_handle).await.unwrap().released_to.is_none());
    }

    #[tokio::test]
    async fn no_shortcut_to_delivered() {
        let (manager, _) = manager();
        let tx = manager.create(request(Decimal::ONE)).await.unwrap();

        let err = manager.confirm_delivery(tx.id, BUYER).await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
        assert_eq!(
            manager.transaction(tx.id).await.unwrap().status,
            TransactionStatus::AwaitingPayment
        );
    }

    #[tokio::test]
    async fn confirm_delivery_releases_to_seller_once() {
        let (manager, issuer) = manager();
        let tx = create_shipped(&manager).await;

        let tx = manager.confirm_delivery(tx.id, BUYER).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Delivered);
        assert_eq!(tx.funds_released_to.as_deref(), Some(SELLER));

        let hold = issuer.hold(&tx.escrow_handle).await.unwrap();
        assert_eq!(hold.released_to.as_deref(), Some(SELLER));

        // Replaying the release changes nothing
        let tx = manager.retry_release(tx.id).await.unwrap();
        assert_eq!(tx.funds_released_to.as_deref(), Some(SELLER));
    }

    #[tokio::test]
    async fn retry_release_needs_a_settled_state() {
        let (manager, _) = manager();
        let tx = manager.create(request(Decimal::ONE)).await.unwrap();

        let err = manager.retry_release(tx.id).await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn open_dispute_gates_and_creates_one_dispute() {
        let (manager, _) = manager();
        let tx = create_shipped(&manager).await;

        let err = manager
            .open_dispute(tx.id, "0xstranger", "not my deal")
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden { .. }));

        let err = manager.open_dispute(tx.id, BUYER, "   ").await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransactionRequest(_)));

        let tx = manager
            .open_dispute(tx.id, BUYER, "item not as described")
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Disputed);

        let dispute = manager.dispute_for(tx.id).await.unwrap().unwrap();
        assert_eq!(dispute.status, DisputeStatus::Open);
        assert_eq!(dispute.reason, "item not as described");
        assert!(dispute.resolution.is_none());

        // At most one dispute, ever
        let err = manager
            .open_dispute(tx.id, SELLER, "counter-complaint")
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::DisputeAlreadyExists(id) if id == tx.id));
    }

    #[tokio::test]
    async fn dispute_only_from_awaiting_delivery() {
        let (manager, _) = manager();
        let tx = manager.create(request(Decimal::ONE)).await.unwrap();

        let err = manager
            .open_dispute(tx.id, BUYER, "cold feet")
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn apply_resolution_refunds_the_buyer() {
        let (manager, issuer) = manager();
        let tx = create_shipped(&manager).await;
        let tx = manager
            .open_dispute(tx.id, BUYER, "item not as described")
            .await
            .unwrap();
        let dispute_id = tx.dispute_id.unwrap();

        let (dispute, tx) = manager
            .apply_resolution(dispute_id, Resolution::BuyerWins, Some("refund".into()))
            .await
            .unwrap();
        assert_eq!(dispute.status, DisputeStatus::Resolved);
        assert_eq!(dispute.resolution, Some(Resolution::BuyerWins));
        assert_eq!(tx.status, TransactionStatus::Resolved);
        assert_eq!(tx.funds_released_to.as_deref(), Some(BUYER));
        assert_eq!(
            issuer.hold(&tx.escrow_handle).await.unwrap().released_to.as_deref(),
            Some(BUYER)
        );

        // Resolution is immutable once set
        let err = manager
            .apply_resolution(dispute_id, Resolution::SellerWins, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn concurrent_confirm_and_dispute_have_one_winner() {
        let (manager, _) = manager();
        let tx = create_shipped(&manager).await;

        let (confirmed, disputed) = tokio::join!(
            manager.confirm_delivery(tx.id, BUYER),
            manager.open_dispute(tx.id, SELLER, "buyer is ghosting"),
        );

        assert!(
            confirmed.is_ok() != disputed.is_ok(),
            "exactly one of the racing transitions must win"
        );
        let status = manager.transaction(tx.id).await.unwrap().status;
        assert!(matches!(
            status,
            TransactionStatus::Delivered | TransactionStatus::Disputed
        ));
    }

    #[tokio::test]
    async fn audit_trail_follows_the_lifecycle() {
        let (manager, _) = manager();
        let tx = create_shipped(&manager).await;
        manager.confirm_delivery(tx.id, BUYER).await.unwrap();

        let events: Vec<String> = manager
            .events_for(tx.id)
            .await
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            events,
            vec![
                "transaction.created",
                "transaction.funded",
                "transaction.shipped",
                "transaction.delivered",
                "escrow.released",
            ]
        );
    }

    #[tokio::test]
    async fn transactions_for_matches_either_side() {
        let (manager, _) = manager();
        let tx = manager.create(request(Decimal::ONE)).await.unwrap();

        assert_eq!(manager.transactions_for(BUYER).await.len(), 1);
        assert_eq!(manager.transactions_for(SELLER).await.len(), 1);
        assert!(manager.transactions_for("0xstranger").await.is_empty());
        assert_eq!(manager.transactions_for(BUYER).await[0].id, tx.id);
    }
}
