//! Core data models for the marketplace escrow system
//!
//! This module contains the transaction and dispute records, their state
//! machines, and the audit event type. Status and asset names serialize in
//! SCREAMING_SNAKE_CASE, matching the values persisted by the wider system.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::MarketResult;
use crate::error::MarketError;

/// Supported settlement assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    Eth,
    Usdc,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eth => "ETH",
            Self::Usdc => "USDC",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction state machine enum
///
/// Linear happy path with one escape hatch into dispute:
/// AWAITING_PAYMENT -> FUNDED -> AWAITING_DELIVERY -> DELIVERED
/// and AWAITING_DELIVERY -> DISPUTED -> RESOLVED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Created against an allocated escrow handle, awaiting buyer payment
    AwaitingPayment,
    /// Buyer paid into escrow
    Funded,
    /// Seller shipped, awaiting buyer confirmation
    AwaitingDelivery,
    /// Buyer confirmed receipt, funds released to seller
    Delivered,
    /// Under adjudication; normal progression suspended
    Disputed,
    /// Dispute adjudicated, funds released to the winner
    Resolved,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingPayment => "AWAITING_PAYMENT",
            Self::Funded => "FUNDED",
            Self::AwaitingDelivery => "AWAITING_DELIVERY",
            Self::Delivered => "DELIVERED",
            Self::Disputed => "DISPUTED",
            Self::Resolved => "RESOLVED",
        }
    }

    /// Check if this is a terminal state (no outgoing transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Resolved)
    }

    /// Check if this state allows opening a dispute
    pub fn can_dispute(&self) -> bool {
        matches!(self, Self::AwaitingDelivery)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispute state machine enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Open,
    Resolved,
}

/// Binding dispute outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    /// Escrowed funds refunded to the buyer
    BuyerWins,
    /// Escrowed funds paid to the seller
    SellerWins,
}

impl Resolution {
    /// The principal the escrow releases to under this outcome
    pub fn winner<'a>(&self, tx: &'a Transaction) -> &'a str {
        match self {
            Self::BuyerWins => &tx.buyer,
            Self::SellerWins => &tx.seller,
        }
    }
}

/// One purchase of one listing between exactly two distinct principals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    /// Opaque handle to the externally held funds; allocated exactly once
    /// at creation, unique across all transactions, never reassigned
    pub escrow_handle: String,
    pub listing_id: Uuid,
    pub buyer: String,
    pub seller: String,
    pub asset: AssetType,
    pub amount: Decimal,
    pub status: TransactionStatus,

    /// Zero-or-one dispute, created lazily via the dispute path only
    pub dispute_id: Option<Uuid>,
    /// Recipient of the escrow release, once it has been acknowledged
    pub funds_released_to: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction in AWAITING_PAYMENT against an allocated handle
    pub fn new(
        listing_id: Uuid,
        buyer: String,
        seller: String,
        asset: AssetType,
        amount: Decimal,
        escrow_handle: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            escrow_handle,
            listing_id,
            buyer,
            seller,
            asset,
            amount,
            status: TransactionStatus::AwaitingPayment,
            dispute_id: None,
            funds_released_to: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_buyer(&self, actor: &str) -> bool {
        self.buyer.eq_ignore_ascii_case(actor)
    }

    pub fn is_seller(&self, actor: &str) -> bool {
        self.seller.eq_ignore_ascii_case(actor)
    }

    /// Either party to the transaction
    pub fn is_party(&self, actor: &str) -> bool {
        self.is_buyer(actor) || self.is_seller(actor)
    }

    /// Validate a state transition against the machine's edges.
    /// Status never changes except through this table.
    pub fn validate_transition(&self, to: TransactionStatus) -> MarketResult<()> {
        use TransactionStatus::*;

        let valid = matches!(
            (self.status, to),
            (AwaitingPayment, Funded)
                | (Funded, AwaitingDelivery)
                | (AwaitingDelivery, Delivered)
                | (AwaitingDelivery, Disputed)
                | (Disputed, Resolved)
        );

        if valid {
            Ok(())
        } else {
            Err(MarketError::invalid_transition(
                self.status.as_str(),
                to.as_str(),
                "no such edge in the transaction lifecycle",
            ))
        }
    }
}

/// Adjudication record for exactly one transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: Uuid,
    /// Immutable reference to the parent transaction
    pub tx_id: Uuid,
    pub reason: String,
    pub status: DisputeStatus,
    /// Present if and only if status is RESOLVED; immutable once set
    pub resolution: Option<Resolution>,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    /// Create a new open dispute for a transaction
    pub fn new(tx_id: Uuid, reason: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx_id,
            reason,
            status: DisputeStatus::Open,
            resolution: None,
            resolution_notes: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}

/// Append-only audit record for lifecycle mutations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub event_type: String,
    pub tx_id: Option<Uuid>,
    pub dispute_id: Option<Uuid>,
    pub actor: Option<String>,
    pub detail: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        event_type: impl Into<String>,
        tx_id: Option<Uuid>,
        dispute_id: Option<Uuid>,
        actor: Option<String>,
        detail: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            tx_id,
            dispute_id,
            actor,
            detail,
            created_at: Utc::now(),
        }
    }
}
