//! Error types for the marketplace core
//!
//! Every failure carries its taxonomy kind so a caller can distinguish
//! "retry once the world changes" (balance topped up, issuer back online)
//! from "this will never succeed with these actors". None of the
//! state-machine errors are retried automatically.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::AssetType;

/// Main error type for marketplace operations
#[derive(Error, Debug)]
pub enum MarketError {
    /// Structural validation failures: malformed input, buyer == seller,
    /// non-positive amount
    #[error("Invalid transaction request: {0}")]
    InvalidTransactionRequest(String),

    /// Oracle-reported shortfall; recoverable by the user (e.g. top-up)
    #[error("Insufficient funds: {principal} holds less than {amount} {asset}")]
    InsufficientFunds {
        principal: String,
        asset: AssetType,
        amount: Decimal,
    },

    /// The escrow issuer could not allocate a handle; no transaction is
    /// persisted, so the caller may retry
    #[error("Escrow allocation failed: {0}")]
    EscrowAllocationFailed(String),

    /// State-gate violation: the requested operation does not apply to the
    /// entity's current state
    #[error("Invalid state transition: {from} -> {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// Role-gate violation: the actor lacks standing for this operation
    #[error("Forbidden: {actor} may not {action}")]
    Forbidden { actor: String, action: String },

    /// A transaction owns at most one dispute, ever
    #[error("A dispute already exists for transaction {0}")]
    DisputeAlreadyExists(Uuid),

    /// Resolving a dispute without naming a winner
    #[error("A resolution is required to resolve a dispute")]
    ResolutionRequired,

    /// The balance oracle did not answer within the bound. Distinct from
    /// `InsufficientFunds`: a timeout says nothing about the balance.
    #[error("Balance oracle timed out after {0} ms")]
    OracleTimeout(u64),

    /// The balance oracle failed outright
    #[error("Balance oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// Entity lookup failure
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MarketError {
    /// Create a structural validation error
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTransactionRequest(msg.into())
    }

    /// Create a state transition error
    pub fn invalid_transition<S: Into<String>>(from: S, to: S, reason: S) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }

    /// Create a role-gate error
    pub fn forbidden<S: Into<String>>(actor: S, action: S) -> Self {
        Self::Forbidden {
            actor: actor.into(),
            action: action.into(),
        }
    }

    /// Create an allocation error
    pub fn allocation<S: Into<String>>(msg: S) -> Self {
        Self::EscrowAllocationFailed(msg.into())
    }

    /// Create a lookup error
    pub fn not_found<S: ToString>(kind: &'static str, id: S) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create an oracle transport error
    pub fn oracle_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::OracleUnavailable(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// External-dependency failures are safe to retry because `create`
    /// performs no partial persistence on failure. State-machine and
    /// validation errors only succeed after the underlying condition changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EscrowAllocationFailed(_) | Self::OracleTimeout(_) | Self::OracleUnavailable(_)
        )
    }
}
