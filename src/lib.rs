//! Escrow-backed transaction core for a peer-to-peer marketplace
//!
//! This crate implements the application-level record of an escrowed purchase:
//! - A role- and state-gated transaction lifecycle (payment, shipping,
//!   delivery confirmation) ending in funds release
//! - A single-dispute-per-transaction adjudication flow with a binding,
//!   immutable resolution
//! - A balance gate over an external oracle, with a bounded timeout
//! - An abstract escrow issuer so the core is testable without live custody

pub mod auth;
pub mod dispute;
pub mod error;
pub mod escrow;
pub mod lifecycle;
pub mod models;
pub mod node;
pub mod oracle;
pub mod settings;

use error::MarketError;

/// Result type alias for marketplace operations
pub type MarketResult<T> = Result<T, MarketError>;
