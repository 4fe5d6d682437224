//! Dispute Resolver - adjudicates open disputes
//!
//! Owns the dispute sub-lifecycle rules: a dispute moves OPEN -> RESOLVED
//! exactly once, the resolution is binding and immutable, and only an
//! authorized arbiter may adjudicate. On success the resolver notifies the
//! transaction lifecycle manager, which finalizes the parent transaction and
//! releases the escrow to the winner.

use async_trait::async_trait;
use std::{collections::HashSet, sync::Arc};
use tracing::info;
use uuid::Uuid;

use crate::MarketResult;
use crate::{
    error::MarketError,
    lifecycle::TransactionManager,
    models::{Dispute, Resolution},
};

/// External authorization decision for dispute arbitration. The policy
/// itself (admin list, role service, on-chain registry) is out of core scope.
#[async_trait]
pub trait ArbiterPolicy: Send + Sync {
    async fn is_authorized_arbiter(&self, actor: &str) -> bool;
}

/// Allow-list policy over principal addresses
#[derive(Default)]
pub struct AllowListPolicy {
    arbiters: HashSet<String>,
}

impl AllowListPolicy {
    pub fn new<I, S>(arbiters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            arbiters: arbiters
                .into_iter()
                .map(|a| a.into().to_lowercase())
                .collect(),
        }
    }
}

#[async_trait]
impl ArbiterPolicy for AllowListPolicy {
    async fn is_authorized_arbiter(&self, actor: &str) -> bool {
        self.arbiters.contains(&actor.to_lowercase())
    }
}

/// Dispute resolution request
#[derive(Debug, Clone)]
pub struct ResolveDisputeRequest {
    pub dispute_id: Uuid,
    pub arbiter: String,
    /// Absent resolution fails with `ResolutionRequired`
    pub resolution: Option<Resolution>,
    pub notes: Option<String>,
}

/// Adjudication entry point
pub struct DisputeResolver {
    manager: Arc<TransactionManager>,
    policy: Arc<dyn ArbiterPolicy>,
}

impl DisputeResolver {
    pub fn new(manager: Arc<TransactionManager>, policy: Arc<dyn ArbiterPolicy>) -> Self {
        Self { manager, policy }
    }

    /// Resolve an open dispute with a binding outcome.
    ///
    /// Validation order: a winner must be named, the arbiter must be
    /// authorized, and the dispute must still be OPEN (an already-resolved
    /// dispute fails with `InvalidTransition`; its resolution never changes).
    pub async fn resolve(&self, request: ResolveDisputeRequest) -> MarketResult<Dispute> {
        let resolution = request.resolution.ok_or(MarketError::ResolutionRequired)?;

        if !self.policy.is_authorized_arbiter(&request.arbiter).await {
            return Err(MarketError::forbidden(
                request.arbiter.as_str(),
                "resolve a dispute",
            ));
        }

        let (dispute, tx) = self
            .manager
            .apply_resolution(request.dispute_id, resolution, request.notes)
            .await?;

        info!(
            arbiter = %request.arbiter,
            "dispute {} resolved ({:?}); transaction {} finalized",
            dispute.id,
            resolution,
            tx.id
        );

        Ok(dispute)
    }
}
