//! Wallet authentication challenges
//!
//! Ephemeral nonce store for the stateless challenge-response flow: a wallet
//! requests a nonce for its address, signs it, and the signature is verified
//! elsewhere. Nonces are keyed by lowercased address, expire after a fixed
//! TTL, and are consumed on first use. Signature recovery itself is outside
//! this crate.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

/// Configuration for the challenge store
#[derive(Debug, Clone)]
pub struct ChallengeStoreConfig {
    /// Nonce lifetime in seconds
    pub nonce_ttl_secs: u64,
}

impl Default for ChallengeStoreConfig {
    fn default() -> Self {
        Self {
            nonce_ttl_secs: 300, // 5 minutes
        }
    }
}

#[derive(Debug, Clone)]
struct Challenge {
    nonce: String,
    expires_at: DateTime<Utc>,
}

/// Keyed, expiring, single-use nonce state
pub struct ChallengeStore {
    config: ChallengeStoreConfig,
    challenges: RwLock<HashMap<String, Challenge>>,
}

impl ChallengeStore {
    pub fn new(config: ChallengeStoreConfig) -> Self {
        Self {
            config,
            challenges: RwLock::new(HashMap::new()),
        }
    }

    /// Issue a fresh nonce for an address, replacing any outstanding one
    pub async fn issue(&self, address: &str) -> String {
        let nonce = hex::encode(rand::random::<[u8; 16]>());
        let expires_at = Utc::now() + Duration::seconds(self.config.nonce_ttl_secs as i64);

        let mut challenges = self.challenges.write().await;
        challenges.retain(|_, c| c.expires_at > Utc::now());
        challenges.insert(
            address.to_lowercase(),
            Challenge {
                nonce: nonce.clone(),
                expires_at,
            },
        );

        info!(address, "issued auth challenge");

        nonce
    }

    /// Check a presented nonce against the outstanding challenge for the
    /// address. A match consumes the challenge; expired or mismatched nonces
    /// fail without side effects.
    pub async fn consume(&self, address: &str, nonce: &str) -> bool {
        let key = address.to_lowercase();
        let mut challenges = self.challenges.write().await;

        let valid = challenges
            .get(&key)
            .is_some_and(|c| c.nonce == nonce && c.expires_at > Utc::now());
        if valid {
            challenges.remove(&key);
        }
        valid
    }
}

impl Default for ChallengeStore {
    fn default() -> Self {
        Self::new(ChallengeStoreConfig::default())
    }
}
