//! Single-use download tokens.
//!
//! Tokens live in memory only. Each one names the file it unlocks, expires
//! after the store's TTL and can be consumed once. Expiry is checked when a
//! token is looked up; `spawn_sweeper` additionally clears stale entries in
//! the background.

use crate::errors::GatewayError;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub token: String,
    pub img: String,
    pub expires_at: Instant,
    pub used: bool,
}

impl TokenRecord {
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

#[derive(Clone)]
pub struct TokenStore {
    tokens: Arc<DashMap<String, TokenRecord>>,
    ttl: Duration,
    capacity: usize,
}

impl TokenStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            tokens: Arc::new(DashMap::new()),
            ttl,
            capacity,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Mint a fresh token for `img`.
    pub fn issue(&self, img: &str) -> Result<TokenRecord, GatewayError> {
        if self.tokens.len() >= self.capacity {
            let purged = self.purge_expired();
            if self.tokens.len() >= self.capacity {
                warn!(
                    capacity = self.capacity,
                    purged, "Token store full, refusing to issue"
                );
                return Err(GatewayError::TokenStoreFull);
            }
        }

        let record = TokenRecord {
            token: Uuid::new_v4().to_string(),
            img: img.to_string(),
            expires_at: Instant::now() + self.ttl,
            used: false,
        };
        self.tokens.insert(record.token.clone(), record.clone());

        Ok(record)
    }

    /// Check a token against `img` without consuming it.
    pub fn validate(&self, token: &str, img: &str) -> Result<(), GatewayError> {
        self.check(token, img, false)
    }

    /// Check a token against `img` and mark it used.
    /// Only one caller can ever get `Ok` for a given token.
    pub fn validate_and_consume(&self, token: &str, img: &str) -> Result<(), GatewayError> {
        self.check(token, img, true)
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }

    /// Drop every expired entry, returning how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.tokens.len();
        self.tokens.retain(|_, record| !record.is_expired_at(now));
        before.saturating_sub(self.tokens.len())
    }

    /// A zero interval never sweeps; the task only waits for `cancel`.
    pub fn spawn_sweeper(&self, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let store = self.clone();

        tokio::spawn(async move {
            if every.is_zero() {
                cancel.cancelled().await;
                return;
            }

            let mut ticker = tokio::time::interval(every);
            // first tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Token sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let purged = store.purge_expired();
                        if purged > 0 {
                            debug!(purged, remaining = store.len(), "Purged expired tokens");
                        }
                    }
                }
            }
        })
    }

    fn check(&self, token: &str, img: &str, consume: bool) -> Result<(), GatewayError> {
        let now = Instant::now();

        // Shard lock is held for the whole check, so consume is atomic
        let expired = {
            let mut record = self
                .tokens
                .get_mut(token)
                .ok_or(GatewayError::TokenNotFound)?;

            if record.is_expired_at(now) {
                true
            } else {
                if record.used {
                    return Err(GatewayError::TokenAlreadyUsed);
                }
                if record.img != img {
                    return Err(GatewayError::TokenFileMismatch);
                }
                if consume {
                    record.used = true;
                }
                false
            }
        };

        if expired {
            self.tokens.remove(token);
            return Err(GatewayError::TokenExpired);
        }

        Ok(())
    }
}

/// First few characters of a token, enough to correlate log lines.
pub fn short(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}
