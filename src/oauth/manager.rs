//! Token cache manager
//!
//! Keeps the process-wide service token in the TTL cache and refreshes it
//! through the client-credentials grant on a miss. The cached lifetime is
//! 60 seconds shorter than the token's declared expiry so the broker never
//! presents a token the backend is about to reject. Concurrent callers may
//! race on a miss; duplicate refreshes are tolerated.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::client::{Token, TokenClient};
use crate::Result;
use crate::cache::TtlCache;

/// Fixed cache key for the service token, shared across all requests
const TOKEN_CACHE_KEY: &str = "token";

/// Safety margin subtracted from the declared token expiry
const EXPIRY_MARGIN_SECS: u64 = 60;

/// Source of fresh service tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Obtain a new token via the client-credentials grant
    async fn client_credentials(&self) -> Result<Token>;
}

#[async_trait]
impl TokenProvider for TokenClient {
    async fn client_credentials(&self) -> Result<Token> {
        TokenClient::client_credentials(self).await
    }
}

/// Caches the service access token, refreshing transparently on miss
pub struct TokenManager {
    provider: Arc<dyn TokenProvider>,
    cache: Arc<TtlCache>,
}

impl TokenManager {
    /// Create a manager over the given token provider and cache
    pub fn new(provider: Arc<dyn TokenProvider>, cache: Arc<TtlCache>) -> Self {
        Self { provider, cache }
    }

    /// The service token for authorizing backend calls
    ///
    /// Returns the cached token while it is at least 60 seconds from its
    /// declared expiry, otherwise obtains and caches a fresh one.
    pub async fn service_token(&self) -> Result<Token> {
        if let Some(token) = self.cache.get::<Token>(TOKEN_CACHE_KEY) {
            debug!("Serving cached service token");
            return Ok(token);
        }

        let token = self.provider.client_credentials().await?;

        let ttl = token.expires_in.saturating_sub(EXPIRY_MARGIN_SECS);
        self.cache
            .set(TOKEN_CACHE_KEY, &token, Duration::from_secs(ttl));
        info!(expires_in = ttl, "Cached fresh service token");

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingProvider {
        calls: AtomicU64,
        expires_in: u64,
    }

    impl CountingProvider {
        fn new(expires_in: u64) -> Self {
            Self {
                calls: AtomicU64::new(0),
                expires_in,
            }
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenProvider for CountingProvider {
        async fn client_credentials(&self) -> Result<Token> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let mut token = Token::from_access_token(format!("token-{n}"));
            token.expires_in = self.expires_in;
            Ok(token)
        }
    }

    #[tokio::test]
    async fn second_call_within_ttl_reuses_cached_token() {
        let provider = Arc::new(CountingProvider::new(3600));
        let manager = TokenManager::new(Arc::clone(&provider) as _, Arc::new(TtlCache::new()));

        let first = manager.service_token().await.unwrap();
        let second = manager.service_token().await.unwrap();

        assert_eq!(first.access_token, second.access_token);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn expired_cache_triggers_exactly_one_refresh() {
        // expires_in of 60 leaves a zero-second cache TTL, so the next call
        // must go back to the provider.
        let provider = Arc::new(CountingProvider::new(60));
        let manager = TokenManager::new(Arc::clone(&provider) as _, Arc::new(TtlCache::new()));

        let first = manager.service_token().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = manager.service_token().await.unwrap();

        assert_ne!(first.access_token, second.access_token);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn cached_lifetime_never_exceeds_declared_expiry() {
        let provider = Arc::new(CountingProvider::new(61));
        let cache = Arc::new(TtlCache::new());
        let manager = TokenManager::new(Arc::clone(&provider) as _, Arc::clone(&cache));

        manager.service_token().await.unwrap();

        // One-second cache TTL from a 61-second token.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(cache.get::<Token>(TOKEN_CACHE_KEY).is_none());
        manager.service_token().await.unwrap();
        assert_eq!(provider.calls(), 2);
    }
}
