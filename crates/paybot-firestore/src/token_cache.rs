//! Bearer-token caching.
//!
//! Tokens are cached until 60 seconds before their advertised expiry so a
//! request never goes out with a token about to lapse mid-flight. A refresh
//! failure falls back to the previous token while it is still inside its raw
//! lifetime.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::FirestoreResult;
use crate::signer::TokenProvider;

/// Refresh margin: treat tokens as expired 60 seconds early.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    /// Still valid with the refresh margin applied.
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    /// Technically still usable, margin or not.
    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Caches tokens minted by a [`TokenProvider`].
pub struct TokenCache {
    provider: Arc<dyn TokenProvider>,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached token so the next call mints a fresh one. Used after
    /// a 401 to force re-authentication.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }

    /// Get a valid access token, minting one if necessary.
    ///
    /// Fast path returns the cached token under a read lock; the miss path
    /// re-checks under the write lock since another task may have refreshed
    /// while we waited for it.
    pub async fn get_token(&self) -> FirestoreResult<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_fresh() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;

        if let Some(cached) = cache.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.access_token.clone());
            }
        }

        self.refresh(&mut cache).await
    }

    async fn refresh(&self, cache: &mut Option<CachedToken>) -> FirestoreResult<String> {
        match self.provider.fetch_token().await {
            Ok(minted) => {
                let expires_at = Instant::now() + Duration::from_secs(minted.expires_in_secs);
                *cache = Some(CachedToken {
                    access_token: minted.token.clone(),
                    expires_at,
                });
                debug!(
                    expires_in_secs = minted.expires_in_secs,
                    "minted new access token"
                );
                Ok(minted.token)
            }
            Err(e) => {
                if let Some(cached) = cache.as_ref() {
                    if cached.is_usable() {
                        warn!("token refresh failed, reusing still-valid token: {}", e);
                        return Ok(cached.access_token.clone());
                    }
                }
                Err(e)
            }
        }
    }
}
