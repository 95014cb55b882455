use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use zeroize::Zeroizing;

use crate::errors::AllureError;

/// A cached credential is treated as unusable this long before it expires.
pub(crate) const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Successful token exchange response.
#[derive(Deserialize)]
pub(crate) struct TokenGrant {
    pub access_token: String,
    pub expires_in: u64,
}

/// Short-lived bearer token handed to a single outbound request.
#[derive(Clone)]
pub(crate) struct BearerToken(Zeroizing<String>);

impl BearerToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(****)")
    }
}

struct Credential {
    token: BearerToken,
    expires_at: Instant,
}

impl Credential {
    fn usable_at(&self, now: Instant, margin: Duration) -> bool {
        now + margin < self.expires_at
    }
}

/// Holds the current bearer credential. [`CredentialCache::ensure_valid`] is
/// the only way to read or replace it.
pub(crate) struct CredentialCache {
    margin: Duration,
    slot: Mutex<Option<Credential>>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::with_margin(REFRESH_MARGIN)
    }

    pub fn with_margin(margin: Duration) -> Self {
        Self {
            margin,
            slot: Mutex::new(None),
        }
    }

    /// Returns a token valid for at least the refresh margin, calling
    /// `refresh` when the cached one is missing or close to expiry.
    ///
    /// The lock is held across the refresh, so callers arriving meanwhile
    /// wait and then reuse the new credential. A failed refresh leaves the
    /// previous credential in place.
    pub async fn ensure_valid<F, Fut>(&self, refresh: F) -> Result<BearerToken, AllureError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenGrant, AllureError>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(current) = slot.as_ref() {
            if current.usable_at(Instant::now(), self.margin) {
                return Ok(current.token.clone());
            }
        }

        let grant = refresh().await?;
        if grant.access_token.is_empty() {
            return Err(AllureError::refresh_failed(
                None,
                "token response carried an empty access_token",
            ));
        }

        let lifetime = Duration::from_secs(grant.expires_in);
        if lifetime <= self.margin {
            tracing::warn!(
                expires_in = grant.expires_in,
                "token lifetime is shorter than the refresh margin; every call will refresh"
            );
        }

        let expires_at = Instant::now().checked_add(lifetime).ok_or_else(|| {
            AllureError::refresh_failed(
                None,
                &format!("expires_in out of range: {}", grant.expires_in),
            )
        })?;

        let credential = Credential {
            token: BearerToken(Zeroizing::new(grant.access_token)),
            expires_at,
        };
        let token = credential.token.clone();
        *slot = Some(credential);

        tracing::info!(expires_in = grant.expires_in, "Allure API token refreshed");
        Ok(token)
    }

    #[cfg(test)]
    async fn snapshot(&self) -> Option<(String, Instant)> {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|c| (c.token.as_str().to_string(), c.expires_at))
    }
}
