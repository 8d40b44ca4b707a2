//! Token issuance, validation, and consumption

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::Mutex;
use tracing::debug;

use core_registry::ResourceId;

const TOKEN_BYTES: usize = 32;

/// An issued access token. The value is the secret; `Debug` redacts it.
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    resource_id: ResourceId,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// The opaque token value presented by the caller.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("resource_id", &self.resource_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

struct TokenEntry {
    resource_id: ResourceId,
    expires_at: DateTime<Utc>,
    consumed: bool,
}

/// Issuer and store for access tokens.
///
/// Safe for concurrent issue/validate/consume from many callers; the map is
/// guarded by a single async mutex, which is sufficient for the short
/// critical sections involved.
pub struct TokenIssuer {
    ttl: Duration,
    tokens: Mutex<HashMap<String, TokenEntry>>,
}

impl TokenIssuer {
    /// Create an issuer with the given default token TTL.
    pub fn new(ttl: std::time::Duration) -> Self {
        let ttl = Duration::from_std(ttl).unwrap_or_else(|_| Duration::minutes(30));
        Self {
            ttl,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    fn generate_value() -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Issue a token bound to one resource, using the default TTL.
    pub async fn issue(&self, resource_id: ResourceId) -> AccessToken {
        self.issue_with_ttl(resource_id, self.ttl).await
    }

    /// Issue a token with an explicit TTL.
    pub async fn issue_with_ttl(&self, resource_id: ResourceId, ttl: Duration) -> AccessToken {
        let issued_at = Utc::now();
        let expires_at = issued_at + ttl;
        let value = Self::generate_value();

        self.tokens.lock().await.insert(
            value.clone(),
            TokenEntry {
                resource_id,
                expires_at,
                consumed: false,
            },
        );

        debug!(resource_id = %resource_id, expires_at = %expires_at, "token issued");

        AccessToken {
            value,
            resource_id,
            issued_at,
            expires_at,
        }
    }

    /// Resolve a token to its bound resource id, if the token is valid.
    ///
    /// Expired entries are pruned here lazily. The three failure causes are
    /// logged distinctly but deliberately collapse to `None` for the caller.
    pub async fn validate(&self, value: &str) -> Option<ResourceId> {
        let mut tokens = self.tokens.lock().await;

        let Some(entry) = tokens.get(value) else {
            debug!("token rejected: unknown");
            return None;
        };

        if entry.consumed {
            debug!(resource_id = %entry.resource_id, "token rejected: already consumed");
            return None;
        }

        if Utc::now() >= entry.expires_at {
            debug!(resource_id = %entry.resource_id, "token rejected: expired");
            tokens.remove(value);
            return None;
        }

        Some(entry.resource_id)
    }

    /// Consume a token after successful use.
    ///
    /// Returns `false` if the token is unknown, expired, or was already
    /// consumed (e.g. by a racing request).
    pub async fn consume(&self, value: &str) -> bool {
        let mut tokens = self.tokens.lock().await;

        match tokens.get_mut(value) {
            Some(entry) if !entry.consumed && Utc::now() < entry.expires_at => {
                entry.consumed = true;
                debug!(resource_id = %entry.resource_id, "token consumed");
                true
            }
            _ => false,
        }
    }

    /// Drop expired and consumed entries. Returns the number removed.
    ///
    /// Validation already prunes lazily; this exists for periodic
    /// housekeeping so the map does not accumulate dead entries.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut tokens = self.tokens.lock().await;
        let before = tokens.len();
        tokens.retain(|_, entry| !entry.consumed && entry.expires_at > now);
        before - tokens.len()
    }

    /// Clear the store entirely (test isolation).
    pub async fn reset(&self) {
        self.tokens.lock().await.clear();
    }

    /// Number of live (unconsumed, unswept) entries.
    pub async fn outstanding(&self) -> usize {
        self.tokens.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(StdDuration::from_secs(30 * 60))
    }

    #[tokio::test]
    async fn issued_token_validates_to_bound_resource() {
        let issuer = issuer();
        let resource_id = ResourceId::new();

        let token = issuer.issue(resource_id).await;
        assert_eq!(issuer.validate(token.value()).await, Some(resource_id));
        assert_eq!(token.resource_id(), resource_id);
        assert!(token.expires_at() > token.issued_at());
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let issuer = issuer();
        assert_eq!(issuer.validate("no-such-token").await, None);
        assert!(!issuer.consume("no-such-token").await);
    }

    #[tokio::test]
    async fn consumed_token_is_rejected_forever() {
        let issuer = issuer();
        let token = issuer.issue(ResourceId::new()).await;

        assert!(issuer.consume(token.value()).await);
        assert_eq!(issuer.validate(token.value()).await, None);
        assert!(!issuer.consume(token.value()).await);
    }

    #[tokio::test]
    async fn expired_token_is_rejected_even_if_unconsumed() {
        let issuer = issuer();
        let token = issuer
            .issue_with_ttl(ResourceId::new(), Duration::zero())
            .await;

        assert_eq!(issuer.validate(token.value()).await, None);
        assert!(!issuer.consume(token.value()).await);
    }

    #[tokio::test]
    async fn token_values_are_unique_and_opaque() {
        let issuer = issuer();
        let resource_id = ResourceId::new();

        let a = issuer.issue(resource_id).await;
        let b = issuer.issue(resource_id).await;

        assert_ne!(a.value(), b.value());
        // 32 random bytes, base64url without padding.
        assert_eq!(a.value().len(), 43);
        assert!(!a.value().contains(resource_id.to_string().as_str()));
    }

    #[tokio::test]
    async fn debug_output_redacts_the_value() {
        let issuer = issuer();
        let token = issuer.issue(ResourceId::new()).await;
        let debug = format!("{:?}", token);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(token.value()));
    }

    #[tokio::test]
    async fn sweep_removes_expired_and_consumed() {
        let issuer = issuer();
        let live = issuer.issue(ResourceId::new()).await;
        let dead = issuer
            .issue_with_ttl(ResourceId::new(), Duration::zero())
            .await;
        let used = issuer.issue(ResourceId::new()).await;
        assert!(issuer.consume(used.value()).await);

        assert_eq!(issuer.sweep(Utc::now()).await, 2);
        assert_eq!(issuer.outstanding().await, 1);
        assert_eq!(issuer.validate(live.value()).await, Some(live.resource_id()));
        drop(dead);
    }

    #[tokio::test]
    async fn reset_clears_all_tokens() {
        let issuer = issuer();
        let token = issuer.issue(ResourceId::new()).await;
        issuer.reset().await;
        assert_eq!(issuer.validate(token.value()).await, None);
        assert_eq!(issuer.outstanding().await, 0);
    }

    #[tokio::test]
    async fn concurrent_consume_admits_exactly_one_winner() {
        let issuer = Arc::new(issuer());
        let token = issuer.issue(ResourceId::new()).await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let issuer = issuer.clone();
            let value = token.value().to_string();
            handles.push(tokio::spawn(async move { issuer.consume(&value).await }));
        }

        let results = futures::future::join_all(handles).await;
        let winners = results
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();
        assert_eq!(winners, 1);
    }
}
