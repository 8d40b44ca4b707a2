//! The offline vault service: registration, delivery, lifecycle

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use core_pipeline::{HttpOriginFetcher, OriginFetcher, Pipeline};
use core_registry::{
    OfflineResource, OwnerId, ResourceId, ResourceRepository, ResourceStatus, ResourceSummary,
};
use core_store::{ByteStream, CiphertextStore, StoreError};
use core_tokens::{AccessToken, TokenIssuer};

use crate::config::{Materialization, VaultConfig};
use crate::error::{Result, VaultError};

/// Registration input. `course_tag` and `module_tag` are opaque to the vault
/// and stored untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewResourceRequest {
    pub source_location: String,
    pub media_type: String,
    pub display_title: String,
    #[serde(default)]
    pub course_tag: Option<String>,
    #[serde(default)]
    pub module_tag: Option<String>,
}

/// Result of a registration: the resource id plus a fresh access token.
#[derive(Debug)]
pub struct RequestedResource {
    pub resource_id: ResourceId,
    pub token: AccessToken,
}

/// A granted delivery: ciphertext as a backpressure-aware stream.
pub struct ContentStream {
    pub resource_id: ResourceId,
    pub size_bytes: u64,
    pub media_type: String,
    pub stream: ByteStream,
}

impl std::fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStream")
            .field("resource_id", &self.resource_id)
            .field("size_bytes", &self.size_bytes)
            .field("media_type", &self.media_type)
            .finish_non_exhaustive()
    }
}

/// Housekeeping counters from [`OfflineVaultService::sweep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub resources_expired: u64,
    pub tokens_removed: usize,
}

/// Protection-and-delivery service for offline learning resources.
///
/// Caller identity arrives as an [`OwnerId`] assigned by the host
/// application's authentication; this service only compares it.
pub struct OfflineVaultService {
    repository: Arc<dyn ResourceRepository>,
    store: Arc<dyn CiphertextStore>,
    tokens: TokenIssuer,
    pipeline: Arc<Pipeline>,
    materialization: Materialization,
}

impl OfflineVaultService {
    /// Build a service over the given storage and origin fetcher.
    pub fn new(
        config: VaultConfig,
        repository: Arc<dyn ResourceRepository>,
        store: Arc<dyn CiphertextStore>,
        fetcher: Arc<dyn OriginFetcher>,
    ) -> Result<Self> {
        config.validate()?;

        let resource_ttl =
            chrono::Duration::from_std(config.resource_ttl).map_err(|_| VaultError::Validation {
                field: "resource_ttl",
                message: "out of range".to_string(),
            })?;

        Ok(Self {
            repository: repository.clone(),
            store: store.clone(),
            tokens: TokenIssuer::new(config.token_ttl),
            pipeline: Arc::new(Pipeline::new(repository, store, fetcher, resource_ttl)),
            materialization: config.materialization,
        })
    }

    /// Build a service with the default HTTP origin fetcher, honoring the
    /// configured fetch timeout.
    pub fn with_http_fetcher(
        config: VaultConfig,
        repository: Arc<dyn ResourceRepository>,
        store: Arc<dyn CiphertextStore>,
    ) -> Result<Self> {
        let fetcher = Arc::new(HttpOriginFetcher::with_timeout(config.fetch_timeout));
        Self::new(config, repository, store, fetcher)
    }

    /// Initialize backing storage.
    pub async fn initialize(&self) -> Result<()> {
        self.repository.initialize().await?;
        Ok(())
    }

    /// Register a resource for offline use and issue an access token.
    ///
    /// Idempotent per `(owner, origin)`: re-requesting an already-registered
    /// resource returns the existing record with a fresh token and does not
    /// create a duplicate. A still-`Pending` record gets another pipeline
    /// run (earlier runs may have failed); the run itself is idempotent.
    #[instrument(skip(self, request), fields(owner_id = %owner))]
    pub async fn request_resource(
        &self,
        owner: &OwnerId,
        request: NewResourceRequest,
    ) -> Result<RequestedResource> {
        validate_request(&request)?;

        let resource_key = derive_resource_key(&request.source_location);

        if let Some(existing) = self
            .repository
            .find_by_owner_and_key(owner, &resource_key)
            .await?
        {
            debug!(resource_id = %existing.id, status = %existing.status, "resource already registered");
            if existing.status == ResourceStatus::Pending {
                self.dispatch_pipeline(existing.id).await;
            }
            let token = self.tokens.issue(existing.id).await;
            return Ok(RequestedResource {
                resource_id: existing.id,
                token,
            });
        }

        let resource = OfflineResource::new(
            owner.clone(),
            resource_key,
            request.source_location,
            request.media_type,
            request.display_title,
            request.course_tag,
            request.module_tag,
        );
        self.repository.insert(&resource).await?;
        info!(resource_id = %resource.id, media_type = %resource.media_type, "resource registered");

        self.dispatch_pipeline(resource.id).await;

        let token = self.tokens.issue(resource.id).await;
        Ok(RequestedResource {
            resource_id: resource.id,
            token,
        })
    }

    async fn dispatch_pipeline(&self, id: ResourceId) {
        match self.materialization {
            Materialization::Background => {
                let pipeline = self.pipeline.clone();
                tokio::spawn(async move {
                    if let Err(e) = pipeline.run(id).await {
                        error!(resource_id = %id, error = %e, "background pipeline run failed");
                    }
                });
            }
            Materialization::Inline => {
                // Failures leave the record pending; they surface to the
                // caller only as a denied delivery later.
                if let Err(e) = self.pipeline.run(id).await {
                    warn!(resource_id = %id, error = %e, "inline pipeline run failed");
                }
            }
        }
    }

    /// Deliver ciphertext for a valid token.
    ///
    /// All token failures collapse to `InvalidToken`; a missing resource and
    /// an ownership mismatch both collapse to `NotFound`. The token is
    /// consumed and `last_accessed_at` updated only when delivery succeeds.
    #[instrument(skip(self, token_value), fields(owner_id = %owner))]
    pub async fn fetch_content(&self, owner: &OwnerId, token_value: &str) -> Result<ContentStream> {
        let resource_id = self
            .tokens
            .validate(token_value)
            .await
            .ok_or(VaultError::InvalidToken)?;

        let Some(mut resource) = self.repository.find_by_id(resource_id).await? else {
            debug!(resource_id = %resource_id, "token resolved to a missing resource");
            return Err(VaultError::NotFound);
        };

        if resource.owner_id != *owner {
            // Collapsed with the missing case: the caller may not learn that
            // someone else's resource exists.
            debug!(resource_id = %resource_id, "delivery denied: owner mismatch");
            return Err(VaultError::NotFound);
        }

        let now = Utc::now();
        if resource.expire_if_due(now) {
            self.repository
                .set_status(resource.id, ResourceStatus::Expired)
                .await?;
            debug!(resource_id = %resource.id, "resource expired at delivery time");
            return Err(VaultError::Expired);
        }
        if resource.status != ResourceStatus::Active {
            debug!(resource_id = %resource.id, status = %resource.status, "resource not deliverable");
            return Err(VaultError::Expired);
        }

        let stream = match self.store.read(resource.id).await {
            Ok(stream) => stream,
            Err(StoreError::Missing(_)) => {
                // An interrupted deletion can leave a row without its blob;
                // finish the deletion and deny.
                warn!(resource_id = %resource.id, "active resource has no ciphertext; removing record");
                self.repository.delete(resource.id).await?;
                return Err(VaultError::Expired);
            }
            Err(e) => return Err(e.into()),
        };

        self.repository.touch_accessed(resource.id, now).await?;
        if !self.tokens.consume(token_value).await {
            // A racing request consumed it between validate and here.
            return Err(VaultError::InvalidToken);
        }

        info!(resource_id = %resource.id, size_bytes = resource.ciphertext_size_bytes, "content delivered");
        Ok(ContentStream {
            resource_id: resource.id,
            size_bytes: resource.ciphertext_size_bytes,
            media_type: resource.media_type,
            stream,
        })
    }

    /// List the caller's resources, newest first. Lazy expiry is applied and
    /// persisted; summaries never carry key material.
    #[instrument(skip(self), fields(owner_id = %owner))]
    pub async fn list_resources(&self, owner: &OwnerId) -> Result<Vec<ResourceSummary>> {
        let now = Utc::now();
        let mut summaries = Vec::new();

        for mut resource in self.repository.list_by_owner(owner).await? {
            if resource.expire_if_due(now) {
                self.repository
                    .set_status(resource.id, ResourceStatus::Expired)
                    .await?;
            }
            summaries.push(resource.summary());
        }

        Ok(summaries)
    }

    /// Remove a resource entirely: ciphertext first, then the registry row.
    #[instrument(skip(self), fields(owner_id = %owner, resource_id = %id))]
    pub async fn delete_resource(&self, owner: &OwnerId, id: ResourceId) -> Result<()> {
        let resource = self.owned_resource(owner, id).await?;

        // Blob first: if we crash between the two, delivery reconciles the
        // orphaned row.
        self.store.delete(resource.id).await?;
        self.repository.delete(resource.id).await?;

        info!("resource deleted");
        Ok(())
    }

    /// Revoke a resource from any state. Terminal: the record stays for
    /// audit, the ciphertext is removed, and the `(owner, origin)` pair may
    /// be registered again.
    #[instrument(skip(self), fields(owner_id = %owner, resource_id = %id))]
    pub async fn revoke_resource(&self, owner: &OwnerId, id: ResourceId) -> Result<()> {
        let resource = self.owned_resource(owner, id).await?;

        self.store.delete(resource.id).await?;
        self.repository
            .set_status(resource.id, ResourceStatus::Revoked)
            .await?;

        info!("resource revoked");
        Ok(())
    }

    async fn owned_resource(&self, owner: &OwnerId, id: ResourceId) -> Result<OfflineResource> {
        let resource = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(VaultError::NotFound)?;

        if resource.owner_id != *owner {
            return Err(VaultError::Forbidden);
        }

        Ok(resource)
    }

    /// Periodic housekeeping: expire stale resources, drop dead tokens.
    ///
    /// Correctness does not depend on this; lazy checks at delivery and
    /// listing already enforce expiry.
    pub async fn sweep(&self) -> Result<SweepOutcome> {
        let now = Utc::now();
        let resources_expired = self.repository.expire_due(now).await?;
        let tokens_removed = self.tokens.sweep(now).await;

        if resources_expired > 0 || tokens_removed > 0 {
            debug!(resources_expired, tokens_removed, "sweep completed");
        }

        Ok(SweepOutcome {
            resources_expired,
            tokens_removed,
        })
    }
}

/// Owner-scoped de-duplication key for an origin location.
fn derive_resource_key(source_location: &str) -> String {
    hex::encode(Sha256::digest(source_location.as_bytes()))
}

fn validate_request(request: &NewResourceRequest) -> Result<()> {
    if request.display_title.trim().is_empty() {
        return Err(VaultError::Validation {
            field: "display_title",
            message: "must not be empty".to_string(),
        });
    }
    if request.media_type.trim().is_empty() {
        return Err(VaultError::Validation {
            field: "media_type",
            message: "must not be empty".to_string(),
        });
    }

    let url = Url::parse(&request.source_location).map_err(|e| VaultError::Validation {
        field: "source_location",
        message: format!("not a valid URL: {}", e),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(VaultError::Validation {
            field: "source_location",
            message: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(location: &str) -> NewResourceRequest {
        NewResourceRequest {
            source_location: location.to_string(),
            media_type: "video/mp4".to_string(),
            display_title: "Lesson".to_string(),
            course_tag: None,
            module_tag: None,
        }
    }

    #[test]
    fn resource_key_is_stable_and_opaque() {
        let a = derive_resource_key("https://cdn.example.com/video1.mp4");
        let b = derive_resource_key("https://cdn.example.com/video1.mp4");
        let c = derive_resource_key("https://cdn.example.com/video2.mp4");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(!a.contains("example.com"));
    }

    #[test]
    fn validation_accepts_http_and_https() {
        assert!(validate_request(&request("https://cdn.example.com/v.mp4")).is_ok());
        assert!(validate_request(&request("http://cdn.example.com/v.mp4")).is_ok());
    }

    #[test]
    fn validation_rejects_bad_locations() {
        assert!(validate_request(&request("not a url")).is_err());
        assert!(validate_request(&request("ftp://example.com/v.mp4")).is_err());
        assert!(validate_request(&request("file:///etc/passwd")).is_err());
    }

    #[test]
    fn validation_rejects_empty_fields() {
        let mut r = request("https://cdn.example.com/v.mp4");
        r.display_title = "   ".to_string();
        assert!(matches!(
            validate_request(&r),
            Err(VaultError::Validation {
                field: "display_title",
                ..
            })
        ));

        let mut r = request("https://cdn.example.com/v.mp4");
        r.media_type = String::new();
        assert!(matches!(
            validate_request(&r),
            Err(VaultError::Validation {
                field: "media_type",
                ..
            })
        ));
    }
}
