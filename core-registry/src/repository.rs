//! Repository trait for the resource registry

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{KeyMaterial, OfflineResource, OwnerId, ResourceId, ResourceStatus};

/// Storage interface for offline resource records.
///
/// All lifecycle mutation flows through this trait so the pipeline, the
/// delivery service, and housekeeping observe a single consistent view.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Initialize backing storage (create schema if needed).
    async fn initialize(&self) -> Result<()>;

    /// Insert a new resource record.
    async fn insert(&self, resource: &OfflineResource) -> Result<()>;

    /// Find a resource by id.
    async fn find_by_id(&self, id: ResourceId) -> Result<Option<OfflineResource>>;

    /// Find the non-revoked resource for an `(owner, resource_key)` pair.
    ///
    /// Revoked records are skipped: revocation is terminal and the pair may
    /// be registered again afterwards.
    async fn find_by_owner_and_key(
        &self,
        owner_id: &OwnerId,
        resource_key: &str,
    ) -> Result<Option<OfflineResource>>;

    /// All resources belonging to an owner, newest first.
    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<OfflineResource>>;

    /// Set the lifecycle status of a resource.
    async fn set_status(&self, id: ResourceId, status: ResourceStatus) -> Result<()>;

    /// Commit a successful pipeline run: persist key material and ciphertext
    /// size, set the expiry, and move the record to `Active`.
    ///
    /// This is a compare-and-set that succeeds only while the record is still
    /// `Pending`; it returns `false` if the record was revoked, expired, or
    /// deleted in the meantime so the caller can discard its result.
    async fn activate(
        &self,
        id: ResourceId,
        key_material: &KeyMaterial,
        size_bytes: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Record a successful delivery access.
    async fn touch_accessed(&self, id: ResourceId, at: DateTime<Utc>) -> Result<()>;

    /// Move every `Active` record past its expiry at `now` to `Expired`.
    ///
    /// Lazy per-record checks already keep delivery correct; this exists for
    /// periodic housekeeping. Returns the number of records transitioned.
    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Physically remove a resource record.
    async fn delete(&self, id: ResourceId) -> Result<()>;
}
