//! In-memory implementation of the resource repository, used in tests and
//! embedded setups that do not need durability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{KeyMaterial, OfflineResource, OwnerId, ResourceId, ResourceStatus};
use crate::repository::ResourceRepository;

/// In-memory [`ResourceRepository`] backed by a mutex-guarded map.
#[derive(Default)]
pub struct InMemoryResourceRepository {
    rows: Mutex<HashMap<ResourceId, OfflineResource>>,
}

impl InMemoryResourceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records (test helper).
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

#[async_trait]
impl ResourceRepository for InMemoryResourceRepository {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, resource: &OfflineResource) -> Result<()> {
        self.rows.lock().await.insert(resource.id, resource.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ResourceId) -> Result<Option<OfflineResource>> {
        Ok(self.rows.lock().await.get(&id).cloned())
    }

    async fn find_by_owner_and_key(
        &self,
        owner_id: &OwnerId,
        resource_key: &str,
    ) -> Result<Option<OfflineResource>> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .find(|r| {
                r.owner_id == *owner_id
                    && r.resource_key == resource_key
                    && r.status != ResourceStatus::Revoked
            })
            .cloned())
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<OfflineResource>> {
        let mut rows: Vec<OfflineResource> = self
            .rows
            .lock()
            .await
            .values()
            .filter(|r| r.owner_id == *owner_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn set_status(&self, id: ResourceId, status: ResourceStatus) -> Result<()> {
        if let Some(row) = self.rows.lock().await.get_mut(&id) {
            row.status = status;
        }
        Ok(())
    }

    async fn activate(
        &self,
        id: ResourceId,
        key_material: &KeyMaterial,
        size_bytes: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut rows = self.rows.lock().await;
        match rows.get_mut(&id) {
            Some(row) if row.status == ResourceStatus::Pending => {
                row.mark_active(key_material.clone(), size_bytes, expires_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch_accessed(&self, id: ResourceId, at: DateTime<Utc>) -> Result<()> {
        if let Some(row) = self.rows.lock().await.get_mut(&id) {
            row.last_accessed_at = Some(at);
        }
        Ok(())
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.lock().await;
        let mut expired = 0;
        for row in rows.values_mut() {
            if row.expire_if_due(now) {
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn delete(&self, id: ResourceId) -> Result<()> {
        self.rows.lock().await.remove(&id);
        Ok(())
    }
}
