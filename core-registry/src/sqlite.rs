//! SQLite implementation of the resource repository
//!
//! Ids are stored as UUID strings, timestamps as epoch milliseconds, and key
//! material as hex columns that are only ever read back into [`KeyMaterial`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, instrument};

use crate::error::{RegistryError, Result};
use crate::models::{KeyMaterial, OfflineResource, OwnerId, ResourceId, ResourceStatus};
use crate::repository::ResourceRepository;

/// SQLite-backed [`ResourceRepository`].
pub struct SqliteResourceRepository {
    pool: SqlitePool,
}

impl SqliteResourceRepository {
    /// Create a repository over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL (e.g. `sqlite://vault.db`).
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    fn row_to_resource(row: &SqliteRow) -> Result<OfflineResource> {
        let id = ResourceId::from_string(&row.try_get::<String, _>("id")?)?;
        let status = ResourceStatus::parse(&row.try_get::<String, _>("status")?)?;

        let key_material = match (
            row.try_get::<Option<String>, _>("key_hex")?,
            row.try_get::<Option<String>, _>("nonce_prefix_hex")?,
        ) {
            (Some(key_hex), Some(prefix_hex)) => {
                Some(KeyMaterial::from_hex_parts(&key_hex, &prefix_hex)?)
            }
            _ => None,
        };

        Ok(OfflineResource {
            id,
            owner_id: OwnerId::new(row.try_get::<String, _>("owner_id")?),
            resource_key: row.try_get("resource_key")?,
            source_location: row.try_get("source_location")?,
            media_type: row.try_get("media_type")?,
            display_title: row.try_get("display_title")?,
            course_tag: row.try_get("course_tag")?,
            module_tag: row.try_get("module_tag")?,
            created_at: millis_to_datetime(row.try_get("created_at")?)?,
            expires_at: opt_millis_to_datetime(row.try_get("expires_at")?)?,
            last_accessed_at: opt_millis_to_datetime(row.try_get("last_accessed_at")?)?,
            ciphertext_size_bytes: row.try_get::<i64, _>("ciphertext_size")? as u64,
            key_material,
            status,
        })
    }
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| RegistryError::CorruptRecord(format!("timestamp out of range: {}", ms)))
}

fn opt_millis_to_datetime(ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ms.map(millis_to_datetime).transpose()
}

#[async_trait]
impl ResourceRepository for SqliteResourceRepository {
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS offline_resources (
                id                TEXT PRIMARY KEY,
                owner_id          TEXT NOT NULL,
                resource_key      TEXT NOT NULL,
                source_location   TEXT NOT NULL,
                media_type        TEXT NOT NULL,
                display_title     TEXT NOT NULL,
                course_tag        TEXT,
                module_tag        TEXT,
                created_at        INTEGER NOT NULL,
                expires_at        INTEGER,
                last_accessed_at  INTEGER,
                ciphertext_size   INTEGER NOT NULL DEFAULT 0,
                key_hex           TEXT,
                nonce_prefix_hex  TEXT,
                status            TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // One live record per (owner, origin); revoked records do not block
        // re-registration.
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_offline_resources_owner_key
            ON offline_resources (owner_id, resource_key)
            WHERE status != 'revoked'
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("resource registry schema initialized");
        Ok(())
    }

    #[instrument(skip(self, resource), fields(resource_id = %resource.id))]
    async fn insert(&self, resource: &OfflineResource) -> Result<()> {
        let key_parts = resource.key_material.as_ref().map(KeyMaterial::to_hex_parts);

        sqlx::query(
            r#"
            INSERT INTO offline_resources
                (id, owner_id, resource_key, source_location, media_type,
                 display_title, course_tag, module_tag, created_at, expires_at,
                 last_accessed_at, ciphertext_size, key_hex, nonce_prefix_hex, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(resource.id.to_string())
        .bind(resource.owner_id.as_str())
        .bind(&resource.resource_key)
        .bind(&resource.source_location)
        .bind(&resource.media_type)
        .bind(&resource.display_title)
        .bind(&resource.course_tag)
        .bind(&resource.module_tag)
        .bind(resource.created_at.timestamp_millis())
        .bind(resource.expires_at.map(|at| at.timestamp_millis()))
        .bind(resource.last_accessed_at.map(|at| at.timestamp_millis()))
        .bind(resource.ciphertext_size_bytes as i64)
        .bind(key_parts.as_ref().map(|(key, _)| key.clone()))
        .bind(key_parts.as_ref().map(|(_, prefix)| prefix.clone()))
        .bind(resource.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: ResourceId) -> Result<Option<OfflineResource>> {
        let row = sqlx::query("SELECT * FROM offline_resources WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_resource).transpose()
    }

    async fn find_by_owner_and_key(
        &self,
        owner_id: &OwnerId,
        resource_key: &str,
    ) -> Result<Option<OfflineResource>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM offline_resources
            WHERE owner_id = ? AND resource_key = ? AND status != 'revoked'
            LIMIT 1
            "#,
        )
        .bind(owner_id.as_str())
        .bind(resource_key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_resource).transpose()
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<OfflineResource>> {
        let rows = sqlx::query(
            "SELECT * FROM offline_resources WHERE owner_id = ? ORDER BY created_at DESC",
        )
        .bind(owner_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_resource).collect()
    }

    #[instrument(skip(self), fields(resource_id = %id))]
    async fn set_status(&self, id: ResourceId, status: ResourceStatus) -> Result<()> {
        sqlx::query("UPDATE offline_resources SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        debug!(status = %status, "resource status updated");
        Ok(())
    }

    #[instrument(skip(self, key_material), fields(resource_id = %id))]
    async fn activate(
        &self,
        id: ResourceId,
        key_material: &KeyMaterial,
        size_bytes: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let (key_hex, prefix_hex) = key_material.to_hex_parts();

        let result = sqlx::query(
            r#"
            UPDATE offline_resources
            SET status = 'active', key_hex = ?, nonce_prefix_hex = ?,
                ciphertext_size = ?, expires_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(key_hex)
        .bind(prefix_hex)
        .bind(size_bytes as i64)
        .bind(expires_at.timestamp_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn touch_accessed(&self, id: ResourceId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE offline_resources SET last_accessed_at = ? WHERE id = ?")
            .bind(at.timestamp_millis())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE offline_resources SET status = 'expired'
             WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at < ?",
        )
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(resource_id = %id))]
    async fn delete(&self, id: ResourceId) -> Result<()> {
        sqlx::query("DELETE FROM offline_resources WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
