//! Domain models for the offline resource registry
//!
//! This module contains the resource record, its lifecycle state machine,
//! and the symmetric key material stored alongside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{RegistryError, Result};

// =============================================================================
// ID Types
// =============================================================================

/// Unique identifier for an offline resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub Uuid);

impl ResourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        let uuid = Uuid::parse_str(s).map_err(|e| RegistryError::InvalidId(e.to_string()))?;
        Ok(Self(uuid))
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque caller identity, assigned by the host application's authentication.
///
/// The registry never interprets this value; it only compares it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Lifecycle status
// =============================================================================

/// Lifecycle status of an offline resource.
///
/// Transitions: `Pending → Active` (pipeline commit), `Active → Expired`
/// (lazy, time-triggered), any state `→ Revoked` (explicit, terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Registered, ciphertext not yet materialized
    Pending,
    /// Ciphertext committed, deliverable until expiry
    Active,
    /// Past its expiry time; no longer deliverable
    Expired,
    /// Explicitly revoked; terminal
    Revoked,
}

impl ResourceStatus {
    /// Returns `true` if the resource can be delivered (subject to expiry).
    pub fn is_active(&self) -> bool {
        matches!(self, ResourceStatus::Active)
    }

    /// Returns `true` if the status is terminal.
    pub fn is_revoked(&self) -> bool {
        matches!(self, ResourceStatus::Revoked)
    }

    /// String form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Pending => "pending",
            ResourceStatus::Active => "active",
            ResourceStatus::Expired => "expired",
            ResourceStatus::Revoked => "revoked",
        }
    }

    /// Parse the database string form.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ResourceStatus::Pending),
            "active" => Ok(ResourceStatus::Active),
            "expired" => Ok(ResourceStatus::Expired),
            "revoked" => Ok(ResourceStatus::Revoked),
            _ => Err(RegistryError::UnknownStatus(s.to_string())),
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Key material
// =============================================================================

/// Symmetric key material for one resource: a 256-bit AES key plus the
/// 8-byte nonce prefix used by the chunked stream cipher.
///
/// Generated fresh per resource from the OS random source, never derived
/// from a passphrase and never reused across resources. Excluded from every
/// listing type and redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    key: Vec<u8>,
    nonce_prefix: [u8; 8],
}

impl KeyMaterial {
    pub const KEY_LEN: usize = 32;
    pub const NONCE_PREFIX_LEN: usize = 8;

    /// Generate fresh random key material from the OS random source.
    pub fn generate() -> Self {
        use rand::RngCore;

        let mut key = vec![0u8; Self::KEY_LEN];
        let mut nonce_prefix = [0u8; Self::NONCE_PREFIX_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        rand::rngs::OsRng.fill_bytes(&mut nonce_prefix);

        Self { key, nonce_prefix }
    }

    /// Create from existing raw parts, validating lengths.
    pub fn from_parts(key: Vec<u8>, nonce_prefix: Vec<u8>) -> Result<Self> {
        if key.len() != Self::KEY_LEN {
            return Err(RegistryError::InvalidKeyMaterial(format!(
                "expected {}-byte key, got {}",
                Self::KEY_LEN,
                key.len()
            )));
        }
        let nonce_prefix: [u8; 8] = nonce_prefix.try_into().map_err(|v: Vec<u8>| {
            RegistryError::InvalidKeyMaterial(format!(
                "expected {}-byte nonce prefix, got {}",
                Self::NONCE_PREFIX_LEN,
                v.len()
            ))
        })?;

        Ok(Self { key, nonce_prefix })
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn nonce_prefix(&self) -> &[u8; 8] {
        &self.nonce_prefix
    }

    /// Hex forms for storage (key, nonce prefix).
    pub fn to_hex_parts(&self) -> (String, String) {
        (hex::encode(&self.key), hex::encode(self.nonce_prefix))
    }

    /// Restore from the stored hex forms.
    pub fn from_hex_parts(key_hex: &str, nonce_prefix_hex: &str) -> Result<Self> {
        let key = hex::decode(key_hex)
            .map_err(|e| RegistryError::InvalidKeyMaterial(format!("invalid key hex: {}", e)))?;
        let prefix = hex::decode(nonce_prefix_hex).map_err(|e| {
            RegistryError::InvalidKeyMaterial(format!("invalid nonce prefix hex: {}", e))
        })?;
        Self::from_parts(key, prefix)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"[REDACTED]")
            .field("nonce_prefix", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Resource record
// =============================================================================

/// Registry record for one offline resource.
#[derive(Debug, Clone)]
pub struct OfflineResource {
    pub id: ResourceId,
    pub owner_id: OwnerId,
    /// Stable per-owner de-duplication key correlated to the origin.
    pub resource_key: String,
    pub source_location: String,
    pub media_type: String,
    pub display_title: String,
    pub course_tag: Option<String>,
    pub module_tag: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set when the pipeline commits; `None` while pending.
    pub expires_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub ciphertext_size_bytes: u64,
    /// Populated only by a successful pipeline commit.
    pub key_material: Option<KeyMaterial>,
    pub status: ResourceStatus,
}

impl OfflineResource {
    /// Create a new resource in `Pending` state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner_id: OwnerId,
        resource_key: String,
        source_location: String,
        media_type: String,
        display_title: String,
        course_tag: Option<String>,
        module_tag: Option<String>,
    ) -> Self {
        Self {
            id: ResourceId::new(),
            owner_id,
            resource_key,
            source_location,
            media_type,
            display_title,
            course_tag,
            module_tag,
            created_at: Utc::now(),
            expires_at: None,
            last_accessed_at: None,
            ciphertext_size_bytes: 0,
            key_material: None,
            status: ResourceStatus::Pending,
        }
    }

    /// Lazily transition `Active → Expired` if the expiry time has passed.
    ///
    /// Returns `true` if a transition happened (the caller is responsible for
    /// persisting it). Never touches `Revoked`.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == ResourceStatus::Active {
            if let Some(expires_at) = self.expires_at {
                if now > expires_at {
                    self.status = ResourceStatus::Expired;
                    return true;
                }
            }
        }
        false
    }

    /// Returns `true` if the resource is deliverable at `now`.
    pub fn is_deliverable(&self, now: DateTime<Utc>) -> bool {
        self.status == ResourceStatus::Active
            && self.expires_at.map(|at| now <= at).unwrap_or(false)
    }

    /// Apply a successful pipeline commit.
    pub fn mark_active(
        &mut self,
        key_material: KeyMaterial,
        size_bytes: u64,
        expires_at: DateTime<Utc>,
    ) {
        self.key_material = Some(key_material);
        self.ciphertext_size_bytes = size_bytes;
        self.expires_at = Some(expires_at);
        self.status = ResourceStatus::Active;
    }

    /// Caller-facing view of this record; carries no key material.
    pub fn summary(&self) -> ResourceSummary {
        ResourceSummary {
            id: self.id,
            display_title: self.display_title.clone(),
            media_type: self.media_type.clone(),
            status: self.status,
            size_bytes: self.ciphertext_size_bytes,
            course_tag: self.course_tag.clone(),
            module_tag: self.module_tag.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_accessed_at: self.last_accessed_at,
        }
    }
}

/// Listing entry returned to callers. Deliberately a separate type so key
/// material cannot leak into a listing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub id: ResourceId,
    pub display_title: String,
    pub media_type: String,
    pub status: ResourceStatus,
    pub size_bytes: u64,
    pub course_tag: Option<String>,
    pub module_tag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}
