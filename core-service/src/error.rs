//! Service error taxonomy
//!
//! `VaultError` is the externally visible error surface. Every variant maps
//! to a stable code string, and `public_message()` is safe to hand to a
//! caller: it never carries key material, storage paths, or upstream detail.
//! Full detail stays in logs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_pipeline::PipelineError;
use core_registry::RegistryError;
use core_store::StoreError;

#[derive(Error, Debug)]
pub enum VaultError {
    /// The caller does not own the resource.
    #[error("Access denied")]
    Forbidden,

    /// No such resource (or, at the delivery boundary, not one the caller
    /// may know exists).
    #[error("Resource not found")]
    NotFound,

    /// Token unknown, expired, consumed, or malformed. Deliberately one
    /// variant: callers cannot distinguish the causes.
    #[error("Invalid or expired access token")]
    InvalidToken,

    /// The resource is not deliverable (expired, revoked, or never
    /// materialized).
    #[error("Resource is no longer available")]
    Expired,

    #[error("Validation failed for '{field}': {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Upstream fetch failed: {0}")]
    UpstreamFetch(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Stable machine-readable code for the external boundary.
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::Forbidden => "FORBIDDEN",
            VaultError::NotFound => "NOT_FOUND",
            VaultError::InvalidToken => "INVALID_TOKEN",
            VaultError::Expired => "EXPIRED",
            VaultError::Validation { .. } => "VALIDATION",
            VaultError::UpstreamFetch(_) => "UPSTREAM_FETCH",
            VaultError::Encryption(_) => "ENCRYPTION",
            VaultError::Storage(_) => "STORAGE",
            VaultError::Internal(_) => "INTERNAL",
        }
    }

    /// Caller-safe message. Operational variants collapse to a generic
    /// phrasing; the detail is only logged.
    pub fn public_message(&self) -> String {
        match self {
            VaultError::Validation { .. }
            | VaultError::Forbidden
            | VaultError::NotFound
            | VaultError::InvalidToken
            | VaultError::Expired => self.to_string(),
            VaultError::UpstreamFetch(_) => "Could not retrieve the resource content".to_string(),
            VaultError::Encryption(_) | VaultError::Storage(_) | VaultError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }

    /// Serializable shape for the external boundary.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code().to_string(),
            message: self.public_message(),
        }
    }
}

/// Wire shape of an error at the external boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<RegistryError> for VaultError {
    fn from(e: RegistryError) -> Self {
        VaultError::Storage(e.to_string())
    }
}

impl From<StoreError> for VaultError {
    fn from(e: StoreError) -> Self {
        VaultError::Storage(e.to_string())
    }
}

impl From<PipelineError> for VaultError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::UpstreamFetch(msg) => VaultError::UpstreamFetch(msg),
            PipelineError::Encryption(msg) => VaultError::Encryption(msg),
            PipelineError::Registry(e) => e.into(),
            PipelineError::Store(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
