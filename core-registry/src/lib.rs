//! # Resource Registry
//!
//! Durable record of every offline resource: metadata, encryption key
//! material, and lifecycle status. All mutation of resource state goes
//! through the [`ResourceRepository`] trait; the pipeline and the delivery
//! service never touch registry rows directly.
//!
//! Two implementations are provided:
//! - [`SqliteResourceRepository`] — durable, backed by `sqlx`/SQLite
//! - [`InMemoryResourceRepository`] — transient, for tests and embedding

pub mod error;
pub mod memory;
pub mod models;
pub mod repository;
pub mod sqlite;

pub use error::{RegistryError, Result};
pub use memory::InMemoryResourceRepository;
pub use models::{
    KeyMaterial, OfflineResource, OwnerId, ResourceId, ResourceStatus, ResourceSummary,
};
pub use repository::ResourceRepository;
pub use sqlite::SqliteResourceRepository;
