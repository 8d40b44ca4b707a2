//! # Offline Vault Service
//!
//! The external surface of the offline learning-resource vault. Ties the
//! registry, ciphertext store, token issuer, and fetch-and-encrypt pipeline
//! together behind [`OfflineVaultService`]:
//!
//! - `request_resource` — validate, register (idempotently), start
//!   materialization, and hand back an access token
//! - `fetch_content` — exchange a valid single-use token for a ciphertext
//!   stream
//! - `list_resources` — the caller's resources, lazy expiry applied, never
//!   any key material
//! - `delete_resource` / `revoke_resource` — lifecycle teardown
//! - `sweep` — periodic housekeeping for expired resources and dead tokens
//!
//! Authentication is the host application's job; every operation takes the
//! already-authenticated caller as an [`OwnerId`](core_registry::OwnerId).

pub mod config;
pub mod error;
pub mod logging;
pub mod service;

pub use config::{Materialization, VaultConfig};
pub use error::{ErrorResponse, Result, VaultError};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
pub use service::{
    ContentStream, NewResourceRequest, OfflineVaultService, RequestedResource, SweepOutcome,
};

pub use core_pipeline::{HttpOriginFetcher, OriginFetcher};
pub use core_registry::{
    InMemoryResourceRepository, OwnerId, ResourceId, ResourceStatus, ResourceSummary,
    SqliteResourceRepository,
};
pub use core_store::{FsCiphertextStore, MemoryCiphertextStore};
pub use core_tokens::AccessToken;
