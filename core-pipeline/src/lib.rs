//! # Fetch-and-Encrypt Pipeline
//!
//! Turns a registered origin location into durable ciphertext:
//!
//! 1. Stream the content from its origin (fail fast on a non-success
//!    response; no retry policy — the caller re-requests instead)
//! 2. Generate fresh random key material for this resource
//! 3. Stream-encrypt into the ciphertext store, counting bytes as they pass
//! 4. Commit key material, size, and expiry through a `Pending`-guarded
//!    compare-and-set, so a resource revoked or deleted mid-flight discards
//!    the result instead of resurrecting
//!
//! Runs are serialized per resource id; runs for distinct resources proceed
//! fully in parallel. A failed run removes any partial ciphertext and leaves
//! the registry entry `Pending` so a later request can retry. No `Active`
//! resource ever exists without complete ciphertext.

pub mod encryption;
pub mod error;
pub mod fetch;
pub mod pipeline;

pub use encryption::{StreamDecryptor, StreamEncryptor, CHUNK_SIZE, TAG_SIZE};
pub use error::{PipelineError, Result};
pub use fetch::{HttpOriginFetcher, OriginContent, OriginFetcher};
pub use pipeline::{Pipeline, PipelineOutcome};
