//! # Ciphertext Store
//!
//! Blob storage for encrypted resource content, keyed by [`ResourceId`] only
//! so origin URLs never leak into storage paths. Writes go through a staged
//! writer (`append` chunks, then `finish`) so a crash or an aborted pipeline
//! run never leaves a partially written blob addressable; reads are
//! backpressure-aware byte streams that never buffer a whole blob in memory.
//!
//! [`ResourceId`]: core_registry::ResourceId

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{Result, StoreError};
pub use fs::FsCiphertextStore;
pub use memory::MemoryCiphertextStore;
pub use traits::{ByteStream, CiphertextStore, CiphertextWriter};
