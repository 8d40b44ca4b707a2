//! Storage traits for ciphertext blobs

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use core_registry::ResourceId;

use crate::error::Result;

/// Backpressure-aware stream of ciphertext bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Staged writer for one blob.
///
/// Appended chunks become visible to readers only after `finish`; `abort`
/// (or dropping without finishing) leaves no addressable blob behind.
#[async_trait]
pub trait CiphertextWriter: Send {
    /// Append a chunk of ciphertext.
    async fn append(&mut self, chunk: Bytes) -> Result<()>;

    /// Commit the blob, returning the total number of bytes written.
    async fn finish(self: Box<Self>) -> Result<u64>;

    /// Discard the write, removing any partial output.
    async fn abort(self: Box<Self>) -> Result<()>;
}

/// Blob store for encrypted resource content.
///
/// The pipeline is the only writer and the delivery service the only reader;
/// everything else reaches ciphertext through those two components.
#[async_trait]
pub trait CiphertextStore: Send + Sync {
    /// Open a staged writer for a resource's blob.
    async fn open_writer(&self, id: ResourceId) -> Result<Box<dyn CiphertextWriter>>;

    /// Stream a committed blob.
    ///
    /// Fails with [`StoreError::Missing`] if no blob exists for the id.
    ///
    /// [`StoreError::Missing`]: crate::error::StoreError::Missing
    async fn read(&self, id: ResourceId) -> Result<ByteStream>;

    /// Remove a blob (and any staged partial write). Idempotent.
    async fn delete(&self, id: ResourceId) -> Result<()>;

    /// Whether a committed blob exists for the id.
    async fn exists(&self, id: ResourceId) -> Result<bool>;

    /// Size in bytes of the committed blob, if present.
    async fn size(&self, id: ResourceId) -> Result<Option<u64>>;
}
