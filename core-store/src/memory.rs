//! In-memory ciphertext store for tests

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use core_registry::ResourceId;

use crate::error::{Result, StoreError};
use crate::traits::{ByteStream, CiphertextStore, CiphertextWriter};

type BlobMap = Arc<Mutex<HashMap<ResourceId, Vec<u8>>>>;

/// In-memory [`CiphertextStore`]. Blobs only become visible on `finish`,
/// matching the staged-write semantics of the filesystem store.
#[derive(Default, Clone)]
pub struct MemoryCiphertextStore {
    blobs: BlobMap,
}

impl MemoryCiphertextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw committed blob bytes (test helper).
    pub async fn blob(&self, id: ResourceId) -> Option<Vec<u8>> {
        self.blobs.lock().await.get(&id).cloned()
    }

    pub async fn blob_count(&self) -> usize {
        self.blobs.lock().await.len()
    }
}

struct MemoryCiphertextWriter {
    id: ResourceId,
    blobs: BlobMap,
    buffer: Vec<u8>,
}

#[async_trait]
impl CiphertextWriter for MemoryCiphertextWriter {
    async fn append(&mut self, chunk: Bytes) -> Result<()> {
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<u64> {
        let written = self.buffer.len() as u64;
        self.blobs.lock().await.insert(self.id, self.buffer);
        Ok(written)
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl CiphertextStore for MemoryCiphertextStore {
    async fn open_writer(&self, id: ResourceId) -> Result<Box<dyn CiphertextWriter>> {
        Ok(Box::new(MemoryCiphertextWriter {
            id,
            blobs: self.blobs.clone(),
            buffer: Vec::new(),
        }))
    }

    async fn read(&self, id: ResourceId) -> Result<ByteStream> {
        let blob = self
            .blobs
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::Missing(id))?;

        // Emit in fixed-size chunks so consumers see stream-shaped input.
        let chunks: Vec<std::io::Result<Bytes>> = blob
            .chunks(8 * 1024)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn delete(&self, id: ResourceId) -> Result<()> {
        self.blobs.lock().await.remove(&id);
        Ok(())
    }

    async fn exists(&self, id: ResourceId) -> Result<bool> {
        Ok(self.blobs.lock().await.contains_key(&id))
    }

    async fn size(&self, id: ResourceId) -> Result<Option<u64>> {
        Ok(self.blobs.lock().await.get(&id).map(|b| b.len() as u64))
    }
}
