//! Pipeline orchestration: fetch, encrypt, commit

use bytes::BytesMut;
use chrono::Duration;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use core_registry::{KeyMaterial, OfflineResource, ResourceId, ResourceRepository, ResourceStatus};
use core_store::{CiphertextStore, CiphertextWriter};

use crate::encryption::{StreamEncryptor, CHUNK_SIZE};
use crate::error::{PipelineError, Result};
use crate::fetch::OriginFetcher;

/// Result of one pipeline run.
#[derive(Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Ciphertext committed; the resource is now active.
    Activated { size_bytes: u64 },
    /// The resource was already active; nothing to do.
    AlreadyActive,
    /// The resource was revoked or deleted (before or during the run);
    /// any produced ciphertext was discarded.
    Discarded,
}

/// Fetch-and-encrypt pipeline.
pub struct Pipeline {
    repository: Arc<dyn ResourceRepository>,
    store: Arc<dyn CiphertextStore>,
    fetcher: Arc<dyn OriginFetcher>,
    resource_ttl: Duration,
    locks: Mutex<HashMap<ResourceId, Arc<Mutex<()>>>>,
}

impl Pipeline {
    pub fn new(
        repository: Arc<dyn ResourceRepository>,
        store: Arc<dyn CiphertextStore>,
        fetcher: Arc<dyn OriginFetcher>,
        resource_ttl: Duration,
    ) -> Self {
        Self {
            repository,
            store,
            fetcher,
            resource_ttl,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Materialize ciphertext for a pending resource.
    ///
    /// Idempotent per resource id: a run for an already-active resource is a
    /// no-op, and concurrent runs for the same id serialize on a per-id lock
    /// so at most one of them writes ciphertext.
    #[instrument(skip(self), fields(resource_id = %id))]
    pub async fn run(&self, id: ResourceId) -> Result<PipelineOutcome> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock.lock().await;

        let outcome = self.run_locked(id).await;

        drop(guard);
        // Drop the id's lock entry once no other run holds it.
        let mut locks = self.locks.lock().await;
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(&id);
        }

        outcome
    }

    async fn run_locked(&self, id: ResourceId) -> Result<PipelineOutcome> {
        let Some(resource) = self.repository.find_by_id(id).await? else {
            debug!("resource deleted before pipeline run; discarding");
            return Ok(PipelineOutcome::Discarded);
        };

        match resource.status {
            ResourceStatus::Pending => {}
            ResourceStatus::Active => {
                debug!("resource already active; pipeline run is a no-op");
                return Ok(PipelineOutcome::AlreadyActive);
            }
            ResourceStatus::Expired | ResourceStatus::Revoked => {
                debug!(status = %resource.status, "resource not pending; discarding run");
                return Ok(PipelineOutcome::Discarded);
            }
        }

        let (key_material, size_bytes) = match self.fetch_and_encrypt(&resource).await {
            Ok(result) => result,
            Err(e) => {
                // Leave the record pending so a later request can retry; make
                // sure no partial ciphertext survives.
                error!(error = %e, "pipeline run failed; resource stays pending");
                if let Err(cleanup) = self.store.delete(id).await {
                    warn!(error = %cleanup, "failed to clean up after pipeline failure");
                }
                return Err(e);
            }
        };

        let expires_at = resource.created_at + self.resource_ttl;
        if self
            .repository
            .activate(id, &key_material, size_bytes, expires_at)
            .await?
        {
            info!(size_bytes, expires_at = %expires_at, "resource activated");
            Ok(PipelineOutcome::Activated { size_bytes })
        } else {
            // Revoked or deleted while we were fetching: the commit loses.
            warn!("resource changed state mid-flight; discarding ciphertext");
            self.store.delete(id).await?;
            Ok(PipelineOutcome::Discarded)
        }
    }

    async fn fetch_and_encrypt(&self, resource: &OfflineResource) -> Result<(KeyMaterial, u64)> {
        let origin = self.fetcher.fetch(&resource.source_location).await?;

        // Fresh key material per resource; never reused, never derived.
        let key_material = KeyMaterial::generate();
        let mut encryptor = StreamEncryptor::new(&key_material)?;

        let mut writer = self.store.open_writer(resource.id).await?;
        match Self::encrypt_stream(origin.stream, &mut encryptor, writer.as_mut()).await {
            Ok(plaintext_bytes) => {
                let ciphertext_bytes = writer.finish().await?;
                debug!(plaintext_bytes, ciphertext_bytes, "content encrypted");
                Ok((key_material, ciphertext_bytes))
            }
            Err(e) => {
                if let Err(abort_err) = writer.abort().await {
                    warn!(error = %abort_err, "failed to abort ciphertext write");
                }
                Err(e)
            }
        }
    }

    async fn encrypt_stream(
        mut stream: core_store::ByteStream,
        encryptor: &mut StreamEncryptor,
        writer: &mut dyn CiphertextWriter,
    ) -> Result<u64> {
        let mut buffer = BytesMut::with_capacity(CHUNK_SIZE);
        let mut plaintext_bytes = 0u64;

        while let Some(next) = stream.next().await {
            let data = next
                .map_err(|e| PipelineError::UpstreamFetch(format!("stream read failed: {}", e)))?;
            plaintext_bytes += data.len() as u64;
            buffer.extend_from_slice(&data);

            while buffer.len() >= CHUNK_SIZE {
                let chunk = buffer.split_to(CHUNK_SIZE);
                writer.append(encryptor.seal_chunk(&chunk)?).await?;
            }
        }

        if !buffer.is_empty() {
            writer.append(encryptor.seal_chunk(&buffer)?).await?;
        }

        Ok(plaintext_bytes)
    }
}
