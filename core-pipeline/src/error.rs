use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Origin fetch failed (request error or non-success status).
    #[error("Upstream fetch failed: {0}")]
    UpstreamFetch(String),

    /// Encryption failed or the ciphertext framing is invalid.
    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Registry error: {0}")]
    Registry(#[from] core_registry::RegistryError),

    #[error("Store error: {0}")]
    Store(#[from] core_store::StoreError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
