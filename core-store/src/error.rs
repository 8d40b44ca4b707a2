use core_registry::ResourceId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Ciphertext missing for resource {0}")]
    Missing(ResourceId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
