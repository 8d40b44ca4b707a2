use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid resource id: {0}")]
    InvalidId(String),

    #[error("Unknown resource status: {0}")]
    UnknownStatus(String),

    #[error("Corrupt resource record: {0}")]
    CorruptRecord(String),

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
