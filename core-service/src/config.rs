//! Service configuration

use std::time::Duration;

use crate::error::{Result, VaultError};

/// How pipeline runs are dispatched after registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Materialization {
    /// `tokio::spawn` the pipeline run; registration returns immediately.
    #[default]
    Background,
    /// Await the pipeline run before returning. Useful for tests and for
    /// hosts that want the resource deliverable as soon as registration
    /// completes.
    Inline,
}

/// Tunable policy for the vault service.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// How long a resource stays deliverable after registration.
    pub resource_ttl: Duration,
    /// Access token lifetime.
    pub token_ttl: Duration,
    /// Per-request timeout for origin fetches.
    pub fetch_timeout: Duration,
    pub materialization: Materialization,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            resource_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            token_ttl: Duration::from_secs(30 * 60),
            fetch_timeout: Duration::from_secs(300),
            materialization: Materialization::Background,
        }
    }
}

impl VaultConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource_ttl(mut self, ttl: Duration) -> Self {
        self.resource_ttl = ttl;
        self
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_materialization(mut self, materialization: Materialization) -> Self {
        self.materialization = materialization;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.resource_ttl.is_zero() {
            return Err(VaultError::Validation {
                field: "resource_ttl",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.token_ttl.is_zero() {
            return Err(VaultError::Validation {
                field: "token_ttl",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.fetch_timeout.is_zero() {
            return Err(VaultError::Validation {
                field: "fetch_timeout",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
