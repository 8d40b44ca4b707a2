//! # Access Token Issuer
//!
//! Short-lived, single-use credentials binding one request to one resource.
//!
//! ## Security Properties
//!
//! - Token values are 32 bytes from a CSPRNG, base64-url-encoded, and never
//!   logged
//! - A token is valid only while unexpired and unconsumed; consumption is
//!   permanent regardless of remaining TTL
//! - Unknown, consumed, and expired tokens are indistinguishable to callers
//!   (all read as "invalid"); the distinction exists only in logs
//! - The store is owned by the issuer instance, not process-global, so it can
//!   be injected, reset between tests, and dropped with its scope
//!
//! The store is transient by design: restarting the process invalidates
//! outstanding tokens, which is safe because resource state is durable and a
//! caller can simply request a new token.

pub mod issuer;

pub use issuer::{AccessToken, TokenIssuer};
