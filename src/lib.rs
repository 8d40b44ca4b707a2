//! Workspace facade crate.
//!
//! Host applications can depend on `ovc-workspace` and get the full offline
//! vault surface (`core-service` plus the types it re-exports from the
//! individual workspace crates) without wiring each crate individually.

pub use core_service::*;
