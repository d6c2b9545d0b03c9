//! Error types shared by the hook pipeline and the protocol servers.
//!
//! Each protocol additionally defines its own semantic error enum (see
//! `dhcp::lease::LeaseError`, `tftp::packet::TftpWireError`,
//! `nfs::compound::NfsStatus`); this module only carries the pipeline-level
//! and top-level plumbing errors.

use thiserror::Error;

/// Raised by the [`crate::hooks::hook_registry::HookRegistry`] when hook
/// execution cannot proceed (circular dependency, missing failure chain, or
/// a fatal hook failing).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HookError(String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Top-level error surfaced by a server's main loop. Every loop catches
/// this, logs it, and continues — there is no fatal path (spec.md §7).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("hook pipeline error: {0}")]
    Hook(#[from] HookError),
}
