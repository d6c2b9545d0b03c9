//! Pluggable storage backend for serving TFTP read requests.
//!
//! The filesystem backend (jailed to a configured root) and an HTTP origin
//! backend both implement this trait, mirroring the abstract/filesystem
//! split the upstream server drew between `AbstractClient` and
//! `FileBackedClient`.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("origin request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// A single open transfer source, handed out by a [`Backend`] for one
/// read request.
#[async_trait]
pub trait FileSource: Send {
    fn filesize(&self) -> u64;

    /// Reads up to `blksize` bytes. Returns fewer than `blksize` (or zero)
    /// only on the final block.
    async fn read_block(&mut self, blksize: usize) -> Result<Vec<u8>, BackendError>;
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn open(&self, filename: &str) -> Result<Box<dyn FileSource>, BackendError>;
}
