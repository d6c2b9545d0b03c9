//! Filesystem-backed [`Backend`], jailed to a configured root directory —
//! the Rust equivalent of the upstream server's `chdir`+`chroot` pairing,
//! done here with path canonicalization since we don't run as root.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::tftp::backend::{Backend, BackendError, FileSource};

pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, filename: &str) -> Result<PathBuf, BackendError> {
        let joined = self.root.join(filename.trim_start_matches('/'));
        let canonical = std::fs::canonicalize(&joined).map_err(|_| BackendError::NotFound(filename.to_string()))?;
        let root_canonical = std::fs::canonicalize(&self.root)?;
        if !canonical.starts_with(&root_canonical) {
            return Err(BackendError::NotFound(filename.to_string()));
        }
        Ok(canonical)
    }
}

struct FsFileSource {
    file: File,
    filesize: u64,
}

#[async_trait]
impl FileSource for FsFileSource {
    fn filesize(&self) -> u64 {
        self.filesize
    }

    async fn read_block(&mut self, blksize: usize) -> Result<Vec<u8>, BackendError> {
        let mut buf = vec![0u8; blksize];
        let n = self.file.read(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }
}

#[async_trait]
impl Backend for FsBackend {
    async fn open(&self, filename: &str) -> Result<Box<dyn FileSource>, BackendError> {
        let path = self.resolve(filename)?;
        if !path.is_file() {
            return Err(BackendError::NotFound(filename.to_string()));
        }
        let meta = tokio::fs::metadata(&path).await?;
        let file = File::open(&path).await?;
        Ok(Box::new(FsFileSource { file, filesize: meta.len() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn serves_file_within_root() {
        let dir = tempdir();
        std::fs::write(dir.join("boot.img"), b"hello world").unwrap();
        let backend = FsBackend::new(&dir);
        let mut source = backend.open("boot.img").await.unwrap();
        assert_eq!(source.filesize(), 11);
        let block = source.read_block(512).await.unwrap();
        assert_eq!(block, b"hello world");
    }

    #[tokio::test]
    async fn rejects_path_escaping_root() {
        let dir = tempdir();
        std::fs::write(dir.join("boot.img"), b"x").unwrap();
        let backend = FsBackend::new(&dir);
        let result = backend.open("../../etc/passwd").await;
        assert!(result.is_err());
    }

    fn tempdir() -> PathBuf {
        let path = std::env::temp_dir().join(format!("pxecore-tftp-test-{}", std::process::id()));
        std::fs::create_dir_all(&path).unwrap();
        let mut marker = std::fs::File::create(path.join(".keep")).unwrap();
        writeln!(marker, "").ok();
        path
    }
}
