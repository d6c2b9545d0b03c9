//! NFSv4 filehandles (RFC5661 §2.10.3).
//!
//! A filehandle is the SHA-512 hex digest of the absolute path it names,
//! ASCII-encoded to exactly 128 bytes (`NFS4_FHSIZE`). Deriving it from the
//! path rather than handing out opaque serials makes filehandle lookup
//! content-addressed and idempotent: looking up the same path twice always
//! yields the same handle, with no persistent counter to restore on
//! restart.

use sha2::{Digest, Sha512};

pub const FH_SIZE: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filehandle(pub String);

impl Filehandle {
    pub fn for_path(path: &str) -> Self {
        let digest = Sha512::digest(path.as_bytes());
        Self(hex::encode(digest))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn from_wire(raw: &[u8]) -> Self {
        Self(String::from_utf8_lossy(raw).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filehandle_is_128_ascii_bytes() {
        let fh = Filehandle::for_path("/srv/boot");
        assert_eq!(fh.0.len(), FH_SIZE);
        assert!(fh.0.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn same_path_yields_same_filehandle() {
        assert_eq!(Filehandle::for_path("/srv/boot"), Filehandle::for_path("/srv/boot"));
    }

    #[test]
    fn different_paths_yield_different_filehandles() {
        assert_ne!(Filehandle::for_path("/srv/boot"), Filehandle::for_path("/srv/other"));
    }
}
