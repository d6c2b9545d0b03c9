//! NFSv4 attribute bitmap engine (RFC5661 §5.8, §3.3.6 attr4 encoding).
//!
//! Attributes are requested and returned as a bitmap (one bit per attribute
//! number, packed into 32-bit words) followed by the XDR-encoded values of
//! every attribute whose bit was set, in ascending attribute-number order.
//! This module supports the attribute numbers a boot-time read-only mount
//! actually needs; anything else requested is silently left unset in the
//! response bitmap rather than answered with garbage.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;

use crate::nfs::fh::{Filehandle, FH_SIZE};

pub const FATTR4_SUPPORTED_ATTRS: u32 = 0;
pub const FATTR4_TYPE: u32 = 1;
pub const FATTR4_FH_EXPIRE_TYPE: u32 = 2;
pub const FATTR4_CHANGE: u32 = 3;
pub const FATTR4_SIZE: u32 = 4;
pub const FATTR4_LINK_SUPPORT: u32 = 5;
pub const FATTR4_SYMLINK_SUPPORT: u32 = 6;
pub const FATTR4_NAMED_ATTR: u32 = 7;
pub const FATTR4_FSID: u32 = 8;
pub const FATTR4_UNIQUE_HANDLES: u32 = 10;
pub const FATTR4_LEASE_TIME: u32 = 11;
pub const FATTR4_RDATTR_ERROR: u32 = 12;
pub const FATTR4_FILEHANDLE: u32 = 19;
pub const FATTR4_FILEID: u32 = 20;
pub const FATTR4_MODE: u32 = 33;
pub const FATTR4_NUMLINKS: u32 = 35;
pub const FATTR4_OWNER: u32 = 36;
pub const FATTR4_OWNER_GROUP: u32 = 37;
pub const FATTR4_RAWDEV: u32 = 41;
pub const FATTR4_SPACE_USED: u32 = 45;
pub const FATTR4_TIME_ACCESS: u32 = 47;
pub const FATTR4_TIME_METADATA: u32 = 52;
pub const FATTR4_TIME_MODIFY: u32 = 53;

/// Domain half of the `name@domain` owner/owner_group string form RFC5661
/// §5.9 requires; this server has no NFSv4 id-mapper so it echoes the
/// numeric uid/gid as the name part and a fixed local domain.
const OWNER_DOMAIN: &str = "localdomain";

const SUPPORTED: &[u32] = &[
    FATTR4_SUPPORTED_ATTRS,
    FATTR4_TYPE,
    FATTR4_FH_EXPIRE_TYPE,
    FATTR4_CHANGE,
    FATTR4_SIZE,
    FATTR4_LINK_SUPPORT,
    FATTR4_SYMLINK_SUPPORT,
    FATTR4_NAMED_ATTR,
    FATTR4_FSID,
    FATTR4_UNIQUE_HANDLES,
    FATTR4_LEASE_TIME,
    FATTR4_RDATTR_ERROR,
    FATTR4_FILEHANDLE,
    FATTR4_FILEID,
    FATTR4_MODE,
    FATTR4_NUMLINKS,
    FATTR4_OWNER,
    FATTR4_OWNER_GROUP,
    FATTR4_RAWDEV,
    FATTR4_SPACE_USED,
    FATTR4_TIME_ACCESS,
    FATTR4_TIME_METADATA,
    FATTR4_TIME_MODIFY,
];

fn set_bit(bitmap: &mut Vec<u32>, attr: u32) {
    let word = (attr / 32) as usize;
    while bitmap.len() <= word {
        bitmap.push(0);
    }
    bitmap[word] |= 1 << (attr % 32);
}

fn is_requested(requested: &[u32], attr: u32) -> bool {
    let word = (attr / 32) as usize;
    requested.get(word).map(|w| w & (1 << (attr % 32)) != 0).unwrap_or(false)
}

fn nfs_type(metadata: &Metadata) -> u32 {
    if metadata.is_dir() {
        2 // NF4DIR
    } else if metadata.file_type().is_symlink() {
        5 // NF4LNK
    } else {
        1 // NF4REG
    }
}

fn pack_time(out: &mut Vec<u8>, secs: i64) {
    out.extend_from_slice(&secs.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // nseconds
}

/// Encodes the attributes in `requested` that this server supports for
/// `metadata`/`fh`, returning the response bitmap words and the packed
/// attribute value bytes, in that order, ready to append to a GETATTR or
/// READDIR reply.
pub fn encode(requested: &[u32], metadata: &Metadata, fh: &Filehandle) -> (Vec<u32>, Vec<u8>) {
    let mut respbitmap = Vec::new();
    let mut out = Vec::new();

    for &attr in SUPPORTED {
        if !is_requested(requested, attr) {
            continue;
        }
        set_bit(&mut respbitmap, attr);

        match attr {
            FATTR4_SUPPORTED_ATTRS => {
                let mut words = Vec::new();
                for &a in SUPPORTED {
                    set_bit(&mut words, a);
                }
                out.extend_from_slice(&(words.len() as u32).to_be_bytes());
                for w in words {
                    out.extend_from_slice(&w.to_be_bytes());
                }
            }
            FATTR4_TYPE => out.extend_from_slice(&nfs_type(metadata).to_be_bytes()),
            FATTR4_FH_EXPIRE_TYPE => out.extend_from_slice(&0u32.to_be_bytes()), // FH4_PERSISTENT
            FATTR4_CHANGE => out.extend_from_slice(&(metadata.mtime() as u64).to_be_bytes()),
            FATTR4_SIZE => out.extend_from_slice(&(metadata.len()).to_be_bytes()),
            FATTR4_LINK_SUPPORT => out.push(0),
            FATTR4_SYMLINK_SUPPORT => out.push(1),
            FATTR4_NAMED_ATTR => out.push(0),
            FATTR4_FSID => {
                out.extend_from_slice(&(metadata.dev()).to_be_bytes());
                out.extend_from_slice(&0u64.to_be_bytes());
            }
            FATTR4_UNIQUE_HANDLES => out.push(1),
            FATTR4_LEASE_TIME => out.extend_from_slice(&90u32.to_be_bytes()),
            FATTR4_RDATTR_ERROR => out.extend_from_slice(&0u32.to_be_bytes()),
            FATTR4_FILEHANDLE => {
                out.extend_from_slice(&(FH_SIZE as u32).to_be_bytes());
                out.extend_from_slice(fh.as_bytes());
            }
            FATTR4_FILEID => out.extend_from_slice(&(metadata.ino()).to_be_bytes()),
            FATTR4_MODE => out.extend_from_slice(&((metadata.mode() & 0o7777) as u32).to_be_bytes()),
            FATTR4_NUMLINKS => out.extend_from_slice(&(metadata.nlink() as u32).to_be_bytes()),
            FATTR4_OWNER => {
                let owner = format!("{}@{}", metadata.uid(), OWNER_DOMAIN);
                out.extend_from_slice(&(owner.len() as u32).to_be_bytes());
                out.extend_from_slice(owner.as_bytes());
                let pad = (4 - owner.len() % 4) % 4;
                out.extend(std::iter::repeat(0u8).take(pad));
            }
            FATTR4_OWNER_GROUP => {
                let group = format!("{}@{}", metadata.gid(), OWNER_DOMAIN);
                out.extend_from_slice(&(group.len() as u32).to_be_bytes());
                out.extend_from_slice(group.as_bytes());
                let pad = (4 - group.len() % 4) % 4;
                out.extend(std::iter::repeat(0u8).take(pad));
            }
            FATTR4_RAWDEV => {
                out.extend_from_slice(&0u32.to_be_bytes());
                out.extend_from_slice(&0u32.to_be_bytes());
            }
            FATTR4_SPACE_USED => out.extend_from_slice(&(metadata.blocks() as u64 * 512).to_be_bytes()),
            FATTR4_TIME_ACCESS => pack_time(&mut out, metadata.atime()),
            FATTR4_TIME_METADATA => pack_time(&mut out, metadata.ctime()),
            FATTR4_TIME_MODIFY => pack_time(&mut out, metadata.mtime()),
            _ => unreachable!(),
        }
    }

    (respbitmap, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file() -> (std::path::PathBuf, Metadata) {
        let path = std::env::temp_dir().join(format!("pxecore-nfs-attrs-test-{}", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"hello").unwrap();
        let metadata = std::fs::metadata(&path).unwrap();
        (path, metadata)
    }

    #[test]
    fn encodes_only_requested_attributes() {
        let (_path, metadata) = temp_file();
        let fh = Filehandle::for_path("/srv/hello");
        let mut requested = Vec::new();
        set_bit(&mut requested, FATTR4_SIZE);
        set_bit(&mut requested, FATTR4_TYPE);

        let (respbitmap, packed) = encode(&requested, &metadata, &fh);
        assert!(is_requested(&respbitmap, FATTR4_SIZE));
        assert!(is_requested(&respbitmap, FATTR4_TYPE));
        assert!(!is_requested(&respbitmap, FATTR4_MODE));
        assert!(!packed.is_empty());
    }
}
