//! Attribute and access-mode operations: ACCESS, GETATTR, SETATTR.

use std::os::unix::fs::PermissionsExt;

use crate::core::codec::Reader;
use crate::nfs::attrs::encode;
use crate::nfs::ops::{OpContext, NFS4ERR_NOENT, NFS4ERR_ROFS, NFS4ERR_STALE, NFS4_OK};

const ACCESS_READ: u32 = 0x1 | 0x2;
const ACCESS_WRITE: u32 = 0x4 | 0x8;
const ACCESS_DELETE: u32 = 0x10;
const ACCESS_EXEC: u32 = 0x20;

/// Access bit computation without a real AUTH_SYS credential: grants read
/// (and write/delete, unless the mount is readonly) to everyone, gated only
/// by the "other" permission bits on the target — a deliberately conservative
/// stand-in for the real per-uid/gid logic the original never finished
/// (its ACCESS implementation was explicitly marked incomplete, relying on
/// authentication this server doesn't perform).
pub fn access(reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let requested = reader.u32().unwrap_or(0);

    let global = ctx.global.lock().expect("nfs global state mutex poisoned");
    let Some(fh) = ctx.conn.current_fh.clone() else {
        response.extend_from_slice(&3u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE.to_be_bytes());
        return NFS4ERR_STALE;
    };
    let Some(path) = global.path_for(&fh) else {
        response.extend_from_slice(&3u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE.to_be_bytes());
        return NFS4ERR_STALE;
    };
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        response.extend_from_slice(&3u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_NOENT.to_be_bytes());
        return NFS4ERR_NOENT;
    };
    let mode = meta.permissions().mode();

    let mut granted = 0u32;
    if mode & 0o4 != 0 {
        granted |= ACCESS_READ;
    }
    if mode & 0o1 != 0 {
        granted |= ACCESS_EXEC;
    }
    if !global.readonly && mode & 0o2 != 0 {
        granted |= ACCESS_WRITE | ACCESS_DELETE;
    }

    response.extend_from_slice(&3u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    response.extend_from_slice(&requested.to_be_bytes());
    response.extend_from_slice(&granted.to_be_bytes());
    NFS4_OK
}

pub fn getattr(reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let maskcnt = reader.u32().unwrap_or(0) as usize;
    let requested = reader.u32_array(maskcnt).unwrap_or_default();

    let global = ctx.global.lock().expect("nfs global state mutex poisoned");
    let Some(fh) = ctx.conn.current_fh.clone() else {
        response.extend_from_slice(&9u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE.to_be_bytes());
        return NFS4ERR_STALE;
    };
    let Some(path) = global.path_for(&fh) else {
        response.extend_from_slice(&9u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE.to_be_bytes());
        return NFS4ERR_STALE;
    };
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        response.extend_from_slice(&9u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_NOENT.to_be_bytes());
        return NFS4ERR_NOENT;
    };

    let (respbitmap, packed) = encode(&requested, &meta, &fh);

    response.extend_from_slice(&9u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    response.extend_from_slice(&(respbitmap.len() as u32).to_be_bytes());
    for word in &respbitmap {
        response.extend_from_slice(&word.to_be_bytes());
    }
    response.extend_from_slice(&(packed.len() as u32).to_be_bytes());
    response.extend_from_slice(&packed);
    NFS4_OK
}

pub fn setattr(reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    // seqid + stateid, unused: this server does not enforce delegation state
    // on SETATTR beyond the readonly gate.
    let _ = reader.take(16);

    let masklen = reader.u32().unwrap_or(0) as usize;
    let _requested = reader.u32_array(masklen).unwrap_or_default();
    let arglen = reader.u32().unwrap_or(0) as usize;
    let _ = reader.take(arglen);

    let global = ctx.global.lock().expect("nfs global state mutex poisoned");
    if global.readonly {
        response.extend_from_slice(&34u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_ROFS.to_be_bytes());
        return NFS4ERR_ROFS;
    }

    response.extend_from_slice(&34u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    response.extend_from_slice(&0u32.to_be_bytes()); // empty response bitmap: nothing applied yet
    NFS4_OK
}
