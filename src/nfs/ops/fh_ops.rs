//! Filehandle-cursor operations: PUTFH, PUTROOTFH, GETFH, LOOKUP, READLINK.

use crate::core::codec::{pad4, Reader};
use crate::nfs::fh::{Filehandle, FH_SIZE};
use crate::nfs::ops::{OpContext, NFS4ERR_NOENT, NFS4ERR_NOTDIR, NFS4ERR_STALE, NFS4ERR_WRONG_TYPE, NFS4_OK};

pub fn putfh(reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let len = reader.u32().unwrap_or(0) as usize;
    let raw = reader.take(len).unwrap_or(&[]);
    let fh = Filehandle::from_wire(raw);

    let global = ctx.global.lock().expect("nfs global state mutex poisoned");
    if !global.fhs.contains_key(&fh) {
        response.extend_from_slice(&22u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE.to_be_bytes());
        return NFS4ERR_STALE;
    }
    drop(global);

    ctx.conn.current_fh = Some(fh);
    response.extend_from_slice(&22u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    NFS4_OK
}

pub fn putrootfh(_reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let global = ctx.global.lock().expect("nfs global state mutex poisoned");
    let root_fh = global.root_filehandle();
    drop(global);

    ctx.conn.current_fh = Some(root_fh);
    response.extend_from_slice(&24u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    NFS4_OK
}

pub fn getfh(_reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let Some(fh) = ctx.conn.current_fh.clone() else {
        response.extend_from_slice(&10u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE.to_be_bytes());
        return NFS4ERR_STALE;
    };

    response.extend_from_slice(&10u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    response.extend_from_slice(&(FH_SIZE as u32).to_be_bytes());
    response.extend_from_slice(fh.as_bytes());
    NFS4_OK
}

pub fn lookup(reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let Ok(name_bytes) = reader.opaque() else {
        response.extend_from_slice(&15u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_NOENT.to_be_bytes());
        return NFS4ERR_NOENT;
    };
    let name = String::from_utf8_lossy(name_bytes).into_owned();

    let mut global = ctx.global.lock().expect("nfs global state mutex poisoned");
    let Some(current_fh) = ctx.conn.current_fh.clone() else {
        response.extend_from_slice(&15u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE.to_be_bytes());
        return NFS4ERR_STALE;
    };
    let Some(path) = global.path_for(&current_fh).cloned() else {
        response.extend_from_slice(&15u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE.to_be_bytes());
        return NFS4ERR_STALE;
    };

    let is_dir = std::fs::symlink_metadata(&path).map(|m| m.is_dir()).unwrap_or(false);
    if !is_dir {
        response.extend_from_slice(&15u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_NOTDIR.to_be_bytes());
        return NFS4ERR_NOTDIR;
    }
    let newpath = path.join(&name);
    if !newpath.exists() {
        response.extend_from_slice(&15u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_NOENT.to_be_bytes());
        return NFS4ERR_NOENT;
    }

    let new_fh = global.intern(newpath);
    ctx.conn.current_fh = Some(new_fh);

    response.extend_from_slice(&15u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    NFS4_OK
}

pub fn readlink(_reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let global = ctx.global.lock().expect("nfs global state mutex poisoned");
    let Some(fh) = ctx.conn.current_fh.clone() else {
        response.extend_from_slice(&27u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE.to_be_bytes());
        return NFS4ERR_STALE;
    };
    let Some(path) = global.path_for(&fh) else {
        response.extend_from_slice(&27u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE.to_be_bytes());
        return NFS4ERR_STALE;
    };

    let Ok(meta) = std::fs::symlink_metadata(path) else {
        response.extend_from_slice(&27u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_NOENT.to_be_bytes());
        return NFS4ERR_NOENT;
    };
    if !meta.file_type().is_symlink() {
        response.extend_from_slice(&27u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_WRONG_TYPE.to_be_bytes());
        return NFS4ERR_WRONG_TYPE;
    }

    let target = std::fs::read_link(path).unwrap_or_default();
    let target = target.to_string_lossy().into_owned();

    response.extend_from_slice(&27u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    let mut buf = Vec::new();
    buf.extend_from_slice(&(target.len() as u32).to_be_bytes());
    buf.extend_from_slice(target.as_bytes());
    pad4(&mut buf);
    response.extend_from_slice(&buf);
    NFS4_OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfs::state::{ClientRegistry, ConnState, GlobalState};
    use std::sync::Mutex;

    fn conn_at_root(global: &Mutex<GlobalState>) -> ConnState {
        let mut conn = ConnState::default();
        conn.current_fh = Some(global.lock().unwrap().root_filehandle());
        conn
    }

    fn lookup_args(name: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
        buf.extend_from_slice(name.as_bytes());
        pad4(&mut buf);
        buf
    }

    #[test]
    fn lookup_through_symlink_to_directory_is_notdir() {
        let dir = std::env::temp_dir().join(format!("pxecore-nfs-lookup-symlink-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let real_dir = dir.join("real");
        std::fs::create_dir_all(&real_dir).unwrap();
        std::fs::write(real_dir.join("child"), b"x").unwrap();
        let link = dir.join("link_to_real");
        std::os::unix::fs::symlink(&real_dir, &link).unwrap();

        let global = Mutex::new(GlobalState::new(dir.clone(), false));
        let clients = ClientRegistry::new();
        let mut conn = conn_at_root(&global);
        let link_fh = global.lock().unwrap().intern(link);
        conn.current_fh = Some(link_fh);

        let args = lookup_args("child");
        let mut reader = Reader::new(&args);
        let mut response = Vec::new();
        let mut ctx = OpContext { global: &global, clients: &clients, conn: &mut conn };
        let status = lookup(&mut reader, &mut response, &mut ctx);
        assert_eq!(status, NFS4ERR_NOTDIR);
    }

    #[test]
    fn lookup_through_real_directory_succeeds() {
        let dir = std::env::temp_dir().join(format!("pxecore-nfs-lookup-real-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("child"), b"x").unwrap();

        let global = Mutex::new(GlobalState::new(dir, false));
        let clients = ClientRegistry::new();
        let mut conn = conn_at_root(&global);

        let args = lookup_args("child");
        let mut reader = Reader::new(&args);
        let mut response = Vec::new();
        let mut ctx = OpContext { global: &global, clients: &clients, conn: &mut conn };
        let status = lookup(&mut reader, &mut response, &mut ctx);
        assert_eq!(status, NFS4_OK);
    }
}
