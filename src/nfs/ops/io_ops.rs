//! File and directory data operations: CREATE, OPEN, CLOSE, READ, WRITE,
//! READDIR.

use std::fs::OpenOptions;
use std::io::{Read as _, Seek, SeekFrom, Write as _};

use rand::RngCore;

use crate::core::codec::{pad4, pad4_len, Reader};
use crate::nfs::attrs::encode;
use crate::nfs::ops::{OpContext, NFS4ERR_NOENT, NFS4ERR_ROFS, NFS4ERR_STALE, NFS4_OK};

fn current_path(ctx: &OpContext) -> Option<std::path::PathBuf> {
    let fh = ctx.conn.current_fh.clone()?;
    let global = ctx.global.lock().expect("nfs global state mutex poisoned");
    global.path_for(&fh).cloned()
}

pub fn create(reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let ftype = reader.u32().unwrap_or(1);
    let Ok(name) = reader.opaque() else {
        response.extend_from_slice(&6u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_NOENT.to_be_bytes());
        return NFS4ERR_NOENT;
    };
    let name = String::from_utf8_lossy(name).into_owned();

    let mut link_target = None;
    if ftype == 5 {
        // NF4LNK: a second opaque carries the symlink target.
        link_target = reader.opaque().ok().map(|b| String::from_utf8_lossy(b).into_owned());
    }

    let attrlen = reader.u32().unwrap_or(0) as usize;
    let _attr_bitmap = reader.u32_array(attrlen).unwrap_or_default();
    let attrslen = reader.u32().unwrap_or(0) as usize;
    let _ = reader.take(attrslen);

    {
        let global = ctx.global.lock().expect("nfs global state mutex poisoned");
        if global.readonly {
            response.extend_from_slice(&6u32.to_be_bytes());
            response.extend_from_slice(&NFS4ERR_ROFS.to_be_bytes());
            return NFS4ERR_ROFS;
        }
    }

    let Some(dir) = current_path(ctx) else {
        response.extend_from_slice(&6u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE.to_be_bytes());
        return NFS4ERR_STALE;
    };
    let newpath = dir.join(&name);

    let created = match ftype {
        2 => std::fs::create_dir(&newpath).is_ok(), // NF4DIR
        5 => link_target.map(|t| std::os::unix::fs::symlink(t, &newpath).is_ok()).unwrap_or(false),
        _ => std::fs::File::create(&newpath).is_ok(), // NF4REG and anything else
    };
    if !created && !newpath.exists() {
        response.extend_from_slice(&6u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_NOENT.to_be_bytes());
        return NFS4ERR_NOENT;
    }

    let mut global = ctx.global.lock().expect("nfs global state mutex poisoned");
    let new_fh = global.intern(newpath);
    drop(global);
    ctx.conn.current_fh = Some(new_fh);

    response.extend_from_slice(&6u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    response.extend_from_slice(&[0u8; 20]); // change_info4: atomic=0, before=0, after=0
    response.extend_from_slice(&0u32.to_be_bytes()); // empty attrset
    NFS4_OK
}

pub fn open(reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let _seqid = reader.u32().unwrap_or(0);
    let _share_access = reader.u32().unwrap_or(0);
    let _share_deny = reader.u32().unwrap_or(0);
    let _clientid = reader.take(8);
    let Ok(_owner) = reader.opaque() else {
        response.extend_from_slice(&18u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_NOENT.to_be_bytes());
        return NFS4ERR_NOENT;
    };

    let opentype = reader.u32().unwrap_or(0);
    let mut createmode = None;
    if opentype != 0 {
        let mode = reader.u32().unwrap_or(0);
        createmode = Some(mode);
        if mode == 0 || mode == 1 {
            let attrlen = reader.u32().unwrap_or(0) as usize;
            let _ = reader.u32_array(attrlen);
            let tosetlen = reader.u32().unwrap_or(0) as usize;
            let _ = reader.take(tosetlen);
        } else if mode == 3 {
            let _verifier = reader.take(8);
            let _ = reader.take(12);
        }
    }

    let openclaim = reader.u32().unwrap_or(0);
    let mut claim_name = None;
    if openclaim == 0 {
        claim_name = reader.opaque().ok().map(|b| String::from_utf8_lossy(b).into_owned());
    } else if openclaim == 1 {
        let _delegate_type = reader.u32().unwrap_or(0);
        let global = ctx.global.lock().expect("nfs global state mutex poisoned");
        if global.readonly {
            response.extend_from_slice(&18u32.to_be_bytes());
            response.extend_from_slice(&NFS4ERR_ROFS.to_be_bytes());
            return NFS4ERR_ROFS;
        }
    }

    let Some(name) = claim_name else {
        // CLAIM_PREVIOUS / CLAIM_DELEGATE_*: not supported by this server,
        // operate on the current filehandle as-is.
        return finish_open(response, ctx, None);
    };

    let Some(dir) = current_path(ctx) else {
        response.extend_from_slice(&18u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE.to_be_bytes());
        return NFS4ERR_STALE;
    };
    let newpath = dir.join(&name);

    let readonly = ctx.global.lock().expect("nfs global state mutex poisoned").readonly;
    if opentype != 0 {
        if readonly {
            response.extend_from_slice(&18u32.to_be_bytes());
            response.extend_from_slice(&NFS4ERR_ROFS.to_be_bytes());
            return NFS4ERR_ROFS;
        }
        if !newpath.exists() && createmode != Some(4) {
            let _ = std::fs::File::create(&newpath);
        }
    }

    let mut global = ctx.global.lock().expect("nfs global state mutex poisoned");
    let fh = global.intern(newpath);
    drop(global);
    finish_open(response, ctx, Some(fh))
}

fn finish_open(response: &mut Vec<u8>, ctx: &mut OpContext, fh: Option<crate::nfs::fh::Filehandle>) -> u32 {
    if let Some(fh) = fh.clone() {
        ctx.conn.current_fh = Some(fh);
    }

    let mut stateid = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut stateid);
    if let Some(fh) = fh {
        let mut global = ctx.global.lock().expect("nfs global state mutex poisoned");
        global.locks.entry(fh).or_default().insert(stateid, (0, 0));
    }

    response.extend_from_slice(&18u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    response.extend_from_slice(&1u32.to_be_bytes()); // stateid seqid
    response.extend_from_slice(&stateid);
    response.extend_from_slice(&[0u8; 20]); // change_info4
    response.extend_from_slice(&0u32.to_be_bytes()); // rflags
    response.extend_from_slice(&0u32.to_be_bytes()); // attrset, empty
    response.extend_from_slice(&0u32.to_be_bytes()); // OPEN_DELEGATE_NONE
    NFS4_OK
}

pub fn close(reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let _seqid = reader.u32().unwrap_or(0);
    let stateid_seqid = reader.u32().unwrap_or(0);
    let stateid_bytes = reader.take(12).unwrap_or(&[0u8; 12][..]).to_vec();
    let mut stateid = [0u8; 12];
    stateid.copy_from_slice(&stateid_bytes[..12.min(stateid_bytes.len())]);

    if let Some(fh) = ctx.conn.current_fh.clone() {
        let mut global = ctx.global.lock().expect("nfs global state mutex poisoned");
        if let Some(locks) = global.locks.get_mut(&fh) {
            locks.remove(&stateid);
        }
    }

    response.extend_from_slice(&4u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    response.extend_from_slice(&stateid_seqid.to_be_bytes());
    response.extend_from_slice(&stateid);
    NFS4_OK
}

pub fn read(reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let _seqid = reader.u32().unwrap_or(0);
    let _stateid = reader.take(12);
    let offset = reader.u64().unwrap_or(0);
    let count = reader.u32().unwrap_or(0) as usize;

    let Some(path) = current_path(ctx) else {
        response.extend_from_slice(&25u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE.to_be_bytes());
        return NFS4ERR_STALE;
    };

    let Ok(mut file) = std::fs::File::open(&path) else {
        response.extend_from_slice(&25u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_NOENT.to_be_bytes());
        return NFS4ERR_NOENT;
    };
    let _ = file.seek(SeekFrom::Start(offset));
    let mut data = vec![0u8; count];
    let n = file.read(&mut data).unwrap_or(0);
    data.truncate(n);
    let filesize = file.seek(SeekFrom::End(0)).unwrap_or(0);
    let eof = offset + data.len() as u64 >= filesize;

    response.extend_from_slice(&25u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    response.extend_from_slice(&(eof as u32).to_be_bytes());
    response.extend_from_slice(&(data.len() as u32).to_be_bytes());
    response.extend_from_slice(&data);
    let pad = pad4_len(data.len());
    response.extend(std::iter::repeat(0u8).take(pad));
    NFS4_OK
}

pub fn write(reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let _seqid = reader.u32().unwrap_or(0);
    let _stateid = reader.take(12);
    let offset = reader.u64().unwrap_or(0);
    let _stable = reader.u32().unwrap_or(0);
    let Ok(data) = reader.opaque() else {
        response.extend_from_slice(&38u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_NOENT.to_be_bytes());
        return NFS4ERR_NOENT;
    };
    let data = data.to_vec();

    let readonly = ctx.global.lock().expect("nfs global state mutex poisoned").readonly;
    if readonly {
        response.extend_from_slice(&38u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_ROFS.to_be_bytes());
        return NFS4ERR_ROFS;
    }

    let Some(path) = current_path(ctx) else {
        response.extend_from_slice(&38u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE.to_be_bytes());
        return NFS4ERR_STALE;
    };
    let Ok(mut file) = OpenOptions::new().write(true).open(&path) else {
        response.extend_from_slice(&38u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_NOENT.to_be_bytes());
        return NFS4ERR_NOENT;
    };
    let _ = file.seek(SeekFrom::Start(offset));
    let _ = file.write_all(&data);

    response.extend_from_slice(&38u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    response.extend_from_slice(&(data.len() as u32).to_be_bytes());
    response.extend_from_slice(&2u32.to_be_bytes()); // FILE_SYNC4
    response.extend_from_slice(&[0u8; 8]); // write verifier
    NFS4_OK
}

pub fn readdir(reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let cookie = reader.u32().unwrap_or(0);
    let _cookie_high = reader.u32().unwrap_or(0);
    let _cookie_verf = reader.take(8);
    let _dircount = reader.u32().unwrap_or(0);
    let maxcount = reader.u32().unwrap_or(u32::MAX) as usize;
    let maskcnt = reader.u32().unwrap_or(0) as usize;
    let requested = reader.u32_array(maskcnt).unwrap_or_default();

    let Some(path) = current_path(ctx) else {
        response.extend_from_slice(&26u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE.to_be_bytes());
        return NFS4ERR_STALE;
    };
    let Ok(entries) = std::fs::read_dir(&path) else {
        response.extend_from_slice(&26u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_NOENT.to_be_bytes());
        return NFS4ERR_NOENT;
    };
    let names: Vec<String> = entries.filter_map(|e| e.ok()).map(|e| e.file_name().to_string_lossy().into_owned()).collect();

    response.extend_from_slice(&26u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    response.extend_from_slice(&(names.len() as u32).to_be_bytes()); // cookieverf high
    response.extend_from_slice(&1u32.to_be_bytes()); // cookieverf low

    let mut remaining: usize = maxcount;
    let mut eof = true;
    let skip = if cookie > 0 { cookie as usize + 1 } else { 0 };

    for (idx, name) in names.iter().enumerate().skip(skip) {
        let entry_path = path.join(name);
        let Ok(meta) = std::fs::symlink_metadata(&entry_path) else { continue };

        let mut global = ctx.global.lock().expect("nfs global state mutex poisoned");
        let fh = global.intern(entry_path);
        drop(global);

        let (respbitmap, packed) = encode(&requested, &meta, &fh);

        let mut entry_bytes = Vec::new();
        entry_bytes.extend_from_slice(&1u32.to_be_bytes()); // value follows
        entry_bytes.extend_from_slice(&(idx as u32).to_be_bytes());
        entry_bytes.extend_from_slice(&0u32.to_be_bytes());
        entry_bytes.extend_from_slice(&(name.len() as u32).to_be_bytes());
        entry_bytes.extend_from_slice(name.as_bytes());
        pad4(&mut entry_bytes);
        entry_bytes.extend_from_slice(&(respbitmap.len() as u32).to_be_bytes());
        for w in &respbitmap {
            entry_bytes.extend_from_slice(&w.to_be_bytes());
        }
        entry_bytes.extend_from_slice(&(packed.len() as u32).to_be_bytes());
        entry_bytes.extend_from_slice(&packed);

        if entry_bytes.len() > remaining {
            eof = false;
            break;
        }
        response.extend_from_slice(&entry_bytes);
        remaining -= entry_bytes.len();
    }

    response.extend_from_slice(&0u32.to_be_bytes()); // no further entry follows
    response.extend_from_slice(&(eof as u32).to_be_bytes());
    NFS4_OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::pad4;
    use crate::nfs::state::{ClientRegistry, ConnState, GlobalState};
    use std::sync::Mutex;

    fn open_args(name: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_be_bytes()); // seqid
        buf.extend_from_slice(&1u32.to_be_bytes()); // share_access
        buf.extend_from_slice(&0u32.to_be_bytes()); // share_deny
        buf.extend_from_slice(&[0u8; 8]); // clientid
        buf.extend_from_slice(&4u32.to_be_bytes()); // owner len
        buf.extend_from_slice(b"test");
        buf.extend_from_slice(&1u32.to_be_bytes()); // opentype = OPEN4_CREATE
        buf.extend_from_slice(&0u32.to_be_bytes()); // createmode = UNCHECKED4
        buf.extend_from_slice(&0u32.to_be_bytes()); // attr bitmap len
        buf.extend_from_slice(&0u32.to_be_bytes()); // attrs len
        buf.extend_from_slice(&0u32.to_be_bytes()); // claim = CLAIM_NULL
        buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
        buf.extend_from_slice(name.as_bytes());
        pad4(&mut buf);
        buf
    }

    fn conn_at_root(global: &Mutex<GlobalState>) -> ConnState {
        let mut conn = ConnState::default();
        conn.current_fh = Some(global.lock().unwrap().root_filehandle());
        conn
    }

    #[test]
    fn open_create_on_readonly_volume_is_rofs() {
        let dir = std::env::temp_dir().join(format!("pxecore-nfs-open-ro-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let global = Mutex::new(GlobalState::new(dir, true));
        let clients = ClientRegistry::new();
        let mut conn = conn_at_root(&global);

        let args = open_args("newfile");
        let mut reader = Reader::new(&args);
        let mut response = Vec::new();
        let mut ctx = OpContext { global: &global, clients: &clients, conn: &mut conn };
        let status = open(&mut reader, &mut response, &mut ctx);
        assert_eq!(status, NFS4ERR_ROFS);
    }

    #[test]
    fn open_create_on_readonly_volume_is_rofs_even_if_file_already_exists() {
        let dir = std::env::temp_dir().join(format!("pxecore-nfs-open-ro-existing-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("newfile"), b"already here").unwrap();
        let global = Mutex::new(GlobalState::new(dir, true));
        let clients = ClientRegistry::new();
        let mut conn = conn_at_root(&global);

        let args = open_args("newfile");
        let mut reader = Reader::new(&args);
        let mut response = Vec::new();
        let mut ctx = OpContext { global: &global, clients: &clients, conn: &mut conn };
        let status = open(&mut reader, &mut response, &mut ctx);
        assert_eq!(status, NFS4ERR_ROFS);
    }

    #[test]
    fn open_create_on_writable_volume_creates_file() {
        let dir = std::env::temp_dir().join(format!("pxecore-nfs-open-rw-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let global = Mutex::new(GlobalState::new(dir.clone(), false));
        let clients = ClientRegistry::new();
        let mut conn = conn_at_root(&global);

        let args = open_args("newfile");
        let mut reader = Reader::new(&args);
        let mut response = Vec::new();
        let mut ctx = OpContext { global: &global, clients: &clients, conn: &mut conn };
        let status = open(&mut reader, &mut response, &mut ctx);
        assert_eq!(status, NFS4_OK);
        assert!(dir.join("newfile").exists());
    }
}
