//! Session and client-lifecycle operations: EXCHANGE_ID, CREATE_SESSION,
//! DESTROY_SESSION, SECINFO_NO_NAME, SEQUENCE, TEST_STATEID,
//! DESTROY_CLIENTID, RECLAIM_COMPLETE.

use rand::RngCore;

use crate::core::codec::{pad4, Reader};
use crate::nfs::ops::{OpContext, NFS4ERR_BADSESSION, NFS4ERR_SEQ_MISORDERED, NFS4ERR_STALE_CLIENTID, NFS4_OK};
use crate::nfs::state::SessionId;

const SERVER_OWNER: &str = "pxecore-nfs";
const SERVER_SCOPE: &str = "pxecore-nfs";

pub fn exchange_id(reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let Ok(owner_id) = reader.opaque() else {
        response.extend_from_slice(&42u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE_CLIENTID.to_be_bytes());
        return NFS4ERR_STALE_CLIENTID;
    };
    let owner_id = owner_id.to_vec();
    let _flags = reader.u32().unwrap_or(0);
    let _state_protect = reader.u32().unwrap_or(0);
    let Ok(_implementation_id) = reader.opaque() else {
        response.extend_from_slice(&42u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE_CLIENTID.to_be_bytes());
        return NFS4ERR_STALE_CLIENTID;
    };

    let clientid = ctx.clients.register(owner_id);
    ctx.conn.current_client = Some(clientid);

    response.extend_from_slice(&42u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    response.extend_from_slice(&clientid);
    response.extend_from_slice(&1u32.to_be_bytes()); // sequence id
    response.extend_from_slice(&0u32.to_be_bytes()); // flags
    response.extend_from_slice(&0u32.to_be_bytes()); // state_protect: SP4_NONE
    response.extend_from_slice(&0u32.to_be_bytes()); // server_owner.minor_id
    let mut owner_buf = Vec::new();
    owner_buf.extend_from_slice(&(SERVER_OWNER.len() as u32).to_be_bytes());
    owner_buf.extend_from_slice(SERVER_OWNER.as_bytes());
    pad4(&mut owner_buf);
    response.extend_from_slice(&owner_buf);
    let mut scope_buf = Vec::new();
    scope_buf.extend_from_slice(&(SERVER_SCOPE.len() as u32).to_be_bytes());
    scope_buf.extend_from_slice(SERVER_SCOPE.as_bytes());
    pad4(&mut scope_buf);
    response.extend_from_slice(&scope_buf);
    response.extend_from_slice(&0u32.to_be_bytes()); // implementation_id, empty array
    NFS4_OK
}

pub fn create_session(reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let clientid_bytes = reader.take(8).unwrap_or(&[0u8; 8][..]);
    let mut clientid = [0u8; 8];
    clientid.copy_from_slice(clientid_bytes);
    let _seqid = reader.u32().unwrap_or(0);
    let _flags = reader.u32().unwrap_or(0);
    // fore channel attrs: 7 u32 fields + request/response cache size
    let _ = reader.take(28);
    let fore_cb_count = reader.u32().unwrap_or(0) as usize;
    let _ = reader.u32_array(fore_cb_count);
    // back channel attrs, same shape
    let _ = reader.take(28);
    let back_cb_count = reader.u32().unwrap_or(0) as usize;
    let _ = reader.u32_array(back_cb_count);
    let _cb_program = reader.u32().unwrap_or(0);
    let _sec_parms_count = reader.u32().unwrap_or(0);

    if ctx.clients.get(&clientid).is_none() {
        response.extend_from_slice(&43u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_STALE_CLIENTID.to_be_bytes());
        return NFS4ERR_STALE_CLIENTID;
    }

    let mut sessid: SessionId = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut sessid);
    ctx.clients.set_session(&clientid, sessid);

    response.extend_from_slice(&43u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    response.extend_from_slice(&sessid);
    response.extend_from_slice(&1u32.to_be_bytes()); // sequence id
    response.extend_from_slice(&0u32.to_be_bytes()); // flags
    // fore channel attrs, echoed back with modest fixed limits
    response.extend_from_slice(&0u32.to_be_bytes()); // headerpadsize
    response.extend_from_slice(&65536u32.to_be_bytes()); // maxrequestsize
    response.extend_from_slice(&65536u32.to_be_bytes()); // maxresponsesize
    response.extend_from_slice(&65536u32.to_be_bytes()); // maxresponsesize_cached
    response.extend_from_slice(&16u32.to_be_bytes()); // maxoperations
    response.extend_from_slice(&64u32.to_be_bytes()); // maxrequests
    response.extend_from_slice(&0u32.to_be_bytes()); // no callback program
    // back channel attrs, identical shape
    response.extend_from_slice(&0u32.to_be_bytes());
    response.extend_from_slice(&65536u32.to_be_bytes());
    response.extend_from_slice(&65536u32.to_be_bytes());
    response.extend_from_slice(&65536u32.to_be_bytes());
    response.extend_from_slice(&16u32.to_be_bytes());
    response.extend_from_slice(&64u32.to_be_bytes());
    response.extend_from_slice(&0u32.to_be_bytes());
    response.extend_from_slice(&0u32.to_be_bytes()); // cb_program
    response.extend_from_slice(&0u32.to_be_bytes()); // sec_parms, empty
    NFS4_OK
}

pub fn destroy_session(reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let sessid_bytes = reader.take(16).unwrap_or(&[0u8; 16][..]);
    let mut sessid: SessionId = [0u8; 16];
    sessid.copy_from_slice(sessid_bytes);

    let Some(clientid) = ctx.conn.current_client else {
        response.extend_from_slice(&44u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_BADSESSION.to_be_bytes());
        return NFS4ERR_BADSESSION;
    };
    let Some(record) = ctx.clients.get(&clientid) else {
        response.extend_from_slice(&44u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_BADSESSION.to_be_bytes());
        return NFS4ERR_BADSESSION;
    };
    if record.sessid != Some(sessid) {
        response.extend_from_slice(&44u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_BADSESSION.to_be_bytes());
        return NFS4ERR_BADSESSION;
    }

    ctx.clients.clear_session(&clientid);
    response.extend_from_slice(&44u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    NFS4_OK
}

pub fn secinfo_no_name(_reader: &mut Reader, response: &mut Vec<u8>, _ctx: &mut OpContext) -> u32 {
    response.extend_from_slice(&52u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    response.extend_from_slice(&1u32.to_be_bytes()); // one entry
    response.extend_from_slice(&1u32.to_be_bytes()); // AUTH_SYS / AUTH_UNIX flavor
    NFS4_OK
}

/// SEQUENCE (RFC5661 §18.46): the defining behavior is the retransmit cache
/// — a repeated sequence id on the same session must return the exact bytes
/// cached from the first reply, not a freshly computed one, since side
/// effects of the original call (e.g. a CREATE) must not run twice.
pub fn sequence(reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let sessid_bytes = reader.take(16).unwrap_or(&[0u8; 16][..]);
    let mut sessid: SessionId = [0u8; 16];
    sessid.copy_from_slice(sessid_bytes);
    let seqid = reader.u32().unwrap_or(0);
    let _slotid = reader.u32().unwrap_or(0);
    let _highest_slotid = reader.u32().unwrap_or(0);
    let _cache_this = reader.u32().unwrap_or(0);

    let Some(clientid) = ctx.conn.current_client else {
        response.extend_from_slice(&53u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_BADSESSION.to_be_bytes());
        return NFS4ERR_BADSESSION;
    };
    let Some(record) = ctx.clients.get(&clientid) else {
        response.extend_from_slice(&53u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_BADSESSION.to_be_bytes());
        return NFS4ERR_BADSESSION;
    };
    if record.sessid != Some(sessid) {
        response.extend_from_slice(&53u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_BADSESSION.to_be_bytes());
        return NFS4ERR_BADSESSION;
    }

    if record.seqid.0 == seqid {
        if let Some(cached) = record.seqid.1 {
            response.extend_from_slice(&cached);
            return NFS4_OK;
        }
    } else if seqid != record.seqid.0 + 1 && !(record.seqid.0 == 0 && seqid == 0) {
        response.extend_from_slice(&53u32.to_be_bytes());
        response.extend_from_slice(&NFS4ERR_SEQ_MISORDERED.to_be_bytes());
        return NFS4ERR_SEQ_MISORDERED;
    }

    response.extend_from_slice(&53u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    response.extend_from_slice(&sessid);
    response.extend_from_slice(&seqid.to_be_bytes());
    response.extend_from_slice(&0u32.to_be_bytes()); // slotid
    response.extend_from_slice(&0u32.to_be_bytes()); // highest_slotid
    response.extend_from_slice(&0u32.to_be_bytes()); // target_highest_slotid
    response.extend_from_slice(&0u32.to_be_bytes()); // status flags
    ctx.clients.cache_reply(&clientid, seqid, response.clone());
    NFS4_OK
}

pub fn test_stateid(reader: &mut Reader, response: &mut Vec<u8>, _ctx: &mut OpContext) -> u32 {
    let count = reader.u32().unwrap_or(0) as usize;
    let _ = reader.take(count * 12);

    response.extend_from_slice(&55u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    response.extend_from_slice(&(count as u32).to_be_bytes());
    for _ in 0..count {
        response.extend_from_slice(&NFS4_OK.to_be_bytes());
    }
    NFS4_OK
}

pub fn destroy_clientid(reader: &mut Reader, response: &mut Vec<u8>, ctx: &mut OpContext) -> u32 {
    let clientid_bytes = reader.take(8).unwrap_or(&[0u8; 8][..]);
    let mut clientid = [0u8; 8];
    clientid.copy_from_slice(clientid_bytes);

    ctx.clients.remove(&clientid);
    response.extend_from_slice(&57u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    NFS4_OK
}

pub fn reclaim_complete(_reader: &mut Reader, response: &mut Vec<u8>, _ctx: &mut OpContext) -> u32 {
    let _one_fs = _reader.u32().unwrap_or(0);
    response.extend_from_slice(&58u32.to_be_bytes());
    response.extend_from_slice(&NFS4_OK.to_be_bytes());
    NFS4_OK
}
