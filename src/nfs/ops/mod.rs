//! One module per family of COMPOUND operations (RFC5661 §18), each
//! consuming exactly its own argument bytes off a shared cursor and
//! appending `opcode, status, ...payload` to the growing response buffer —
//! the same "operations share one cursor, not self-delimited frames" shape
//! the original implementation used.

pub mod attr_ops;
pub mod fh_ops;
pub mod io_ops;
pub mod session_ops;

use crate::nfs::state::{ClientRegistry, ConnState, GlobalState};
use std::sync::Mutex;

/// Everything an operation needs beyond its own argument bytes: the shared
/// server state and this connection's "current"/"saved" filehandle cursor.
pub struct OpContext<'a> {
    pub global: &'a Mutex<GlobalState>,
    pub clients: &'a ClientRegistry,
    pub conn: &'a mut ConnState,
}

// NFS4 status codes used across operations (RFC5661 §15.1).
pub const NFS4_OK: u32 = 0;
pub const NFS4ERR_NOENT: u32 = 2;
pub const NFS4ERR_NOTDIR: u32 = 20;
pub const NFS4ERR_ROFS: u32 = 30;
pub const NFS4ERR_STALE: u32 = 70;
pub const NFS4ERR_WRONG_TYPE: u32 = 10083;
pub const NFS4ERR_STALE_CLIENTID: u32 = 10022;
pub const NFS4ERR_BADSESSION: u32 = 10052;
pub const NFS4ERR_SEQ_MISORDERED: u32 = 10063;
pub const NFS4ERR_OP_ILLEGAL: u32 = 10044;
