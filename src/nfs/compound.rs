//! COMPOUND request dispatch (RFC5661 §15.2).
//!
//! A COMPOUND carries a tag, a minor version, and an ordered list of
//! `(opcode, args)` pairs sharing one argument cursor. Operations run in
//! order; the first non-zero status stops the compound, matching the
//! upstream server's own short-circuit (spec.md §4.3). The dispatch table
//! is a plain lookup array built once at module load, not the reflection
//! the original used to resolve an opcode to its handler (spec.md §9).

use std::sync::Mutex;

use crate::core::codec::{pad4, Reader};
use crate::nfs::ops::{
    attr_ops, fh_ops, io_ops, session_ops, OpContext, NFS4ERR_OP_ILLEGAL, NFS4_OK,
};
use crate::nfs::state::{ClientRegistry, ConnState, GlobalState};

pub const OP_ACCESS: u32 = 3;
pub const OP_CLOSE: u32 = 4;
pub const OP_CREATE: u32 = 6;
pub const OP_GETATTR: u32 = 9;
pub const OP_GETFH: u32 = 10;
pub const OP_LOOKUP: u32 = 15;
pub const OP_OPEN: u32 = 18;
pub const OP_PUTFH: u32 = 22;
pub const OP_PUTROOTFH: u32 = 24;
pub const OP_READ: u32 = 25;
pub const OP_READDIR: u32 = 26;
pub const OP_READLINK: u32 = 27;
pub const OP_SETATTR: u32 = 34;
pub const OP_WRITE: u32 = 38;
pub const OP_EXCHANGE_ID: u32 = 42;
pub const OP_CREATE_SESSION: u32 = 43;
pub const OP_DESTROY_SESSION: u32 = 44;
pub const OP_SECINFO_NO_NAME: u32 = 52;
pub const OP_SEQUENCE: u32 = 53;
pub const OP_TEST_STATEID: u32 = 55;
pub const OP_DESTROY_CLIENTID: u32 = 57;
pub const OP_RECLAIM_COMPLETE: u32 = 58;

type OpFn = fn(&mut Reader, &mut Vec<u8>, &mut OpContext) -> u32;

/// The dispatch table spec.md §9 asks for: a value-level array built at
/// init, not a runtime decorator registry. Opcodes registered here are
/// "present"; everything else (COMMIT, LOCK family, LOOKUPP, RENAME, ...)
/// is registered implicitly as NFS4ERR_OP_ILLEGAL by [`lookup`]'s `None`
/// arm, per spec.md §4.3's "registered but presently inert" set.
const DISPATCH: &[(u32, OpFn)] = &[
    (OP_ACCESS, attr_ops::access),
    (OP_CLOSE, io_ops::close),
    (OP_CREATE, io_ops::create),
    (OP_GETATTR, attr_ops::getattr),
    (OP_GETFH, fh_ops::getfh),
    (OP_LOOKUP, fh_ops::lookup),
    (OP_OPEN, io_ops::open),
    (OP_PUTFH, fh_ops::putfh),
    (OP_PUTROOTFH, fh_ops::putrootfh),
    (OP_READ, io_ops::read),
    (OP_READDIR, io_ops::readdir),
    (OP_READLINK, fh_ops::readlink),
    (OP_SETATTR, attr_ops::setattr),
    (OP_WRITE, io_ops::write),
    (OP_EXCHANGE_ID, session_ops::exchange_id),
    (OP_CREATE_SESSION, session_ops::create_session),
    (OP_DESTROY_SESSION, session_ops::destroy_session),
    (OP_SECINFO_NO_NAME, session_ops::secinfo_no_name),
    (OP_SEQUENCE, session_ops::sequence),
    (OP_TEST_STATEID, session_ops::test_stateid),
    (OP_DESTROY_CLIENTID, session_ops::destroy_clientid),
    (OP_RECLAIM_COMPLETE, session_ops::reclaim_complete),
];

fn lookup(opcode: u32) -> Option<OpFn> {
    DISPATCH.iter().find(|(op, _)| *op == opcode).map(|(_, f)| *f)
}

/// Runs one COMPOUND request against `global`/`clients`/`conn`, returning
/// the fully encoded COMPOUND4res: overall status, echoed tag, and the
/// per-operation results accumulated up to (and including) the first
/// failure.
pub fn process(global: &Mutex<GlobalState>, clients: &ClientRegistry, conn: &mut ConnState, request: &[u8]) -> Vec<u8> {
    let mut reader = Reader::new(request);
    let tag = reader.opaque().unwrap_or(&[]).to_vec();
    let _minor_version = reader.u32().unwrap_or(0);
    let numops = reader.u32().unwrap_or(0) as usize;

    let mut results = Vec::new();
    let mut overall_status = NFS4_OK;
    let mut executed = 0u32;

    for _ in 0..numops {
        let Ok(opcode) = reader.u32() else { break };
        let mut ctx = OpContext { global, clients, conn };
        let status = match lookup(opcode) {
            Some(handler) => handler(&mut reader, &mut results, &mut ctx),
            None => {
                results.extend_from_slice(&opcode.to_be_bytes());
                results.extend_from_slice(&NFS4ERR_OP_ILLEGAL.to_be_bytes());
                NFS4ERR_OP_ILLEGAL
            }
        };
        executed += 1;
        overall_status = status;
        if status != NFS4_OK {
            break;
        }
    }

    let mut out = Vec::with_capacity(12 + tag.len() + results.len());
    out.extend_from_slice(&overall_status.to_be_bytes());
    out.extend_from_slice(&(tag.len() as u32).to_be_bytes());
    out.extend_from_slice(&tag);
    pad4(&mut out);
    out.extend_from_slice(&executed.to_be_bytes());
    out.extend_from_slice(&results);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfs::fh::FH_SIZE;

    fn compound(tag: &[u8], ops: &[(u32, Vec<u8>)]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(tag.len() as u32).to_be_bytes());
        buf.extend_from_slice(tag);
        pad4(&mut buf);
        buf.extend_from_slice(&1u32.to_be_bytes()); // minorversion
        buf.extend_from_slice(&(ops.len() as u32).to_be_bytes());
        for (opcode, args) in ops {
            buf.extend_from_slice(&opcode.to_be_bytes());
            buf.extend_from_slice(args);
        }
        buf
    }

    fn getattr_args(words: &[u32]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(words.len() as u32).to_be_bytes());
        for w in words {
            buf.extend_from_slice(&w.to_be_bytes());
        }
        buf
    }

    #[test]
    fn putrootfh_then_getattr_succeeds() {
        let dir = std::env::temp_dir().join(format!("pxecore-nfs-compound-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let global = Mutex::new(GlobalState::new(dir, true));
        let clients = ClientRegistry::new();
        let mut conn = ConnState::default();

        let request = compound(b"", &[(OP_PUTROOTFH, Vec::new()), (OP_GETATTR, getattr_args(&[0b10]))]);
        let reply = process(&global, &clients, &mut conn, &request);

        let overall_status = u32::from_be_bytes(reply[0..4].try_into().unwrap());
        assert_eq!(overall_status, NFS4_OK);

        // First result: PUTROOTFH -> opcode, status
        let mut pos = 4;
        let taglen = u32::from_be_bytes(reply[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4 + taglen;
        pos += (4 - taglen % 4) % 4;
        pos += 4; // numresults
        let op1 = u32::from_be_bytes(reply[pos..pos + 4].try_into().unwrap());
        let status1 = u32::from_be_bytes(reply[pos + 4..pos + 8].try_into().unwrap());
        assert_eq!(op1, OP_PUTROOTFH);
        assert_eq!(status1, NFS4_OK);
    }

    #[test]
    fn stale_putfh_halts_compound() {
        let dir = std::env::temp_dir().join(format!("pxecore-nfs-compound-stale-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let global = Mutex::new(GlobalState::new(dir, true));
        let clients = ClientRegistry::new();
        let mut conn = ConnState::default();

        let mut fh_bytes = vec![0u8; FH_SIZE];
        let mut args = Vec::new();
        args.extend_from_slice(&(fh_bytes.len() as u32).to_be_bytes());
        args.append(&mut fh_bytes);

        let request = compound(b"", &[(OP_PUTFH, args), (OP_GETATTR, getattr_args(&[0b10]))]);
        let reply = process(&global, &clients, &mut conn, &request);

        let overall_status = u32::from_be_bytes(reply[0..4].try_into().unwrap());
        assert_eq!(overall_status, 70); // NFS4ERR_STALE

        let mut pos = 4;
        let taglen = u32::from_be_bytes(reply[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4 + taglen + (4 - taglen % 4) % 4;
        let numresults = u32::from_be_bytes(reply[pos..pos + 4].try_into().unwrap());
        assert_eq!(numresults, 1); // only PUTFH ran; GETATTR never executed
    }

    #[test]
    fn unimplemented_opcode_yields_op_illegal() {
        let dir = std::env::temp_dir().join(format!("pxecore-nfs-compound-illegal-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let global = Mutex::new(GlobalState::new(dir, true));
        let clients = ClientRegistry::new();
        let mut conn = ConnState::default();

        let request = compound(b"", &[(1, Vec::new())]); // OP_REMOVE, unimplemented
        let reply = process(&global, &clients, &mut conn, &request);
        let overall_status = u32::from_be_bytes(reply[0..4].try_into().unwrap());
        assert_eq!(overall_status, NFS4ERR_OP_ILLEGAL);
    }
}
