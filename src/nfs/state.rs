//! Server-wide and per-client NFS state.
//!
//! `GlobalState` is shared across every connection (the filehandle table,
//! open-file lock table, and the readonly/root configuration); `ClientState`
//! tracks one EXCHANGE_ID-registered client; `ConnState` is the per-TCP-
//! connection "current" cursor a COMPOUND advances as it runs (current
//! filehandle, selected client).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use rand::RngCore;

use crate::nfs::fh::Filehandle;

pub type StateId = [u8; 12];
pub type ClientId = [u8; 8];
pub type SessionId = [u8; 16];

#[derive(Debug, Default)]
pub struct GlobalState {
    pub root: PathBuf,
    pub readonly: bool,
    pub fhs: HashMap<Filehandle, PathBuf>,
    /// share_access/share_deny per open stateid, keyed by the filehandle
    /// they were opened against.
    pub locks: HashMap<Filehandle, HashMap<StateId, (u32, u32)>>,
}

impl GlobalState {
    pub fn new(root: PathBuf, readonly: bool) -> Self {
        let root_fh = Filehandle::for_path(&root.to_string_lossy());
        let mut fhs = HashMap::new();
        fhs.insert(root_fh, root.clone());
        Self { root, readonly, fhs, locks: HashMap::new() }
    }

    pub fn root_filehandle(&self) -> Filehandle {
        Filehandle::for_path(&self.root.to_string_lossy())
    }

    /// Registers `path` under its content-derived filehandle, returning it.
    pub fn intern(&mut self, path: PathBuf) -> Filehandle {
        let fh = Filehandle::for_path(&path.to_string_lossy());
        self.fhs.entry(fh.clone()).or_insert(path);
        fh
    }

    pub fn path_for(&self, fh: &Filehandle) -> Option<&PathBuf> {
        self.fhs.get(fh)
    }
}

#[derive(Debug, Clone)]
pub struct ClientRecord {
    pub clientid: ClientId,
    pub owner_id: Vec<u8>,
    /// `(sequence_id, cached_reply_bytes)` for the SEQUENCE retransmit
    /// cache — RFC5661 §18.46 requires the literal cached reply bytes be
    /// returned verbatim on a retransmitted sequence id, not recomputed.
    pub seqid: (u32, Option<Vec<u8>>),
    pub sessid: Option<SessionId>,
}

/// Per-connection cursor a COMPOUND moves as operations run.
#[derive(Debug, Default)]
pub struct ConnState {
    pub current_fh: Option<Filehandle>,
    pub saved_fh: Option<Filehandle>,
    pub current_client: Option<ClientId>,
}

#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, ClientRecord>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, owner_id: Vec<u8>) -> ClientId {
        let mut id = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut id);
        let record = ClientRecord { clientid: id, owner_id, seqid: (0, None), sessid: None };
        self.clients.lock().expect("client registry mutex poisoned").insert(id, record);
        id
    }

    pub fn get(&self, id: &ClientId) -> Option<ClientRecord> {
        self.clients.lock().expect("client registry mutex poisoned").get(id).cloned()
    }

    pub fn set_session(&self, id: &ClientId, sessid: SessionId) {
        if let Some(record) = self.clients.lock().expect("client registry mutex poisoned").get_mut(id) {
            record.sessid = Some(sessid);
        }
    }

    pub fn clear_session(&self, id: &ClientId) {
        if let Some(record) = self.clients.lock().expect("client registry mutex poisoned").get_mut(id) {
            record.sessid = None;
        }
    }

    pub fn cache_reply(&self, id: &ClientId, seqid: u32, reply: Vec<u8>) {
        if let Some(record) = self.clients.lock().expect("client registry mutex poisoned").get_mut(id) {
            record.seqid = (seqid, Some(reply));
        }
    }

    pub fn remove(&self, id: &ClientId) {
        self.clients.lock().expect("client registry mutex poisoned").remove(id);
    }
}
