//! Per-client transfer state machine (RFC1350 §5-6, RFC2348 §3).
//!
//! One [`Transfer`] is created per inbound RRQ and owns its own ephemeral
//! UDP socket, mirroring the upstream server spawning a fresh
//! `ParentSocket`-derived client per request rather than multiplexing
//! everything through the listening socket.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::net::UdpSocket;

use crate::tftp::backend::FileSource;
use crate::tftp::options::{negotiate, NegotiatedOptions};
use crate::tftp::packet::{encode_data, encode_error, encode_oack, ReadRequest};

pub struct Transfer {
    pub socket: UdpSocket,
    pub peer: SocketAddr,
    pub filename: String,
    source: Box<dyn FileSource>,
    options: NegotiatedOptions,
    last_block: u64,
    block: u64,
    wrap: u32,
    retries: u8,
    default_retries: u8,
    sent_time: Instant,
    timeout: Duration,
    pending_block: Option<Vec<u8>>,
    /// Set when the most recently read block was shorter than `blksize`
    /// (including empty) — the backend's own EOF signal, independent of
    /// whatever `last_block` was computed from at construction time.
    short_block: bool,
    pub dead: bool,
}

impl Transfer {
    pub async fn new(
        socket: UdpSocket,
        peer: SocketAddr,
        req: &ReadRequest,
        source: Box<dyn FileSource>,
        default_retries: u8,
        timeout: Duration,
    ) -> Self {
        let filesize = source.filesize();
        let options = negotiate(req, filesize);
        let last_block = (filesize as f64 / options.blksize as f64).ceil() as u64;
        let has_options = !options.echoed.is_empty();
        Self {
            socket,
            peer,
            filename: req.filename.clone(),
            source,
            options,
            last_block,
            block: if has_options { 0 } else { 1 },
            wrap: 0,
            retries: default_retries,
            default_retries,
            sent_time: Instant::now(),
            timeout,
            pending_block: None,
            short_block: false,
            dead: false,
        }
    }

    /// Kicks off the transfer: OACK if options were negotiated, else the
    /// first DATA block.
    pub async fn start(&mut self) {
        if !self.options.echoed.is_empty() {
            let oack = encode_oack(&self.options.echoed);
            let _ = self.socket.send_to(&oack, self.peer).await;
            debug!("OACK sent to {}", self.peer);
        } else {
            self.send_current_block().await;
        }
    }

    async fn next_block_bytes(&mut self) -> Option<Vec<u8>> {
        match self.source.read_block(self.options.blksize as usize).await {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("backend read error for {}: {}", self.filename, e);
                None
            }
        }
    }

    async fn send_current_block(&mut self) {
        let data = match self.pending_block.take() {
            Some(data) => data,
            None => match self.next_block_bytes().await {
                Some(data) => {
                    self.short_block = data.len() < self.options.blksize as usize;
                    data
                }
                None => return,
            },
        };
        let wire_block = (self.block % 65536) as u16;
        let pkt = encode_data(wire_block, &data);
        let _ = self.socket.send_to(&pkt, self.peer).await;
        self.pending_block = Some(data);
        self.retries -= 1;
        self.sent_time = Instant::now();
    }

    pub async fn resend(&mut self) {
        if let Some(data) = self.pending_block.clone() {
            let wire_block = (self.block % 65536) as u16;
            let pkt = encode_data(wire_block, &data);
            let _ = self.socket.send_to(&pkt, self.peer).await;
            self.retries = self.retries.saturating_sub(1);
            self.sent_time = Instant::now();
        }
    }

    /// Handles an ACK for `block`, advancing the transfer or completing it.
    pub async fn handle_ack(&mut self, block: u16) {
        if block == 0 {
            self.wrap += 1;
        }
        let current = (self.block % 65536) as u16;
        if block < current {
            warn!("ignoring duplicate ACK {} for {}", block, self.filename);
            return;
        }
        if block > current {
            warn!("ignoring out-of-sequence ACK {} for {}", block, self.filename);
            return;
        }

        let acked_absolute = block as u64 + self.wrap as u64 * 65536;
        let filesize_is_multiple = self.source.filesize() % self.options.blksize == 0;
        let known_size_done = self.last_block > 0 && acked_absolute == self.last_block;

        // Either the fixed block count computed at construction time says
        // we're done, or the backend itself just handed back a short (or
        // empty) read — its own EOF signal, used when `filesize`/`last_block`
        // was unknown (e.g. an HTTP origin with no Content-Length).
        if known_size_done || self.short_block {
            if known_size_done && filesize_is_multiple && !self.short_block {
                self.block += 1;
                self.pending_block = None;
                self.send_current_block().await;
            }
            info!("completed sending {}", self.filename);
            self.dead = true;
            return;
        }

        self.block += 1;
        self.retries = self.default_retries;
        self.pending_block = None;
        self.send_current_block().await;
    }

    pub fn no_ack(&self) -> bool {
        self.sent_time.elapsed() >= self.timeout
    }

    pub fn deadline(&self) -> Instant {
        self.sent_time + self.timeout
    }

    pub fn no_retries(&self) -> bool {
        self.retries == 0
    }

    pub async fn send_error(&self, code: u16, message: &str) {
        let pkt = encode_error(code, message);
        let _ = self.socket.send_to(&pkt, self.peer).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tftp::backend::BackendError;
    use async_trait::async_trait;

    struct MemSource {
        data: Vec<u8>,
        pos: usize,
    }

    #[async_trait]
    impl FileSource for MemSource {
        fn filesize(&self) -> u64 {
            self.data.len() as u64
        }
        async fn read_block(&mut self, blksize: usize) -> Result<Vec<u8>, BackendError> {
            let end = (self.pos + blksize).min(self.data.len());
            let chunk = self.data[self.pos..end].to_vec();
            self.pos = end;
            Ok(chunk)
        }
    }

    /// Mimics `HttpFileSource` against an origin with no `Content-Length`:
    /// `filesize()` stays 0 for the whole transfer, so `last_block` is 0
    /// and the only completion signal is a short/empty `read_block`.
    struct UnknownSizeSource {
        data: Vec<u8>,
        pos: usize,
    }

    #[async_trait]
    impl FileSource for UnknownSizeSource {
        fn filesize(&self) -> u64 {
            0
        }
        async fn read_block(&mut self, blksize: usize) -> Result<Vec<u8>, BackendError> {
            let end = (self.pos + blksize).min(self.data.len());
            let chunk = self.data[self.pos..end].to_vec();
            self.pos = end;
            Ok(chunk)
        }
    }

    async fn udp() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    #[tokio::test]
    async fn single_block_transfer_completes_on_matching_ack() {
        let socket = udp().await;
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let req = ReadRequest { filename: "f".to_string(), mode: "octet".to_string(), options: vec![] };
        let source = Box::new(MemSource { data: b"hello".to_vec(), pos: 0 });
        let mut transfer = Transfer::new(socket, peer, &req, source, 3, Duration::from_secs(5)).await;
        assert_eq!(transfer.last_block, 1);
        transfer.start().await;
        transfer.handle_ack(1).await;
        assert!(transfer.dead);
    }

    #[tokio::test]
    async fn unknown_filesize_completes_on_short_read_not_infinite_empty_data() {
        let socket = udp().await;
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let req = ReadRequest { filename: "f".to_string(), mode: "octet".to_string(), options: vec![] };
        // 700 bytes over a 512 blksize: one full block, one short final block.
        let source = Box::new(UnknownSizeSource { data: vec![7u8; 700], pos: 0 });
        let mut transfer = Transfer::new(socket, peer, &req, source, 3, Duration::from_secs(5)).await;
        assert_eq!(transfer.last_block, 0);
        transfer.start().await;
        assert!(!transfer.dead);
        transfer.handle_ack(1).await;
        assert!(!transfer.dead, "full first block must not be mistaken for EOF");
        transfer.handle_ack(2).await;
        assert!(transfer.dead, "short second block must terminate the transfer");
    }

    #[tokio::test]
    async fn unknown_filesize_exact_multiple_sends_trailing_empty_block() {
        let socket = udp().await;
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let req = ReadRequest { filename: "f".to_string(), mode: "octet".to_string(), options: vec![] };
        // 1024 bytes over a 512 blksize: two full blocks, then a natural
        // empty read that the backend itself produces once exhausted.
        let source = Box::new(UnknownSizeSource { data: vec![7u8; 1024], pos: 0 });
        let mut transfer = Transfer::new(socket, peer, &req, source, 3, Duration::from_secs(5)).await;
        transfer.start().await;
        transfer.handle_ack(1).await;
        assert!(!transfer.dead);
        transfer.handle_ack(2).await;
        assert!(!transfer.dead, "second full block must not terminate yet");
        transfer.handle_ack(3).await;
        assert!(transfer.dead, "trailing empty block must terminate the transfer");
    }

    #[tokio::test]
    async fn out_of_sequence_ack_is_ignored() {
        let socket = udp().await;
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let req = ReadRequest { filename: "f".to_string(), mode: "octet".to_string(), options: vec![] };
        let source = Box::new(MemSource { data: b"hello world, this is more than one block".to_vec(), pos: 0 });
        let mut transfer = Transfer::new(socket, peer, &req, source, 3, Duration::from_secs(5)).await;
        transfer.start().await;
        transfer.handle_ack(5).await;
        assert!(!transfer.dead);
        assert_eq!(transfer.block, 1);
    }
}
