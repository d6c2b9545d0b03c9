//! TFTP server main loop.
//!
//! The upstream server busy-polls `select(..., timeout=0)` across the
//! listening socket and every open client socket. Here the same
//! single-threaded cooperative shape is kept — one transfer is still one
//! socket, all multiplexed from one loop — but readiness is awaited
//! properly via [`futures::future::select_all`] instead of spinning.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use futures::future::{self, BoxFuture};
use log::{debug, error, info, warn};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::sleep_until;

use crate::config::{TftpBackendKind, TftpConfig};
use crate::core::errors::ServerError;
use crate::tftp::backend::Backend;
use crate::tftp::backend_fs::FsBackend;
use crate::tftp::backend_http::HttpBackend;
use crate::tftp::packet::{self, OP_ACK, OP_RRQ};
use crate::tftp::transfer::Transfer;

enum Event {
    NewRequest(Vec<u8>, SocketAddr),
    ClientMessage(usize, Vec<u8>),
    Timeout,
}

async fn bind_ephemeral(ip: IpAddr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    let addr = SocketAddr::new(ip, 0);
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

fn build_backend(cfg: &TftpConfig) -> Box<dyn Backend> {
    match cfg.backend {
        TftpBackendKind::Filesystem => Box::new(FsBackend::new(cfg.netbook_directory.clone())),
        TftpBackendKind::Http => Box::new(HttpBackend::new(cfg.http_origin.clone())),
    }
}

pub async fn run(cfg: TftpConfig) -> Result<(), ServerError> {
    let backend = build_backend(&cfg);
    let listener = UdpSocket::bind((cfg.ip, cfg.port)).await?;
    info!("tftp listening on {}:{}", cfg.ip, cfg.port);

    let mut transfers: Vec<Transfer> = Vec::new();

    loop {
        transfers.retain(|t| !t.dead);

        let event = {
            let mut futs: Vec<BoxFuture<Event>> = Vec::new();

            futs.push(Box::pin(async {
                let mut buf = [0u8; 1024];
                match listener.recv_from(&mut buf).await {
                    Ok((n, addr)) => Event::NewRequest(buf[..n].to_vec(), addr),
                    Err(e) => {
                        error!("tftp listener recv error: {}", e);
                        future::pending::<Event>().await
                    }
                }
            }));

            for (idx, transfer) in transfers.iter().enumerate() {
                futs.push(Box::pin(async move {
                    let mut buf = [0u8; 1024];
                    match transfer.socket.recv_from(&mut buf).await {
                        Ok((n, _)) => Event::ClientMessage(idx, buf[..n].to_vec()),
                        Err(_) => future::pending::<Event>().await,
                    }
                }));
            }

            if let Some(deadline) = transfers.iter().filter(|t| !t.dead).map(|t| t.deadline()).min() {
                futs.push(Box::pin(async move {
                    sleep_until(deadline.into()).await;
                    Event::Timeout
                }));
            }

            let (event, _idx, _rest) = future::select_all(futs).await;
            event
        };

        match event {
            Event::NewRequest(buf, addr) => handle_new_request(&buf, addr, &cfg, backend.as_ref(), &mut transfers).await,
            Event::ClientMessage(idx, buf) => handle_client_message(idx, &buf, &mut transfers).await,
            Event::Timeout => handle_timeouts(&mut transfers).await,
        }
    }
}

async fn handle_new_request(buf: &[u8], addr: SocketAddr, cfg: &TftpConfig, backend: &dyn Backend, transfers: &mut Vec<Transfer>) {
    let op = match packet::opcode(buf) {
        Ok(op) => op,
        Err(_) => return,
    };
    if op != OP_RRQ {
        debug!("ignoring non-RRQ opcode {} from {}", op, addr);
        return;
    }

    let req = match packet::parse_rrq(buf) {
        Ok(req) => req,
        Err(e) => {
            warn!("malformed RRQ from {}: {}", addr, e);
            return;
        }
    };

    if req.mode.to_ascii_lowercase() != "octet" {
        if let Ok(socket) = bind_ephemeral(cfg.ip).await {
            let _ = socket.send_to(&packet::encode_error(5, &format!("Mode {} not supported", req.mode)), addr).await;
        }
        return;
    }

    match backend.open(&req.filename).await {
        Ok(source) => {
            let socket = match bind_ephemeral(cfg.ip).await {
                Ok(s) => s,
                Err(e) => {
                    error!("failed to bind ephemeral tftp socket: {}", e);
                    return;
                }
            };
            info!("new request for \"{}\" from {}", req.filename, addr);
            let mut transfer =
                Transfer::new(socket, addr, &req, source, cfg.default_retries, Duration::from_secs(cfg.timeout_secs)).await;
            transfer.start().await;
            transfers.push(transfer);
        }
        Err(e) => {
            warn!("{} not found for {}: {}", req.filename, addr, e);
            if let Ok(socket) = bind_ephemeral(cfg.ip).await {
                let _ = socket.send_to(&packet::encode_error(1, "File Not Found"), addr).await;
            }
        }
    }
}

async fn handle_client_message(idx: usize, buf: &[u8], transfers: &mut [Transfer]) {
    let Some(transfer) = transfers.get_mut(idx) else { return };
    match packet::opcode(buf) {
        Ok(op) if op == OP_ACK => {
            if let Ok(block) = packet::parse_ack(buf) {
                transfer.handle_ack(block).await;
            }
        }
        _ => debug!("unexpected opcode from {}", transfer.peer),
    }
}

async fn handle_timeouts(transfers: &mut [Transfer]) {
    for transfer in transfers.iter_mut() {
        if !transfer.dead && transfer.no_ack() {
            transfer.resend().await;
        }
    }
    for transfer in transfers.iter_mut() {
        if !transfer.dead && transfer.no_retries() {
            transfer.dead = true;
        }
    }
}
