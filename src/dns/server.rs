//! DNS responder main loop. The original ran a `ThreadingUDPServer`,
//! spawning a thread per datagram; here each datagram gets its own
//! `tokio::spawn`'d task instead, the async equivalent.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::net::UdpSocket;

use crate::config::DnsConfig;
use crate::core::errors::ServerError;
use crate::dns::packet::{encode_reply, parse_query, QTYPE_A};
use crate::dns::records::RecordTable;

pub async fn run(cfg: DnsConfig) -> Result<(), ServerError> {
    let socket = Arc::new(UdpSocket::bind(&cfg.bind_addr).await?);
    let table = Arc::new(RecordTable::from_overrides(cfg.overrides));
    info!("dns listening on {}", cfg.bind_addr);

    let mut buf = [0u8; 512];
    loop {
        let (len, addr) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                error!("dns recv error: {}", e);
                continue;
            }
        };
        let request = buf[..len].to_vec();
        let socket = socket.clone();
        let table = table.clone();

        tokio::spawn(async move {
            let query = match parse_query(&request) {
                Ok(q) => q,
                Err(e) => {
                    warn!("failed to parse DNS request from {}: {}", addr, e);
                    return;
                }
            };

            debug!("request from ({} {}) for {}", addr.ip(), addr.port(), query.question.qname);

            let answers = if query.question.qtype == QTYPE_A {
                table.lookup_a(&query.question.qname)
            } else {
                Vec::new()
            };
            for ip in &answers {
                info!("answering A {} with {}", query.question.qname, ip);
            }

            let reply = encode_reply(&query, &answers);
            if let Err(e) = socket.send_to(&reply, addr).await {
                error!("dns send error: {}", e);
            }
        });
    }
}
