//! DHCP server main loop: one UDP socket bound to port 67, handing each
//! datagram to the hook pipeline and broadcasting the crafted reply to
//! port 68.

use std::net::SocketAddr;

use log::{debug, error, trace};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::config::DhcpConfig;
use crate::core::errors::ServerError;
use crate::dhcp::hooks::build_registry;
use crate::dhcp::packet::DhcpV4Packet;
use crate::hooks::hook_registry::HookRegistry;
use crate::hooks::packet_context::PacketContext;
use crate::hooks::state::PacketState;

const BUFFER_SIZE: usize = 1024;

fn bind_broadcast_socket(cfg: &DhcpConfig) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    #[cfg(target_os = "linux")]
    if !cfg.interface.is_empty() {
        socket.bind_device(Some(cfg.interface.as_bytes()))?;
    }
    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.port).parse().expect("valid socket address");
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

pub async fn run(cfg: DhcpConfig) -> Result<(), ServerError> {
    let broadcast_addr = cfg.broadcast;
    let socket = bind_broadcast_socket(&cfg)?;
    let registry: HookRegistry<DhcpV4Packet, DhcpV4Packet> = build_registry(cfg);

    let mut buf = [0u8; BUFFER_SIZE];
    loop {
        let (len, _src) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                error!("dhcp recv error: {}", e);
                continue;
            }
        };

        let input = DhcpV4Packet::from_raw_bytes(&buf[..len]);
        trace!("received DHCP packet, xid={:#x}", input.xid);

        let mut ctx: PacketContext<DhcpV4Packet, DhcpV4Packet> = input.into();
        ctx.set_state(PacketState::Received);

        if let Err(e) = registry.run_hooks(&mut ctx) {
            debug!("dhcp hook pipeline error: {}", e);
            continue;
        }

        let reply = ctx.drop();
        if reply.op != 2 {
            continue; // no reply was crafted for this message type
        }
        let dest = SocketAddr::new(broadcast_addr.into(), 68);
        if let Err(e) = socket.send_to(&reply.to_raw_bytes(), dest).await {
            error!("dhcp send error: {}", e);
        }
    }
}
