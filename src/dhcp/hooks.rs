//! Hook wiring for the DHCP pipeline: DISCOVER -> OFFER and
//! REQUEST(giaddr == 0) -> ACK, built on the generic [`HookRegistry`].

use std::net::Ipv4Addr;
use std::sync::Mutex;

use log::{debug, info, warn};

use crate::config::DhcpConfig;
use crate::core::errors::HookError;
use crate::dhcp::lease::LeaseTable;
use crate::dhcp::options::{craft_options, DHCPACK, DHCPDISCOVER, DHCPOFFER, DHCPREQUEST};
use crate::dhcp::packet::DhcpV4Packet;
use crate::hooks::flags::HookFlag;
use crate::hooks::hook_registry::{Hook, HookClosure, HookRegistry};
use crate::hooks::state::PacketState;

/// Builds a registry with the DHCP config and a fresh lease table installed
/// as services, and the discover/request hooks registered.
pub fn build_registry(cfg: DhcpConfig) -> HookRegistry<DhcpV4Packet, DhcpV4Packet> {
    let mut registry = HookRegistry::new();
    registry.register_service(Mutex::new(LeaseTable::new()));
    registry.register_service(cfg);

    registry.register_hook(PacketState::Received, discover_hook());
    registry.register_hook(PacketState::Received, request_hook());
    registry
}

fn discover_hook() -> Hook<DhcpV4Packet, DhcpV4Packet> {
    Hook::new(
        "dhcp_discover_offer".to_string(),
        HookClosure(Box::new(|services, ctx| {
            if ctx.get_input().message_type() != Some(DHCPDISCOVER) {
                return Ok(0);
            }

            let services = services.lock().expect("services mutex poisoned");
            let cfg = services.get::<DhcpConfig>().ok_or_else(|| HookError::new("missing DhcpConfig service"))?;
            let leases = services.get::<Mutex<LeaseTable>>().ok_or_else(|| HookError::new("missing LeaseTable service"))?;
            let mut leases = leases.lock().expect("lease table mutex poisoned");

            let client_mac = ctx.get_input().chaddr;
            let binding = cfg.binding_for(&client_mac.into());

            let offer_ip = if let Some(ip) = binding.and_then(|b| b.ipaddr) {
                ip
            } else if let Some(lease) = leases.get(&client_mac) {
                lease.ip
            } else {
                leases.next_ip(cfg.offer_from, cfg.offer_to).map_err(|e| HookError::new(e.to_string()))?
            };
            leases.assign(client_mac, offer_ip);

            info!("DHCPOFFER - {} -> {}", client_mac, offer_ip);

            let input = ctx.get_input().clone();
            let out = ctx.get_mut_output();
            craft_reply(out, &input, offer_ip, cfg.file_server);
            out.options = craft_options(DHCPOFFER, cfg, binding, &cfg.boot_filename);
            Ok(1)
        })),
        vec![HookFlag::Fatal],
    )
}

fn request_hook() -> Hook<DhcpV4Packet, DhcpV4Packet> {
    Hook::new(
        "dhcp_request_ack".to_string(),
        HookClosure(Box::new(|services, ctx| {
            let input = ctx.get_input().clone();
            if input.message_type() != Some(DHCPREQUEST) {
                return Ok(0);
            }
            if input.giaddr != Ipv4Addr::UNSPECIFIED {
                debug!("ignoring relayed DHCPREQUEST (giaddr != 0)");
                return Ok(0);
            }

            let services = services.lock().expect("services mutex poisoned");
            let cfg = services.get::<DhcpConfig>().ok_or_else(|| HookError::new("missing DhcpConfig service"))?;
            let leases = services.get::<Mutex<LeaseTable>>().ok_or_else(|| HookError::new("missing LeaseTable service"))?;
            let mut leases = leases.lock().expect("lease table mutex poisoned");

            let client_mac = input.chaddr;
            let binding = cfg.binding_for(&client_mac.into());

            let ack_ip = if let Some(ip) = binding.and_then(|b| b.ipaddr) {
                ip
            } else if let Some(lease) = leases.get(&client_mac) {
                lease.ip
            } else {
                match leases.next_ip(cfg.offer_from, cfg.offer_to) {
                    Ok(ip) => ip,
                    Err(e) => {
                        warn!("DHCPACK failed for {}: {}", client_mac, e);
                        return Err(HookError::new(e.to_string()));
                    }
                }
            };
            leases.assign(client_mac, ack_ip);

            info!("DHCPACK - {} -> {}", client_mac, ack_ip);

            let out = ctx.get_mut_output();
            craft_reply(out, &input, ack_ip, cfg.file_server);
            out.options = craft_options(DHCPACK, cfg, binding, &cfg.boot_filename);
            Ok(1)
        })),
        vec![HookFlag::Fatal],
    )
}

fn craft_reply(out: &mut DhcpV4Packet, input: &DhcpV4Packet, yiaddr: Ipv4Addr, file_server: Ipv4Addr) {
    out.op = 2; // BOOTREPLY
    out.htype = 1;
    out.hlen = 6;
    out.hops = 0;
    out.xid = input.xid;
    out.secs = 0;
    out.flags = 0;
    out.ciaddr = Ipv4Addr::UNSPECIFIED;
    out.yiaddr = yiaddr;
    out.siaddr = file_server;
    out.giaddr = Ipv4Addr::UNSPECIFIED;
    out.chaddr = input.chaddr;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcp::packet::MacAddr;
    use crate::hooks::packet_context::PacketContext;

    fn discover(mac: [u8; 6]) -> DhcpV4Packet {
        let mut pkt = DhcpV4Packet::empty();
        pkt.op = 1;
        pkt.xid = 0xAABBCCDD;
        pkt.chaddr = MacAddr(mac);
        pkt.options.push(crate::core::codec::Tlv { tag: 53, value: vec![DHCPDISCOVER] });
        pkt
    }

    #[test]
    fn discover_produces_offer_with_echoed_xid() {
        let registry = build_registry(DhcpConfig::default());
        let mut ctx: PacketContext<DhcpV4Packet, DhcpV4Packet> = discover([1, 2, 3, 4, 5, 6]).into();
        registry.run_hooks(&mut ctx).unwrap();
        assert_eq!(ctx.get_output().xid, 0xAABBCCDD);
        assert_eq!(ctx.get_output().op, 2);
        assert_eq!(ctx.get_output().message_type(), Some(DHCPOFFER));
    }

    #[test]
    fn repeated_discover_keeps_same_offered_ip() {
        let registry = build_registry(DhcpConfig::default());
        let mac = [9, 9, 9, 9, 9, 9];

        let mut first: PacketContext<DhcpV4Packet, DhcpV4Packet> = discover(mac).into();
        registry.run_hooks(&mut first).unwrap();
        let first_ip = first.get_output().yiaddr;

        let mut second: PacketContext<DhcpV4Packet, DhcpV4Packet> = discover(mac).into();
        registry.run_hooks(&mut second).unwrap();
        assert_eq!(second.get_output().yiaddr, first_ip);
    }
}
