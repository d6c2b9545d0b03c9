//! DHCP option crafting for OFFER/ACK replies (RFC2132 §9).
//!
//! Emission order matches the upstream server exactly: message type, server
//! identifier, subnet mask, router, DNS servers, lease time, then the PXE
//! boot pair (TFTP server address, boot filename).

use std::net::Ipv4Addr;

use crate::config::{DhcpConfig, MacBinding};
use crate::core::codec::{ipv4_to_u32, Tlv};
use crate::dhcp::lease::LEASE_SECONDS;

pub const DHCPDISCOVER: u8 = 1;
pub const DHCPOFFER: u8 = 2;
pub const DHCPREQUEST: u8 = 3;
pub const DHCPACK: u8 = 5;

fn tlv(tag: u8, value: Vec<u8>) -> Tlv {
    Tlv { tag, value }
}

/// Crafts the full option list for an OFFER or ACK, applying any per-MAC
/// override before falling back to the server-wide default.
pub fn craft_options(msg_type: u8, cfg: &DhcpConfig, binding: Option<&MacBinding>, filename: &str) -> Vec<Tlv> {
    let subnet = binding.and_then(|b| b.subnet).unwrap_or(cfg.subnet_mask);
    let router = binding.and_then(|b| b.router).unwrap_or(cfg.router);
    let dns_servers: Vec<Ipv4Addr> = binding.and_then(|b| b.dns.clone()).unwrap_or_else(|| vec![cfg.dns_server]);

    let mut dns_bytes = Vec::with_capacity(dns_servers.len() * 4);
    for server in &dns_servers {
        dns_bytes.extend_from_slice(&ipv4_to_u32(*server).to_be_bytes());
    }

    let mut filename_bytes = filename.as_bytes().to_vec();
    filename_bytes.push(0);

    vec![
        tlv(53, vec![msg_type]),
        tlv(54, ipv4_to_u32(cfg.ip).to_be_bytes().to_vec()),
        tlv(1, ipv4_to_u32(subnet).to_be_bytes().to_vec()),
        tlv(3, ipv4_to_u32(router).to_be_bytes().to_vec()),
        tlv(6, dns_bytes),
        tlv(51, (LEASE_SECONDS as u32).to_be_bytes().to_vec()),
        tlv(66, cfg.file_server.to_string().into_bytes()),
        tlv(67, filename_bytes),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_order_matches_upstream() {
        let cfg = DhcpConfig::default();
        let opts = craft_options(DHCPOFFER, &cfg, None, "undionly.kpxe");
        let tags: Vec<u8> = opts.iter().map(|o| o.tag).collect();
        assert_eq!(tags, vec![53, 54, 1, 3, 6, 51, 66, 67]);
    }

    #[test]
    fn binding_overrides_subnet_and_router() {
        let cfg = DhcpConfig::default();
        let binding = MacBinding {
            ipaddr: None,
            subnet: Some(Ipv4Addr::new(255, 255, 0, 0)),
            router: Some(Ipv4Addr::new(10, 0, 0, 1)),
            dns: None,
        };
        let opts = craft_options(DHCPACK, &cfg, Some(&binding), "undionly.kpxe");
        let subnet = opts.iter().find(|o| o.tag == 1).unwrap();
        assert_eq!(subnet.value, ipv4_to_u32(Ipv4Addr::new(255, 255, 0, 0)).to_be_bytes().to_vec());
    }
}
