//! BOOTP/DHCPv4 packet representation (RFC2131 §2, RFC2132).
//!
//! A packet is a fixed 236-byte BOOTP header, a 4-byte magic cookie
//! (`0x63825363`), and a TLV-encoded options section terminated by tag 255.

use std::net::Ipv4Addr;

use crate::core::codec::{ipv4_to_u32, tlv_parse, u32_to_ipv4, Tlv};
use crate::hooks::packet_context::PacketType;

pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
const HEADER_LEN: usize = 236;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub fn zero() -> Self {
        Self([0; 6])
    }
}

impl From<MacAddr> for mac_address::MacAddress {
    fn from(mac: MacAddr) -> Self {
        mac_address::MacAddress::new(mac.0)
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// A parsed (or yet-to-be-crafted) DHCP packet.
///
/// `xid` and `secs` are held in the byte order they appear on the wire
/// (network/big-endian, per RFC2131) — an earlier draft of this server
/// decoded them little-endian, which desynced retransmission matching
/// against real clients.
#[derive(Debug, Clone)]
pub struct DhcpV4Packet {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: MacAddr,
    pub options: Vec<Tlv>,
}

impl DhcpV4Packet {
    pub fn message_type(&self) -> Option<u8> {
        self.options.iter().find(|o| o.tag == 53).and_then(|o| o.value.first().copied())
    }

    pub fn option(&self, tag: u8) -> Option<&[u8]> {
        self.options.iter().find(|o| o.tag == tag).map(|o| o.value.as_slice())
    }
}

impl PacketType for DhcpV4Packet {
    fn empty() -> Self {
        Self {
            op: 0,
            htype: 1,
            hlen: 6,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: MacAddr::zero(),
            options: Vec::new(),
        }
    }

    fn from_raw_bytes(raw: &[u8]) -> Self {
        if raw.len() < HEADER_LEN {
            return Self::empty();
        }
        let xid = u32::from_be_bytes(raw[4..8].try_into().unwrap());
        let secs = u16::from_be_bytes(raw[8..10].try_into().unwrap());
        let flags = u16::from_be_bytes(raw[10..12].try_into().unwrap());
        let ciaddr = u32_to_ipv4(u32::from_be_bytes(raw[12..16].try_into().unwrap()));
        let yiaddr = u32_to_ipv4(u32::from_be_bytes(raw[16..20].try_into().unwrap()));
        let siaddr = u32_to_ipv4(u32::from_be_bytes(raw[20..24].try_into().unwrap()));
        let giaddr = u32_to_ipv4(u32::from_be_bytes(raw[24..28].try_into().unwrap()));
        let mut chaddr = [0u8; 6];
        chaddr.copy_from_slice(&raw[28..34]);

        let options = if raw.len() > HEADER_LEN + 4 && raw[HEADER_LEN..HEADER_LEN + 4] == MAGIC_COOKIE {
            tlv_parse(&raw[HEADER_LEN + 4..])
        } else {
            Vec::new()
        };

        Self {
            op: raw[0],
            htype: raw[1],
            hlen: raw[2],
            hops: raw[3],
            xid,
            secs,
            flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr: MacAddr(chaddr),
            options,
        }
    }

    fn to_raw_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + 4 + 64);
        out.push(self.op);
        out.push(self.htype);
        out.push(self.hlen);
        out.push(self.hops);
        out.extend_from_slice(&self.xid.to_be_bytes());
        out.extend_from_slice(&self.secs.to_be_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&ipv4_to_u32(self.ciaddr).to_be_bytes());
        out.extend_from_slice(&ipv4_to_u32(self.yiaddr).to_be_bytes());
        out.extend_from_slice(&ipv4_to_u32(self.siaddr).to_be_bytes());
        out.extend_from_slice(&ipv4_to_u32(self.giaddr).to_be_bytes());
        out.extend_from_slice(&self.chaddr.0);
        out.extend(std::iter::repeat(0u8).take(10)); // chaddr padding to 16 bytes
        out.extend(std::iter::repeat(0u8).take(64)); // sname
        out.extend(std::iter::repeat(0u8).take(128)); // file
        out.extend_from_slice(&MAGIC_COOKIE);
        for opt in &self.options {
            out.push(opt.tag);
            out.push(opt.value.len() as u8);
            out.extend_from_slice(&opt.value);
        }
        out.push(255);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_discover(xid: u32, mac: [u8; 6]) -> Vec<u8> {
        let mut pkt = DhcpV4Packet::empty();
        pkt.op = 1;
        pkt.xid = xid;
        pkt.chaddr = MacAddr(mac);
        pkt.options.push(Tlv { tag: 53, value: vec![1] });
        pkt.to_raw_bytes()
    }

    #[test]
    fn xid_roundtrips_big_endian() {
        let raw = sample_discover(0x11223344, [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        let parsed = DhcpV4Packet::from_raw_bytes(&raw);
        assert_eq!(parsed.xid, 0x11223344);
        assert_eq!(parsed.chaddr.0, [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        assert_eq!(parsed.message_type(), Some(1));
    }

    #[test]
    fn mac_display_is_upper_hex_colon_separated() {
        let mac = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(mac.to_string(), "00:11:22:33:44:55");
    }
}
