//! Wire codec utilities shared by every protocol: TLV encode/parse for
//! DHCP options, big-endian integer packing, IPv4 dotted↔u32 conversion,
//! and 4-byte padding helpers for NFS opaque strings.

use std::net::Ipv4Addr;

/// A single tag-length-value option as found on the DHCP options wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub tag: u8,
    pub value: Vec<u8>,
}

/// Encodes one `tag, len, value` option. Caller is responsible for value
/// lengths that fit in a u8 (true of every DHCP option this core emits).
pub fn tlv_encode(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + value.len());
    out.push(tag);
    out.push(value.len() as u8);
    out.extend_from_slice(value);
    out
}

/// Parses a TLV-encoded options blob, honoring pad (0) bytes and stopping
/// at the end marker (255) or when the buffer is exhausted.
pub fn tlv_parse(mut raw: &[u8]) -> Vec<Tlv> {
    let mut out = Vec::new();
    while !raw.is_empty() {
        let tag = raw[0];
        if tag == 0 {
            raw = &raw[1..];
            continue;
        }
        if tag == 255 {
            break;
        }
        if raw.len() < 2 {
            break;
        }
        let len = raw[1] as usize;
        if raw.len() < 2 + len {
            break;
        }
        let value = raw[2..2 + len].to_vec();
        out.push(Tlv { tag, value });
        raw = &raw[2 + len..];
    }
    out
}

/// Converts a dotted-quad string or [`Ipv4Addr`] to its host-order u32.
pub fn ipv4_to_u32(addr: Ipv4Addr) -> u32 {
    u32::from_be_bytes(addr.octets())
}

pub fn u32_to_ipv4(value: u32) -> Ipv4Addr {
    Ipv4Addr::from(value.to_be_bytes())
}

/// Number of padding bytes needed to round `len` up to a 4-byte boundary.
pub fn pad4_len(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

/// Appends zero padding to round `buf`'s length up to a 4-byte boundary.
pub fn pad4(buf: &mut Vec<u8>) {
    let pad = pad4_len(buf.len());
    buf.extend(std::iter::repeat(0u8).take(pad));
}

/// Writes a length-prefixed, 4-byte-padded opaque string as NFSv4 requires
/// for every variable-length byte string on the wire.
pub fn write_opaque(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
    pad4(buf);
}

/// A cursor-like reader over a COMPOUND argument buffer. All reads are
/// big-endian; opaque reads additionally skip the 4-byte-aligned padding.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("unexpected end of buffer reading NFS argument")]
pub struct ReadOverrun;

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn u32(&mut self) -> Result<u32, ReadOverrun> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
    }

    pub fn u64(&mut self) -> Result<u64, ReadOverrun> {
        let bytes = self.take(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ReadOverrun> {
        if self.pos + n > self.buf.len() {
            return Err(ReadOverrun);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Reads a length-prefixed opaque string and skips its padding.
    pub fn opaque(&mut self) -> Result<&'a [u8], ReadOverrun> {
        let len = self.u32()? as usize;
        let data = self.take(len)?;
        let pad = pad4_len(len);
        if pad > 0 {
            self.take(pad)?;
        }
        Ok(data)
    }

    pub fn u32_array(&mut self, count: usize) -> Result<Vec<u32>, ReadOverrun> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.u32()?);
        }
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ReadOverrun> {
        self.take(n).map(|_| ())
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tlv_roundtrip() {
        let encoded = tlv_encode(1, &[255, 255, 255, 0]);
        let parsed = tlv_parse(&encoded);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].tag, 1);
        assert_eq!(parsed[0].value, vec![255, 255, 255, 0]);
    }

    #[test]
    fn tlv_parse_stops_at_end_marker() {
        let mut raw = tlv_encode(1, &[1]);
        raw.push(0xFF);
        raw.extend(tlv_encode(2, &[2]));
        let parsed = tlv_parse(&raw);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn ipv4_conversion_roundtrip() {
        let addr: Ipv4Addr = "192.168.0.10".parse().unwrap();
        assert_eq!(u32_to_ipv4(ipv4_to_u32(addr)), addr);
    }

    #[test]
    fn pad4_rounds_up() {
        assert_eq!(pad4_len(0), 0);
        assert_eq!(pad4_len(1), 3);
        assert_eq!(pad4_len(4), 0);
        assert_eq!(pad4_len(5), 3);
    }

    #[test]
    fn reader_reads_opaque_with_padding() {
        let mut buf = Vec::new();
        write_opaque(&mut buf, b"abc");
        buf.extend_from_slice(&42u32.to_be_bytes());
        let mut r = Reader::new(&buf);
        assert_eq!(r.opaque().unwrap(), b"abc");
        assert_eq!(r.u32().unwrap(), 42);
    }
}
