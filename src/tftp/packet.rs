//! TFTP wire format (RFC1350 §5, RFC2348 options extension).

use thiserror::Error;

pub const OP_RRQ: u16 = 1;
pub const OP_DATA: u16 = 3;
pub const OP_ACK: u16 = 4;
pub const OP_ERROR: u16 = 5;
pub const OP_OACK: u16 = 6;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("packet too short")]
    TooShort,
    #[error("request missing null-terminated fields")]
    MalformedRequest,
}

/// A parsed read request: filename, transfer mode, and any RFC2348 options
/// in the order they appeared on the wire.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub filename: String,
    pub mode: String,
    pub options: Vec<(String, String)>,
}

fn split_null_terminated(buf: &[u8]) -> Vec<String> {
    buf.split(|b| *b == 0).filter(|s| !s.is_empty()).map(|s| String::from_utf8_lossy(s).into_owned()).collect()
}

pub fn opcode(raw: &[u8]) -> Result<u16, PacketError> {
    if raw.len() < 2 {
        return Err(PacketError::TooShort);
    }
    Ok(u16::from_be_bytes([raw[0], raw[1]]))
}

pub fn parse_rrq(raw: &[u8]) -> Result<ReadRequest, PacketError> {
    if raw.len() < 2 {
        return Err(PacketError::TooShort);
    }
    let fields = split_null_terminated(&raw[2..]);
    if fields.len() < 2 {
        return Err(PacketError::MalformedRequest);
    }
    let filename = fields[0].clone();
    let mode = fields[1].clone();
    let mut options = Vec::new();
    let mut rest = fields[2..].iter();
    while let (Some(name), Some(value)) = (rest.next(), rest.next()) {
        options.push((name.clone(), value.clone()));
    }
    Ok(ReadRequest { filename, mode, options })
}

pub fn parse_ack(raw: &[u8]) -> Result<u16, PacketError> {
    if raw.len() < 4 {
        return Err(PacketError::TooShort);
    }
    Ok(u16::from_be_bytes([raw[2], raw[3]]))
}

pub fn encode_data(block: u16, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + data.len());
    out.extend_from_slice(&OP_DATA.to_be_bytes());
    out.extend_from_slice(&block.to_be_bytes());
    out.extend_from_slice(data);
    out
}

pub fn encode_error(code: u16, message: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + message.len() + 1);
    out.extend_from_slice(&OP_ERROR.to_be_bytes());
    out.extend_from_slice(&code.to_be_bytes());
    out.extend_from_slice(message.as_bytes());
    out.push(0);
    out
}

/// Acknowledges the RFC2348 options a client asked for, in request order.
pub fn encode_oack(options: &[(String, String)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&OP_OACK.to_be_bytes());
    for (name, value) in options {
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(value.as_bytes());
        out.push(0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rrq_with_options() {
        let mut raw = OP_RRQ.to_be_bytes().to_vec();
        raw.extend_from_slice(b"boot.img\0octet\0blksize\01468\0tsize\00\0");
        let req = parse_rrq(&raw).unwrap();
        assert_eq!(req.filename, "boot.img");
        assert_eq!(req.mode, "octet");
        assert_eq!(req.options, vec![("blksize".to_string(), "1468".to_string()), ("tsize".to_string(), "0".to_string())]);
    }

    #[test]
    fn ack_extracts_block_number() {
        let mut raw = OP_ACK.to_be_bytes().to_vec();
        raw.extend_from_slice(&42u16.to_be_bytes());
        assert_eq!(parse_ack(&raw).unwrap(), 42);
    }

    #[test]
    fn data_packet_has_opcode_and_block() {
        let pkt = encode_data(3, b"hello");
        assert_eq!(&pkt[0..2], &OP_DATA.to_be_bytes());
        assert_eq!(&pkt[2..4], &3u16.to_be_bytes());
        assert_eq!(&pkt[4..], b"hello");
    }
}
