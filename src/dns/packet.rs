//! Minimal RFC1035 message parsing/encoding: just enough of the question
//! and answer sections to answer A-record lookups, which is all this
//! thin override responder needs to serve.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DnsPacketError {
    #[error("message too short")]
    TooShort,
    #[error("malformed qname")]
    MalformedName,
}

pub const QTYPE_A: u16 = 1;
pub const CLASS_IN: u16 = 1;
const TTL: u32 = 60;

#[derive(Debug, Clone)]
pub struct Question {
    pub qname: String,
    pub qtype: u16,
    pub qclass: u16,
}

#[derive(Debug, Clone)]
pub struct DnsQuery {
    pub id: u16,
    pub question: Question,
    /// Raw question-section bytes, echoed verbatim into the reply.
    pub question_raw: Vec<u8>,
}

fn parse_qname(buf: &[u8], mut pos: usize) -> Result<(String, usize), DnsPacketError> {
    let mut labels = Vec::new();
    loop {
        let len = *buf.get(pos).ok_or(DnsPacketError::MalformedName)? as usize;
        if len == 0 {
            pos += 1;
            break;
        }
        pos += 1;
        let label = buf.get(pos..pos + len).ok_or(DnsPacketError::MalformedName)?;
        labels.push(String::from_utf8_lossy(label).into_owned());
        pos += len;
    }
    Ok((labels.join("."), pos))
}

pub fn parse_query(buf: &[u8]) -> Result<DnsQuery, DnsPacketError> {
    if buf.len() < 12 {
        return Err(DnsPacketError::TooShort);
    }
    let id = u16::from_be_bytes([buf[0], buf[1]]);
    let (qname, pos) = parse_qname(buf, 12)?;
    if buf.len() < pos + 4 {
        return Err(DnsPacketError::TooShort);
    }
    let qtype = u16::from_be_bytes([buf[pos], buf[pos + 1]]);
    let qclass = u16::from_be_bytes([buf[pos + 2], buf[pos + 3]]);
    let question_raw = buf[12..pos + 4].to_vec();

    Ok(DnsQuery { id, question: Question { qname, qtype, qclass }, question_raw })
}

/// Builds a reply with `qr=1, aa=1, ra=1` and zero or more A-record
/// answers, each pointing back at the question name via a name pointer.
pub fn encode_reply(query: &DnsQuery, answers: &[std::net::Ipv4Addr]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&query.id.to_be_bytes());
    out.extend_from_slice(&[0x85, 0x80]); // flags: qr=1 aa=1 rd=0 ra=1 rcode=0
    out.extend_from_slice(&1u16.to_be_bytes()); // qdcount
    out.extend_from_slice(&(answers.len() as u16).to_be_bytes()); // ancount
    out.extend_from_slice(&0u16.to_be_bytes()); // nscount
    out.extend_from_slice(&0u16.to_be_bytes()); // arcount
    out.extend_from_slice(&query.question_raw);

    for ip in answers {
        out.extend_from_slice(&[0xC0, 0x0C]); // pointer to question name at offset 12
        out.extend_from_slice(&QTYPE_A.to_be_bytes());
        out.extend_from_slice(&CLASS_IN.to_be_bytes());
        out.extend_from_slice(&TTL.to_be_bytes());
        out.extend_from_slice(&4u16.to_be_bytes());
        out.extend_from_slice(&ip.octets());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_qname(labels: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        for label in labels {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
        out.push(0);
        out
    }

    #[test]
    fn parses_qname_and_qtype() {
        let mut buf = vec![0x12, 0x34]; // id
        buf.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 0, 0, 0]); // flags+counts
        buf.extend(encode_qname(&["ftp", "se", "debian", "org"]));
        buf.extend_from_slice(&QTYPE_A.to_be_bytes());
        buf.extend_from_slice(&CLASS_IN.to_be_bytes());

        let query = parse_query(&buf).unwrap();
        assert_eq!(query.id, 0x1234);
        assert_eq!(query.question.qname, "ftp.se.debian.org");
        assert_eq!(query.question.qtype, QTYPE_A);
    }

    #[test]
    fn reply_echoes_id_and_question() {
        let mut buf = vec![0, 42];
        buf.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 0, 0, 0]);
        buf.extend(encode_qname(&["example", "com"]));
        buf.extend_from_slice(&QTYPE_A.to_be_bytes());
        buf.extend_from_slice(&CLASS_IN.to_be_bytes());
        let query = parse_query(&buf).unwrap();

        let reply = encode_reply(&query, &["10.0.0.1".parse().unwrap()]);
        assert_eq!(u16::from_be_bytes([reply[0], reply[1]]), 42);
        assert_eq!(u16::from_be_bytes([reply[6], reply[7]]), 1); // ancount
    }
}
