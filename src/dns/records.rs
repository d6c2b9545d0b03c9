//! Record lookup: the configured override table first, then the host
//! system resolver, same two-tier scheme as the upstream `lookup()`
//! (a literal override for `ftp.se.debian.org.`, everything else resolved
//! normally).

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};

#[derive(Debug, Clone, Default)]
pub struct RecordTable {
    a_records: HashMap<String, Ipv4Addr>,
}

impl RecordTable {
    pub fn from_overrides(overrides: HashMap<String, Ipv4Addr>) -> Self {
        Self { a_records: overrides }
    }

    /// Looks up A records for `qname`, normalizing the trailing-dot
    /// convention DNS zone files use. Falls back to the host resolver for
    /// any name not in the override table.
    pub fn lookup_a(&self, qname: &str) -> Vec<Ipv4Addr> {
        let key = qname.trim_end_matches('.');
        if let Some((_, ip)) = self.a_records.iter().find(|(name, _)| name.trim_end_matches('.') == key) {
            return vec![*ip];
        }
        Self::resolve_host(key)
    }

    /// Resolves `host` via the system resolver (`getaddrinfo` on Unix),
    /// keeping only the IPv4 results; an unresolvable name yields no answers.
    fn resolve_host(host: &str) -> Vec<Ipv4Addr> {
        match (host, 0).to_socket_addrs() {
            Ok(addrs) => addrs
                .filter_map(|addr| match addr {
                    SocketAddr::V4(v4) => Some(*v4.ip()),
                    SocketAddr::V6(_) => None,
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_override_regardless_of_trailing_dot() {
        let mut overrides = HashMap::new();
        overrides.insert("ftp.se.debian.org.".to_string(), Ipv4Addr::new(1, 2, 3, 4));
        let table = RecordTable::from_overrides(overrides);
        assert_eq!(table.lookup_a("ftp.se.debian.org"), vec![Ipv4Addr::new(1, 2, 3, 4)]);
    }

    #[test]
    fn unknown_name_returns_empty() {
        let table = RecordTable::from_overrides(HashMap::new());
        assert!(table.lookup_a("unknown.example.").is_empty());
    }
}
