//! Typed configuration structures for every server, replacing the
//! original's dotted-path `dhcp.binding.<MAC>.*` lookup with a per-MAC
//! override map (spec.md §9 REDESIGN FLAG).
//!
//! Every config struct derives [`serde::Deserialize`] so a deployment can
//! load it from a TOML file; programmatic defaults match the upstream
//! `pypxe` defaults so tests and the binary can run without a file on disk.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use mac_address::MacAddress;
use serde::Deserialize;

fn de_mac_key<'de, D>(deserializer: D) -> Result<HashMap<MacAddress, MacBinding>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: HashMap<String, MacBinding> = HashMap::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(k, v)| {
            k.parse::<MacAddress>()
                .map(|mac| (mac, v))
                .map_err(|e| serde::de::Error::custom(format!("invalid MAC address {k}: {e}")))
        })
        .collect()
}

/// Per-MAC override of the server-wide DHCP defaults. Each field falls back
/// independently to [`DhcpConfig`]'s corresponding default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MacBinding {
    pub ipaddr: Option<Ipv4Addr>,
    pub subnet: Option<Ipv4Addr>,
    pub router: Option<Ipv4Addr>,
    pub dns: Option<Vec<Ipv4Addr>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DhcpConfig {
    pub ip: Ipv4Addr,
    pub interface: String,
    pub port: u16,
    pub offer_from: Ipv4Addr,
    pub offer_to: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub router: Ipv4Addr,
    pub dns_server: Ipv4Addr,
    pub broadcast: Ipv4Addr,
    pub file_server: Ipv4Addr,
    pub boot_filename: String,
    #[serde(deserialize_with = "de_mac_key")]
    pub static_bindings: HashMap<MacAddress, MacBinding>,
    pub mode_debug: bool,
}

impl Default for DhcpConfig {
    fn default() -> Self {
        Self {
            ip: Ipv4Addr::new(192, 168, 2, 2),
            interface: String::new(),
            port: 67,
            offer_from: Ipv4Addr::new(192, 168, 2, 100),
            offer_to: Ipv4Addr::new(192, 168, 2, 150),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            router: Ipv4Addr::new(192, 168, 2, 1),
            dns_server: Ipv4Addr::new(8, 8, 8, 8),
            broadcast: Ipv4Addr::new(255, 255, 255, 255),
            file_server: Ipv4Addr::new(192, 168, 2, 2),
            boot_filename: "undionly.kpxe".to_string(),
            static_bindings: HashMap::new(),
            mode_debug: false,
        }
    }
}

impl DhcpConfig {
    pub fn binding_for(&self, mac: &MacAddress) -> Option<&MacBinding> {
        self.static_bindings.get(mac)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub enum TftpBackendKind {
    #[default]
    Filesystem,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TftpConfig {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub default_retries: u8,
    pub timeout_secs: u64,
    pub backend: TftpBackendKind,
    /// Root directory for the filesystem backend; requests are resolved
    /// relative to it and may never escape it.
    pub netbook_directory: String,
    /// Base URL for the HTTP backend (e.g. `http://origin.example/`).
    pub http_origin: String,
    pub mode_debug: bool,
}

impl Default for TftpConfig {
    fn default() -> Self {
        Self {
            ip: Ipv4Addr::UNSPECIFIED,
            port: 69,
            default_retries: 3,
            timeout_secs: 5,
            backend: TftpBackendKind::Filesystem,
            netbook_directory: ".".to_string(),
            http_origin: String::new(),
            mode_debug: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NfsConfig {
    pub root_path: String,
    pub readonly: bool,
    pub bind_addr: String,
}

impl Default for NfsConfig {
    fn default() -> Self {
        Self { root_path: "/srv".to_string(), readonly: true, bind_addr: "0.0.0.0:2049".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    pub bind_addr: String,
    /// Static qname → A-record overrides, e.g. `ftp.se.debian.org.` from
    /// spec.md §6, generalized into configuration.
    pub overrides: HashMap<String, Ipv4Addr>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0:53".to_string(), overrides: HashMap::new() }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dhcp: DhcpConfig,
    pub tftp: TftpConfig,
    pub nfs: NfsConfig,
    pub dns: DnsConfig,
    pub log_verbosity: u64,
}

impl AppConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn load(path: &str) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_upstream() {
        let cfg = DhcpConfig::default();
        assert_eq!(cfg.port, 67);
        assert_eq!(cfg.offer_from, Ipv4Addr::new(192, 168, 2, 100));
    }

    #[test]
    fn per_mac_override_parses() {
        let toml = r#"
            [dhcp.static_bindings."00:11:22:33:44:55"]
            ipaddr = "192.168.0.10"
        "#;
        let cfg = AppConfig::from_toml_str(toml).unwrap();
        let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();
        let binding = cfg.dhcp.binding_for(&mac).unwrap();
        assert_eq!(binding.ipaddr, Some(Ipv4Addr::new(192, 168, 0, 10)));
    }
}
