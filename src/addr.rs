//! Listener address selection.
//!
//! Internal mode binds a local address; external mode binds the machine's LAN
//! address and requires an explicit, forwarded port.

use crate::error::{RelocError, Result};
use crate::protocol::{timeouts, DEFAULT_HOST, DEFAULT_PORT};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum AddressMode {
    #[default]
    Internal,
    External,
}

impl FromStr for AddressMode {
    type Err = RelocError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "internal" => Ok(AddressMode::Internal),
            "external" => Ok(AddressMode::External),
            other => Err(RelocError::Config(format!(
                "mode must be 'internal' or 'external', got '{}'",
                other
            ))),
        }
    }
}

fn is_loopback_name(host: &str) -> bool {
    let h = host.to_ascii_lowercase();
    h == "localhost" || h.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
}

/// Host and port the listener should bind for `mode`.
pub fn resolve_listen(mode: AddressMode, host: Option<&str>, port: Option<u16>) -> Result<(String, u16)> {
    match mode {
        AddressMode::Internal => Ok((
            host.unwrap_or(DEFAULT_HOST).to_string(),
            port.unwrap_or(DEFAULT_PORT),
        )),
        AddressMode::External => {
            if let Some(h) = host {
                if is_loopback_name(h) {
                    return Err(RelocError::Config(
                        "localhost is not allowed in external mode; give the external address".into(),
                    ));
                }
            }
            let port = port.ok_or_else(|| {
                RelocError::Config("external mode needs an explicit, forwarded port".into())
            })?;
            let host = match host {
                Some(h) => h.to_string(),
                None => internal_ip().to_string(),
            };
            Ok((host, port))
        }
    }
}

/// Host and port a sender should target for `mode`.
pub fn resolve_target(mode: AddressMode, host: Option<&str>, port: Option<u16>) -> Result<(String, u16)> {
    match (mode, host, port) {
        (AddressMode::External, Some(h), Some(p)) => Ok((h.to_string(), p)),
        (AddressMode::External, _, _) => Err(RelocError::Config(
            "external mode needs both --host and --port".into(),
        )),
        (AddressMode::Internal, h, p) => Ok((
            h.unwrap_or(DEFAULT_HOST).to_string(),
            p.unwrap_or(DEFAULT_PORT),
        )),
    }
}

/// This machine's address on the local network, or 127.0.0.1 if none can be
/// determined. No packet is sent: connecting a UDP socket only selects a route.
pub fn internal_ip() -> IpAddr {
    let route = || -> std::io::Result<IpAddr> {
        let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        sock.connect(("10.255.255.255", 1))?;
        Ok(sock.local_addr()?.ip())
    };
    match route() {
        Ok(ip) if !ip.is_unspecified() => ip,
        _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}

/// Public addresses as reported by an external lookup service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIp {
    pub ipv4: String,
    pub ipv6: Option<String>,
}

fn fetch(url: &str) -> Result<String> {
    let agent = ureq::AgentBuilder::new()
        .timeout(Duration::from_millis(timeouts::LOOKUP_MS))
        .build();
    let body = agent
        .get(url)
        .call()
        .map_err(|e| RelocError::Lookup(format!("{}: {}", url, e)))?
        .into_string()
        .map_err(|e| RelocError::Lookup(format!("{}: {}", url, e)))?;
    Ok(body.trim().to_string())
}

/// Ask ipify for this host's public addresses. Display only; nothing binds to
/// the result.
pub fn lookup_external_ip() -> Result<ExternalIp> {
    let ipv4 = fetch("https://api.ipify.org")?;
    let ipv6 = fetch("https://api6.ipify.org").ok();
    Ok(ExternalIp { ipv4, ipv6 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse_is_case_insensitive() {
        assert_eq!("Internal".parse::<AddressMode>().unwrap(), AddressMode::Internal);
        assert_eq!("EXTERNAL".parse::<AddressMode>().unwrap(), AddressMode::External);
        assert!("public".parse::<AddressMode>().is_err());
    }

    #[test]
    fn test_internal_defaults() {
        assert_eq!(
            resolve_listen(AddressMode::Internal, None, None).unwrap(),
            ("localhost".to_string(), 1750)
        );
        assert_eq!(
            resolve_listen(AddressMode::Internal, Some("0.0.0.0"), Some(9000)).unwrap(),
            ("0.0.0.0".to_string(), 9000)
        );
    }

    #[test]
    fn test_external_requires_port_and_rejects_loopback() {
        assert!(resolve_listen(AddressMode::External, Some("203.0.113.9"), None).is_err());
        assert!(resolve_listen(AddressMode::External, Some("localhost"), Some(4000)).is_err());
        assert!(resolve_listen(AddressMode::External, Some("127.0.0.1"), Some(4000)).is_err());
        let (host, port) = resolve_listen(AddressMode::External, None, Some(4000)).unwrap();
        assert!(!host.is_empty());
        assert_eq!(port, 4000);
    }

    #[test]
    fn test_sender_target() {
        assert_eq!(
            resolve_target(AddressMode::Internal, None, None).unwrap(),
            ("localhost".to_string(), 1750)
        );
        assert!(resolve_target(AddressMode::External, Some("h"), None).is_err());
        assert!(resolve_target(AddressMode::External, None, Some(1)).is_err());
    }

    #[test]
    fn test_internal_ip_is_usable() {
        assert!(!internal_ip().is_unspecified());
    }
}
