use crate::errors::ForwardError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire protocol an upstream speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Udp,
    Tcp,
    Dot,
    Doh,
    Doq,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Dot => "dot",
            Self::Doh => "doh",
            Self::Doq => "doq",
        }
    }

    /// Port applied when the configured address carries none. DoH has no
    /// entry here: its addresses are URLs and default to 443 implicitly.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Udp | Self::Tcp => 53,
            Self::Dot | Self::Doq => 853,
            Self::Doh => 443,
        }
    }

    fn scheme_prefix(&self) -> Option<&'static str> {
        match self {
            Self::Dot => Some("tls://"),
            Self::Doq => Some("quic://"),
            _ => None,
        }
    }
}

impl FromStr for Protocol {
    type Err = ForwardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            "dot" => Ok(Self::Dot),
            "doh" => Ok(Self::Doh),
            "doq" => Ok(Self::Doq),
            other => Err(ForwardError::InvalidUpstream(format!(
                "unsupported upstream protocol '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized upstream endpoint: scheme prefix stripped, default port
/// applied. For DoH the host/port are those of the query URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Whether the host is an IP literal (no bootstrap lookup needed).
    pub fn is_literal(&self) -> bool {
        self.host.parse::<std::net::IpAddr>().is_ok()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Splits `host[:port]`, handling bracketed and bare IPv6 literals.
/// A bare string with multiple colons and no brackets is an IPv6 literal
/// without a port.
pub fn split_host_port(s: &str) -> Result<(String, Option<u16>), ForwardError> {
    if let Some(rest) = s.strip_prefix('[') {
        let end = rest.find(']').ok_or_else(|| {
            ForwardError::InvalidUpstream(format!("unterminated bracket in address '{s}'"))
        })?;
        let host = rest[..end].to_string();
        let after = &rest[end + 1..];
        if after.is_empty() {
            return Ok((host, None));
        }
        let port_str = after.strip_prefix(':').ok_or_else(|| {
            ForwardError::InvalidUpstream(format!("malformed address '{s}'"))
        })?;
        let port = port_str.parse::<u16>().map_err(|_| {
            ForwardError::InvalidUpstream(format!("invalid port in address '{s}'"))
        })?;
        return Ok((host, Some(port)));
    }

    if s.parse::<std::net::Ipv6Addr>().is_ok() {
        return Ok((s.to_string(), None));
    }

    match s.rsplit_once(':') {
        Some((host, port_str)) => {
            let port = port_str.parse::<u16>().map_err(|_| {
                ForwardError::InvalidUpstream(format!("invalid port in address '{s}'"))
            })?;
            Ok((host.to_string(), Some(port)))
        }
        None => Ok((s.to_string(), None)),
    }
}

/// Normalizes a configured upstream address for the given protocol.
pub fn normalize_endpoint(address: &str, protocol: Protocol) -> Result<Endpoint, ForwardError> {
    let mut addr = address.trim();
    if let Some(prefix) = protocol.scheme_prefix() {
        addr = addr.strip_prefix(prefix).unwrap_or(addr);
    }
    if protocol == Protocol::Doh {
        addr = addr.strip_prefix("https://").unwrap_or(addr);
        addr = addr.split('/').next().unwrap_or(addr);
    }
    if addr.is_empty() {
        return Err(ForwardError::InvalidUpstream(format!(
            "empty upstream address '{address}'"
        )));
    }

    let (host, port) = split_host_port(addr)?;
    Ok(Endpoint {
        host,
        port: port.unwrap_or_else(|| protocol.default_port()),
    })
}
