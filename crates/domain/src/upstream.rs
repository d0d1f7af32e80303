use crate::protocol::Protocol;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which split a pool serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum PoolTag {
    Cn,
    Overseas,
}

impl PoolTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cn => "CN",
            Self::Overseas => "Overseas",
        }
    }
}

impl fmt::Display for PoolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable configuration of one upstream server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// `host[:port]`, optionally scheme-prefixed (`https://`, `tls://`,
    /// `quic://`). Normalization happens in [`crate::protocol::normalize_endpoint`].
    pub address: String,

    pub protocol: Protocol,

    /// ECS source IP stamped onto outbound queries; empty disables ECS.
    #[serde(default)]
    pub ecs_ip: String,

    /// Reuse long-lived connections per RFC 7766 (tcp/dot only).
    #[serde(default)]
    pub pipeline: bool,

    /// Use HTTP/3 instead of HTTP/1.1+2 (doh only).
    #[serde(default)]
    pub http3: bool,

    #[serde(default)]
    pub insecure_skip_verify: bool,
}

impl UpstreamConfig {
    pub fn new(address: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            address: address.into(),
            protocol,
            ecs_ip: String::new(),
            pipeline: false,
            http3: false,
            insecure_skip_verify: false,
        }
    }
}
