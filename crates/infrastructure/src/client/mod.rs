//! Upstream client variants and the factory that builds them.

pub mod doh;
pub mod doq;
pub mod dot;
pub mod pipeline;
pub mod stats;
pub mod tcp;
pub mod tls;
pub mod udp;

use crate::bootstrap::Bootstrapper;
use crate::context::QueryContext;
use async_trait::async_trait;
use hickory_proto::op::Message;
use janus_dns_domain::{ForwardError, Protocol, UpstreamConfig};
use std::sync::Arc;
use std::time::Duration;

pub use pipeline::{ConnectionPool, PoolSlot, PIPELINE_POOL_CAPACITY};
pub use stats::{StatsClient, UpstreamStatsSnapshot};

/// Per-query ceiling for the datagram/stream transports.
pub const STREAM_QUERY_TIMEOUT: Duration = Duration::from_secs(5);
/// Per-query ceiling for the HTTP and QUIC transports.
pub const HTTP_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// One upstream's single operation. Implementations mutate the owned query
/// (ECS, for now) before it goes on the wire, so racing callers hand each
/// attempt its own clone.
#[async_trait]
pub trait DnsClient: Send + Sync {
    async fn resolve(&self, query: Message, ctx: &QueryContext) -> Result<Message, ForwardError>;
}

/// Concrete client, one variant per wire protocol.
pub enum UpstreamClient {
    Udp(udp::UdpClient),
    Tcp(tcp::TcpClient),
    Dot(dot::DotClient),
    Doh(doh::DohClient),
    Doq(doq::DoqClient),
}

impl UpstreamClient {
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Udp(_) => Protocol::Udp,
            Self::Tcp(_) => Protocol::Tcp,
            Self::Dot(_) => Protocol::Dot,
            Self::Doh(_) => Protocol::Doh,
            Self::Doq(_) => Protocol::Doq,
        }
    }
}

#[async_trait]
impl DnsClient for UpstreamClient {
    async fn resolve(&self, query: Message, ctx: &QueryContext) -> Result<Message, ForwardError> {
        match self {
            Self::Udp(c) => c.resolve(query, ctx).await,
            Self::Tcp(c) => c.resolve(query, ctx).await,
            Self::Dot(c) => c.resolve(query, ctx).await,
            Self::Doh(c) => c.resolve(query, ctx).await,
            Self::Doq(c) => c.resolve(query, ctx).await,
        }
    }
}

/// Builds the client matching the configured protocol tag.
pub fn build_client(
    cfg: &UpstreamConfig,
    bootstrap: Arc<Bootstrapper>,
) -> Result<UpstreamClient, ForwardError> {
    match cfg.protocol {
        Protocol::Udp => Ok(UpstreamClient::Udp(udp::UdpClient::new(cfg, bootstrap)?)),
        Protocol::Tcp => Ok(UpstreamClient::Tcp(tcp::TcpClient::new(cfg, bootstrap)?)),
        Protocol::Dot => Ok(UpstreamClient::Dot(dot::DotClient::new(cfg, bootstrap)?)),
        Protocol::Doh => Ok(UpstreamClient::Doh(doh::DohClient::new(cfg, bootstrap)?)),
        Protocol::Doq => Ok(UpstreamClient::Doq(doq::DoqClient::new(cfg, bootstrap)?)),
    }
}
