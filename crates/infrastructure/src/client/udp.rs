use super::STREAM_QUERY_TIMEOUT;
use crate::bootstrap::Bootstrapper;
use crate::client::DnsClient;
use crate::context::{guard, QueryContext};
use crate::ecs::ensure_ecs;
use crate::wire;
use async_trait::async_trait;
use hickory_proto::op::Message;
use janus_dns_domain::{normalize_endpoint, Endpoint, ForwardError, Protocol, UpstreamConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

const MAX_UDP_RESPONSE_SIZE: usize = 4096;

/// Single-shot datagram exchange, no retry.
pub struct UdpClient {
    endpoint: Endpoint,
    ecs_ip: String,
    bootstrap: Arc<Bootstrapper>,
}

impl UdpClient {
    pub fn new(cfg: &UpstreamConfig, bootstrap: Arc<Bootstrapper>) -> Result<Self, ForwardError> {
        Ok(Self {
            endpoint: normalize_endpoint(&cfg.address, Protocol::Udp)?,
            ecs_ip: cfg.ecs_ip.clone(),
            bootstrap: Arc::clone(&bootstrap),
        })
    }

    async fn exchange(&self, request_bytes: &[u8], ctx: &QueryContext) -> Result<Message, ForwardError> {
        let ip = self.bootstrap.lookup(&self.endpoint.host, ctx).await?;
        let server = SocketAddr::new(ip, self.endpoint.port);

        let bind_addr: SocketAddr = if server.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| ForwardError::Network(format!("failed to bind UDP socket: {e}")))?;

        socket
            .send_to(request_bytes, server)
            .await
            .map_err(|e| ForwardError::Network(format!("UDP send to {server} failed: {e}")))?;

        let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        let (len, from) = socket
            .recv_from(&mut recv_buf)
            .await
            .map_err(|e| ForwardError::Network(format!("UDP recv from {server} failed: {e}")))?;

        if from.ip() != server.ip() {
            warn!(expected = %server, received_from = %from, "UDP response from unexpected source");
        }
        if len == 0 {
            return Err(ForwardError::EmptyResponse);
        }

        debug!(server = %server, bytes = len, "UDP response received");
        wire::unpack(&recv_buf[..len])
    }
}

#[async_trait]
impl DnsClient for UdpClient {
    async fn resolve(&self, mut query: Message, ctx: &QueryContext) -> Result<Message, ForwardError> {
        ensure_ecs(&mut query, &self.ecs_ip);
        let request_bytes = wire::pack(&query)?;
        let deadline = ctx.clip(STREAM_QUERY_TIMEOUT);
        guard(ctx, deadline, self.exchange(&request_bytes, ctx)).await
    }
}
