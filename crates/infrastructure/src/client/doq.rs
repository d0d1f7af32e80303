use super::HTTP_QUERY_TIMEOUT;
use crate::bootstrap::Bootstrapper;
use crate::client::{tls, DnsClient};
use crate::context::{guard, QueryContext};
use crate::ecs::ensure_ecs;
use crate::wire;
use async_trait::async_trait;
use hickory_proto::op::Message;
use janus_dns_domain::{normalize_endpoint, Endpoint, ForwardError, Protocol, UpstreamConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

const DOQ_ALPN: &[u8] = b"doq";
const DOQ_MAX_IDLE: Duration = Duration::from_secs(10);
const MAX_DOQ_MESSAGE_SIZE: usize = 65535;

/// DNS over QUIC (RFC 9250): one fresh connection per query, one
/// bidirectional stream, 2-byte big-endian framing both ways.
pub struct DoqClient {
    endpoint: Endpoint,
    ecs_ip: String,
    bootstrap: Arc<Bootstrapper>,
    quinn_config: quinn::ClientConfig,
    quic_endpoint: OnceCell<quinn::Endpoint>,
}

impl DoqClient {
    pub fn new(cfg: &UpstreamConfig, bootstrap: Arc<Bootstrapper>) -> Result<Self, ForwardError> {
        let tls_config = tls::client_config(cfg.insecure_skip_verify, &[DOQ_ALPN]);
        let quic_tls = quinn::crypto::rustls::QuicClientConfig::try_from(tls_config)
            .map_err(|e| ForwardError::Tls(format!("invalid QUIC TLS config: {e}")))?;
        let mut quinn_config = quinn::ClientConfig::new(Arc::new(quic_tls));

        let mut transport = quinn::TransportConfig::default();
        transport.max_idle_timeout(Some(
            quinn::IdleTimeout::try_from(DOQ_MAX_IDLE)
                .map_err(|e| ForwardError::InvalidUpstream(format!("invalid idle timeout: {e}")))?,
        ));
        quinn_config.transport_config(Arc::new(transport));

        Ok(Self {
            endpoint: normalize_endpoint(&cfg.address, Protocol::Doq)?,
            ecs_ip: cfg.ecs_ip.clone(),
            bootstrap: Arc::clone(&bootstrap),
            quinn_config,
            quic_endpoint: OnceCell::new(),
        })
    }

    async fn quic_endpoint(&self) -> Result<&quinn::Endpoint, ForwardError> {
        self.quic_endpoint
            .get_or_try_init(|| async {
                let mut endpoint =
                    quinn::Endpoint::client((std::net::Ipv4Addr::UNSPECIFIED, 0).into())
                        .map_err(|e| {
                            ForwardError::Network(format!("failed to create QUIC endpoint: {e}"))
                        })?;
                endpoint.set_default_client_config(self.quinn_config.clone());
                Ok(endpoint)
            })
            .await
    }

    async fn exchange(&self, request_bytes: &[u8], ctx: &QueryContext) -> Result<Message, ForwardError> {
        let ip = self.bootstrap.lookup(&self.endpoint.host, ctx).await?;
        let addr = SocketAddr::new(ip, self.endpoint.port);

        let connecting = self
            .quic_endpoint()
            .await?
            .connect(addr, &self.endpoint.host)
            .map_err(|e| ForwardError::Network(format!("failed to initiate QUIC connection to {addr}: {e}")))?;
        let connection = connecting
            .await
            .map_err(|e| ForwardError::Network(format!("QUIC connection to {addr} failed: {e}")))?;

        let (mut send, mut recv) = connection
            .open_bi()
            .await
            .map_err(|e| ForwardError::Network(format!("failed to open QUIC stream to {addr}: {e}")))?;

        let length = request_bytes.len() as u16;
        send.write_all(&length.to_be_bytes())
            .await
            .map_err(|e| ForwardError::Network(format!("failed to write DoQ length prefix: {e}")))?;
        send.write_all(request_bytes)
            .await
            .map_err(|e| ForwardError::Network(format!("failed to write DoQ message: {e}")))?;
        send.finish()
            .map_err(|e| ForwardError::Network(format!("failed to finish DoQ send stream: {e}")))?;

        let mut len_buf = [0u8; 2];
        recv.read_exact(&mut len_buf)
            .await
            .map_err(|e| ForwardError::Network(format!("failed to read DoQ response length: {e}")))?;
        let response_len = u16::from_be_bytes(len_buf) as usize;
        if response_len == 0 {
            return Err(ForwardError::EmptyResponse);
        }
        if response_len > MAX_DOQ_MESSAGE_SIZE {
            return Err(ForwardError::Network(format!(
                "DoQ response too large: {response_len} bytes"
            )));
        }

        let mut response = vec![0u8; response_len];
        recv.read_exact(&mut response)
            .await
            .map_err(|e| ForwardError::Network(format!("failed to read DoQ response body: {e}")))?;

        connection.close(0u32.into(), b"done");
        debug!(server = %addr, response_len, "DoQ response received");
        wire::unpack(&response)
    }
}

#[async_trait]
impl DnsClient for DoqClient {
    async fn resolve(&self, mut query: Message, ctx: &QueryContext) -> Result<Message, ForwardError> {
        ensure_ecs(&mut query, &self.ecs_ip);
        let request_bytes = wire::pack(&query)?;
        let deadline = ctx.clip(HTTP_QUERY_TIMEOUT);
        guard(ctx, deadline, self.exchange(&request_bytes, ctx)).await
    }
}
