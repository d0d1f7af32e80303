use super::pipeline::{ConnectionPool, PIPELINE_POOL_CAPACITY};
use super::tcp::{read_frame, send_frame};
use super::STREAM_QUERY_TIMEOUT;
use crate::bootstrap::Bootstrapper;
use crate::client::{tls, DnsClient};
use crate::context::{guard, QueryContext};
use crate::ecs::ensure_ecs;
use crate::wire;
use async_trait::async_trait;
use hickory_proto::op::Message;
use janus_dns_domain::{normalize_endpoint, Endpoint, ForwardError, Protocol, UpstreamConfig};
use rustls::pki_types::ServerName;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// DNS over TLS (RFC 7858): the TCP state machine behind a TLS session.
/// SNI is the configured hostname, not the bootstrap-resolved address.
pub struct DotClient {
    endpoint: Endpoint,
    ecs_ip: String,
    bootstrap: Arc<Bootstrapper>,
    tls_config: Arc<rustls::ClientConfig>,
    pool: Option<ConnectionPool<TlsStream<TcpStream>>>,
}

impl DotClient {
    pub fn new(cfg: &UpstreamConfig, bootstrap: Arc<Bootstrapper>) -> Result<Self, ForwardError> {
        Ok(Self {
            endpoint: normalize_endpoint(&cfg.address, Protocol::Dot)?,
            ecs_ip: cfg.ecs_ip.clone(),
            bootstrap: Arc::clone(&bootstrap),
            tls_config: tls::client_config(cfg.insecure_skip_verify, &[]),
            pool: cfg
                .pipeline
                .then(|| ConnectionPool::new(PIPELINE_POOL_CAPACITY)),
        })
    }

    async fn dial(&self, ctx: &QueryContext) -> Result<TlsStream<TcpStream>, ForwardError> {
        let ip = self.bootstrap.lookup(&self.endpoint.host, ctx).await?;
        let addr = SocketAddr::new(ip, self.endpoint.port);

        let server_name = ServerName::try_from(self.endpoint.host.clone())
            .map_err(|e| ForwardError::Tls(format!("invalid TLS hostname '{}': {e}", self.endpoint.host)))?;

        let tcp = tokio::time::timeout_at(ctx.clip(STREAM_QUERY_TIMEOUT), TcpStream::connect(addr))
            .await
            .map_err(|_| ForwardError::DeadlineExceeded)?
            .map_err(|e| ForwardError::Network(format!("connection to {addr} failed: {e}")))?;

        let connector = TlsConnector::from(Arc::clone(&self.tls_config));
        let stream = tokio::time::timeout_at(
            ctx.clip(STREAM_QUERY_TIMEOUT),
            connector.connect(server_name, tcp),
        )
        .await
        .map_err(|_| ForwardError::DeadlineExceeded)?
        .map_err(|e| ForwardError::Tls(format!("handshake with {addr} failed: {e}")))?;

        debug!(server = %self.endpoint, "TLS connection established");
        Ok(stream)
    }

    async fn exchange_on(
        conn: &mut TlsStream<TcpStream>,
        request_bytes: &[u8],
        ctx: &QueryContext,
    ) -> Result<Message, ForwardError> {
        tokio::time::timeout_at(
            ctx.clip(STREAM_QUERY_TIMEOUT),
            send_frame(conn, request_bytes),
        )
        .await
        .map_err(|_| ForwardError::DeadlineExceeded)??;

        let response_bytes =
            tokio::time::timeout_at(ctx.clip(STREAM_QUERY_TIMEOUT), read_frame(conn))
                .await
                .map_err(|_| ForwardError::DeadlineExceeded)??;

        wire::unpack(&response_bytes)
    }

    async fn resolve_oneshot(
        &self,
        query: &Message,
        request_bytes: &[u8],
        ctx: &QueryContext,
    ) -> Result<Message, ForwardError> {
        let mut conn = self.dial(ctx).await?;
        let response = Self::exchange_on(&mut conn, request_bytes, ctx).await?;
        if response.id() != query.id() {
            return Err(ForwardError::IdMismatch);
        }
        Ok(response)
    }

    async fn resolve_pipeline(
        &self,
        pool: &ConnectionPool<TlsStream<TcpStream>>,
        query: &Message,
        request_bytes: &[u8],
        ctx: &QueryContext,
    ) -> Result<Message, ForwardError> {
        let mut slot = pool.checkout(ctx.clip(STREAM_QUERY_TIMEOUT)).await?;

        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => match self.dial(ctx).await {
                Ok(conn) => conn,
                Err(err) => {
                    slot.discard();
                    return Err(err);
                }
            },
        };

        match Self::exchange_on(&mut conn, request_bytes, ctx).await {
            Ok(response) if response.id() == query.id() => {
                slot.put_back(conn);
                Ok(response)
            }
            Ok(_) => {
                slot.discard();
                Err(ForwardError::IdMismatch)
            }
            Err(err) => {
                slot.discard();
                Err(err)
            }
        }
    }
}

#[async_trait]
impl DnsClient for DotClient {
    async fn resolve(&self, mut query: Message, ctx: &QueryContext) -> Result<Message, ForwardError> {
        ensure_ecs(&mut query, &self.ecs_ip);
        let request_bytes = wire::pack(&query)?;

        guard(ctx, ctx.deadline, async {
            match &self.pool {
                Some(pool) => {
                    self.resolve_pipeline(pool, &query, &request_bytes, ctx)
                        .await
                }
                None => self.resolve_oneshot(&query, &request_bytes, ctx).await,
            }
        })
        .await
    }
}
