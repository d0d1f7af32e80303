use super::pipeline::{ConnectionPool, PIPELINE_POOL_CAPACITY};
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
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const MAX_TCP_MESSAGE_SIZE: usize = 65535;

/// DNS over TCP (RFC 1035 §4.2.2): messages carry a 2-byte length prefix.
/// One-shot by default; with `pipeline` a bounded pool of long-lived
/// connections is reused per RFC 7766.
pub struct TcpClient {
    endpoint: Endpoint,
    ecs_ip: String,
    bootstrap: Arc<Bootstrapper>,
    pool: Option<ConnectionPool<TcpStream>>,
}

impl TcpClient {
    pub fn new(cfg: &UpstreamConfig, bootstrap: Arc<Bootstrapper>) -> Result<Self, ForwardError> {
        Ok(Self {
            endpoint: normalize_endpoint(&cfg.address, Protocol::Tcp)?,
            ecs_ip: cfg.ecs_ip.clone(),
            bootstrap: Arc::clone(&bootstrap),
            pool: cfg
                .pipeline
                .then(|| ConnectionPool::new(PIPELINE_POOL_CAPACITY)),
        })
    }

    async fn dial(&self, ctx: &QueryContext) -> Result<TcpStream, ForwardError> {
        let ip = self.bootstrap.lookup(&self.endpoint.host, ctx).await?;
        let addr = SocketAddr::new(ip, self.endpoint.port);
        tokio::time::timeout_at(ctx.clip(STREAM_QUERY_TIMEOUT), TcpStream::connect(addr))
            .await
            .map_err(|_| ForwardError::DeadlineExceeded)?
            .map_err(|e| ForwardError::Network(format!("connection to {addr} failed: {e}")))
    }

    async fn exchange_on(
        conn: &mut TcpStream,
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

    /// Pipelined path: one checked-out slot carries one in-flight query.
    /// Any error, and any ID mismatch, discards the slot so the next user
    /// dials fresh.
    async fn resolve_pipeline(
        &self,
        pool: &ConnectionPool<TcpStream>,
        query: &Message,
        request_bytes: &[u8],
        ctx: &QueryContext,
    ) -> Result<Message, ForwardError> {
        let mut slot = pool.checkout(ctx.clip(STREAM_QUERY_TIMEOUT)).await?;

        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => match self.dial(ctx).await {
                Ok(conn) => {
                    debug!(server = %self.endpoint, "pipeline slot dialed");
                    conn
                }
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
impl DnsClient for TcpClient {
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

pub(crate) async fn send_frame<S>(stream: &mut S, message_bytes: &[u8]) -> Result<(), ForwardError>
where
    S: AsyncWriteExt + Unpin,
{
    let length = message_bytes.len() as u16;
    stream
        .write_all(&length.to_be_bytes())
        .await
        .map_err(|e| ForwardError::Network(format!("failed to write length prefix: {e}")))?;
    stream
        .write_all(message_bytes)
        .await
        .map_err(|e| ForwardError::Network(format!("failed to write DNS message: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| ForwardError::Network(format!("failed to flush stream: {e}")))?;
    Ok(())
}

pub(crate) async fn read_frame<S>(stream: &mut S) -> Result<Vec<u8>, ForwardError>
where
    S: AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| ForwardError::Network(format!("failed to read response length: {e}")))?;

    let response_len = u16::from_be_bytes(len_buf) as usize;
    if response_len == 0 {
        return Err(ForwardError::EmptyResponse);
    }
    if response_len > MAX_TCP_MESSAGE_SIZE {
        return Err(ForwardError::Network(format!(
            "response too large: {response_len} bytes"
        )));
    }

    let mut response = vec![0u8; response_len];
    stream
        .read_exact(&mut response)
        .await
        .map_err(|e| ForwardError::Network(format!("failed to read response body: {e}")))?;
    Ok(response)
}
