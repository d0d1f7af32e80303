use super::HTTP_QUERY_TIMEOUT;
use crate::bootstrap::{Bootstrapper, BOOTSTRAP_TIMEOUT};
use crate::client::{tls, DnsClient};
use crate::context::{guard, QueryContext};
use crate::ecs::ensure_ecs;
use crate::wire;
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use hickory_proto::op::Message;
use janus_dns_domain::{split_host_port, ForwardError, UpstreamConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

pub const DOH_CONTENT_TYPE: &str = "application/dns-message";

const H3_MAX_IDLE: Duration = Duration::from_secs(30);
const ERROR_BODY_LIMIT: usize = 512;
const DOH_DEFAULT_PORT: u16 = 443;

type H3SendRequest = h3::client::SendRequest<h3_quinn::OpenStreams, Bytes>;

/// DNS over HTTPS (RFC 8484): POST with `application/dns-message` bodies.
/// HTTP/1.1+2 goes through a per-upstream reqwest client whose TCP connects
/// resolve via the bootstrap resolver; the `http3` flag switches to a
/// quinn-backed h3 client instead.
pub struct DohClient {
    url: String,
    ecs_ip: String,
    transport: DohTransport,
}

enum DohTransport {
    Http(reqwest::Client),
    H3(H3Transport),
}

impl DohClient {
    pub fn new(cfg: &UpstreamConfig, bootstrap: Arc<Bootstrapper>) -> Result<Self, ForwardError> {
        // The configured URL is taken verbatim when it carries a scheme.
        let url = if cfg.address.starts_with("https://") {
            cfg.address.clone()
        } else {
            format!("https://{}", cfg.address)
        };

        let transport = if cfg.http3 {
            DohTransport::H3(H3Transport::new(
                &url,
                cfg.insecure_skip_verify,
                Arc::clone(&bootstrap),
            )?)
        } else {
            DohTransport::Http(build_http_client(cfg, bootstrap)?)
        };

        Ok(Self {
            url,
            ecs_ip: cfg.ecs_ip.clone(),
            transport,
        })
    }

    pub fn is_http3(&self) -> bool {
        matches!(self.transport, DohTransport::H3(_))
    }

    async fn resolve_http(
        &self,
        client: &reqwest::Client,
        request_bytes: Vec<u8>,
    ) -> Result<Message, ForwardError> {
        let response = client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, DOH_CONTENT_TYPE)
            .header(reqwest::header::ACCEPT, DOH_CONTENT_TYPE)
            .body(request_bytes)
            .send()
            .await
            .map_err(|e| ForwardError::Network(format!("DoH request to {} failed: {e}", self.url)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.bytes().await.unwrap_or_default();
            return Err(ForwardError::HttpStatus {
                code: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let body = response.bytes().await.map_err(|e| {
            ForwardError::Network(format!("failed to read DoH response from {}: {e}", self.url))
        })?;
        if body.is_empty() {
            return Err(ForwardError::EmptyResponse);
        }

        debug!(url = %self.url, response_len = body.len(), "DoH response received");
        wire::unpack(&body)
    }
}

#[async_trait]
impl DnsClient for DohClient {
    async fn resolve(&self, mut query: Message, ctx: &QueryContext) -> Result<Message, ForwardError> {
        ensure_ecs(&mut query, &self.ecs_ip);
        let request_bytes = wire::pack(&query)?;
        let deadline = ctx.clip(HTTP_QUERY_TIMEOUT);

        guard(ctx, deadline, async {
            match &self.transport {
                DohTransport::Http(client) => self.resolve_http(client, request_bytes).await,
                DohTransport::H3(h3) => h3.request(&self.url, &request_bytes, ctx).await,
            }
        })
        .await
    }
}

fn build_http_client(
    cfg: &UpstreamConfig,
    bootstrap: Arc<Bootstrapper>,
) -> Result<reqwest::Client, ForwardError> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(HTTP_QUERY_TIMEOUT)
        .pool_max_idle_per_host(4)
        .dns_resolver(Arc::new(BootstrapDns { bootstrap }))
        .danger_accept_invalid_certs(cfg.insecure_skip_verify)
        .build()
        .map_err(|e| ForwardError::InvalidUpstream(format!("failed to build DoH client: {e}")))
}

/// Routes reqwest's connection establishment through the bootstrap
/// resolver, so DoH hostnames never depend on the system resolver once
/// bootstrap servers are configured.
struct BootstrapDns {
    bootstrap: Arc<Bootstrapper>,
}

impl reqwest::dns::Resolve for BootstrapDns {
    fn resolve(&self, name: reqwest::dns::Name) -> reqwest::dns::Resolving {
        let bootstrap = Arc::clone(&self.bootstrap);
        Box::pin(async move {
            let ctx = QueryContext::with_timeout(BOOTSTRAP_TIMEOUT);
            let ip = bootstrap
                .lookup(name.as_str(), &ctx)
                .await
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
            let addrs: reqwest::dns::Addrs = Box::new(std::iter::once(SocketAddr::new(ip, 0)));
            Ok(addrs)
        })
    }
}

struct H3Transport {
    hostname: String,
    port: u16,
    quinn_config: quinn::ClientConfig,
    endpoint: OnceCell<quinn::Endpoint>,
    send_request: Mutex<Option<H3SendRequest>>,
    bootstrap: Arc<Bootstrapper>,
}

impl H3Transport {
    fn new(
        url: &str,
        insecure_skip_verify: bool,
        bootstrap: Arc<Bootstrapper>,
    ) -> Result<Self, ForwardError> {
        let without_scheme = url.strip_prefix("https://").unwrap_or(url);
        let host_part = without_scheme.split('/').next().unwrap_or(without_scheme);
        let (hostname, port) = split_host_port(host_part)?;

        let tls_config = tls::client_config(insecure_skip_verify, &[b"h3"]);
        let quic_tls = quinn::crypto::rustls::QuicClientConfig::try_from(tls_config)
            .map_err(|e| ForwardError::Tls(format!("invalid QUIC TLS config: {e}")))?;
        let mut quinn_config = quinn::ClientConfig::new(Arc::new(quic_tls));

        let mut transport = quinn::TransportConfig::default();
        transport.max_idle_timeout(Some(
            quinn::IdleTimeout::try_from(H3_MAX_IDLE)
                .map_err(|e| ForwardError::InvalidUpstream(format!("invalid idle timeout: {e}")))?,
        ));
        quinn_config.transport_config(Arc::new(transport));

        Ok(Self {
            hostname,
            port: port.unwrap_or(DOH_DEFAULT_PORT),
            quinn_config,
            endpoint: OnceCell::new(),
            send_request: Mutex::new(None),
            bootstrap,
        })
    }

    async fn endpoint(&self) -> Result<&quinn::Endpoint, ForwardError> {
        self.endpoint
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

    async fn connect_new(&self, ctx: &QueryContext) -> Result<H3SendRequest, ForwardError> {
        let ip = self.bootstrap.lookup(&self.hostname, ctx).await?;
        let addr = SocketAddr::new(ip, self.port);

        let connecting = self
            .endpoint()
            .await?
            .connect(addr, &self.hostname)
            .map_err(|e| ForwardError::Network(format!("failed to initiate H3 connection to {addr}: {e}")))?;
        let connection = connecting
            .await
            .map_err(|e| ForwardError::Network(format!("H3 connection to {addr} failed: {e}")))?;

        let h3_conn = h3_quinn::Connection::new(connection);
        let (mut driver, send_request) = h3::client::new(h3_conn)
            .await
            .map_err(|e| ForwardError::Network(format!("failed to create H3 client for {addr}: {e}")))?;

        tokio::spawn(async move {
            let _ = std::future::poll_fn(|cx| driver.poll_close(cx)).await;
        });

        debug!(server = %addr, hostname = %self.hostname, "H3 connection established");
        Ok(send_request)
    }

    /// Tries the pooled send-request handle first; a failed exchange drops
    /// it and retries once over a fresh connection.
    async fn request(
        &self,
        url: &str,
        request_bytes: &[u8],
        ctx: &QueryContext,
    ) -> Result<Message, ForwardError> {
        let pooled = { self.send_request.lock().await.clone() };

        if let Some(mut send_request) = pooled {
            match Self::execute(&mut send_request, url, request_bytes).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    debug!(url = %url, error = %err, "pooled H3 connection stale, reconnecting");
                    *self.send_request.lock().await = None;
                }
            }
        }

        let mut fresh = self.connect_new(ctx).await?;
        *self.send_request.lock().await = Some(fresh.clone());
        Self::execute(&mut fresh, url, request_bytes).await
    }

    async fn execute(
        send_request: &mut H3SendRequest,
        url: &str,
        request_bytes: &[u8],
    ) -> Result<Message, ForwardError> {
        let request = http::Request::builder()
            .method("POST")
            .uri(url)
            .header("content-type", DOH_CONTENT_TYPE)
            .header("accept", DOH_CONTENT_TYPE)
            .body(())
            .map_err(|e| ForwardError::Network(format!("failed to build H3 request: {e}")))?;

        let mut stream = send_request
            .send_request(request)
            .await
            .map_err(|e| ForwardError::Network(format!("failed to send H3 request to {url}: {e}")))?;

        stream
            .send_data(Bytes::copy_from_slice(request_bytes))
            .await
            .map_err(|e| ForwardError::Network(format!("failed to send H3 body to {url}: {e}")))?;
        stream
            .finish()
            .await
            .map_err(|e| ForwardError::Network(format!("failed to finish H3 stream to {url}: {e}")))?;

        let response = stream
            .recv_response()
            .await
            .map_err(|e| ForwardError::Network(format!("failed to receive H3 response from {url}: {e}")))?;
        let status = response.status();

        let mut body = BytesMut::new();
        while let Some(mut chunk) = stream
            .recv_data()
            .await
            .map_err(|e| ForwardError::Network(format!("failed to read H3 body from {url}: {e}")))?
        {
            body.extend_from_slice(chunk.chunk());
            chunk.advance(chunk.remaining());
        }

        if status != http::StatusCode::OK {
            return Err(ForwardError::HttpStatus {
                code: status.as_u16(),
                body: truncate_body(&body),
            });
        }
        if body.is_empty() {
            return Err(ForwardError::EmptyResponse);
        }
        wire::unpack(&body)
    }
}

fn truncate_body(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(ERROR_BODY_LIMIT)
        .collect()
}
