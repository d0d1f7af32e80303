//! Bootstrap resolution of upstream hostnames over plain UDP, breaking the
//! chicken-and-egg cycle for encrypted upstreams.

use crate::context::{guard, QueryContext};
use crate::wire;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, RecordType};
use janus_dns_domain::{split_host_port, ForwardError};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

pub const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_UDP_RESPONSE_SIZE: usize = 4096;
const DEFAULT_DNS_PORT: u16 = 53;

/// Resolves hostnames against a fixed plain-DNS server list, choosing
/// servers round-robin. With no servers configured the operating system
/// resolver is used instead.
#[derive(Debug)]
pub struct Bootstrapper {
    servers: Vec<SocketAddr>,
    counter: AtomicU64,
}

impl Bootstrapper {
    /// Entries without a port get `:53`; entries that are not socket
    /// addresses are dropped with a warning.
    pub fn new(servers: &[String]) -> Self {
        let servers = servers
            .iter()
            .filter_map(|raw| {
                let (host, port) = match split_host_port(raw) {
                    Ok(parts) => parts,
                    Err(err) => {
                        warn!(server = %raw, error = %err, "ignoring invalid bootstrap server");
                        return None;
                    }
                };
                match host.parse::<IpAddr>() {
                    Ok(ip) => Some(SocketAddr::new(ip, port.unwrap_or(DEFAULT_DNS_PORT))),
                    Err(_) => {
                        warn!(server = %raw, "ignoring non-literal bootstrap server");
                        None
                    }
                }
            })
            .collect();
        Self {
            servers,
            counter: AtomicU64::new(0),
        }
    }

    /// Uses only the operating system resolver.
    pub fn system() -> Self {
        Self::new(&[])
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// Maps `host` to one usable IP. Literals pass through verbatim; the
    /// first address of the response wins.
    pub async fn lookup(&self, host: &str, ctx: &QueryContext) -> Result<IpAddr, ForwardError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let deadline = ctx.clip(BOOTSTRAP_TIMEOUT);

        if self.servers.is_empty() {
            let host_owned = host.to_string();
            return guard(ctx, deadline, async {
                let mut addrs = tokio::net::lookup_host((host_owned.as_str(), 0u16))
                    .await
                    .map_err(|e| ForwardError::BootstrapFailed {
                        host: host_owned.clone(),
                        reason: e.to_string(),
                    })?;
                addrs
                    .next()
                    .map(|a| a.ip())
                    .ok_or_else(|| ForwardError::BootstrapNoAddresses(host_owned.clone()))
            })
            .await;
        }

        let idx = self.counter.fetch_add(1, Ordering::Relaxed) as usize;
        let server = self.servers[idx % self.servers.len()];

        guard(ctx, deadline, async {
            if let Some(ip) = self.query_once(server, host, RecordType::A).await? {
                return Ok(ip);
            }
            if let Some(ip) = self.query_once(server, host, RecordType::AAAA).await? {
                return Ok(ip);
            }
            Err(ForwardError::BootstrapNoAddresses(host.to_string()))
        })
        .await
    }

    async fn query_once(
        &self,
        server: SocketAddr,
        host: &str,
        record_type: RecordType,
    ) -> Result<Option<IpAddr>, ForwardError> {
        let name = Name::from_str(host).map_err(|e| ForwardError::BootstrapFailed {
            host: host.to_string(),
            reason: format!("invalid hostname: {e}"),
        })?;

        let id = fastrand::u16(..);
        let mut query = Message::new();
        query.set_id(id);
        query.set_message_type(MessageType::Query);
        query.set_op_code(OpCode::Query);
        query.set_recursion_desired(true);
        query.add_query(Query::query(name, record_type));
        let request_bytes = wire::pack(&query)?;

        let bind_addr: SocketAddr = if server.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| ForwardError::Network(format!("failed to bind bootstrap socket: {e}")))?;

        socket
            .send_to(&request_bytes, server)
            .await
            .map_err(|e| ForwardError::Network(format!("bootstrap send to {server} failed: {e}")))?;

        let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        let (len, _) = socket
            .recv_from(&mut recv_buf)
            .await
            .map_err(|e| ForwardError::Network(format!("bootstrap recv from {server} failed: {e}")))?;

        let response = wire::unpack(&recv_buf[..len])?;
        if response.id() != id {
            return Err(ForwardError::IdMismatch);
        }

        let ip = response.answers().iter().find_map(|record| match record.data() {
            RData::A(a) => Some(IpAddr::V4(a.0)),
            RData::AAAA(aaaa) => Some(IpAddr::V6(aaaa.0)),
            _ => None,
        });

        debug!(
            server = %server,
            host = %host,
            record_type = %record_type,
            resolved = ?ip,
            "bootstrap lookup"
        );
        Ok(ip)
    }
}
