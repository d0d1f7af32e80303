use crate::client::DnsClient;
use crate::context::QueryContext;
use async_trait::async_trait;
use hickory_proto::op::Message;
use janus_dns_domain::{ForwardError, PoolTag, Protocol};
use serde::Serialize;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::time::Instant;

/// Transparent decorator counting outcomes per upstream. Cancellations and
/// deadline expiries are booked separately from wire errors; successful
/// calls touch no error counter.
pub struct StatsClient {
    inner: Arc<dyn DnsClient>,
    address: String,
    protocol: Protocol,
    group: PoolTag,
    counters: Mutex<Counters>,
}

#[derive(Debug, Default, Clone)]
struct Counters {
    total_queries: u64,
    total_errors: u64,
    total_canceled: u64,
    total_duration_us: u64,
}

/// Point-in-time view of one upstream's counters.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamStatsSnapshot {
    pub address: String,
    pub protocol: String,
    pub group: String,
    pub total_queries: u64,
    pub total_errors: u64,
    pub total_canceled: u64,
    pub avg_duration_ms: u64,
}

impl StatsClient {
    pub fn new(
        inner: Arc<dyn DnsClient>,
        address: impl Into<String>,
        protocol: Protocol,
        group: PoolTag,
    ) -> Self {
        Self {
            inner,
            address: address.into(),
            protocol,
            group,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn group(&self) -> PoolTag {
        self.group
    }

    pub fn snapshot(&self) -> UpstreamStatsSnapshot {
        let counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let avg_duration_ms = if counters.total_queries > 0 {
            counters.total_duration_us / counters.total_queries / 1000
        } else {
            0
        };
        UpstreamStatsSnapshot {
            address: self.address.clone(),
            protocol: self.protocol.to_string(),
            group: self.group.to_string(),
            total_queries: counters.total_queries,
            total_errors: counters.total_errors,
            total_canceled: counters.total_canceled,
            avg_duration_ms,
        }
    }
}

#[async_trait]
impl DnsClient for StatsClient {
    async fn resolve(&self, query: Message, ctx: &QueryContext) -> Result<Message, ForwardError> {
        let start = Instant::now();
        let result = self.inner.resolve(query, ctx).await;
        let elapsed_us = start.elapsed().as_micros() as u64;

        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        counters.total_queries += 1;
        counters.total_duration_us += elapsed_us;
        match &result {
            Err(err) if err.is_cancellation() => counters.total_canceled += 1,
            Err(_) => counters.total_errors += 1,
            Ok(_) => {}
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{MessageType, OpCode};

    struct FixedOutcome(Option<ForwardError>);

    #[async_trait]
    impl DnsClient for FixedOutcome {
        async fn resolve(&self, query: Message, _ctx: &QueryContext) -> Result<Message, ForwardError> {
            match &self.0 {
                None => Ok(query),
                Some(err) => Err(err.clone()),
            }
        }
    }

    fn empty_query() -> Message {
        let mut msg = Message::new();
        msg.set_id(1);
        msg.set_message_type(MessageType::Query);
        msg.set_op_code(OpCode::Query);
        msg
    }

    #[tokio::test]
    async fn success_counts_no_errors() {
        let stats = StatsClient::new(
            Arc::new(FixedOutcome(None)),
            "223.5.5.5:53",
            Protocol::Udp,
            PoolTag::Cn,
        );
        let ctx = QueryContext::default();
        stats.resolve(empty_query(), &ctx).await.unwrap();
        stats.resolve(empty_query(), &ctx).await.unwrap();

        let snap = stats.snapshot();
        assert_eq!(snap.total_queries, 2);
        assert_eq!(snap.total_errors, 0);
        assert_eq!(snap.total_canceled, 0);
        assert_eq!(snap.group, "CN");
        assert_eq!(snap.protocol, "udp");
    }

    #[tokio::test]
    async fn wire_error_and_cancellation_book_separately() {
        let ctx = QueryContext::default();

        let failed = StatsClient::new(
            Arc::new(FixedOutcome(Some(ForwardError::Network("reset".into())))),
            "8.8.8.8:53",
            Protocol::Udp,
            PoolTag::Overseas,
        );
        let _ = failed.resolve(empty_query(), &ctx).await;

        let canceled = StatsClient::new(
            Arc::new(FixedOutcome(Some(ForwardError::Cancelled))),
            "8.8.4.4:53",
            Protocol::Udp,
            PoolTag::Overseas,
        );
        let _ = canceled.resolve(empty_query(), &ctx).await;
        let _ = canceled
            .resolve(empty_query(), &QueryContext::default())
            .await;

        assert_eq!(failed.snapshot().total_errors, 1);
        assert_eq!(failed.snapshot().total_canceled, 0);
        assert_eq!(canceled.snapshot().total_errors, 0);
        assert_eq!(canceled.snapshot().total_canceled, 2);
    }

    #[test]
    fn idle_average_is_zero() {
        let stats = StatsClient::new(
            Arc::new(FixedOutcome(None)),
            "1.1.1.1:53",
            Protocol::Tcp,
            PoolTag::Overseas,
        );
        assert_eq!(stats.snapshot().avg_duration_ms, 0);
    }

    #[test]
    fn average_divides_by_queries() {
        let stats = StatsClient::new(
            Arc::new(FixedOutcome(None)),
            "1.1.1.1:53",
            Protocol::Tcp,
            PoolTag::Overseas,
        );
        {
            let mut counters = stats.counters.lock().unwrap();
            counters.total_queries = 4;
            counters.total_duration_us = 8_000;
        }
        assert_eq!(stats.snapshot().avg_duration_ms, 2);
    }
}
