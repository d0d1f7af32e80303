#![allow(dead_code)]

pub mod servers;

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use janus_dns_domain::message::reply_to;
use janus_dns_domain::{ForwardError, PoolTag, Protocol};
use janus_dns_infrastructure::router::Pool;
use janus_dns_infrastructure::{DnsClient, QueryContext, StatsClient};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scriptable upstream: fixed answer or error, optional delay, call
/// counter. Honors cancellation while delayed, like a real client would at
/// a suspension point.
pub struct MockClient {
    answer: Option<IpAddr>,
    error: Option<ForwardError>,
    delay: Duration,
    calls: AtomicU64,
}

impl MockClient {
    pub fn answering(ip: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Some(ip.parse().unwrap()),
            error: None,
            delay: Duration::ZERO,
            calls: AtomicU64::new(0),
        })
    }

    pub fn answering_after(ip: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answer: Some(ip.parse().unwrap()),
            error: None,
            delay,
            calls: AtomicU64::new(0),
        })
    }

    pub fn failing(error: ForwardError) -> Arc<Self> {
        Arc::new(Self {
            answer: None,
            error: Some(error),
            delay: Duration::ZERO,
            calls: AtomicU64::new(0),
        })
    }

    pub fn hanging(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answer: Some("192.0.2.200".parse().unwrap()),
            error: None,
            delay,
            calls: AtomicU64::new(0),
        })
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsClient for MockClient {
    async fn resolve(&self, query: Message, ctx: &QueryContext) -> Result<Message, ForwardError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(ForwardError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        Ok(answer_reply(&query, self.answer.expect("mock without answer")))
    }
}

/// A query for `name`, type A, recursion desired.
pub fn a_query(name: &str) -> Message {
    let mut msg = Message::new();
    msg.set_id(fastrand::u16(..));
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    msg.add_query(Query::query(Name::from_str(name).unwrap(), RecordType::A));
    msg
}

/// Reply to `query` answering its first question with `ip`, TTL 300.
pub fn answer_reply(query: &Message, ip: IpAddr) -> Message {
    let mut reply = reply_to(query);
    let name = query.queries()[0].name().clone();
    let rdata = match ip {
        IpAddr::V4(v4) => RData::A(v4.into()),
        IpAddr::V6(v6) => RData::AAAA(v6.into()),
    };
    reply.add_answer(Record::from_rdata(name, 300, rdata));
    reply
}

/// Wraps mocks in stats decorators and builds a pool, returning the
/// wrappers for counter assertions.
pub fn pool_of(tag: PoolTag, mocks: &[Arc<MockClient>]) -> (Pool, Vec<Arc<StatsClient>>) {
    let stats: Vec<Arc<StatsClient>> = mocks
        .iter()
        .enumerate()
        .map(|(i, mock)| {
            Arc::new(StatsClient::new(
                Arc::clone(mock) as Arc<dyn DnsClient>,
                format!("mock-{}:{}", tag, i),
                Protocol::Udp,
                tag,
            ))
        })
        .collect();
    (Pool::new(tag, stats.clone()), stats)
}

/// Race-ready view of a set of mocks, without stats wrappers.
pub fn clients_of(mocks: &[Arc<MockClient>]) -> Vec<Arc<dyn DnsClient>> {
    mocks
        .iter()
        .map(|m| Arc::clone(m) as Arc<dyn DnsClient>)
        .collect()
}

/// First answer rdata rendered as text.
pub fn first_answer_string(msg: &Message) -> String {
    msg.answers()
        .first()
        .map(|r| r.data().to_string())
        .unwrap_or_default()
}
