//! The decision cascade: hosts override → exact rule → regex rule →
//! GeoSite → GeoIP fallback probe.

use crate::bootstrap::Bootstrapper;
use crate::client::{build_client, DnsClient, StatsClient, UpstreamStatsSnapshot};
use crate::context::QueryContext;
use crate::geo::GeoData;
use crate::querylog::QueryLogEmitter;
use crate::race::race;
use arc_swap::ArcSwap;
use hickory_proto::op::Message;
use hickory_proto::rr::RData;
use janus_dns_domain::message::{first_answer_ip, rcode_name, reply_to};
use janus_dns_domain::{
    normalize_domain, AnswerRecord, ForwarderConfig, ForwardError, HostOverrides, LogEntry,
    PoolTag, Provenance, RoutingRules, RuleTarget, UpstreamConfig,
};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const HOSTS_TTL: u32 = 60;

/// Ordered group of upstream clients for one side of the split. Ordering is
/// informational only; racing is unordered.
pub struct Pool {
    tag: PoolTag,
    stats: Vec<Arc<StatsClient>>,
    clients: Vec<Arc<dyn DnsClient>>,
}

impl Pool {
    pub fn new(tag: PoolTag, stats: Vec<Arc<StatsClient>>) -> Self {
        let clients = stats
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn DnsClient>)
            .collect();
        Self { tag, stats, clients }
    }

    pub fn tag(&self) -> PoolTag {
        self.tag
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn snapshots(&self) -> impl Iterator<Item = UpstreamStatsSnapshot> + '_ {
        self.stats.iter().map(|c| c.snapshot())
    }
}

/// Immutable routing state for one configuration generation. A reload
/// builds a fresh router and publishes it through [`SharedRouter`].
pub struct Router {
    hosts: HostOverrides,
    rules: RoutingRules,
    geo: Arc<GeoData>,
    cn: Pool,
    overseas: Pool,
    emitter: QueryLogEmitter,
}

impl Router {
    pub fn new(
        hosts: HostOverrides,
        rules: RoutingRules,
        geo: Arc<GeoData>,
        cn: Pool,
        overseas: Pool,
        emitter: QueryLogEmitter,
    ) -> Self {
        Self {
            hosts,
            rules,
            geo,
            cn,
            overseas,
            emitter,
        }
    }

    pub fn from_config(
        cfg: &ForwarderConfig,
        geo: Arc<GeoData>,
        emitter: QueryLogEmitter,
    ) -> Self {
        let bootstrap = Arc::new(Bootstrapper::new(&cfg.bootstrap_dns));

        let cn = build_pool(PoolTag::Cn, &cfg.upstreams.cn, &bootstrap);
        let overseas = build_pool(PoolTag::Overseas, &cfg.upstreams.overseas, &bootstrap);

        info!(
            cn_upstreams = cn.len(),
            overseas_upstreams = overseas.len(),
            hosts = cfg.hosts.len(),
            rules = cfg.rules.len(),
            "router constructed"
        );

        Self::new(
            HostOverrides::from_map(&cfg.hosts),
            RoutingRules::from_map(&cfg.rules),
            geo,
            cn,
            overseas,
            emitter,
        )
    }

    pub fn upstream_stats(&self) -> Vec<UpstreamStatsSnapshot> {
        self.cn.snapshots().chain(self.overseas.snapshots()).collect()
    }

    /// Routes one query and emits a log entry for it. The returned error is
    /// verbatim; converting it to a SERVFAIL wire reply is the transport
    /// layer's job.
    pub async fn route(
        &self,
        query: &Message,
        client_ip: IpAddr,
        ctx: &QueryContext,
    ) -> Result<Message, ForwardError> {
        let Some(question) = query.queries().first() else {
            return Err(ForwardError::NoQuestion);
        };
        let domain = question.name().to_string();
        let query_type = question.query_type().to_string();

        let start = Instant::now();
        let (result, provenance) = self.route_internal(query, ctx).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (status, answer, answer_records) = match &result {
            Ok(response) => {
                let (answer, records) = summarize_answers(response);
                (rcode_name(response.response_code()), answer, records)
            }
            Err(_) => ("ERROR".to_string(), String::new(), Vec::new()),
        };

        debug!(
            domain = %domain,
            provenance = %provenance,
            duration_ms,
            status = %status,
            "query routed"
        );

        self.emitter.emit(LogEntry {
            id: 0,
            time: chrono::Utc::now().to_rfc3339(),
            client_ip,
            domain,
            query_type,
            upstream: provenance.to_string(),
            answer,
            answer_records,
            duration_ms,
            status,
        });

        result
    }

    async fn route_internal(
        &self,
        query: &Message,
        ctx: &QueryContext,
    ) -> (Result<Message, ForwardError>, Provenance) {
        let qname = normalize_domain(&query.queries()[0].name().to_ascii());

        if let Some(address) = self.hosts.lookup(&qname) {
            return (self.hosts_reply(query, &qname, address), Provenance::Hosts);
        }

        if let Some(target) = self.rules.exact(&qname) {
            return match target {
                RuleTarget::Cn => (
                    race(query, &self.cn.clients, ctx).await,
                    Provenance::RuleCn,
                ),
                RuleTarget::Overseas => (
                    race(query, &self.overseas.clients, ctx).await,
                    Provenance::RuleOverseas,
                ),
            };
        }

        if let Some(target) = self.rules.regex_match(&qname) {
            return match target {
                RuleTarget::Cn => (
                    race(query, &self.cn.clients, ctx).await,
                    Provenance::RegexRuleCn,
                ),
                RuleTarget::Overseas => (
                    race(query, &self.overseas.clients, ctx).await,
                    Provenance::RegexRuleOverseas,
                ),
            };
        }

        if let Some(code) = self.geo.lookup_site(&qname) {
            return if code == "cn" {
                (
                    race(query, &self.cn.clients, ctx).await,
                    Provenance::GeoSiteCn,
                )
            } else {
                (
                    race(query, &self.overseas.clients, ctx).await,
                    Provenance::GeoSiteOverseas,
                )
            };
        }

        // GeoIP fallback: probe overseas, reroute to CN when the answer
        // address is domestic.
        let response = match race(query, &self.overseas.clients, ctx).await {
            Ok(response) => response,
            Err(err) => {
                return (
                    Err(ForwardError::GeoIpInitialFailed(err.to_string())),
                    Provenance::GeoIpFail,
                );
            }
        };

        match first_answer_ip(&response) {
            Some(ip) if self.geo.is_cn(ip) => (
                race(query, &self.cn.clients, ctx).await,
                Provenance::GeoIpCn,
            ),
            _ => (Ok(response), Provenance::GeoIpOverseas),
        }
    }

    /// Synthesizes the hosts short-circuit reply: one A/AAAA answer, TTL 60.
    fn hosts_reply(
        &self,
        query: &Message,
        qname: &str,
        address: &str,
    ) -> Result<Message, ForwardError> {
        let ip: IpAddr = address.parse().map_err(|_| ForwardError::InvalidHostsEntry {
            domain: qname.to_string(),
            address: address.to_string(),
        })?;

        let name = query.queries()[0].name().clone();
        let rdata = match ip {
            IpAddr::V4(v4) => RData::A(v4.into()),
            IpAddr::V6(v6) => RData::AAAA(v6.into()),
        };

        let mut reply = reply_to(query);
        reply.add_answer(hickory_proto::rr::Record::from_rdata(name, HOSTS_TTL, rdata));
        Ok(reply)
    }
}

fn build_pool(tag: PoolTag, configs: &[UpstreamConfig], bootstrap: &Arc<Bootstrapper>) -> Pool {
    let mut stats = Vec::with_capacity(configs.len());
    for cfg in configs {
        match build_client(cfg, Arc::clone(bootstrap)) {
            Ok(client) => {
                stats.push(Arc::new(StatsClient::new(
                    Arc::new(client),
                    &cfg.address,
                    cfg.protocol,
                    tag,
                )));
            }
            Err(err) => {
                warn!(group = %tag, address = %cfg.address, error = %err, "failed to initialize upstream");
            }
        }
    }
    Pool::new(tag, stats)
}

/// First answer's rdata, with a `(+N more)` suffix for multi-answer
/// responses, plus the full record list in display form.
fn summarize_answers(response: &Message) -> (String, Vec<AnswerRecord>) {
    let answers = response.answers();
    if answers.is_empty() {
        return (String::new(), Vec::new());
    }

    let records: Vec<AnswerRecord> = answers
        .iter()
        .map(|record| AnswerRecord {
            name: record.name().to_string(),
            record_type: record.record_type().to_string(),
            ttl: record.ttl(),
            data: record.data().to_string(),
        })
        .collect();

    let mut summary = records[0].data.clone();
    if records.len() > 1 {
        summary.push_str(&format!(" (+{} more)", records.len() - 1));
    }
    (summary, records)
}

/// Atomically swappable router handle: readers see a consistent snapshot
/// for the duration of their query, reloads publish a new generation.
pub struct SharedRouter {
    inner: ArcSwap<Router>,
}

impl SharedRouter {
    pub fn new(router: Router) -> Self {
        Self {
            inner: ArcSwap::from_pointee(router),
        }
    }

    pub fn load(&self) -> Arc<Router> {
        self.inner.load_full()
    }

    pub fn swap(&self, router: Router) {
        self.inner.store(Arc::new(router));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{MessageType, OpCode, Query};
    use hickory_proto::rr::{Name, Record, RecordType};
    use std::str::FromStr;

    fn a_query(name: &str) -> Message {
        let mut msg = Message::new();
        msg.set_id(0x2222);
        msg.set_message_type(MessageType::Query);
        msg.set_op_code(OpCode::Query);
        msg.set_recursion_desired(true);
        msg.add_query(Query::query(Name::from_str(name).unwrap(), RecordType::A));
        msg
    }

    #[test]
    fn summary_is_rdata_with_more_suffix() {
        let query = a_query("multi.example.");
        let mut response = reply_to(&query);
        let name = Name::from_str("multi.example.").unwrap();
        response.add_answer(Record::from_rdata(
            name.clone(),
            300,
            RData::A("1.2.3.4".parse::<std::net::Ipv4Addr>().unwrap().into()),
        ));
        response.add_answer(Record::from_rdata(
            name.clone(),
            300,
            RData::A("5.6.7.8".parse::<std::net::Ipv4Addr>().unwrap().into()),
        ));
        response.add_answer(Record::from_rdata(
            name,
            300,
            RData::A("9.9.9.9".parse::<std::net::Ipv4Addr>().unwrap().into()),
        ));

        let (summary, records) = summarize_answers(&response);
        assert_eq!(summary, "1.2.3.4 (+2 more)");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].record_type, "A");
        assert_eq!(records[0].ttl, 300);
    }

    #[test]
    fn summary_of_empty_answer_is_empty() {
        let query = a_query("empty.example.");
        let response = reply_to(&query);
        let (summary, records) = summarize_answers(&response);
        assert!(summary.is_empty());
        assert!(records.is_empty());
    }
}
