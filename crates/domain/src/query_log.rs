use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Which branch of the decision cascade produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Hosts,
    RuleCn,
    RuleOverseas,
    RegexRuleCn,
    RegexRuleOverseas,
    GeoSiteCn,
    GeoSiteOverseas,
    GeoIpCn,
    GeoIpOverseas,
    GeoIpFail,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hosts => "Hosts",
            Self::RuleCn => "Rule(CN)",
            Self::RuleOverseas => "Rule(Overseas)",
            Self::RegexRuleCn => "Rule(Regex/CN)",
            Self::RegexRuleOverseas => "Rule(Regex/Overseas)",
            Self::GeoSiteCn => "GeoSite(CN)",
            Self::GeoSiteOverseas => "GeoSite(Overseas)",
            Self::GeoIpCn => "GeoIP(CN)",
            Self::GeoIpOverseas => "GeoIP(Overseas)",
            Self::GeoIpFail => "GeoIP(Fail)",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One answer record of a logged response, in display form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AnswerRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub ttl: u32,
    pub data: String,
}

/// One routed query, as handed to the query-log collector. `id` is zero
/// until the collector assigns it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogEntry {
    #[serde(default)]
    pub id: u64,
    pub time: String,
    pub client_ip: IpAddr,
    pub domain: String,
    #[serde(rename = "type")]
    pub query_type: String,
    /// Provenance label, see [`Provenance`].
    pub upstream: String,
    pub answer: String,
    pub answer_records: Vec<AnswerRecord>,
    pub duration_ms: u64,
    pub status: String,
}
