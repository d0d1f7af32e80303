pub mod config;
pub mod errors;
pub mod message;
pub mod protocol;
pub mod query_log;
pub mod rules;
pub mod upstream;

pub use config::{ForwarderConfig, GeoDataConfig, UpstreamsConfig};
pub use errors::ForwardError;
pub use protocol::{normalize_endpoint, split_host_port, Endpoint, Protocol};
pub use query_log::{AnswerRecord, LogEntry, Provenance};
pub use rules::{normalize_domain, HostOverrides, RoutingRules, RuleTarget};
pub use upstream::{PoolTag, UpstreamConfig};
