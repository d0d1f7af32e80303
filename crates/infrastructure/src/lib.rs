//! Query pipeline of the Janus split-horizon DNS forwarder: bootstrap
//! resolution, the five upstream client variants, ECS stamping, racing,
//! geo lookups and the routing cascade.

pub mod bootstrap;
pub mod client;
pub mod context;
pub mod ecs;
pub mod geo;
pub mod querylog;
pub mod race;
pub mod router;
pub mod wire;

pub use bootstrap::{Bootstrapper, BOOTSTRAP_TIMEOUT};
pub use client::{
    build_client, DnsClient, StatsClient, UpstreamClient, UpstreamStatsSnapshot,
    HTTP_QUERY_TIMEOUT, STREAM_QUERY_TIMEOUT,
};
pub use context::{QueryContext, DEFAULT_QUERY_TIMEOUT};
pub use ecs::ensure_ecs;
pub use geo::{GeoData, IpIndex, SiteIndex};
pub use querylog::{QueryLogEmitter, QueryLogStats, QueryLogger};
pub use race::{race, RACE_TIMEOUT};
pub use router::{Pool, Router, SharedRouter};
