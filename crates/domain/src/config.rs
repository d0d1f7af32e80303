use crate::upstream::UpstreamConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Runtime configuration of the forwarding core. File formats, reload
/// triggers and path resolution belong to the hosting process; the core only
/// consumes the deserialized form.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ForwarderConfig {
    /// Plain-UDP servers used to resolve upstream hostnames. Empty means
    /// the operating system resolver.
    #[serde(default)]
    pub bootstrap_dns: Vec<String>,

    #[serde(default)]
    pub upstreams: UpstreamsConfig,

    /// Static overrides: domain → literal IP.
    #[serde(default)]
    pub hosts: HashMap<String, String>,

    /// Routing rules: domain or `regexp:`-pattern → `cn` / `overseas`.
    #[serde(default)]
    pub rules: HashMap<String, String>,

    #[serde(default)]
    pub geo_data: GeoDataConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UpstreamsConfig {
    #[serde(default)]
    pub cn: Vec<UpstreamConfig>,
    #[serde(default)]
    pub overseas: Vec<UpstreamConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GeoDataConfig {
    /// Path to the IP country database; empty disables GeoIP lookups.
    #[serde(default)]
    pub geoip_path: String,
    /// Path to the site category database; empty disables GeoSite lookups.
    #[serde(default)]
    pub geosite_path: String,
}
