//! Read-only geo databases backing the GeoSite and GeoIP cascade steps.

pub mod ip;
pub mod site;

use janus_dns_domain::{ForwardError, GeoDataConfig};
use std::net::IpAddr;
use std::path::Path;

pub use ip::IpIndex;
pub use site::SiteIndex;

/// Both indexes, loaded once at startup. An empty path in the config leaves
/// that index empty (all lookups negative); an unreadable or corrupt file
/// fails the load.
#[derive(Debug, Default)]
pub struct GeoData {
    site: SiteIndex,
    ip: IpIndex,
}

impl GeoData {
    pub fn load(cfg: &GeoDataConfig) -> Result<Self, ForwardError> {
        let site = if cfg.geosite_path.is_empty() {
            SiteIndex::empty()
        } else {
            SiteIndex::load(Path::new(&cfg.geosite_path))?
        };
        let ip = if cfg.geoip_path.is_empty() {
            IpIndex::empty()
        } else {
            IpIndex::load(Path::new(&cfg.geoip_path))?
        };
        Ok(Self { site, ip })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_parts(site: SiteIndex, ip: IpIndex) -> Self {
        Self { site, ip }
    }

    /// Category code for a domain: `"cn"` when any `cn` list contains it,
    /// another matched code otherwise, `None` when nothing matches.
    pub fn lookup_site(&self, domain: &str) -> Option<&str> {
        self.site.lookup(domain)
    }

    pub fn is_cn(&self, ip: IpAddr) -> bool {
        self.ip.is_cn(ip)
    }
}
