use ipnetwork::IpNetwork;
use janus_dns_domain::ForwardError;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct IpFile {
    countries: Vec<CountryEntry>,
}

#[derive(Debug, Deserialize)]
struct CountryEntry {
    code: String,
    #[serde(default)]
    ipv4_ranges: Vec<String>,
    #[serde(default)]
    ipv6_ranges: Vec<String>,
}

/// IP → country codes by subnet containment.
#[derive(Debug, Default)]
pub struct IpIndex {
    countries: Vec<(Arc<str>, Vec<IpNetwork>)>,
}

impl IpIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, ForwardError> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            ForwardError::GeoDataLoad(format!("cannot read {}: {e}", path.display()))
        })?;
        let file: IpFile = serde_json::from_str(&data).map_err(|e| {
            ForwardError::GeoDataLoad(format!("cannot parse {}: {e}", path.display()))
        })?;

        let mut countries = Vec::with_capacity(file.countries.len());
        for entry in file.countries {
            let mut networks =
                Vec::with_capacity(entry.ipv4_ranges.len() + entry.ipv6_ranges.len());
            for cidr in entry.ipv4_ranges.iter().chain(entry.ipv6_ranges.iter()) {
                match cidr.parse::<IpNetwork>() {
                    Ok(network) => networks.push(network),
                    Err(err) => {
                        warn!(country = %entry.code, cidr = %cidr, error = %err, "skipping invalid CIDR");
                    }
                }
            }
            countries.push((Arc::from(entry.code.to_ascii_uppercase().as_str()), networks));
        }

        info!(
            path = %path.display(),
            countries = countries.len(),
            "IP database loaded"
        );
        Ok(Self { countries })
    }

    /// True iff any `CN` range contains the address.
    pub fn is_cn(&self, ip: IpAddr) -> bool {
        self.countries
            .iter()
            .filter(|(code, _)| code.as_ref() == "CN")
            .any(|(_, networks)| networks.iter().any(|n| n.contains(ip)))
    }

    /// First country whose ranges contain the address.
    pub fn lookup(&self, ip: IpAddr) -> Option<&str> {
        self.countries
            .iter()
            .find(|(_, networks)| networks.iter().any(|n| n.contains(ip)))
            .map(|(code, _)| code.as_ref())
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}
