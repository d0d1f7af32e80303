use janus_dns_domain::{normalize_domain, ForwardError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
struct SiteFile {
    categories: Vec<SiteCategory>,
}

#[derive(Debug, Deserialize)]
struct SiteCategory {
    code: String,
    domains: Vec<String>,
}

/// Domain → category codes. A listed domain matches itself and every
/// subdomain.
#[derive(Debug, Default)]
pub struct SiteIndex {
    domains: HashMap<String, Vec<Arc<str>>>,
}

impl SiteIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, ForwardError> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            ForwardError::GeoDataLoad(format!("cannot read {}: {e}", path.display()))
        })?;
        let file: SiteFile = serde_json::from_str(&data).map_err(|e| {
            ForwardError::GeoDataLoad(format!("cannot parse {}: {e}", path.display()))
        })?;

        let mut domains: HashMap<String, Vec<Arc<str>>> = HashMap::new();
        for category in &file.categories {
            let code: Arc<str> = Arc::from(category.code.to_ascii_lowercase().as_str());
            for domain in &category.domains {
                domains
                    .entry(normalize_domain(domain))
                    .or_default()
                    .push(Arc::clone(&code));
            }
        }

        info!(
            path = %path.display(),
            categories = file.categories.len(),
            domains = domains.len(),
            "site database loaded"
        );
        Ok(Self { domains })
    }

    /// Case-insensitive lookup across the domain and its parent suffixes.
    /// `cn` wins when several categories match; otherwise the first match
    /// on the most specific suffix is returned.
    pub fn lookup(&self, domain: &str) -> Option<&str> {
        if self.domains.is_empty() {
            return None;
        }
        let normalized = normalize_domain(domain);

        let mut first_match: Option<&str> = None;
        let mut candidate = normalized.as_str();
        loop {
            if let Some(codes) = self.domains.get(candidate) {
                for code in codes {
                    if code.as_ref() == "cn" {
                        return Some("cn");
                    }
                    first_match.get_or_insert(code.as_ref());
                }
            }
            match candidate.split_once('.') {
                Some((_, parent)) => candidate = parent,
                None => break,
            }
        }
        first_match
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
