use regex::Regex;
use std::collections::HashMap;
use tracing::warn;

/// Target pool of a routing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTarget {
    Cn,
    Overseas,
}

impl RuleTarget {
    /// Case-insensitive parse. `None` for unknown labels — those rules are
    /// dropped so lookups fall through the cascade, matching the original
    /// behavior.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cn" => Some(Self::Cn),
            "overseas" => Some(Self::Overseas),
            _ => None,
        }
    }
}

/// Lowercases and strips the trailing dot, the normal form for all domain
/// table keys and lookups.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim_end_matches('.').to_ascii_lowercase()
}

/// Static hosts overrides: normalized FQDN → literal address string.
///
/// Values are kept as strings; parsing happens at query time so an invalid
/// literal surfaces as `InvalidHostsEntry` for exactly the queries it
/// affects.
#[derive(Debug, Clone, Default)]
pub struct HostOverrides {
    entries: HashMap<String, String>,
}

impl HostOverrides {
    pub fn from_map(raw: &HashMap<String, String>) -> Self {
        let entries = raw
            .iter()
            .map(|(domain, addr)| (normalize_domain(domain), addr.clone()))
            .collect();
        Self { entries }
    }

    pub fn lookup(&self, normalized: &str) -> Option<&str> {
        self.entries.get(normalized).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
struct RegexRule {
    pattern: Regex,
    target: RuleTarget,
}

/// Routing rules: exact domains shadow regex patterns; regex patterns apply
/// in configuration order.
#[derive(Debug, Clone, Default)]
pub struct RoutingRules {
    exact: HashMap<String, RuleTarget>,
    regex: Vec<RegexRule>,
}

const REGEX_PREFIX: &str = "regexp:";

impl RoutingRules {
    /// Builds the tables from raw `domain → target` pairs. Keys starting
    /// with `regexp:` become patterns. Invalid patterns and unknown targets
    /// are skipped.
    pub fn from_map(raw: &HashMap<String, String>) -> Self {
        let mut exact = HashMap::new();
        let mut regex = Vec::new();

        // HashMap order is arbitrary; sort regex rules by pattern text so
        // "configuration order" is at least deterministic across reloads.
        let mut entries: Vec<_> = raw.iter().collect();
        entries.sort_by_key(|(k, _)| k.as_str());

        for (key, target_str) in entries {
            let Some(target) = RuleTarget::parse(target_str) else {
                warn!(rule = %key, target = %target_str, "ignoring rule with unknown target");
                continue;
            };
            if let Some(pattern) = key.strip_prefix(REGEX_PREFIX) {
                match Regex::new(pattern) {
                    Ok(pattern) => regex.push(RegexRule { pattern, target }),
                    Err(err) => {
                        warn!(pattern = %pattern, error = %err, "ignoring invalid regex rule");
                    }
                }
            } else {
                exact.insert(normalize_domain(key), target);
            }
        }

        Self { exact, regex }
    }

    pub fn exact(&self, normalized: &str) -> Option<RuleTarget> {
        self.exact.get(normalized).copied()
    }

    /// First regex pattern matching the normalized name wins.
    pub fn regex_match(&self, normalized: &str) -> Option<RuleTarget> {
        self.regex
            .iter()
            .find(|r| r.pattern.is_match(normalized))
            .map(|r| r.target)
    }

    pub fn exact_len(&self) -> usize {
        self.exact.len()
    }

    pub fn regex_len(&self) -> usize {
        self.regex.len()
    }
}
