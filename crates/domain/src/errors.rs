use thiserror::Error;

/// Errors produced by the forwarding pipeline.
///
/// Payloads are strings so the enum stays `Clone`; callers that need to
/// branch do so on the variant, not the text.
#[derive(Error, Debug, Clone)]
pub enum ForwardError {
    #[error("no upstream clients configured for this pool")]
    NoUpstreamsConfigured,

    #[error("all upstream queries failed: {0}")]
    AllUpstreamsFailed(String),

    #[error("race timed out waiting for the first upstream response")]
    RaceTimeout,

    #[error("bootstrap lookup failed for {host}: {reason}")]
    BootstrapFailed { host: String, reason: String },

    #[error("bootstrap lookup for {0} returned no addresses")]
    BootstrapNoAddresses(String),

    #[error("failed to pack DNS message: {0}")]
    Pack(String),

    #[error("failed to unpack DNS message: {0}")]
    Unpack(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("upstream returned HTTP {code}: {body}")]
    HttpStatus { code: u16, body: String },

    #[error("upstream returned an empty response")]
    EmptyResponse,

    #[error("response ID does not match request ID")]
    IdMismatch,

    #[error("invalid hosts entry {address} for {domain}")]
    InvalidHostsEntry { domain: String, address: String },

    #[error("initial overseas resolution failed during GeoIP split: {0}")]
    GeoIpInitialFailed(String),

    #[error("query was cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("failed to load geo database: {0}")]
    GeoDataLoad(String),

    #[error("invalid upstream configuration: {0}")]
    InvalidUpstream(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("query contains no question")]
    NoQuestion,
}

impl ForwardError {
    /// True for outcomes the stats decorator books as cancellations rather
    /// than errors: the query was abandoned, not refused.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}
