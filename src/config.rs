//! Endpoint configuration: the parameters an `EthEndpoint` carries and
//! the identity rule `Client` uses to reject duplicates.

use crate::error::ValidationError;
use crate::types::{DataSize, HttpUrl, Timespan, UInt, UInt64};

/// Per-endpoint request budget: `batch_limit` requests refill every
/// `batch_timespan`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointQuota {
    pub batch_limit: UInt,
    pub batch_timespan: Timespan,
}

impl Default for EndpointQuota {
    fn default() -> Self {
        Self {
            batch_limit: UInt::new(20).unwrap(),
            batch_timespan: Timespan::from_secs(60),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EthEndpoint {
    pub url: HttpUrl,
    pub username: Option<String>,
    pub password: Option<String>,
    pub quota: EndpointQuota,
    pub log_safe_gap: UInt64,
    pub log_range_boundary: UInt64,
    pub log_size_border: DataSize,
    pub log_time_border: Timespan,
    pub log_quantity_border: UInt,
    pub timeout: Timespan,
}

impl EthEndpoint {
    /// Builds an endpoint from a bare URL, applying every documented
    /// default. Use the builder-style `with_*` methods to override
    /// individual fields before the endpoint is handed to `Client::new`.
    pub fn new(url: HttpUrl) -> Self {
        let log_time_border = Timespan::from_secs(5);
        Self {
            url,
            username: None,
            password: None,
            quota: EndpointQuota::default(),
            log_safe_gap: UInt64::new(15).unwrap(),
            log_range_boundary: UInt64::new(5000).unwrap(),
            log_size_border: DataSize::from_mib(4),
            log_time_border,
            log_quantity_border: UInt::new(10_000).unwrap(),
            timeout: log_time_border + Timespan::from_secs(6),
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_quota(mut self, quota: EndpointQuota) -> Self {
        self.quota = quota;
        self
    }

    pub fn with_log_range_boundary(mut self, boundary: UInt64) -> Self {
        self.log_range_boundary = boundary;
        self
    }

    /// The identity used to detect duplicate endpoints: host plus
    /// canonicalized path. Query string, fragment, and credentials are
    /// deliberately excluded.
    pub fn identity_key(&self) -> String {
        self.url.canonical_identity()
    }

    pub fn basic_auth(&self) -> Option<(String, String)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        }
    }
}

/// Validates a combined primary + backup endpoint list: primary must be
/// non-empty, and no two endpoints (within or across tiers) may share an
/// identity.
pub fn validate_endpoint_lists(
    primary: &[EthEndpoint],
    backup: &[EthEndpoint],
) -> Result<(), ValidationError> {
    if primary.is_empty() {
        return Err(ValidationError::EmptyPrimary);
    }
    let mut seen = std::collections::BTreeSet::new();
    for endpoint in primary.iter().chain(backup.iter()) {
        let key = endpoint.identity_key();
        if !seen.insert(key.clone()) {
            return Err(ValidationError::DuplicateEndpoint(key));
        }
    }
    Ok(())
}
