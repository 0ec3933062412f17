//! Cluster domain types
//!
//! Upstream clusters balanced with maglev consistent hashing, their health
//! check policy and their backend endpoints. These types carry no protocol or
//! transport dependencies; translation to Envoy resources lives in `xds`.

use std::fmt;
use std::time::Duration;

/// Connect timeout applied when a request leaves it unset.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maglev lookup table size applied when a request leaves it unset.
pub const DEFAULT_MAGLEV_TABLE_SIZE: u64 = 65_537;

/// Largest table size Envoy accepts for the maglev load balancer.
pub const MAX_MAGLEV_TABLE_SIZE: u64 = 5_000_011;

/// Longest duration a `google.protobuf.Duration` can carry (10 000 years).
pub const MAX_DURATION: Duration = Duration::from_secs(315_576_000_000);

/// Backend address inside a cluster. Identity is the `(host, port)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub upstream_host: String,
    pub upstream_port: u32,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u32) -> Self {
        Self { upstream_host: host.into(), upstream_port: port }
    }

    /// True when this endpoint has the given identity.
    pub fn matches(&self, host: &str, port: u32) -> bool {
        self.upstream_host == host && self.upstream_port == port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.upstream_host, self.upstream_port)
    }
}

/// Active HTTP health check run by the proxies against every endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheckPolicy {
    pub timeout: Duration,
    pub interval: Duration,
    pub unhealthy_threshold: u32,
    pub healthy_threshold: u32,
    pub path: String,
}

impl HealthCheckPolicy {
    /// HTTP check against `path` with conservative defaults.
    pub fn http(path: impl Into<String>) -> Self {
        Self {
            timeout: Duration::from_secs(1),
            interval: Duration::from_secs(5),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
            path: path.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ClusterValidationError> {
        if self.timeout.is_zero() {
            return Err(ClusterValidationError::InvalidHealthCheck("timeout must be positive"));
        }
        if self.timeout > MAX_DURATION {
            return Err(ClusterValidationError::InvalidHealthCheck("timeout is out of range"));
        }
        if self.interval.is_zero() {
            return Err(ClusterValidationError::InvalidHealthCheck("interval must be positive"));
        }
        if self.interval > MAX_DURATION {
            return Err(ClusterValidationError::InvalidHealthCheck("interval is out of range"));
        }
        if self.unhealthy_threshold == 0 {
            return Err(ClusterValidationError::InvalidHealthCheck(
                "unhealthy_threshold must be positive",
            ));
        }
        if self.healthy_threshold == 0 {
            return Err(ClusterValidationError::InvalidHealthCheck(
                "healthy_threshold must be positive",
            ));
        }
        if !self.path.starts_with('/') {
            return Err(ClusterValidationError::InvalidHealthCheck("path must start with '/'"));
        }
        Ok(())
    }
}

/// Tunable part of a cluster as supplied by callers.
///
/// Endpoints are deliberately absent: they are only managed through the
/// backend operations.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSpec {
    pub name: String,
    pub listener_name: String,
    pub connect_timeout: Duration,
    pub health_check: HealthCheckPolicy,
    /// Percentage of healthy hosts under which the proxy ignores health status.
    pub health_panic_threshold: f64,
    pub lb_table_size: u64,
}

impl ClusterSpec {
    pub fn new(
        name: impl Into<String>,
        listener_name: impl Into<String>,
        health_check: HealthCheckPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            listener_name: listener_name.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            health_check,
            health_panic_threshold: 50.0,
            lb_table_size: DEFAULT_MAGLEV_TABLE_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_panic_threshold(mut self, percent: f64) -> Self {
        self.health_panic_threshold = percent;
        self
    }

    pub fn with_table_size(mut self, size: u64) -> Self {
        self.lb_table_size = size;
        self
    }

    /// Replace zero values with their defaults.
    pub fn normalized(mut self) -> Self {
        if self.connect_timeout.is_zero() {
            self.connect_timeout = DEFAULT_CONNECT_TIMEOUT;
        }
        if self.lb_table_size == 0 {
            self.lb_table_size = DEFAULT_MAGLEV_TABLE_SIZE;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ClusterValidationError> {
        if self.name.trim().is_empty() {
            return Err(ClusterValidationError::EmptyName);
        }
        if self.listener_name.trim().is_empty() {
            return Err(ClusterValidationError::EmptyListenerName);
        }
        if self.connect_timeout.is_zero() || self.connect_timeout > MAX_DURATION {
            return Err(ClusterValidationError::InvalidTimeout);
        }
        if !(0.0..=100.0).contains(&self.health_panic_threshold) {
            return Err(ClusterValidationError::InvalidPanicThreshold(self.health_panic_threshold));
        }
        if self.lb_table_size > MAX_MAGLEV_TABLE_SIZE || !is_prime(self.lb_table_size) {
            return Err(ClusterValidationError::InvalidTableSize(self.lb_table_size));
        }
        self.health_check.validate()
    }
}

/// Cluster as held by the store: tunables plus the live endpoint set.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub name: String,
    pub listener_name: String,
    pub connect_timeout: Duration,
    pub health_check: HealthCheckPolicy,
    pub health_panic_threshold: f64,
    pub lb_table_size: u64,
    /// Kept in insertion order.
    pub endpoints: Vec<Endpoint>,
}

impl Cluster {
    /// New cluster with an empty endpoint set.
    pub fn from_spec(spec: ClusterSpec) -> Self {
        Self {
            name: spec.name,
            listener_name: spec.listener_name,
            connect_timeout: spec.connect_timeout,
            health_check: spec.health_check,
            health_panic_threshold: spec.health_panic_threshold,
            lb_table_size: spec.lb_table_size,
            endpoints: Vec::new(),
        }
    }

    /// Overwrite tunables, keeping listener binding and endpoints.
    pub fn apply_tunables(&mut self, spec: ClusterSpec) {
        self.connect_timeout = spec.connect_timeout;
        self.health_check = spec.health_check;
        self.health_panic_threshold = spec.health_panic_threshold;
        self.lb_table_size = spec.lb_table_size;
    }

    pub fn has_endpoint(&self, host: &str, port: u32) -> bool {
        self.endpoints.iter().any(|endpoint| endpoint.matches(host, port))
    }

    pub fn spec(&self) -> ClusterSpec {
        ClusterSpec {
            name: self.name.clone(),
            listener_name: self.listener_name.clone(),
            connect_timeout: self.connect_timeout,
            health_check: self.health_check.clone(),
            health_panic_threshold: self.health_panic_threshold,
            lb_table_size: self.lb_table_size,
        }
    }
}

/// Structural problems detected in a [`ClusterSpec`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClusterValidationError {
    #[error("cluster name cannot be empty")]
    EmptyName,

    #[error("cluster must reference a listener")]
    EmptyListenerName,

    #[error("connect timeout must be positive and at most 315576000000s")]
    InvalidTimeout,

    #[error("health panic threshold {0} must be within 0..=100 percent")]
    InvalidPanicThreshold(f64),

    #[error("maglev table size {0} must be a prime no larger than 5000011")]
    InvalidTableSize(u64),

    #[error("health check {0}")]
    InvalidHealthCheck(&'static str),
}

impl ClusterValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            Self::EmptyName => "name",
            Self::EmptyListenerName => "listener_name",
            Self::InvalidTimeout => "connect_timeout",
            Self::InvalidPanicThreshold(_) => "health_panic_threshold",
            Self::InvalidTableSize(_) => "lb_table_size",
            Self::InvalidHealthCheck(_) => "health_check",
        }
    }
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut divisor = 3;
    while divisor * divisor <= n {
        if n % divisor == 0 {
            return false;
        }
        divisor += 2;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web_spec() -> ClusterSpec {
        ClusterSpec::new("web", "web-l", HealthCheckPolicy::http("/healthz"))
    }

    #[test]
    fn endpoint_identity_is_host_and_port() {
        let endpoint = Endpoint::new("10.0.0.1", 8080);
        assert!(endpoint.matches("10.0.0.1", 8080));
        assert!(!endpoint.matches("10.0.0.1", 8081));
        assert_eq!(endpoint.to_string(), "10.0.0.1:8080");
    }

    #[test]
    fn default_spec_is_valid() {
        assert_eq!(web_spec().validate(), Ok(()));
    }

    #[test]
    fn normalized_fills_zero_values() {
        let spec = web_spec().with_connect_timeout(Duration::ZERO).with_table_size(0).normalized();
        assert_eq!(spec.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(spec.lb_table_size, DEFAULT_MAGLEV_TABLE_SIZE);
    }

    #[test]
    fn table_size_must_be_prime_and_bounded() {
        assert_eq!(
            web_spec().with_table_size(65_536).validate(),
            Err(ClusterValidationError::InvalidTableSize(65_536))
        );
        assert_eq!(web_spec().with_table_size(MAX_MAGLEV_TABLE_SIZE).validate(), Ok(()));
        assert!(web_spec().with_table_size(5_000_111).validate().is_err());
        assert_eq!(web_spec().with_table_size(251).validate(), Ok(()));
    }

    #[test]
    fn durations_beyond_protobuf_range_are_rejected() {
        let too_long = MAX_DURATION + Duration::from_secs(1);

        let spec = web_spec().with_connect_timeout(too_long);
        assert_eq!(spec.validate(), Err(ClusterValidationError::InvalidTimeout));
        assert!(web_spec().with_connect_timeout(MAX_DURATION).validate().is_ok());

        let mut spec = web_spec();
        spec.health_check.timeout = too_long;
        assert!(matches!(spec.validate(), Err(ClusterValidationError::InvalidHealthCheck(_))));

        let mut spec = web_spec();
        spec.health_check.interval = too_long;
        assert!(matches!(spec.validate(), Err(ClusterValidationError::InvalidHealthCheck(_))));
    }

    #[test]
    fn panic_threshold_is_a_percentage() {
        let error = web_spec().with_panic_threshold(101.0).validate().unwrap_err();
        assert_eq!(error.field(), "health_panic_threshold");
        assert_eq!(web_spec().with_panic_threshold(0.0).validate(), Ok(()));
    }

    #[test]
    fn health_check_rejects_zero_thresholds_and_relative_paths() {
        let mut spec = web_spec();
        spec.health_check.healthy_threshold = 0;
        assert!(matches!(spec.validate(), Err(ClusterValidationError::InvalidHealthCheck(_))));

        let mut spec = web_spec();
        spec.health_check.path = "healthz".to_string();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn empty_names_are_rejected() {
        let mut spec = web_spec();
        spec.name = " ".to_string();
        assert_eq!(spec.validate(), Err(ClusterValidationError::EmptyName));

        let mut spec = web_spec();
        spec.listener_name.clear();
        assert_eq!(spec.validate(), Err(ClusterValidationError::EmptyListenerName));
    }

    #[test]
    fn apply_tunables_preserves_endpoints_and_listener() {
        let mut cluster = Cluster::from_spec(web_spec());
        cluster.endpoints.push(Endpoint::new("10.0.0.1", 8080));

        let mut update = web_spec().with_table_size(251);
        update.listener_name = "other-l".to_string();
        cluster.apply_tunables(update);

        assert_eq!(cluster.lb_table_size, 251);
        assert_eq!(cluster.listener_name, "web-l");
        assert!(cluster.has_endpoint("10.0.0.1", 8080));
    }

    #[test]
    fn primality() {
        assert!(!is_prime(0));
        assert!(!is_prime(1));
        assert!(is_prime(2));
        assert!(is_prime(65_537));
        assert!(!is_prime(65_535));
    }
}
