//! Listener domain types
//!
//! A listener is a proxy-side socket that forwards raw TCP traffic to exactly
//! one cluster through a `tcp_proxy` network filter.

/// Envoy name of the TCP proxy network filter.
pub const TCP_PROXY_FILTER_NAME: &str = "envoy.filters.network.tcp_proxy";

/// Type URL of the TCP proxy filter configuration.
pub const TCP_PROXY_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.tcp_proxy.v3.TcpProxy";

/// Stat prefix given to listeners created through the management API.
pub const TCP_PROXY_STAT_PREFIX: &str = "tcp_proxy";

/// Access log path used when none is configured.
pub const DEFAULT_ACCESS_LOG_PATH: &str = "/dev/stdout";

/// Network filter forwarding to a named cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkFilter {
    pub name: String,
    pub type_url: String,
    pub stat_prefix: String,
    pub cluster: String,
}

impl NetworkFilter {
    pub fn tcp_proxy(cluster: impl Into<String>) -> Self {
        Self {
            name: TCP_PROXY_FILTER_NAME.to_string(),
            type_url: TCP_PROXY_TYPE_URL.to_string(),
            stat_prefix: TCP_PROXY_STAT_PREFIX.to_string(),
            cluster: cluster.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterChain {
    pub filters: Vec<NetworkFilter>,
}

/// Socket-level description of a listener, as supplied by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSpec {
    pub name: String,
    pub address: String,
    pub port: u32,
    pub access_log_path: String,
}

impl ListenerSpec {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u32) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            access_log_path: DEFAULT_ACCESS_LOG_PATH.to_string(),
        }
    }

    pub fn with_access_log_path(mut self, path: impl Into<String>) -> Self {
        self.access_log_path = path.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub name: String,
    pub address: String,
    pub port: u32,
    pub access_log_path: String,
    pub filter_chains: Vec<FilterChain>,
}

impl Listener {
    /// Listener with a single chain forwarding everything to `cluster`.
    pub fn tcp_proxy(spec: ListenerSpec, cluster: impl Into<String>) -> Self {
        Self {
            name: spec.name,
            address: spec.address,
            port: spec.port,
            access_log_path: spec.access_log_path,
            filter_chains: vec![FilterChain { filters: vec![NetworkFilter::tcp_proxy(cluster)] }],
        }
    }

    /// Cluster named by the first filter of the first chain.
    pub fn target_cluster(&self) -> Option<&str> {
        self.filter_chains
            .first()
            .and_then(|chain| chain.filters.first())
            .map(|filter| filter.cluster.as_str())
    }

    pub fn validate(&self) -> Result<(), ListenerValidationError> {
        if self.name.trim().is_empty() {
            return Err(ListenerValidationError::EmptyName);
        }
        if self.address.trim().is_empty() {
            return Err(ListenerValidationError::EmptyAddress);
        }
        if self.port == 0 || self.port > u32::from(u16::MAX) {
            return Err(ListenerValidationError::InvalidPort(self.port));
        }
        if let Some(filter) = self
            .filter_chains
            .iter()
            .flat_map(|chain| chain.filters.iter())
            .find(|filter| filter.type_url != TCP_PROXY_TYPE_URL)
        {
            return Err(ListenerValidationError::UnsupportedFilter(filter.type_url.clone()));
        }
        match self.target_cluster() {
            Some(cluster) if !cluster.trim().is_empty() => Ok(()),
            _ => Err(ListenerValidationError::MissingTarget),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerValidationError {
    #[error("listener name cannot be empty")]
    EmptyName,

    #[error("listener address cannot be empty")]
    EmptyAddress,

    #[error("listener port {0} must be between 1 and 65535")]
    InvalidPort(u32),

    #[error("listener must forward to a cluster")]
    MissingTarget,

    #[error("unsupported network filter type '{0}'; only tcp_proxy is supported")]
    UnsupportedFilter(String),
}

impl ListenerValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            Self::EmptyName => "name",
            Self::EmptyAddress => "address",
            Self::InvalidPort(_) => "port",
            Self::MissingTarget | Self::UnsupportedFilter(_) => "filter_chains",
        }
    }
}
