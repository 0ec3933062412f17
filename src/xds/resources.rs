//! Translation of the domain model into Envoy xDS resources.
//!
//! Every function here is pure: the same store contents always produce the
//! same protobuf messages. Input is assumed to have passed domain validation.

use envoy_types::pb::envoy::config::cluster::v3::cluster::{
    self, common_lb_config::ConsistentHashingLbConfig, ClusterDiscoveryType, CommonLbConfig,
    DiscoveryType, DnsLookupFamily, EdsClusterConfig, LbPolicy, MaglevLbConfig,
};
use envoy_types::pb::envoy::config::cluster::v3::Cluster as EnvoyCluster;
use envoy_types::pb::envoy::config::core::v3::{
    address::Address as AddressType,
    api_config_source::ApiType,
    config_source::ConfigSourceSpecifier,
    grpc_service::{EnvoyGrpc, TargetSpecifier},
    health_check::{self, HttpHealthCheck},
    socket_address::{PortSpecifier, Protocol},
    Address, ApiConfigSource, ApiVersion, ConfigSource, GrpcService, HealthCheck, SocketAddress,
};
use envoy_types::pb::envoy::config::endpoint::v3::{
    lb_endpoint, ClusterLoadAssignment, Endpoint as EnvoyEndpoint, LbEndpoint,
    LocalityLbEndpoints,
};
use envoy_types::pb::envoy::config::listener::v3::{
    filter, listener_filter, Filter, FilterChain as EnvoyFilterChain, Listener as EnvoyListener,
    ListenerFilter,
};
use envoy_types::pb::envoy::extensions::filters::network::tcp_proxy::v3::{
    tcp_proxy::ClusterSpecifier, TcpProxy,
};
use envoy_types::pb::envoy::r#type::v3::{hash_policy, HashPolicy, Percent};
use envoy_types::pb::google::protobuf::{Any, Duration, UInt32Value, UInt64Value};
use prost::Message;
use tracing::debug;

use crate::domain::{Cluster, Endpoint, HealthCheckPolicy, Listener, TCP_PROXY_TYPE_URL};
use crate::xds::access_log::build_file_access_log;

pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";
pub const ENDPOINT_TYPE_URL: &str =
    "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";

/// Name of the proxy-side cluster that points back at this control plane.
pub const XDS_CLUSTER_NAME: &str = "xds_cluster";

/// Bounded-load factor for consistent hashing, in percent of the mean load.
pub const HASH_BALANCE_FACTOR: u32 = 150;

pub const PROXY_PROTOCOL_FILTER_NAME: &str = "envoy.filters.listener.proxy_protocol";
pub const PROXY_PROTOCOL_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.listener.proxy_protocol.v3.ProxyProtocol";

/// Wrapper for a built Envoy resource along with its name.
#[derive(Clone, Debug, PartialEq)]
pub struct BuiltResource {
    pub name: String,
    pub resource: Any,
}

impl BuiltResource {
    pub fn encode<M: Message>(name: impl Into<String>, type_url: &str, message: &M) -> Self {
        Self {
            name: name.into(),
            resource: Any { type_url: type_url.to_string(), value: message.encode_to_vec() },
        }
    }

    pub fn into_any(self) -> Any {
        self.resource
    }

    pub fn type_url(&self) -> &str {
        &self.resource.type_url
    }
}

/// EDS-discovered maglev cluster. Endpoints are not embedded; they travel as
/// a separate load assignment.
pub fn build_cluster(cluster: &Cluster) -> EnvoyCluster {
    debug!(cluster = %cluster.name, table_size = cluster.lb_table_size, "Building cluster resource");

    EnvoyCluster {
        name: cluster.name.clone(),
        connect_timeout: Some(to_proto_duration(cluster.connect_timeout)),
        cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::Eds as i32)),
        eds_cluster_config: Some(EdsClusterConfig {
            eds_config: Some(xds_config_source()),
            service_name: String::new(),
        }),
        lb_policy: LbPolicy::Maglev as i32,
        lb_config: Some(cluster::LbConfig::MaglevLbConfig(MaglevLbConfig {
            table_size: Some(UInt64Value { value: cluster.lb_table_size }),
            ..Default::default()
        })),
        common_lb_config: Some(CommonLbConfig {
            healthy_panic_threshold: Some(Percent { value: cluster.health_panic_threshold }),
            consistent_hashing_lb_config: Some(ConsistentHashingLbConfig {
                use_hostname_for_hashing: false,
                hash_balance_factor: Some(UInt32Value { value: HASH_BALANCE_FACTOR }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        health_checks: vec![build_health_check(&cluster.health_check)],
        dns_lookup_family: DnsLookupFamily::V4Only as i32,
        ..Default::default()
    }
}

/// TCP proxy listener forwarding to its target cluster, hashing on the source
/// address and expecting a PROXY protocol header.
pub fn build_listener(listener: &Listener) -> EnvoyListener {
    let target = listener.target_cluster().unwrap_or_default();
    let stat_prefix = listener
        .filter_chains
        .first()
        .and_then(|chain| chain.filters.first())
        .map(|filter| filter.stat_prefix.clone())
        .unwrap_or_default();

    debug!(listener = %listener.name, cluster = %target, port = listener.port, "Building listener resource");

    let tcp_proxy = TcpProxy {
        stat_prefix,
        cluster_specifier: Some(ClusterSpecifier::Cluster(target.to_string())),
        hash_policy: vec![HashPolicy {
            policy_specifier: Some(hash_policy::PolicySpecifier::SourceIp(
                hash_policy::SourceIp {},
            )),
        }],
        access_log: vec![build_file_access_log(&listener.access_log_path)],
        ..Default::default()
    };

    let filter_name = listener
        .filter_chains
        .first()
        .and_then(|chain| chain.filters.first())
        .map(|filter| filter.name.clone())
        .unwrap_or_default();

    EnvoyListener {
        name: listener.name.clone(),
        address: Some(socket_address(&listener.address, listener.port)),
        listener_filters: vec![ListenerFilter {
            name: PROXY_PROTOCOL_FILTER_NAME.to_string(),
            config_type: Some(listener_filter::ConfigType::TypedConfig(Any {
                type_url: PROXY_PROTOCOL_TYPE_URL.to_string(),
                // Default ProxyProtocol config encodes to zero bytes.
                value: Vec::new(),
            })),
            ..Default::default()
        }],
        filter_chains: vec![EnvoyFilterChain {
            filters: vec![Filter {
                name: filter_name,
                config_type: Some(filter::ConfigType::TypedConfig(Any {
                    type_url: TCP_PROXY_TYPE_URL.to_string(),
                    value: tcp_proxy.encode_to_vec(),
                })),
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Single-locality assignment listing endpoints in insertion order.
pub fn build_load_assignment(cluster_name: &str, endpoints: &[Endpoint]) -> ClusterLoadAssignment {
    let lb_endpoints = endpoints
        .iter()
        .map(|endpoint| LbEndpoint {
            host_identifier: Some(lb_endpoint::HostIdentifier::Endpoint(EnvoyEndpoint {
                address: Some(socket_address(&endpoint.upstream_host, endpoint.upstream_port)),
                ..Default::default()
            })),
            ..Default::default()
        })
        .collect();

    ClusterLoadAssignment {
        cluster_name: cluster_name.to_string(),
        endpoints: vec![LocalityLbEndpoints { lb_endpoints, ..Default::default() }],
        ..Default::default()
    }
}

fn build_health_check(policy: &HealthCheckPolicy) -> HealthCheck {
    HealthCheck {
        timeout: Some(to_proto_duration(policy.timeout)),
        interval: Some(to_proto_duration(policy.interval)),
        unhealthy_threshold: Some(UInt32Value { value: policy.unhealthy_threshold }),
        healthy_threshold: Some(UInt32Value { value: policy.healthy_threshold }),
        health_checker: Some(health_check::HealthChecker::HttpHealthCheck(HttpHealthCheck {
            path: policy.path.clone(),
            ..Default::default()
        })),
        ..Default::default()
    }
}

fn xds_config_source() -> ConfigSource {
    ConfigSource {
        resource_api_version: ApiVersion::V3 as i32,
        config_source_specifier: Some(ConfigSourceSpecifier::ApiConfigSource(ApiConfigSource {
            api_type: ApiType::Grpc as i32,
            transport_api_version: ApiVersion::V3 as i32,
            set_node_on_first_message_only: true,
            grpc_services: vec![GrpcService {
                target_specifier: Some(TargetSpecifier::EnvoyGrpc(EnvoyGrpc {
                    cluster_name: XDS_CLUSTER_NAME.to_string(),
                    ..Default::default()
                })),
                ..Default::default()
            }],
            ..Default::default()
        })),
        ..Default::default()
    }
}

fn socket_address(address: &str, port: u32) -> Address {
    Address {
        address: Some(AddressType::SocketAddress(SocketAddress {
            address: address.to_string(),
            port_specifier: Some(PortSpecifier::PortValue(port)),
            protocol: Protocol::Tcp as i32,
            ..Default::default()
        })),
    }
}

/// Domain validation caps durations well below `i64::MAX` seconds; anything
/// larger saturates instead of wrapping negative.
fn to_proto_duration(value: std::time::Duration) -> Duration {
    Duration {
        seconds: i64::try_from(value.as_secs()).unwrap_or(i64::MAX),
        nanos: i32::try_from(value.subsec_nanos()).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClusterSpec, ListenerSpec};

    fn web_cluster() -> Cluster {
        let mut cluster = Cluster::from_spec(
            ClusterSpec::new("web", "web-l", HealthCheckPolicy::http("/healthz"))
                .with_panic_threshold(40.0),
        );
        cluster.endpoints.push(Endpoint::new("10.0.0.1", 8080));
        cluster.endpoints.push(Endpoint::new("10.0.0.2", 8080));
        cluster
    }

    #[test]
    fn cluster_uses_eds_and_maglev() {
        let built = build_cluster(&web_cluster());

        assert_eq!(built.name, "web");
        assert_eq!(built.lb_policy, LbPolicy::Maglev as i32);
        assert_eq!(
            built.cluster_discovery_type,
            Some(ClusterDiscoveryType::Type(DiscoveryType::Eds as i32))
        );
        assert!(built.load_assignment.is_none());
        assert_eq!(built.dns_lookup_family, DnsLookupFamily::V4Only as i32);
        assert_eq!(built.connect_timeout, Some(Duration { seconds: 5, nanos: 0 }));

        match built.lb_config {
            Some(cluster::LbConfig::MaglevLbConfig(config)) => {
                assert_eq!(config.table_size.map(|v| v.value), Some(65_537));
            }
            other => panic!("unexpected lb config: {:?}", other),
        }

        let common = built.common_lb_config.expect("common lb config");
        assert_eq!(common.healthy_panic_threshold.map(|p| p.value), Some(40.0));
        assert_eq!(
            common.consistent_hashing_lb_config.and_then(|c| c.hash_balance_factor).map(|v| v.value),
            Some(HASH_BALANCE_FACTOR)
        );
    }

    #[test]
    fn cluster_eds_source_points_at_xds_cluster() {
        let built = build_cluster(&web_cluster());
        let source = built.eds_cluster_config.and_then(|c| c.eds_config).expect("eds config");

        match source.config_source_specifier {
            Some(ConfigSourceSpecifier::ApiConfigSource(api)) => {
                assert_eq!(api.api_type, ApiType::Grpc as i32);
                assert!(api.set_node_on_first_message_only);
                match api.grpc_services[0].target_specifier.as_ref() {
                    Some(TargetSpecifier::EnvoyGrpc(grpc)) => {
                        assert_eq!(grpc.cluster_name, XDS_CLUSTER_NAME)
                    }
                    other => panic!("unexpected target: {:?}", other),
                }
            }
            other => panic!("unexpected config source: {:?}", other),
        }
    }

    #[test]
    fn health_check_is_http() {
        let built = build_cluster(&web_cluster());
        assert_eq!(built.health_checks.len(), 1);

        let check = &built.health_checks[0];
        assert_eq!(check.interval, Some(Duration { seconds: 5, nanos: 0 }));
        assert_eq!(check.healthy_threshold.as_ref().map(|v| v.value), Some(2));
        match check.health_checker.as_ref() {
            Some(health_check::HealthChecker::HttpHealthCheck(http)) => {
                assert_eq!(http.path, "/healthz")
            }
            other => panic!("unexpected health checker: {:?}", other),
        }
    }

    #[test]
    fn listener_forwards_to_cluster_with_source_ip_hash() {
        let listener = Listener::tcp_proxy(
            ListenerSpec::new("web-l", "0.0.0.0", 9000).with_access_log_path("/tmp/web.log"),
            "web",
        );
        let built = build_listener(&listener);

        assert_eq!(built.name, "web-l");
        assert_eq!(built.listener_filters[0].name, PROXY_PROTOCOL_FILTER_NAME);

        let filter = &built.filter_chains[0].filters[0];
        let any = match filter.config_type.as_ref() {
            Some(filter::ConfigType::TypedConfig(any)) => any,
            other => panic!("unexpected filter config: {:?}", other),
        };
        assert_eq!(any.type_url, TCP_PROXY_TYPE_URL);

        let tcp_proxy = TcpProxy::decode(any.value.as_slice()).expect("decode tcp proxy");
        assert_eq!(tcp_proxy.stat_prefix, "tcp_proxy");
        assert_eq!(tcp_proxy.cluster_specifier, Some(ClusterSpecifier::Cluster("web".to_string())));
        assert_eq!(tcp_proxy.hash_policy.len(), 1);
        assert_eq!(tcp_proxy.access_log.len(), 1);

        match built.address.and_then(|a| a.address) {
            Some(AddressType::SocketAddress(socket)) => {
                assert_eq!(socket.address, "0.0.0.0");
                assert_eq!(socket.port_specifier, Some(PortSpecifier::PortValue(9000)));
            }
            other => panic!("unexpected address: {:?}", other),
        }
    }

    #[test]
    fn load_assignment_keeps_insertion_order() {
        let cluster = web_cluster();
        let assignment = build_load_assignment(&cluster.name, &cluster.endpoints);

        assert_eq!(assignment.cluster_name, "web");
        assert_eq!(assignment.endpoints.len(), 1);

        let hosts: Vec<String> = assignment.endpoints[0]
            .lb_endpoints
            .iter()
            .filter_map(|lb| match lb.host_identifier.as_ref() {
                Some(lb_endpoint::HostIdentifier::Endpoint(endpoint)) => {
                    match endpoint.address.as_ref().and_then(|a| a.address.as_ref()) {
                        Some(AddressType::SocketAddress(socket)) => Some(socket.address.clone()),
                        _ => None,
                    }
                }
                _ => None,
            })
            .collect();
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn proto_durations_never_go_negative() {
        let converted = to_proto_duration(std::time::Duration::from_secs(u64::MAX));
        assert_eq!(converted.seconds, i64::MAX);

        let converted = to_proto_duration(std::time::Duration::from_millis(1500));
        assert_eq!((converted.seconds, converted.nanos), (1, 500_000_000));
    }

    #[test]
    fn empty_endpoint_set_still_builds_assignment() {
        let assignment = build_load_assignment("web", &[]);
        assert_eq!(assignment.endpoints[0].lb_endpoints.len(), 0);
    }

    #[test]
    fn built_resource_wraps_any() {
        let built = build_cluster(&web_cluster());
        let resource = BuiltResource::encode("web", CLUSTER_TYPE_URL, &built);
        assert_eq!(resource.type_url(), CLUSTER_TYPE_URL);
        let decoded = EnvoyCluster::decode(resource.into_any().value.as_slice()).expect("decode");
        assert_eq!(decoded.name, "web");
    }
}
