//! JSON file access log attached to every TCP proxy listener.

use envoy_types::pb::envoy::config::accesslog::v3::{
    access_log::ConfigType as AccessLogConfigType, AccessLog,
};
use envoy_types::pb::envoy::config::core::v3::{
    substitution_format_string::Format, SubstitutionFormatString,
};
use envoy_types::pb::envoy::extensions::access_loggers::file::v3::{
    file_access_log::AccessLogFormat, FileAccessLog,
};
use envoy_types::pb::google::protobuf::{
    value::Kind, Any as EnvoyAny, Struct as ProstStruct, Value as ProstValue,
};
use prost::Message;

pub const FILE_ACCESS_LOG_NAME: &str = "envoy.access_loggers.file";
pub const FILE_ACCESS_LOG_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.access_loggers.file.v3.FileAccessLog";

/// Field name to command operator for each JSON log line.
pub const ACCESS_LOG_FIELDS: [(&str, &str); 24] = [
    ("authority", "%REQ(:AUTHORITY)%"),
    ("bytes_received", "%BYTES_RECEIVED%"),
    ("bytes_sent", "%BYTES_SENT%"),
    ("connection_termination_details", "%CONNECTION_TERMINATION_DETAILS%"),
    ("downstream_local_address", "%DOWNSTREAM_LOCAL_ADDRESS%"),
    ("downstream_remote_address", "%DOWNSTREAM_REMOTE_ADDRESS%"),
    ("duration", "%DURATION%"),
    ("method", "%REQ(:METHOD)%"),
    ("path", "%REQ(X-ENVOY-ORIGINAL-PATH?:PATH)%"),
    ("protocol", "%PROTOCOL%"),
    ("request_id", "%REQ(X-REQUEST-ID)%"),
    ("requested_server_name", "%REQUESTED_SERVER_NAME%"),
    ("response_code", "%RESPONSE_CODE%"),
    ("response_code_details", "%RESPONSE_CODE_DETAILS%"),
    ("response_flags", "%RESPONSE_FLAGS%"),
    ("route_name", "%ROUTE_NAME%"),
    ("start_time", "%START_TIME%"),
    ("upstream_cluster", "%UPSTREAM_CLUSTER%"),
    ("upstream_host", "%UPSTREAM_HOST%"),
    ("upstream_local_address", "%UPSTREAM_LOCAL_ADDRESS%"),
    ("upstream_service_time", "%RESP(X-ENVOY-UPSTREAM-SERVICE-TIME)%"),
    ("upstream_transport_failure_reason", "%UPSTREAM_TRANSPORT_FAILURE_REASON%"),
    ("user_agent", "%REQ(USER-AGENT)%"),
    ("x_forwarded_for", "%REQ(X-FORWARDED-FOR)%"),
];

fn json_format() -> ProstStruct {
    ProstStruct {
        fields: ACCESS_LOG_FIELDS
            .iter()
            .map(|(key, operator)| {
                (
                    key.to_string(),
                    ProstValue { kind: Some(Kind::StringValue(operator.to_string())) },
                )
            })
            .collect(),
    }
}

/// File access log writing one JSON object per connection to `path`.
pub fn build_file_access_log(path: &str) -> AccessLog {
    let file_log = FileAccessLog {
        path: path.to_string(),
        access_log_format: Some(AccessLogFormat::LogFormat(SubstitutionFormatString {
            format: Some(Format::JsonFormat(json_format())),
            ..Default::default()
        })),
    };

    AccessLog {
        name: FILE_ACCESS_LOG_NAME.to_string(),
        filter: None,
        config_type: Some(AccessLogConfigType::TypedConfig(EnvoyAny {
            type_url: FILE_ACCESS_LOG_TYPE_URL.to_string(),
            value: file_log.encode_to_vec(),
        })),
    }
}
