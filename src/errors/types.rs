//! # Error Types
//!
//! Error taxonomy for the magplane control plane using `thiserror`.

use std::fmt;

use validator::{ValidationErrors, ValidationErrorsKind};

use crate::domain::{ClusterValidationError, ListenerValidationError};

/// Custom result type for magplane operations
pub type Result<T> = std::result::Result<T, MagplaneError>;

/// Main error type for the control plane
#[derive(thiserror::Error, Debug)]
pub enum MagplaneError {
    /// Malformed or out-of-range input, rejected before any mutation
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Referenced entity is absent
    #[error("Resource not found: {resource_type} '{id}'")]
    NotFound { resource_type: String, id: String },

    /// Entity already exists or the request contradicts existing wiring
    #[error("Resource conflict: {message}")]
    Conflict { message: String, resource_type: String },

    /// A freshly built snapshot failed its internal consistency check
    #[error("Snapshot consistency error: {message}")]
    Consistency { message: String },

    /// The discovery cache rejected a snapshot; the process cannot continue serving
    #[error("Snapshot publish error for node '{node_id}': {message}")]
    Publish { message: String, node_id: String },

    /// Settings could not be loaded or are invalid
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Bootstrap description could not be parsed
    #[error("Bootstrap error: {context}")]
    Bootstrap {
        #[source]
        source: serde_yaml::Error,
        context: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Listener bind or serve failures
    #[error("Transport error: {0}")]
    Transport(String),

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

/// Coarse classification of [`MagplaneError`], used for structured responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Consistency,
    Publish,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Consistency => "consistency_error",
            ErrorKind::Publish => "publish_error",
            ErrorKind::Internal => "internal_error",
        };
        f.write_str(label)
    }
}

impl MagplaneError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    pub fn conflict<M: Into<String>, R: Into<String>>(message: M, resource_type: R) -> Self {
        Self::Conflict { message: message.into(), resource_type: resource_type.into() }
    }

    pub fn consistency<S: Into<String>>(message: S) -> Self {
        Self::Consistency { message: message.into() }
    }

    pub fn publish<S: Into<String>, N: Into<String>>(message: S, node_id: N) -> Self {
        Self::Publish { message: message.into(), node_id: node_id.into() }
    }

    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Classify the error for API responses and metrics labels
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Consistency { .. } => ErrorKind::Consistency,
            Self::Publish { .. } => ErrorKind::Publish,
            Self::Config { .. }
            | Self::Bootstrap { .. }
            | Self::Io { .. }
            | Self::Transport(_)
            | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// HTTP status code matching this error
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Consistency | ErrorKind::Publish | ErrorKind::Internal => 500,
        }
    }

    /// Whether the process must stop serving after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Publish { .. })
    }
}

impl From<std::io::Error> for MagplaneError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_yaml::Error> for MagplaneError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Bootstrap { source: error, context: "YAML parsing failed".to_string() }
    }
}

impl From<config::ConfigError> for MagplaneError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<ClusterValidationError> for MagplaneError {
    fn from(error: ClusterValidationError) -> Self {
        Self::validation_field(error.to_string(), error.field())
    }
}

impl From<ListenerValidationError> for MagplaneError {
    fn from(error: ListenerValidationError) -> Self {
        Self::validation_field(error.to_string(), error.field())
    }
}

impl From<ValidationErrors> for MagplaneError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages = Vec::new();
        collect_messages(&errors, "", &mut messages);
        messages.sort();

        let field = messages.first().map(|(field, _)| field.clone());
        let message = messages
            .into_iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect::<Vec<_>>()
            .join("; ");

        Self::Validation { message: format!("Validation failed: {}", message), field }
    }
}

fn collect_messages(errors: &ValidationErrors, prefix: &str, out: &mut Vec<(String, String)>) {
    for (field, kind) in errors.errors() {
        let path =
            if prefix.is_empty() { field.to_string() } else { format!("{}.{}", prefix, field) };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let joined = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push((path, joined));
            }
            ValidationErrorsKind::Struct(nested) => collect_messages(nested, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_messages(nested, &format!("{}[{}]", path, index), out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_error_creation() {
        let error = MagplaneError::config("Test configuration error");
        assert!(matches!(error, MagplaneError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: Test configuration error");
    }

    #[test]
    fn test_validation_error() {
        let error = MagplaneError::validation_field("must be prime", "lb_table_size");
        if let MagplaneError::Validation { field, .. } = error {
            assert_eq!(field, Some("lb_table_size".to_string()));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(MagplaneError::validation("test").status_code(), 400);
        assert_eq!(MagplaneError::not_found("cluster", "web").status_code(), 404);
        assert_eq!(MagplaneError::conflict("test", "cluster").status_code(), 409);
        assert_eq!(MagplaneError::consistency("dangling").status_code(), 500);
        assert_eq!(MagplaneError::publish("stale", "node").status_code(), 500);
        assert_eq!(MagplaneError::internal("test").status_code(), 500);
    }

    #[test]
    fn only_publish_errors_are_fatal() {
        assert!(MagplaneError::publish("stale version", "test-id").is_fatal());
        assert!(!MagplaneError::consistency("dangling").is_fatal());
        assert!(!MagplaneError::not_found("cluster", "web").is_fatal());
    }

    #[test]
    fn not_found_message_names_resource() {
        let error = MagplaneError::not_found("cluster", "web");
        assert_eq!(error.to_string(), "Resource not found: cluster 'web'");
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(error.kind().to_string(), "not_found");
    }

    #[derive(Validate)]
    struct Inner {
        #[validate(range(min = 1, message = "must be positive"))]
        value: u32,
    }

    #[derive(Validate)]
    struct Outer {
        #[validate(nested)]
        inner: Inner,
    }

    #[test]
    fn nested_validation_errors_carry_path() {
        let errors = Outer { inner: Inner { value: 0 } }.validate().unwrap_err();
        let error = MagplaneError::from(errors);
        match error {
            MagplaneError::Validation { message, field } => {
                assert!(message.contains("inner.value: must be positive"));
                assert_eq!(field.as_deref(), Some("inner.value"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
