//! Error types for the reflex core library.
//!
//! Uses `thiserror` for every public error, grouped by the collaborator that
//! raises it. `ConfigError` stays separate from `ReflexError` because only
//! the binary loads configuration.

/// Top-level error type for the reflex core library.
#[derive(Debug, thiserror::Error)]
pub enum ReflexError {
    #[error("Finding error: {0}")]
    Finding(#[from] FindingError),

    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Structural errors raised while extracting fields from a raw finding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FindingError {
    #[error("required field '{field}' is missing from the finding")]
    MissingField { field: &'static str },

    #[error("field '{field}' has an unexpected shape: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Errors from the parameter store and the configuration resolver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParameterError {
    #[error("Parameter {name} is not found")]
    NotFound { name: String },
}

/// Errors from the remote resource gateway.
///
/// The in-tree gateways only raise `Request`. `Throttled` and `AccessDenied`
/// are for cloud backends implementing `ResourceGateway` outside this crate;
/// the workflow treats every variant as a remote failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("{operation} failed: {message}")]
    Request { operation: String, message: String },

    /// The backend rate-limited the call.
    #[error("{operation} was throttled by the backend")]
    Throttled { operation: String },

    /// The backend rejected the caller's credentials or permissions.
    #[error("{operation} was denied: {message}")]
    AccessDenied { operation: String, message: String },
}

impl GatewayError {
    /// Shorthand for a generic request failure.
    pub fn request(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// The gateway operation that produced this error.
    pub fn operation(&self) -> &str {
        match self {
            Self::Request { operation, .. }
            | Self::Throttled { operation }
            | Self::AccessDenied { operation, .. } => operation,
        }
    }
}

/// Errors raised while unwrapping an incoming event envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("event has no findings list at '{path}'")]
    MissingFindings { path: &'static str },
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}
