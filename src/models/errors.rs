use thiserror::Error;

/// Errors surfaced to API callers. Codes follow the gRPC status numbering used
/// by the node's query services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal: {0}")]
    Internal(String),
    #[error("unimplemented: {0}")]
    Unimplemented(String),
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::Unimplemented(message.into())
    }

    /// Wraps an upstream failure, keeping its full context chain in the message.
    pub fn upstream(context: &str, err: anyhow::Error) -> Self {
        Self::Internal(format!("{context}: {err:#}"))
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => 3,
            Self::NotFound(_) => 5,
            Self::Unimplemented(_) => 12,
            Self::Internal(_) => 13,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(m) | Self::InvalidArgument(m) | Self::Internal(m) | Self::Unimplemented(m) => m,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unsupported extension: {extension}")]
    UnsupportedExtension { extension: String },
    #[error("Missing required setting for the {extension} extension: {field}")]
    MissingField { extension: String, field: String },
    #[error("Invalid bech32 prefix {prefix}: {reason}")]
    InvalidPrefix { prefix: String, reason: String },
}
