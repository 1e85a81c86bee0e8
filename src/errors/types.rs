//! Error types for the APNs client
//!
//! Every failure a caller can observe is an [`ApnsError`]. The variants are
//! grouped by the outcome they describe, and [`ApnsError::kind`] collapses them
//! into the small [`FailureKind`] taxonomy callers usually branch on.

use std::path::PathBuf;
use thiserror::Error;

/// Number of device-token characters shown in error messages and logs
const TOKEN_PREFIX_LEN: usize = 8;

/// Shorten a device token for display
pub fn token_prefix(device_token: &str) -> String {
    let prefix: String = device_token.chars().take(TOKEN_PREFIX_LEN).collect();
    format!("{prefix}...")
}

/// Coarse classification of a failed delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Provider credentials could not be used to sign a token
    Auth,
    /// The device token is malformed or no longer registered
    Token,
    /// The exchange exceeded a configured deadline
    Timeout,
    /// Transient failures persisted past the retry budget
    Server,
    /// APNs rejected the request, or it could not be built or sent
    Delivery,
    /// Local configuration is unusable
    Config,
}

/// Which deadline expired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutPhase {
    /// Establishing the connection
    Connect,
    /// Waiting for response bytes
    Read,
    /// Waiting for a free slot in the connection pool
    PoolAcquire,
}

impl TimeoutPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Read => "read",
            Self::PoolAcquire => "pool acquire",
        }
    }
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Token => "token",
            Self::Timeout => "timeout",
            Self::Server => "server",
            Self::Delivery => "delivery",
            Self::Config => "config",
        }
    }
}

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum ApnsError {
    // Credential errors
    #[error("Authentication error: {message}")]
    Auth {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Per-token delivery errors
    #[error("Invalid device token {}: {reason}", token_prefix(.device_token))]
    InvalidDeviceToken {
        device_token: String,
        status: u16,
        reason: String,
    },

    #[error("Request timed out after {timeout_secs}s ({phase}) for token {}", token_prefix(.device_token))]
    Timeout {
        device_token: String,
        phase: TimeoutPhase,
        /// The deadline that expired
        timeout_secs: u64,
    },

    #[error("APNs server error after {attempts} attempts for token {}: {reason}", token_prefix(.device_token))]
    RetriesExhausted {
        device_token: String,
        attempts: u32,
        status: Option<u16>,
        reason: String,
    },

    #[error("APNs rejected notification (HTTP {status}): {reason}")]
    Rejected {
        device_token: String,
        status: u16,
        reason: String,
    },

    #[error("Failed to build request: {message}")]
    Request {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Client has been closed")]
    ClientClosed,

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidConfigValue { key: String, reason: String },

    // I/O errors
    #[error("File I/O error for '{path}': {operation}")]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Convenience type alias for Results using ApnsError
pub type ApnsResult<T> = Result<T, ApnsError>;

impl ApnsError {
    /// Create a new Auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new Auth error with source
    pub fn auth_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Auth {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new Request error
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new Request error with source
    pub fn request_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Request {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new Config error with source
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn invalid_value(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a new I/O error with source
    pub fn io_with_source(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Io {
            path: path.into(),
            operation: operation.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Classify the error into the delivery failure taxonomy
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Auth { .. } => FailureKind::Auth,
            Self::InvalidDeviceToken { .. } => FailureKind::Token,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::RetriesExhausted { .. } => FailureKind::Server,
            Self::Rejected { .. } | Self::Request { .. } | Self::ClientClosed => {
                FailureKind::Delivery
            }
            Self::Config { .. }
            | Self::InvalidConfigValue { .. }
            | Self::Io { .. } => FailureKind::Config,
        }
    }

    /// The device token the failure relates to, if any
    pub fn device_token(&self) -> Option<&str> {
        match self {
            Self::InvalidDeviceToken { device_token, .. }
            | Self::Timeout { device_token, .. }
            | Self::RetriesExhausted { device_token, .. }
            | Self::Rejected { device_token, .. } => Some(device_token),
            _ => None,
        }
    }

    /// The reason string reported by APNs, if the failure came from a response
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::InvalidDeviceToken { reason, .. }
            | Self::RetriesExhausted { reason, .. }
            | Self::Rejected { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ApnsError {
    fn from(err: std::io::Error) -> Self {
        let operation = match err.kind() {
            std::io::ErrorKind::NotFound => "file not found",
            std::io::ErrorKind::PermissionDenied => "permission denied",
            _ => "I/O operation",
        }
        .to_string();

        Self::Io {
            path: PathBuf::from("unknown"),
            operation,
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for ApnsError {
    fn from(err: serde_json::Error) -> Self {
        Self::request_with_source("payload is not valid JSON", err)
    }
}

impl From<toml::de::Error> for ApnsError {
    fn from(err: toml::de::Error) -> Self {
        Self::config_with_source(format!("TOML parsing error: {err}"), err)
    }
}

impl From<jsonwebtoken::errors::Error> for ApnsError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::auth_with_source(format!("provider token signing failed: {err}"), err)
    }
}
