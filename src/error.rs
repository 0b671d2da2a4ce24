//! Error types and handling for glowdcc
//!
//! One error enum covers the whole crate. Variants follow the failure
//! taxonomy of the integration: fatal setup errors (auth, discovery, config)
//! and transient fetch errors that the coordinator recovers from by serving
//! a previously cached reading.

use thiserror::Error;

/// Result type alias for glowdcc operations
pub type Result<T> = std::result::Result<T, GlowError>;

/// Main error type for glowdcc
///
/// `Clone` so that a single fetch outcome can be handed to every caller that
/// was waiting on the same in-flight request.
#[derive(Debug, Clone, Error)]
pub enum GlowError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Credentials rejected by the remote API
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Account exposes no usable metering resources
    #[error("Discovery error: {message}")]
    Discovery { message: String },

    /// Transport-level failures talking to the remote API
    #[error("Network error: {message}")]
    Network { message: String },

    /// Remote API asked us to slow down
    #[error("Rate limited: {message}")]
    RateLimit { message: String },

    /// Remote call exceeded its time budget
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Remote API answered but has no data for the requested window yet
    #[error("No data: {message}")]
    NoData { message: String },

    /// Non-success status or unexpected payload from the remote API
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A derived value is missing one of its inputs
    #[error("Incomplete data for {quantity}: {message}")]
    IncompleteData { quantity: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },
}

impl GlowError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new authentication error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a new discovery error
    pub fn discovery<S: Into<String>>(message: S) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new rate limit error
    pub fn rate_limited<S: Into<String>>(message: S) -> Self {
        Self::RateLimit {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a new no-data error
    pub fn no_data<S: Into<String>>(message: S) -> Self {
        Self::NoData {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a new incomplete data error
    pub fn incomplete<Q: Into<String>, S: Into<String>>(quantity: Q, message: S) -> Self {
        Self::IncompleteData {
            quantity: quantity.into(),
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Whether the failure is expected to clear up on a later poll.
    ///
    /// Transient failures are absorbed by the coordinator (stale serving);
    /// everything else is surfaced as-is.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::RateLimit { .. }
                | Self::Timeout { .. }
                | Self::NoData { .. }
                | Self::Api { .. }
        )
    }

    /// Whether the remote API rejected our credentials or token
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

impl From<std::io::Error> for GlowError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for GlowError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GlowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for GlowError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(err.to_string())
        } else if err.is_decode() {
            Self::Serialization {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::api(status.as_u16(), err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}
