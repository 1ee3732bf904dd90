//! Error types for keymaster-agent
//!
//! This module defines the error types used throughout the application.
//! We use `thiserror` for ergonomic error definitions and `anyhow` for
//! error propagation in the binary.

use thiserror::Error;

/// Main error type for keymaster-agent operations
#[derive(Error, Debug)]
pub enum KeymasterError {
    /// Malformed interface or peer data
    #[error("Validation error: {field}: {message}")]
    Validation {
        /// Offending field, e.g. `peers[0].allowed_ips[1]`
        field: String,
        /// What is wrong with it
        message: String,
    },

    /// Interface absent from the config scheme
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failure of an external dependency (network, subprocess, filesystem)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Unparseable line in the WireGuard text format
    #[error("Parse error on line {line}: {message}")]
    Parse {
        /// 1-based line number, 0 when the error concerns the whole document
        line: usize,
        /// What could not be parsed
        message: String,
    },

    /// Daemon configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key generation or derivation errors
    #[error("Key material error: {0}")]
    KeyMaterial(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using KeymasterError
pub type Result<T> = std::result::Result<T, KeymasterError>;

impl KeymasterError {
    /// Build a validation error for `field`
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        KeymasterError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Build a parse error for the 1-based `line`
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        KeymasterError::Parse {
            line,
            message: message.into(),
        }
    }

    /// Whether this is a "does not exist" miss rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeymasterError::NotFound(_))
    }

    /// Prefix the field of a validation error, leaving other errors alone.
    ///
    /// Used when a nested record (a peer inside an interface) is validated
    /// so the reported field reads `peers[2].endpoint`.
    pub fn within(self, parent: &str) -> Self {
        match self {
            KeymasterError::Validation { field, message } => KeymasterError::Validation {
                field: format!("{}.{}", parent, field),
                message,
            },
            other => other,
        }
    }
}

impl From<serde_json::Error> for KeymasterError {
    fn from(err: serde_json::Error) -> Self {
        KeymasterError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for KeymasterError {
    fn from(err: toml::de::Error) -> Self {
        KeymasterError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for KeymasterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            KeymasterError::Timeout(err.to_string())
        } else if err.is_decode() {
            KeymasterError::Serialization(err.to_string())
        } else {
            KeymasterError::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for KeymasterError {
    fn from(err: url::ParseError) -> Self {
        KeymasterError::Config(format!("Invalid URL: {}", err))
    }
}
