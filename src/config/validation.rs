//! Configuration validation functions
//!
//! Each check names the offending configuration key in its error.

use crate::error::{KeymasterError, Result};
use crate::source::validate_base_url;
use crate::wireguard::PrivateKey;
use std::path::Path;

/// Validate a period or timeout in seconds (must be positive)
pub fn validate_seconds(key: &str, secs: u64) -> Result<()> {
    if secs == 0 {
        return Err(KeymasterError::Config(format!(
            "{} must be greater than 0",
            key
        )));
    }
    Ok(())
}

/// Validate a source base URL
pub fn validate_url(key: &str, url: &str) -> Result<()> {
    validate_base_url(url).map_err(|e| KeymasterError::Config(format!("{}: {}", key, e)))?;
    Ok(())
}

/// Validate an API token
pub fn validate_token(key: &str, token: &str) -> Result<()> {
    if token.trim().is_empty() {
        return Err(KeymasterError::Config(format!("{} cannot be empty", key)));
    }

    if token.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(KeymasterError::Config(format!(
            "{} contains whitespace or control characters",
            key
        )));
    }

    Ok(())
}

/// Validate a network name (used as a URL path segment)
pub fn validate_network_name(key: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(KeymasterError::Config(format!("{} cannot be empty", key)));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(KeymasterError::Config(format!(
            "{} '{}' contains invalid characters (only alphanumeric, '_', '-' and '.' allowed)",
            key, name
        )));
    }

    Ok(())
}

/// Validate a forced private key (base64 of 32 bytes)
pub fn validate_private_key(key: &str, private_key: &str) -> Result<()> {
    PrivateKey::from_base64(private_key)
        .map_err(|e| KeymasterError::Config(format!("{}: {}", key, e)))?;
    Ok(())
}

/// Validate the scheme config directory (must be absolute)
pub fn validate_config_dir(key: &str, dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Err(KeymasterError::Config(format!("{} cannot be empty", key)));
    }

    if !dir.is_absolute() {
        return Err(KeymasterError::Config(format!(
            "{} must be an absolute path, got {}",
            key,
            dir.display()
        )));
    }

    Ok(())
}
