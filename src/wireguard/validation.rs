//! Field validation for interfaces and peers
//!
//! Every check takes the name of the field it validates so the resulting
//! error points at the offending value.

use crate::error::{KeymasterError, Result};
use ipnet::IpNet;

/// Validate a required string field
pub fn validate_required(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(KeymasterError::validation(field, "must not be empty"));
    }
    Ok(())
}

/// Validate that a list field has at least one entry
pub fn validate_non_empty<T>(field: &str, values: &[T]) -> Result<()> {
    if values.is_empty() {
        return Err(KeymasterError::validation(
            field,
            "must contain at least one entry",
        ));
    }
    Ok(())
}

/// Parse `<ip>/<prefixlen>` with an explicit prefix length
fn parse_cidr(field: &str, cidr: &str) -> Result<IpNet> {
    if !cidr.contains('/') {
        return Err(KeymasterError::validation(
            field,
            format!("'{}' has no prefix length (expected format: IP/prefix)", cidr),
        ));
    }

    cidr.parse::<IpNet>().map_err(|e| {
        KeymasterError::validation(field, format!("'{}' is not valid CIDR notation: {}", cidr, e))
    })
}

/// Validate an interface address: any address inside a prefix, e.g. `10.0.0.1/24`
pub fn validate_interface_cidr(field: &str, cidr: &str) -> Result<()> {
    parse_cidr(field, cidr).map(|_| ())
}

/// Validate an allowed-IPs entry: a network prefix with no host bits set
pub fn validate_network_cidr(field: &str, cidr: &str) -> Result<()> {
    let net = parse_cidr(field, cidr)?;
    if net.trunc() != net {
        return Err(KeymasterError::validation(
            field,
            format!("'{}' has host bits set (did you mean {}?)", cidr, net.trunc()),
        ));
    }
    Ok(())
}

/// Validate endpoint format (host:port)
///
/// The string is split on every `:` and must yield exactly a host and a
/// port, so bare IPv6 literals are rejected.
pub fn validate_endpoint(field: &str, endpoint: &str) -> Result<()> {
    let parts: Vec<&str> = endpoint.split(':').collect();

    if parts.len() != 2 {
        return Err(KeymasterError::validation(
            field,
            format!("'{}' is not of the form host:port", endpoint),
        ));
    }

    if parts[0].is_empty() {
        return Err(KeymasterError::validation(
            field,
            format!("'{}' does not contain a valid hostname", endpoint),
        ));
    }

    parts[1].parse::<u16>().map_err(|_| {
        KeymasterError::validation(field, format!("'{}' is not a valid port", parts[1]))
    })?;

    Ok(())
}

/// Validate an integer that must fit a port-sized field (0-65535 inclusive)
pub fn validate_u16(field: &str, value: i64) -> Result<u16> {
    u16::try_from(value).map_err(|_| {
        KeymasterError::validation(
            field,
            format!("{} is out of range (must be between 0 and 65535 inclusive)", value),
        )
    })
}

/// Validate a firewall mark (any 32-bit unsigned value)
pub fn validate_u32(field: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        KeymasterError::validation(
            field,
            format!("{} is out of range (must be between 0 and {})", value, u32::MAX),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: KeymasterError) -> String {
        match err {
            KeymasterError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_validate_required() {
        assert!(validate_required("public_key", "abc").is_ok());
        assert_eq!(
            field_of(validate_required("public_key", "").unwrap_err()),
            "public_key"
        );
    }

    #[test]
    fn test_validate_network_cidr() {
        assert!(validate_network_cidr("allowed_ips", "192.168.1.0/24").is_ok());
        assert!(validate_network_cidr("allowed_ips", "0.0.0.0/0").is_ok());
        assert!(validate_network_cidr("allowed_ips", "fe80::/64").is_ok());
        assert!(validate_network_cidr("allowed_ips", "10.0.0.7/32").is_ok());

        assert!(validate_network_cidr("allowed_ips", "192.73.0.4").is_err());
        assert!(validate_network_cidr("allowed_ips", "192.73.0.4/33").is_err());
        assert!(validate_network_cidr("allowed_ips", "192.373.0.4/24").is_err());
        assert!(validate_network_cidr("allowed_ips", "192.173.0.4/24").is_err());
        assert!(validate_network_cidr("allowed_ips", "fe80::/129").is_err());
    }

    #[test]
    fn test_validate_interface_cidr() {
        assert!(validate_interface_cidr("addresses", "223.224.225.226/24").is_ok());
        assert!(validate_interface_cidr("addresses", "fd00::1/64").is_ok());

        assert!(validate_interface_cidr("addresses", "asdf").is_err());
        assert!(validate_interface_cidr("addresses", "192.168.1.2").is_err());
        assert!(validate_interface_cidr("addresses", "192.268.1.2/24").is_err());
        assert!(validate_interface_cidr("addresses", "::8g:1/120").is_err());
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("endpoint", "example.com:51820").is_ok());
        assert!(validate_endpoint("endpoint", "192.168.1.1:0").is_ok());
        assert!(validate_endpoint("endpoint", "192.168.1.1:65535").is_ok());

        assert!(validate_endpoint("endpoint", "asdf").is_err());
        assert!(validate_endpoint("endpoint", ":51820").is_err());
        assert!(validate_endpoint("endpoint", "google.com:asdf").is_err());
        assert!(validate_endpoint("endpoint", "172.34.89.92:84323").is_err());
        assert!(validate_endpoint("endpoint", "172.34.89.92:8432:anotha-one").is_err());
        assert!(validate_endpoint("endpoint", "[::1]:51820").is_err());
    }

    #[test]
    fn test_validate_integer_ranges() {
        assert_eq!(validate_u16("listen_port", 51820).unwrap(), 51820);
        assert_eq!(validate_u16("listen_port", 0).unwrap(), 0);
        assert!(validate_u16("listen_port", -3).is_err());
        assert!(validate_u16("listen_port", 100000).is_err());

        assert_eq!(validate_u32("fw_mark", 32).unwrap(), 32);
        assert!(validate_u32("fw_mark", -1).is_err());
    }
}
