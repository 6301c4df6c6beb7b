//! Field validation helpers shared by the spec builder

use crate::error::SpecError;
use crate::quantity::Quantity;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

/// Locally administered unicast MAC, lowercase with colons or uppercase with dashes
pub const MAC_ADDRESS_PATTERN: &str =
    r"^(?:[0-9a-f][26ae](?::[0-9a-f]{2}){5}|[0-9A-F][26AE](?:-[0-9A-F]{2}){5})$";

/// SMBIOS system serial, a lowercase UUID
pub const FIRMWARE_SERIAL_PATTERN: &str =
    r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$";

/// Platform secret size ceiling (1 MiB). Cloud-init and user credentials
/// are rendered into a single secret.
pub const MAX_SECRET_SIZE: usize = 1024 * 1024;

/// Maximum number of exposed ports per protocol
pub const MAX_EXPOSED_PORTS: usize = 10;

static MAC_ADDRESS_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(MAC_ADDRESS_PATTERN));

static FIRMWARE_SERIAL_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(FIRMWARE_SERIAL_PATTERN));

fn is_match(
    re: &'static LazyLock<Result<Regex, regex::Error>>,
    value: &str,
) -> Result<bool, SpecError> {
    match LazyLock::force(re) {
        Ok(re) => Ok(re.is_match(value)),
        Err(e) => Err(SpecError::Pattern(e.clone())),
    }
}

/// Check a MAC address against [`MAC_ADDRESS_PATTERN`]
pub fn validate_mac_address(mac: &str) -> Result<(), SpecError> {
    if is_match(&MAC_ADDRESS_RE, mac)? {
        Ok(())
    } else {
        Err(SpecError::InvalidMacAddress(mac.to_string()))
    }
}

/// Check a firmware serial against [`FIRMWARE_SERIAL_PATTERN`]
pub fn validate_firmware_serial(serial: &str) -> Result<(), SpecError> {
    if is_match(&FIRMWARE_SERIAL_RE, serial)? {
        Ok(())
    } else {
        Err(SpecError::InvalidFirmwareSerial(serial.to_string()))
    }
}

/// Parse a size string for the named field
pub fn parse_quantity(field: &'static str, value: &str) -> Result<Quantity, SpecError> {
    Quantity::parse(value).map_err(SpecError::quantity(field))
}

/// Remaining cloud-init budget once `users_size` bytes of credentials are rendered
pub fn cloud_init_budget(users_size: usize) -> usize {
    MAX_SECRET_SIZE.saturating_sub(users_size)
}

/// Check that a cloud-init script plus credentials fits in one secret
pub fn check_cloud_init_size(cloud_init: &str, users_size: usize) -> Result<(), SpecError> {
    let max = cloud_init_budget(users_size);
    if users_size <= MAX_SECRET_SIZE && cloud_init.len() <= max {
        Ok(())
    } else {
        Err(SpecError::CloudInitTooLarge {
            max,
            actual: cloud_init.len(),
        })
    }
}

/// Check that a cloud-init script is a YAML mapping. Only syntax is
/// checked; an empty script is accepted. In a multi-document stream only
/// the first document is checked.
pub fn validate_cloud_init(cloud_init: &str) -> Result<(), SpecError> {
    if cloud_init.trim().is_empty() {
        return Ok(());
    }
    let Some(document) = serde_yaml::Deserializer::from_str(cloud_init).next() else {
        return Ok(());
    };
    match Option::<serde_yaml::Mapping>::deserialize(document) {
        Ok(_) => Ok(()),
        Err(e) => Err(SpecError::InvalidCloudInit(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_mac_address_patterns() {
        assert!(validate_mac_address("02:00:00:aa:bb:cc").is_ok());
        assert!(validate_mac_address("a6:12:34:56:78:9a").is_ok());
        assert!(validate_mac_address("0E-00-00-AA-BB-CC").is_ok());

        // globally administered first octet
        assert!(validate_mac_address("00:00:00:aa:bb:cc").is_err());
        // mixed separators and case
        assert!(validate_mac_address("02:00:00:AA:BB:CC").is_err());
        assert!(validate_mac_address("02-00-00-aa-bb-cc").is_err());
        // trailing garbage
        assert!(validate_mac_address("02:00:00:aa:bb:cc:dd").is_err());

        let err = validate_mac_address("nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_firmware_serial_pattern() {
        assert!(validate_firmware_serial("4c4c4544-0042-3510-8052-b4c04f4e3732").is_ok());
        assert!(validate_firmware_serial("4C4C4544-0042-3510-8052-B4C04F4E3732").is_err());
        assert!(validate_firmware_serial("4c4c4544004235108052b4c04f4e3732").is_err());
    }

    #[test]
    fn test_cloud_init_size_budget() {
        assert!(check_cloud_init_size("", 0).is_ok());
        assert!(check_cloud_init_size(&"x".repeat(MAX_SECRET_SIZE), 0).is_ok());
        assert!(check_cloud_init_size(&"x".repeat(MAX_SECRET_SIZE - 10), 10).is_ok());

        match check_cloud_init_size(&"x".repeat(MAX_SECRET_SIZE - 9), 10) {
            Err(SpecError::CloudInitTooLarge { max, actual }) => {
                assert_eq!(max, MAX_SECRET_SIZE - 10);
                assert_eq!(actual, MAX_SECRET_SIZE - 9);
            }
            other => panic!("expected CloudInitTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_cloud_init_yaml() {
        assert!(validate_cloud_init("").is_ok());
        assert!(validate_cloud_init("#cloud-config\npackages:\n  - htop\n").is_ok());
        assert!(validate_cloud_init("runcmd: [echo hi]").is_ok());

        assert!(validate_cloud_init("just a string").is_err());
        assert!(validate_cloud_init("key: [unterminated").is_err());
        assert!(validate_cloud_init("- a\n- b\n").is_err());
    }

    #[test]
    fn test_cloud_init_multi_document() {
        assert!(validate_cloud_init("#cloud-config\nruncmd: [a]\n---\nruncmd: [b]\n").is_ok());
        assert!(validate_cloud_init("---\npackages: [htop]\n---\n- not checked\n").is_ok());
        assert!(validate_cloud_init("- a\n---\nruncmd: [b]\n").is_err());
    }
}
