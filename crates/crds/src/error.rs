//! VirtualServer errors
//!
//! Spec mutations fail with [`SpecError`]; the condition engine fails with
//! [`StatusError`]. Neither is fatal: every failure leaves the record as it
//! was before the call.

use crate::conditions::ConditionType;
use crate::quantity::QuantityError;
use crate::virtual_server::{PortProtocol, SystemPresetClass};
use thiserror::Error;

/// Broad classification of a [`SpecError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Mutually exclusive fields or exceeded fixed limits
    Invariant,
    /// Malformed quantity or cloud-init document
    Parse,
    /// MAC address or firmware serial pattern mismatch
    Format,
}

/// Errors raised while building or validating a `VirtualServerSpec`
#[derive(Debug, Clone, Error)]
pub enum SpecError {
    /// CPU and GPU types are mutually exclusive
    #[error("{requested} resources cannot be set if {existing} type is set")]
    ResourceClassConflict {
        /// Class the caller tried to configure
        requested: SystemPresetClass,
        /// Class already configured
        existing: SystemPresetClass,
    },

    /// Ports cannot be exposed while a load balancer IP is directly attached
    #[error("ports cannot be exposed if DirectAttachLoadBalancerIP is enabled")]
    DirectAttachConflict,

    /// Too many ports for one protocol
    #[error("a maximum of {max} exposed {protocol} ports are permitted")]
    PortLimitExceeded {
        /// Protocol of the rejected port
        protocol: PortProtocol,
        /// Fixed per-protocol limit
        max: usize,
    },

    /// Port outside 1-65535
    #[error("port {0} is out of range, it must be between 1 and 65535")]
    InvalidPort(u16),

    /// The same port appears twice for one protocol
    #[error("{protocol} port {port} is listed more than once")]
    DuplicatePort {
        /// Protocol of the port
        protocol: PortProtocol,
        /// Repeated port
        port: u16,
    },

    /// A count that must be at least 1 was zero
    #[error("{0} must be at least 1")]
    InvalidCount(&'static str),

    /// Two users share a username
    #[error("user '{0}' is listed more than once")]
    DuplicateUser(String),

    /// Two disks or two filesystems share a name
    #[error("volume '{0}' is listed more than once")]
    DuplicateVolume(String),

    /// A volume must have exactly one source
    #[error("volume '{name}' must have exactly one source, found {count}")]
    InvalidVolumeSource {
        /// Volume name
        name: String,
        /// Number of sources set
        count: usize,
    },

    /// The root filesystem must have exactly one source
    #[error("root filesystem must have exactly one source, found {0}")]
    InvalidRootSource(usize),

    /// Ephemeral root filesystems can only be backed by a PVC
    #[error("an ephemeral root filesystem requires a PVC source")]
    EphemeralRootRequiresPvc,

    /// Size string is not a valid quantity
    #[error("could not parse {field} quantity: {source}")]
    InvalidQuantity {
        /// Field the quantity was meant for
        field: &'static str,
        /// Underlying parse failure
        #[source]
        source: QuantityError,
    },

    /// Cloud-init plus user data exceeds the secret size ceiling
    #[error("cloud-init script must be {max} characters in length or less, got {actual}")]
    CloudInitTooLarge {
        /// Remaining budget for the script
        max: usize,
        /// Length that was rejected
        actual: usize,
    },

    /// Cloud-init script is not a YAML mapping
    #[error("cloud-init is not a valid YAML mapping: {0}")]
    InvalidCloudInit(String),

    /// MAC address does not match the locally administered unicast pattern
    #[error("invalid format of MAC address '{0}', it must be ff:ff:ff:ff:ff:ff or FF-FF-FF-FF-FF-FF")]
    InvalidMacAddress(String),

    /// Firmware serial is not a lowercase UUID
    #[error("invalid format of firmware serial '{0}', it must be ffffffff-ffff-ffff-ffff-ffffffffffff")]
    InvalidFirmwareSerial(String),

    /// Validation pattern failed to compile
    #[error("validation pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl SpecError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ResourceClassConflict { .. }
            | Self::DirectAttachConflict
            | Self::PortLimitExceeded { .. }
            | Self::InvalidPort(_)
            | Self::DuplicatePort { .. }
            | Self::InvalidCount(_)
            | Self::DuplicateUser(_)
            | Self::DuplicateVolume(_)
            | Self::InvalidVolumeSource { .. }
            | Self::InvalidRootSource(_)
            | Self::EphemeralRootRequiresPvc
            | Self::CloudInitTooLarge { .. } => ErrorKind::Invariant,
            Self::InvalidQuantity { .. } | Self::InvalidCloudInit(_) => ErrorKind::Parse,
            Self::InvalidMacAddress(_) | Self::InvalidFirmwareSerial(_) | Self::Pattern(_) => {
                ErrorKind::Format
            }
        }
    }

    pub(crate) fn quantity(field: &'static str) -> impl FnOnce(QuantityError) -> Self {
        move |source| Self::InvalidQuantity { field, source }
    }
}

/// Errors raised by the condition engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StatusError {
    /// A propagating update needs the top-level condition to exist
    #[error("cannot propagate {0} to Ready: Ready condition is not initialized")]
    ReadyConditionMissing(ConditionType),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(SpecError::DirectAttachConflict.kind(), ErrorKind::Invariant);
        assert_eq!(
            SpecError::InvalidMacAddress("x".to_string()).kind(),
            ErrorKind::Format
        );
        assert_eq!(
            SpecError::InvalidQuantity {
                field: "memory",
                source: QuantityError::Empty,
            }
            .kind(),
            ErrorKind::Parse
        );
    }

    #[test]
    fn test_error_messages() {
        let err = SpecError::ResourceClassConflict {
            requested: SystemPresetClass::Gpu,
            existing: SystemPresetClass::Cpu,
        };
        assert_eq!(err.to_string(), "gpu resources cannot be set if cpu type is set");

        let err = SpecError::PortLimitExceeded {
            protocol: PortProtocol::Tcp,
            max: 10,
        };
        assert_eq!(err.to_string(), "a maximum of 10 exposed TCP ports are permitted");
    }
}
