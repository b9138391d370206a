//! Error types for lanlight core.

use thiserror::Error;

use crate::protocol::MessageKind;
use crate::types::MacAddr;

/// Core error type for shared operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// True for the "device is offline" family: retries exhausted, an
    /// abandoned request, or no transport to send on.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            CoreError::Device(DeviceError::Unreachable { .. })
                | CoreError::Device(DeviceError::NotConnected { .. })
        )
    }
}

/// Per-device request failures
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device {mac} cannot be reached after {attempts} attempt(s)")]
    Unreachable { mac: MacAddr, attempts: u32 },

    #[error("Device {mac} has no open transport")]
    NotConnected { mac: MacAddr },

    #[error("Device {mac} has no free sequence number")]
    SequenceExhausted { mac: MacAddr },

    #[error("Unexpected response from {mac}: expected {expected:?}, got {got:?}")]
    UnexpectedResponse {
        mac: MacAddr,
        expected: MessageKind,
        got: MessageKind,
    },
}

/// Wire-level errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Unknown message type {0}")]
    UnknownKind(u16),

    #[error("Reply for sequence {sequence} rejected: {reason}")]
    Mismatch { sequence: u8, reason: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid MAC address: {0}")]
    InvalidMacAddress(String),

    #[error("Invalid IPv6 address: {0}")]
    InvalidIpv6Address(String),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> MacAddr {
        "d0:73:d5:01:02:03".parse().unwrap()
    }

    #[test]
    fn test_unreachable_display() {
        let err = CoreError::Device(DeviceError::Unreachable {
            mac: mac(),
            attempts: 3,
        });
        assert_eq!(
            format!("{}", err),
            "Device error: Device d0:73:d5:01:02:03 cannot be reached after 3 attempt(s)"
        );
    }

    #[test]
    fn test_is_unreachable() {
        assert!(CoreError::from(DeviceError::NotConnected { mac: mac() }).is_unreachable());
        assert!(CoreError::from(DeviceError::Unreachable {
            mac: mac(),
            attempts: 1
        })
        .is_unreachable());
        assert!(!CoreError::from(DeviceError::SequenceExhausted { mac: mac() }).is_unreachable());
        assert!(!CoreError::from(ProtocolError::UnknownKind(9)).is_unreachable());
    }

    #[test]
    fn test_core_error_from_protocol_error() {
        let err: CoreError = ProtocolError::Malformed("short header".to_string()).into();
        assert!(format!("{}", err).contains("Malformed message"));
    }
}
