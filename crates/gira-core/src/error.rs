//! Error types for gira-core.
//!
//! | Variant | Raised when | Retried |
//! |---------|-------------|---------|
//! | [`Error::InvalidArgument`] | Position outside 0-100, before any I/O | No |
//! | [`Error::DeviceNotFound`] | Transport has no path to the device | No |
//! | [`Error::ConnectionFailed`] | A connect attempt failed, or all of them | Per attempt |
//! | [`Error::WriteFailed`] | Connected, but the command write failed | No |
//! | [`Error::Timeout`] | A single connect or write attempt took too long | Per attempt |
//! | [`Error::CommandFailed`] | Public wrapper around any transport failure | No |
//!
//! Callers of [`CoverClient`](crate::client::CoverClient) only ever see
//! `InvalidArgument`, `DeviceNotFound` and `CommandFailed`. The transport
//! cause of a `CommandFailed` stays reachable through
//! [`std::error::Error::source`] and [`Error::root_cause`].
//!
//! Broadcasts that do not decode are dropped by the passive listener and
//! never surface as errors.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use gira_types::CodecError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Raw btleplug failure.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    #[error(transparent)]
    InvalidArgument(#[from] CodecError),

    #[error("Cover not reachable: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// A retained connection was used after the link dropped.
    #[error("Link to cover is down")]
    NotConnected,

    /// The peer does not expose the command characteristic.
    #[error("No command characteristic {uuid} among {service_count} services")]
    CharacteristicNotFound { uuid: String, service_count: usize },

    #[error("{operation} did not finish within {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Could not connect: {reason}")]
    ConnectionFailed {
        /// Address of the cover, when known.
        device_id: Option<String>,
        reason: ConnectionFailureReason,
    },

    #[error("Writing {uuid} failed: {reason}")]
    WriteFailed { uuid: String, reason: String },

    /// A command could not be delivered. Wraps the transport cause.
    #[error("Command to {device} failed: {source}")]
    CommandFailed {
        /// Display form of the [`DeviceIdentity`](gira_types::DeviceIdentity).
        device: String,
        #[source]
        source: Box<Error>,
    },
}

/// Why a connection could not be established.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// The peer did not answer.
    OutOfRange,
    /// The retry budget is spent. Terminal.
    RetriesExhausted { attempts: u32, last_error: String },
}

impl fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange => f.write_str("cover did not answer"),
            Self::RetriesExhausted {
                attempts,
                last_error,
            } => write!(f, "no link after {attempts} attempts (last: {last_error})"),
        }
    }
}

/// Why the transport had no path to a cover.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// The address was not seen by the adapter.
    NotFound { identifier: String },
    /// The host has no usable Bluetooth adapter.
    NoAdapter,
}

impl fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { identifier } => write!(f, "{identifier} was not seen by the adapter"),
            Self::NoAdapter => f.write_str("no Bluetooth adapter"),
        }
    }
}

impl Error {
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            identifier: identifier.into(),
        })
    }

    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    pub fn characteristic_not_found(uuid: impl Into<String>, service_count: usize) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.into(),
            service_count,
        }
    }

    pub fn connection_failed(device_id: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { device_id, reason }
    }

    pub fn write_failed(uuid: impl ToString, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            uuid: uuid.to_string(),
            reason: reason.into(),
        }
    }

    /// Wrap a transport failure at the public command boundary.
    pub fn command_failed(device: impl Into<String>, source: Error) -> Self {
        Self::CommandFailed {
            device: device.into(),
            source: Box::new(source),
        }
    }

    /// Whether another connect attempt could succeed.
    ///
    /// Only link-level failures qualify. Everything a retry cannot change
    /// (bad arguments, unknown devices, a spent retry budget, a missing
    /// characteristic, failed writes) is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Bluetooth(_) | Error::NotConnected | Error::Timeout { .. } => true,
            Error::ConnectionFailed { reason, .. } => {
                !matches!(reason, ConnectionFailureReason::RetriesExhausted { .. })
            }
            Error::InvalidArgument(_)
            | Error::DeviceNotFound(_)
            | Error::CharacteristicNotFound { .. }
            | Error::WriteFailed { .. }
            | Error::CommandFailed { .. } => false,
        }
    }

    /// The innermost transport error behind any `CommandFailed` layers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::CommandFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
