#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]
#![doc = "An async bridge between application code and a BLE central running in an external process."]
#![warn(missing_docs)]

mod fmt;

pub mod config;
pub mod device;
pub mod gatt;
pub mod handler;
mod response;
pub mod state;
pub mod subscriber;
pub mod transport;
pub mod types;

pub use device::{Device, DeviceConfig};
pub use state::State;

/// Errors reported by the bridge.
///
/// The same type is handed to lifecycle and notification handlers, so it
/// stays small and `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The transport did not answer in time.
    Timeout,
    /// A UUID string contained something other than hex digits.
    InvalidUuid,
    /// A value had the wrong length.
    InvalidLength,
    /// The operation is not allowed in the device's current state.
    InvalidState(State),
    /// The operation requires a connection to the given peripheral.
    NotConnected,
    /// The device has not been initialized, or has been closed.
    NotInitialized,
    /// The characteristic does not support the operation.
    NotSupported,
    /// The adapter was powered off.
    PoweredOff,
    /// The connection was lost.
    Disconnected,
    /// The connection attempt failed with the given status.
    ConnectionFailed(u8),
    /// The peer answered with an ATT error code.
    Att(u8),
    /// A fixed-size container was full.
    InsufficientSpace,
    /// The transport refused a command. The transport's own error is
    /// returned to the caller; handlers see this.
    TransportFailed,
}

/// Error returned by operations that talk to the transport.
#[derive(Debug)]
pub enum BridgeError<E> {
    /// Error raised by the transport itself.
    Transport(E),
    /// Error raised by the bridge.
    Bridge(Error),
}

impl<E> From<Error> for BridgeError<E> {
    fn from(value: Error) -> Self {
        Self::Bridge(value)
    }
}

impl<E> BridgeError<E> {
    /// Bridge error, if this is not a transport error.
    pub fn bridge(&self) -> Option<Error> {
        match self {
            Self::Bridge(e) => Some(*e),
            Self::Transport(_) => None,
        }
    }
}

#[cfg(feature = "defmt")]
impl<E> defmt::Format for BridgeError<E>
where
    E: defmt::Format,
{
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            BridgeError::Transport(value) => {
                defmt::write!(fmt, "Transport({})", value)
            }
            BridgeError::Bridge(value) => {
                defmt::write!(fmt, "Bridge({})", value)
            }
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Timeout => f.write_str("operation timed out"),
            Error::InvalidUuid => f.write_str("invalid uuid"),
            Error::InvalidLength => f.write_str("invalid length"),
            Error::InvalidState(state) => write!(f, "not allowed in state {:?}", state),
            Error::NotConnected => f.write_str("not connected"),
            Error::NotInitialized => f.write_str("device not initialized"),
            Error::NotSupported => f.write_str("not supported"),
            Error::PoweredOff => f.write_str("adapter powered off"),
            Error::Disconnected => f.write_str("disconnected"),
            Error::ConnectionFailed(status) => write!(f, "connection failed (status {:#04x})", status),
            Error::Att(code) => write!(f, "att error {:#04x}", code),
            Error::InsufficientSpace => f.write_str("insufficient space"),
            Error::TransportFailed => f.write_str("transport refused the command"),
        }
    }
}

/// Commonly used types.
pub mod prelude {
    pub use crate::device::{Device, DeviceConfig};
    pub use crate::gatt::{Characteristic, CharacteristicProps, Service};
    pub use crate::handler::{Handler, HandlerTable};
    pub use crate::state::State;
    pub use crate::subscriber::SubscriberRegistry;
    pub use crate::transport::{Command, Transport, TransportEvent};
    pub use crate::types::peripheral::{Advertisement, Peripheral, PeripheralId};
    pub use crate::types::uuid::Uuid;
    pub use crate::{BridgeError, Error};
}
