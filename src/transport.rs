//! Boundary to the process that owns the native BLE stack.
//!
//! The bridge never speaks to the radio itself. It hands [`Command`]s to a
//! [`Transport`] and consumes the [`TransportEvent`]s the transport reports
//! back. How the two are carried (pipes to a helper process, a socket, an
//! in-memory mock) is up to the transport.
use heapless::Vec;

use crate::config::{MAX_CHARACTERISTICS, MAX_SERVICES, VALUE_MAX};
use crate::gatt::{Characteristic, Service};
use crate::types::peripheral::{Advertisement, Peripheral, PeripheralId};
use crate::types::uuid::Uuid;
use crate::Error;

/// A command for the native BLE stack.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command<'a> {
    /// Begin scanning for advertisements.
    StartScan {
        /// Only report peripherals advertising one of these services. Empty means all.
        services: &'a [Uuid],
        /// Report every advertisement rather than once per peripheral.
        allow_duplicates: bool,
    },
    /// Stop scanning.
    StopScan,
    /// Open a connection.
    Connect(&'a PeripheralId),
    /// Close a connection, or abort a pending one.
    CancelConnection(&'a PeripheralId),
    /// Discover primary services, optionally filtered by UUID.
    DiscoverServices {
        /// Target peripheral.
        id: &'a PeripheralId,
        /// Service filter. Empty means all.
        uuids: &'a [Uuid],
    },
    /// Discover characteristics of a service, optionally filtered by UUID.
    DiscoverCharacteristics {
        /// Target peripheral.
        id: &'a PeripheralId,
        /// Service to search.
        service: &'a Service,
        /// Characteristic filter. Empty means all.
        uuids: &'a [Uuid],
    },
    /// Read an attribute value.
    ReadCharacteristic {
        /// Target peripheral.
        id: &'a PeripheralId,
        /// Attribute handle.
        handle: u16,
    },
    /// Write an attribute value.
    WriteCharacteristic {
        /// Target peripheral.
        id: &'a PeripheralId,
        /// Attribute handle.
        handle: u16,
        /// Value to write.
        data: &'a [u8],
        /// Whether the peer must acknowledge the write.
        with_response: bool,
    },
    /// Read the signal strength of a connection.
    ReadRssi(&'a PeripheralId),
}

/// An event reported by the native BLE stack.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Adapter power state changed.
    PowerState {
        /// Whether the adapter is powered on.
        powered: bool,
    },
    /// An advertisement was received while scanning.
    AdvertisementReceived {
        /// Advertising peripheral.
        peripheral: Peripheral,
        /// Advertisement contents.
        advertisement: Advertisement,
        /// Signal strength (dBm).
        rssi: i8,
    },
    /// A connection was established.
    ConnectionEstablished {
        /// Connected peripheral.
        id: PeripheralId,
    },
    /// A connection attempt failed.
    ConnectionFailed {
        /// Peripheral that could not be connected.
        id: PeripheralId,
        /// Failure reason.
        reason: Error,
    },
    /// Response to [`Command::DiscoverServices`].
    ServicesDiscovered {
        /// Peripheral.
        id: PeripheralId,
        /// Discovered services or the failure.
        services: Result<Vec<Service, MAX_SERVICES>, Error>,
    },
    /// Response to [`Command::DiscoverCharacteristics`].
    CharacteristicsDiscovered {
        /// Peripheral.
        id: PeripheralId,
        /// Discovered characteristics or the failure.
        characteristics: Result<Vec<Characteristic, MAX_CHARACTERISTICS>, Error>,
    },
    /// An attribute value, either answering a read or pushed by the peer.
    CharacteristicValue {
        /// Peripheral.
        id: PeripheralId,
        /// Attribute handle.
        handle: u16,
        /// Attribute value.
        data: Vec<u8, VALUE_MAX>,
        /// Pushed by the peer (notification or indication) rather than read.
        notification: bool,
        /// Failure reported alongside the value.
        error: Option<Error>,
    },
    /// Response to a [`Command::WriteCharacteristic`] with response.
    WriteResponse {
        /// Peripheral.
        id: PeripheralId,
        /// Attribute handle.
        handle: u16,
        /// Failure, if the write was rejected.
        error: Option<Error>,
    },
    /// Response to [`Command::ReadRssi`].
    Rssi {
        /// Peripheral.
        id: PeripheralId,
        /// Signal strength (dBm) or the failure.
        rssi: Result<i8, Error>,
    },
    /// A connection was closed.
    Disconnected {
        /// Peripheral.
        id: PeripheralId,
        /// `None` for a clean disconnect, the reason otherwise.
        reason: Option<Error>,
    },
}

/// Channel to the native BLE stack.
///
/// `send` and `receive` may be called concurrently: the device's run loop
/// sits in `receive` while operations issue commands.
pub trait Transport {
    /// Transport specific error.
    type Error: core::fmt::Debug;

    /// Bring the transport up. Called once by [`crate::Device::init`].
    async fn open(&self) -> Result<(), Self::Error>;

    /// Hand a command to the native stack. Returns once the command is accepted, not answered.
    async fn send(&self, command: Command<'_>) -> Result<(), Self::Error>;

    /// Wait for the next event.
    async fn receive(&self) -> Result<TransportEvent, Self::Error>;
}
