//! Peripheral identity and advertisement data.
use core::fmt;

use heapless::{String, Vec};

use crate::config::{ADV_DATA_MAX, ADV_SERVICES_MAX, PERIPHERAL_ID_MAX, PERIPHERAL_NAME_MAX};
use crate::types::uuid::Uuid;
use crate::Error;

/// Identifier of a remote device, as reported by the transport.
///
/// Usually a MAC address such as `AA:BB:CC:DD:EE:FF`. Identifiers compare
/// case-insensitively, so `aa:bb:cc:dd:ee:ff` names the same peripheral.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Eq)]
pub struct PeripheralId(String<PERIPHERAL_ID_MAX>);

impl PeripheralId {
    /// Create an identifier, failing if it is empty or too long.
    pub fn new(id: &str) -> Result<Self, Error> {
        if id.is_empty() {
            return Err(Error::InvalidLength);
        }
        let mut s = String::new();
        s.push_str(id).map_err(|_| Error::InvalidLength)?;
        Ok(Self(s))
    }

    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Case-insensitive comparison against a plain string.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl PartialEq for PeripheralId {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other.as_str())
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered or connected remote device.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub struct Peripheral {
    id: PeripheralId,
    name: String<PERIPHERAL_NAME_MAX>,
}

impl Peripheral {
    /// Create a peripheral. Names longer than the configured maximum are truncated.
    pub fn new(id: &str, name: &str) -> Result<Self, Error> {
        Ok(Self {
            id: PeripheralId::new(id)?,
            name: truncate(name),
        })
    }

    /// Identifier of the peripheral.
    pub fn id(&self) -> &PeripheralId {
        &self.id
    }

    /// Human-readable name, empty if the peripheral did not report one.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

/// Advertisement data delivered alongside a discovered peripheral.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Advertisement {
    /// Complete or shortened local name.
    pub local_name: Option<String<PERIPHERAL_NAME_MAX>>,
    /// Advertised TX power level (dBm).
    pub tx_power_level: Option<i8>,
    /// Manufacturer specific data, company identifier included.
    pub manufacturer_data: Vec<u8, ADV_DATA_MAX>,
    /// Service data, service UUID included.
    pub service_data: Vec<u8, ADV_DATA_MAX>,
    /// Advertised service UUIDs.
    pub services: Vec<Uuid, ADV_SERVICES_MAX>,
    /// Whether the peripheral accepts connections.
    pub connectable: bool,
}

impl Advertisement {
    /// Set the local name, truncating it if needed.
    pub fn with_local_name(mut self, name: &str) -> Self {
        self.local_name = Some(truncate(name));
        self
    }

    /// Set the manufacturer data.
    pub fn with_manufacturer_data(mut self, data: &[u8]) -> Result<Self, Error> {
        self.manufacturer_data = Vec::from_slice(data).map_err(|_| Error::InsufficientSpace)?;
        Ok(self)
    }

    /// Add an advertised service.
    pub fn with_service(mut self, uuid: Uuid) -> Result<Self, Error> {
        self.services.push(uuid).map_err(|_| Error::InsufficientSpace)?;
        Ok(self)
    }
}

fn truncate<const N: usize>(name: &str) -> String<N> {
    let mut s = String::new();
    for c in name.chars() {
        if s.push(c).is_err() {
            break;
        }
    }
    s
}
