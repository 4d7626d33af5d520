//! GATT objects discovered on a connected peripheral.
use crate::types::uuid::Uuid;

/// Client characteristic configuration value enabling notifications.
pub const CCCD_NOTIFY: [u8; 2] = [0x01, 0x00];
/// Client characteristic configuration value enabling indications.
pub const CCCD_INDICATE: [u8; 2] = [0x02, 0x00];
/// Client characteristic configuration value disabling both.
pub const CCCD_DISABLED: [u8; 2] = [0x00, 0x00];

/// A primary service and the attribute handle range it covers.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Clone)]
pub struct Service {
    /// Service UUID.
    pub uuid: Uuid,
    /// First attribute handle of the service.
    pub start: u16,
    /// Last attribute handle of the service.
    pub end: u16,
}

impl Service {
    /// Create a new service.
    pub const fn new(uuid: Uuid, start: u16, end: u16) -> Self {
        Self { uuid, start, end }
    }

    /// Whether an attribute handle falls inside this service.
    pub fn contains(&self, handle: u16) -> bool {
        (self.start..=self.end).contains(&handle)
    }
}

/// Characteristic properties, as found in the characteristic declaration.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct CharacteristicProps(pub u8);

impl CharacteristicProps {
    /// Broadcast
    pub const BROADCAST: u8 = 0x01;
    /// Read
    pub const READ: u8 = 0x02;
    /// Write without response
    pub const WRITE_WITHOUT_RESPONSE: u8 = 0x04;
    /// Write
    pub const WRITE: u8 = 0x08;
    /// Notify
    pub const NOTIFY: u8 = 0x10;
    /// Indicate
    pub const INDICATE: u8 = 0x20;

    fn has(&self, prop: u8) -> bool {
        self.0 & prop != 0
    }

    /// Value can be read.
    pub fn can_read(&self) -> bool {
        self.has(Self::READ)
    }

    /// Value can be written, with or without response.
    pub fn can_write(&self) -> bool {
        self.has(Self::WRITE) || self.has(Self::WRITE_WITHOUT_RESPONSE)
    }

    /// Value changes can be notified.
    pub fn can_notify(&self) -> bool {
        self.has(Self::NOTIFY)
    }

    /// Value changes can be indicated.
    pub fn can_indicate(&self) -> bool {
        self.has(Self::INDICATE)
    }
}

/// A characteristic within a discovered service.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Clone)]
pub struct Characteristic {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Handle of the characteristic declaration.
    pub handle: u16,
    /// Handle of the characteristic value. Reads, writes and notifications use this one.
    pub value_handle: u16,
    /// Declared properties.
    pub props: CharacteristicProps,
    /// Handle of the client characteristic configuration descriptor, if present.
    pub cccd_handle: Option<u16>,
}

impl Characteristic {
    /// Create a characteristic without a configuration descriptor.
    pub const fn new(uuid: Uuid, handle: u16, value_handle: u16, props: u8) -> Self {
        Self {
            uuid,
            handle,
            value_handle,
            props: CharacteristicProps(props),
            cccd_handle: None,
        }
    }

    /// Attach the configuration descriptor handle.
    pub const fn with_cccd(mut self, cccd_handle: u16) -> Self {
        self.cccd_handle = Some(cccd_handle);
        self
    }

    /// CCCD value that enables updates for this characteristic.
    ///
    /// Notifications are preferred; indications are used when they are the
    /// only kind of update the characteristic supports.
    pub fn subscription_value(&self) -> Option<[u8; 2]> {
        if self.props.can_notify() {
            Some(CCCD_NOTIFY)
        } else if self.props.can_indicate() {
            Some(CCCD_INDICATE)
        } else {
            None
        }
    }
}
