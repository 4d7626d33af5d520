//! UUID types.
use core::fmt;
use core::str::FromStr;

use crate::Error;

/// A 16-bit or 128-bit UUID.
///
/// Bytes are stored little-endian, the way they travel over the air.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Uuid {
    /// 16-bit UUID
    Uuid16([u8; 2]),
    /// 128-bit UUID
    Uuid128([u8; 16]),
}

impl From<u16> for Uuid {
    fn from(data: u16) -> Self {
        Uuid::Uuid16(data.to_le_bytes())
    }
}

impl From<u128> for Uuid {
    fn from(data: u128) -> Self {
        Uuid::Uuid128(data.to_le_bytes())
    }
}

impl From<[u8; 2]> for Uuid {
    fn from(data: [u8; 2]) -> Self {
        Uuid::Uuid16(data)
    }
}

impl From<[u8; 16]> for Uuid {
    fn from(data: [u8; 16]) -> Self {
        Uuid::Uuid128(data)
    }
}

impl Uuid {
    /// Create a new 16-bit UUID.
    pub const fn new_short(val: u16) -> Self {
        Self::Uuid16(val.to_le_bytes())
    }

    /// Create a new 128-bit UUID.
    pub const fn new_long(val: [u8; 16]) -> Self {
        Self::Uuid128(val)
    }

    /// Get the 16-bit UUID value, if this is a short UUID.
    pub fn as_short(&self) -> Option<u16> {
        match self {
            Uuid::Uuid16(data) => Some(u16::from_le_bytes(*data)),
            Uuid::Uuid128(_) => None,
        }
    }

    /// Get the raw UUID bytes.
    pub fn as_raw(&self) -> &[u8] {
        match self {
            Uuid::Uuid16(uuid) => uuid,
            Uuid::Uuid128(uuid) => uuid,
        }
    }
}

impl TryFrom<&[u8]> for Uuid {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        match value.len() {
            2 => Ok(Uuid::Uuid16([value[0], value[1]])),
            16 => {
                let mut bytes = [0; 16];
                bytes.copy_from_slice(value);
                Ok(Uuid::Uuid128(bytes))
            }
            _ => Err(Error::InvalidLength),
        }
    }
}

/// Parse a UUID from its hexadecimal form.
///
/// Accepts 4 hex digits (`"ffe0"`) for a 16-bit UUID, or 32 hex digits for a
/// 128-bit UUID. Dashes are ignored, so the canonical
/// `0000ffe0-0000-1000-8000-00805f9b34fb` form is accepted as well.
impl FromStr for Uuid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut raw = [0u8; 16];
        let mut nibbles = 0;
        for c in s.bytes() {
            let v = match c {
                b'-' => continue,
                b'0'..=b'9' => c - b'0',
                b'a'..=b'f' => c - b'a' + 10,
                b'A'..=b'F' => c - b'A' + 10,
                _ => return Err(Error::InvalidUuid),
            };
            if nibbles == raw.len() * 2 {
                return Err(Error::InvalidLength);
            }
            raw[nibbles / 2] |= if nibbles % 2 == 0 { v << 4 } else { v };
            nibbles += 1;
        }

        match nibbles {
            4 => Ok(Uuid::new_short(u16::from_be_bytes([raw[0], raw[1]]))),
            32 => {
                raw.reverse();
                Ok(Uuid::Uuid128(raw))
            }
            _ => Err(Error::InvalidLength),
        }
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uuid::Uuid16(data) => write!(f, "{:04x}", u16::from_le_bytes(*data)),
            Uuid::Uuid128(data) => {
                for (i, b) in data.iter().rev().enumerate() {
                    if matches!(i, 4 | 6 | 8 | 10) {
                        f.write_str("-")?;
                    }
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}
