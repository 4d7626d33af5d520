//! Compile-time configuration.
//!
//! All containers in the bridge are fixed size. The capacities below bound
//! what a single transport event can carry; data that does not fit is
//! truncated or rejected where it enters the bridge.

/// Maximum length of a peripheral identifier.
///
/// Identifiers are either a MAC address (`AA:BB:CC:DD:EE:FF`) or a
/// platform UUID string, both of which fit.
///
/// Default: 40.
pub const PERIPHERAL_ID_MAX: usize = 40;

/// Maximum length of a peripheral's human-readable name.
///
/// Longer names are truncated.
///
/// Default: 32.
pub const PERIPHERAL_NAME_MAX: usize = 32;

/// Maximum length of manufacturer or service data in an advertisement.
///
/// Default: 31.
pub const ADV_DATA_MAX: usize = 31;

/// Maximum number of service UUIDs retained from an advertisement.
///
/// Default: 4.
pub const ADV_SERVICES_MAX: usize = 4;

/// Maximum number of services returned by a single discovery.
///
/// Default: 8.
pub const MAX_SERVICES: usize = 8;

/// Maximum number of characteristics returned by a single discovery.
///
/// Default: 16.
pub const MAX_CHARACTERISTICS: usize = 16;

/// Maximum length of a characteristic value.
///
/// Default: 512.
pub const VALUE_MAX: usize = 512;

/// Default number of notification subscriptions a device can hold.
///
/// Default: 16.
pub const DEFAULT_SUBSCRIBERS: usize = 16;
