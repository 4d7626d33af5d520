//! Lifecycle callbacks.
//!
//! The device holds one optional callback per event category. Callbacks run
//! synchronously on the task delivering the event, and the next event of
//! that category is not processed until the callback returns. A callback
//! that needs to do GATT work should hand off to another task (for example
//! through an `embassy_sync::signal::Signal`) rather than wait inline.
use crate::state::State;
use crate::types::peripheral::{Advertisement, Peripheral};
use crate::Error;

/// Called on every lifecycle state transition.
pub type StateChangedHandler<'d> = &'d (dyn Fn(State) + Sync);
/// Called for each advertisement received while scanning, with its signal strength.
pub type DiscoveredHandler<'d> = &'d (dyn Fn(&Peripheral, &Advertisement, i8) + Sync);
/// Called when a connection attempt completes. The error is `None` on success.
pub type ConnectedHandler<'d> = &'d (dyn Fn(&Peripheral, Option<Error>) + Sync);
/// Called when a connection closes. The error is `None` for a clean disconnect.
pub type DisconnectedHandler<'d> = &'d (dyn Fn(&Peripheral, Option<Error>) + Sync);

/// A callback for one event category.
#[derive(Clone, Copy)]
pub enum Handler<'d> {
    /// Lifecycle state changes.
    StateChanged(StateChangedHandler<'d>),
    /// Discovered peripherals.
    PeripheralDiscovered(DiscoveredHandler<'d>),
    /// Completed connection attempts.
    PeripheralConnected(ConnectedHandler<'d>),
    /// Closed connections.
    PeripheralDisconnected(DisconnectedHandler<'d>),
}

/// Fixed table of lifecycle callbacks.
#[derive(Clone, Copy, Default)]
pub struct HandlerTable<'d> {
    state_changed: Option<StateChangedHandler<'d>>,
    discovered: Option<DiscoveredHandler<'d>>,
    connected: Option<ConnectedHandler<'d>>,
    disconnected: Option<DisconnectedHandler<'d>>,
}

impl<'d> HandlerTable<'d> {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self {
            state_changed: None,
            discovered: None,
            connected: None,
            disconnected: None,
        }
    }

    /// Store a callback, replacing the previous one of the same category.
    pub fn set(&mut self, handler: Handler<'d>) {
        let replaced = match handler {
            Handler::StateChanged(f) => self.state_changed.replace(f).is_some(),
            Handler::PeripheralDiscovered(f) => self.discovered.replace(f).is_some(),
            Handler::PeripheralConnected(f) => self.connected.replace(f).is_some(),
            Handler::PeripheralDisconnected(f) => self.disconnected.replace(f).is_some(),
        };
        if replaced {
            debug!("[device] replaced a registered handler");
        }
    }

    pub(crate) fn state_changed(&self, state: State) {
        if let Some(f) = self.state_changed {
            f(state);
        }
    }

    /// Returns `false` if no discovery callback is registered.
    pub(crate) fn discovered(&self, peripheral: &Peripheral, advertisement: &Advertisement, rssi: i8) -> bool {
        match self.discovered {
            Some(f) => {
                f(peripheral, advertisement, rssi);
                true
            }
            None => false,
        }
    }

    pub(crate) fn connected(&self, peripheral: &Peripheral, error: Option<Error>) {
        match self.connected {
            Some(f) => f(peripheral, error),
            None => {
                if let Some(e) = error {
                    trace!("[device] connect error {:?} dropped, no handler", e);
                }
            }
        }
    }

    pub(crate) fn disconnected(&self, peripheral: &Peripheral, error: Option<Error>) {
        if let Some(f) = self.disconnected {
            f(peripheral, error);
        }
    }
}
