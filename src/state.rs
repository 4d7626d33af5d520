//! Device lifecycle.
//!
//! [`Lifecycle`] holds the transition rules and nothing else: it performs no
//! I/O and invokes no callbacks. The device applies a transition under its
//! lock, releases the lock, and only then notifies the application.
use crate::types::peripheral::{Peripheral, PeripheralId};
use crate::Error;

/// Lifecycle state of a device.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No power report received from the transport yet.
    Unknown,
    /// The adapter is off.
    PoweredOff,
    /// The adapter is on and idle.
    PoweredOn,
    /// Scanning for advertisements.
    Scanning,
    /// A connection attempt is in progress.
    Connecting,
    /// Connected to a peripheral.
    Connected,
    /// The last connection was closed.
    Disconnected,
}

/// A committed state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub from: State,
    pub to: State,
}

pub(crate) struct Lifecycle {
    state: State,
    // State to return to if the pending connection attempt fails.
    resume: State,
    peer: Option<Peripheral>,
}

impl Lifecycle {
    pub(crate) const fn new() -> Self {
        Self {
            state: State::Unknown,
            resume: State::Unknown,
            peer: None,
        }
    }

    pub(crate) fn state(&self) -> State {
        self.state
    }

    /// The peripheral being connected to, or the connected one.
    pub(crate) fn peer(&self) -> Option<&Peripheral> {
        self.peer.as_ref()
    }

    /// Forget the session and go back to [`State::Unknown`].
    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }

    fn enter(&mut self, to: State) -> Transition {
        let t = Transition { from: self.state, to };
        self.state = to;
        t
    }

    /// Apply a power report. Returns the transition and, when power was
    /// lost mid-session, the peripheral that was dropped.
    pub(crate) fn power(&mut self, powered: bool) -> Option<(Transition, Option<Peripheral>)> {
        match (powered, self.state) {
            (false, State::PoweredOff) => None,
            (false, _) => Some((self.enter(State::PoweredOff), self.peer.take())),
            (true, State::Unknown | State::PoweredOff) => Some((self.enter(State::PoweredOn), None)),
            (true, _) => None,
        }
    }

    /// Returns `Ok(None)` if already scanning.
    pub(crate) fn start_scan(&mut self) -> Result<Option<Transition>, Error> {
        match self.state {
            State::PoweredOn | State::Disconnected => Ok(Some(self.enter(State::Scanning))),
            State::Scanning => Ok(None),
            State::PoweredOff => Err(Error::PoweredOff),
            other => Err(Error::InvalidState(other)),
        }
    }

    pub(crate) fn stop_scan(&mut self) -> Option<Transition> {
        match self.state {
            State::Scanning => Some(self.enter(State::PoweredOn)),
            _ => None,
        }
    }

    /// Undo `t` if nothing has moved the state since.
    pub(crate) fn revert(&mut self, t: Transition) -> bool {
        if self.state != t.to {
            return false;
        }
        self.state = t.from;
        true
    }

    pub(crate) fn begin_connect(&mut self, peripheral: &Peripheral) -> Result<Transition, Error> {
        self.resume = match self.state {
            State::PoweredOn | State::Disconnected => State::PoweredOn,
            State::Scanning => State::Scanning,
            State::PoweredOff => return Err(Error::PoweredOff),
            other => return Err(Error::InvalidState(other)),
        };
        self.peer = Some(peripheral.clone());
        Ok(self.enter(State::Connecting))
    }

    fn is_pending(&self, id: &PeripheralId) -> bool {
        self.state == State::Connecting && self.peer.as_ref().is_some_and(|p| p.id() == id)
    }

    /// Whether `id` is the connected peripheral.
    pub(crate) fn is_connected(&self, id: &PeripheralId) -> bool {
        self.state == State::Connected && self.peer.as_ref().is_some_and(|p| p.id() == id)
    }

    pub(crate) fn ensure_connected(&self, id: &PeripheralId) -> Result<(), Error> {
        match self.state {
            State::PoweredOff => Err(Error::PoweredOff),
            _ if self.is_connected(id) => Ok(()),
            _ => Err(Error::NotConnected),
        }
    }

    /// The pending attempt for `id` succeeded.
    pub(crate) fn connected(&mut self, id: &PeripheralId) -> Option<(Transition, Peripheral)> {
        if !self.is_pending(id) {
            return None;
        }
        let peer = self.peer.clone()?;
        Some((self.enter(State::Connected), peer))
    }

    /// The pending attempt for `id` failed.
    pub(crate) fn connect_failed(&mut self, id: &PeripheralId) -> Option<(Transition, Peripheral)> {
        if !self.is_pending(id) {
            return None;
        }
        let peer = self.peer.take()?;
        let to = self.resume;
        Some((self.enter(to), peer))
    }

    /// The link to `id` went away. While connecting this counts as a failed
    /// attempt, which the caller can tell from `Transition::from`.
    pub(crate) fn disconnected(&mut self, id: &PeripheralId) -> Option<(Transition, Peripheral)> {
        if self.is_pending(id) {
            return self.connect_failed(id);
        }
        if !self.is_connected(id) {
            return None;
        }
        let peer = self.peer.take()?;
        Some((self.enter(State::Disconnected), peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> Peripheral {
        Peripheral::new("AA:BB:CC:DD:EE:FF", "Light").unwrap()
    }

    fn powered() -> Lifecycle {
        let mut l = Lifecycle::new();
        l.power(true);
        l
    }

    #[test]
    fn first_power_report_leaves_unknown() {
        let mut l = Lifecycle::new();
        assert_eq!(l.state(), State::Unknown);
        let (t, _) = l.power(false).unwrap();
        assert_eq!(t, Transition { from: State::Unknown, to: State::PoweredOff });
        assert!(l.power(false).is_none());
        let (t, _) = l.power(true).unwrap();
        assert_eq!(t.to, State::PoweredOn);
        assert!(l.power(true).is_none());
    }

    #[test]
    fn scan_and_stop() {
        let mut l = powered();
        assert_eq!(
            l.start_scan(),
            Ok(Some(Transition { from: State::PoweredOn, to: State::Scanning }))
        );
        assert_eq!(l.start_scan(), Ok(None));
        assert_eq!(
            l.stop_scan(),
            Some(Transition { from: State::Scanning, to: State::PoweredOn })
        );
        assert_eq!(l.stop_scan(), None);
    }

    #[test]
    fn revert_only_when_unchanged() {
        let mut l = powered();
        let t = l.start_scan().unwrap().unwrap();
        assert!(l.revert(t));
        assert_eq!(l.state(), State::PoweredOn);

        let t = l.start_scan().unwrap().unwrap();
        l.power(false);
        assert!(!l.revert(t));
        assert_eq!(l.state(), State::PoweredOff);
    }

    #[test]
    fn scan_rejected_while_off_or_connected() {
        let mut l = Lifecycle::new();
        l.power(false);
        assert_eq!(l.start_scan(), Err(Error::PoweredOff));

        let mut l = powered();
        let p = light();
        l.begin_connect(&p).unwrap();
        assert_eq!(l.start_scan(), Err(Error::InvalidState(State::Connecting)));
        l.connected(p.id()).unwrap();
        assert_eq!(l.start_scan(), Err(Error::InvalidState(State::Connected)));
    }

    #[test]
    fn failed_connect_reverts_and_allows_retry() {
        let mut l = powered();
        let p = light();
        l.start_scan().unwrap();

        let t = l.begin_connect(&p).unwrap();
        assert_eq!(t, Transition { from: State::Scanning, to: State::Connecting });
        let (t, failed) = l.connect_failed(p.id()).unwrap();
        assert_eq!(t.to, State::Scanning);
        assert_eq!(failed, p);
        assert!(l.peer().is_none());

        l.begin_connect(&p).unwrap();
        let (t, _) = l.connected(p.id()).unwrap();
        assert_eq!(t.to, State::Connected);
        assert!(l.ensure_connected(p.id()).is_ok());
    }

    #[test]
    fn outcome_for_other_peripheral_ignored() {
        let mut l = powered();
        let p = light();
        let other = PeripheralId::new("11:22:33:44:55:66").unwrap();
        l.begin_connect(&p).unwrap();
        assert!(l.connected(&other).is_none());
        assert!(l.connect_failed(&other).is_none());
        assert_eq!(l.state(), State::Connecting);
    }

    #[test]
    fn disconnect_while_connecting_is_a_failure() {
        let mut l = powered();
        let p = light();
        l.begin_connect(&p).unwrap();
        let (t, _) = l.disconnected(p.id()).unwrap();
        assert_eq!(t, Transition { from: State::Connecting, to: State::PoweredOn });
    }

    #[test]
    fn disconnect_ends_session() {
        let mut l = powered();
        let p = light();
        l.begin_connect(&p).unwrap();
        l.connected(p.id()).unwrap();

        let (t, peer) = l.disconnected(p.id()).unwrap();
        assert_eq!(t, Transition { from: State::Connected, to: State::Disconnected });
        assert_eq!(peer, p);
        assert_eq!(l.ensure_connected(p.id()), Err(Error::NotConnected));
        assert!(l.disconnected(p.id()).is_none());

        // A new session may start from here.
        assert_eq!(
            l.begin_connect(&p),
            Ok(Transition { from: State::Disconnected, to: State::Connecting })
        );
        let (t, _) = l.connect_failed(p.id()).unwrap();
        assert_eq!(t.to, State::PoweredOn);
    }

    #[test]
    fn power_loss_drops_session() {
        let mut l = powered();
        let p = light();
        l.begin_connect(&p).unwrap();
        l.connected(p.id()).unwrap();

        let (t, dropped) = l.power(false).unwrap();
        assert_eq!(t.from, State::Connected);
        assert_eq!(dropped, Some(p.clone()));
        assert_eq!(l.ensure_connected(p.id()), Err(Error::PoweredOff));
        assert_eq!(l.begin_connect(&p), Err(Error::PoweredOff));
    }

    #[test]
    fn reset_forgets_session() {
        let mut l = powered();
        let p = light();
        l.begin_connect(&p).unwrap();
        l.connected(p.id()).unwrap();

        l.reset();
        assert_eq!(l.state(), State::Unknown);
        assert!(l.peer().is_none());
        assert_eq!(l.ensure_connected(p.id()), Err(Error::NotConnected));
        let (t, dropped) = l.power(true).unwrap();
        assert_eq!(t, Transition { from: State::Unknown, to: State::PoweredOn });
        assert!(dropped.is_none());
    }
}
