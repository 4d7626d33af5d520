//! Routing of notifications to their handlers.
//!
//! Every value the peer pushes carries the attribute handle it belongs to.
//! The registry maps that handle to the single handler interested in it.
//!
//! The registry may be reached before the owning device has finished
//! initializing, or after it has been closed. In that state every operation
//! logs a warning and does nothing; `lookup` reports no handler.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::LinearMap;

use crate::config::DEFAULT_SUBSCRIBERS;
use crate::Error;

/// Handler invoked once per notification or indication for its handle.
pub type NotificationHandler<'d> = &'d (dyn Fn(&[u8], Option<Error>) + Sync);

/// Attribute handle to handler map, at most one handler per handle.
pub struct HandlerMap<'d, const N: usize> {
    inner: LinearMap<u16, NotificationHandler<'d>, N>,
}

impl<'d, const N: usize> Default for HandlerMap<'d, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'d, const N: usize> HandlerMap<'d, N> {
    /// Create an empty map.
    pub const fn new() -> Self {
        Self { inner: LinearMap::new() }
    }

    /// Register `handler` for `handle`, replacing any previous handler.
    ///
    /// Fails only when `handle` is new and the map is full.
    pub fn subscribe(&mut self, handle: u16, handler: NotificationHandler<'d>) -> Result<(), Error> {
        self.inner
            .insert(handle, handler)
            .map(|_| ())
            .map_err(|_| Error::InsufficientSpace)
    }

    /// Remove the handler for `handle`. Returns whether one was registered.
    pub fn unsubscribe(&mut self, handle: u16) -> bool {
        self.inner.remove(&handle).is_some()
    }

    /// Handler registered for `handle`.
    pub fn lookup(&self, handle: u16) -> Option<NotificationHandler<'d>> {
        self.inner.get(&handle).copied()
    }

    /// Remove all handlers.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Thread-safe handler map with an explicit uninitialized state.
///
/// A single lock guards the map. It is held only for the map update itself;
/// handlers are returned by `lookup` and invoked by the caller after the
/// lock is released, so a handler may subscribe or unsubscribe freely.
pub struct SubscriberRegistry<'d, M: RawMutex, const N: usize = DEFAULT_SUBSCRIBERS> {
    state: Mutex<M, RefCell<Option<HandlerMap<'d, N>>>>,
}

impl<'d, M: RawMutex, const N: usize> Default for SubscriberRegistry<'d, M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'d, M: RawMutex, const N: usize> SubscriberRegistry<'d, M, N> {
    /// Create an uninitialized registry.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(None)),
        }
    }

    /// Create a registry that is ready for use.
    pub const fn initialized() -> Self {
        Self {
            state: Mutex::new(RefCell::new(Some(HandlerMap::new()))),
        }
    }

    /// Make the registry usable. Existing registrations are kept.
    pub fn initialize(&self) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.is_none() {
                *state = Some(HandlerMap::new());
            }
        });
    }

    /// Drop all registrations and return to the uninitialized state.
    pub fn teardown(&self) {
        self.state.lock(|state| {
            state.borrow_mut().take();
        });
        debug!("[registry] torn down");
    }

    /// Whether the registry is usable.
    pub fn is_initialized(&self) -> bool {
        self.state.lock(|state| state.borrow().is_some())
    }

    /// Register `handler` for `handle`, replacing any previous handler.
    pub fn subscribe(&self, handle: u16, handler: NotificationHandler<'d>) {
        match self.try_subscribe(handle, handler) {
            Ok(()) => trace!("[registry] subscribed handle {}", handle),
            Err(Error::NotInitialized) => {
                warn!("[registry] subscribe({}) on uninitialized registry, ignored", handle)
            }
            Err(_) => warn!("[registry] no room for handle {}, dropping subscription", handle),
        }
    }

    /// Like [`Self::subscribe`], but reports why a registration was not made.
    pub fn try_subscribe(&self, handle: u16, handler: NotificationHandler<'d>) -> Result<(), Error> {
        self.state.lock(|state| match state.borrow_mut().as_mut() {
            Some(map) => map.subscribe(handle, handler),
            None => Err(Error::NotInitialized),
        })
    }

    /// Remove the handler for `handle`, if any.
    pub fn unsubscribe(&self, handle: u16) {
        let removed = self
            .state
            .lock(|state| state.borrow_mut().as_mut().map(|map| map.unsubscribe(handle)));
        match removed {
            Some(true) => trace!("[registry] unsubscribed handle {}", handle),
            Some(false) => {}
            None => warn!("[registry] unsubscribe({}) on uninitialized registry, ignored", handle),
        }
    }

    /// Handler currently registered for `handle`.
    pub fn lookup(&self, handle: u16) -> Option<NotificationHandler<'d>> {
        let found = self
            .state
            .lock(|state| state.borrow().as_ref().map(|map| map.lookup(handle)));
        match found {
            Some(handler) => handler,
            None => {
                warn!("[registry] lookup({}) on uninitialized registry", handle);
                None
            }
        }
    }

    /// Remove all handlers, keeping the registry initialized.
    pub fn clear(&self) {
        self.state.lock(|state| {
            if let Some(map) = state.borrow_mut().as_mut() {
                map.clear();
            }
        });
    }

    /// Number of registered handlers. Zero when uninitialized.
    pub fn len(&self) -> usize {
        self.state
            .lock(|state| state.borrow().as_ref().map(|map| map.len()).unwrap_or(0))
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
