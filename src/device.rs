//! The device: lifecycle, event dispatch and GATT operations.
//!
//! A [`Device`] is driven by two kinds of callers. [`Device::run`] pulls
//! events from the transport and dispatches them, invoking lifecycle and
//! notification handlers inline. Operations such as [`Device::connect`] or
//! [`Device::read_characteristic`] are called from other tasks; they send a
//! command and wait for the run loop to hand them the matching answer.
//!
//! `run` must be polled for any operation that waits on an answer to make
//! progress.
use core::cell::{Cell, RefCell};

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};
use heapless::Vec;

use crate::config::{DEFAULT_SUBSCRIBERS, MAX_CHARACTERISTICS, MAX_SERVICES, VALUE_MAX};
use crate::gatt::{Characteristic, Service, CCCD_DISABLED};
use crate::handler::{Handler, HandlerTable, StateChangedHandler};
use crate::response::{Pending, Response};
use crate::state::{Lifecycle, State, Transition};
use crate::subscriber::{NotificationHandler, SubscriberRegistry};
use crate::transport::{Command, Transport, TransportEvent};
use crate::types::peripheral::{Peripheral, PeripheralId};
use crate::types::uuid::Uuid;
use crate::{BridgeError, Error};

/// Runtime configuration of a [`Device`].
#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig {
    /// How long [`Device::connect`] waits for the transport to report the outcome.
    ///
    /// Default: 10 seconds.
    pub connect_timeout: Duration,
    /// How long discovery, read, write and RSSI requests wait for an answer.
    ///
    /// Default: 5 seconds.
    pub operation_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(5),
        }
    }
}

/// A BLE central reached through a [`Transport`].
///
/// `M` selects the mutex used for shared state: `NoopRawMutex` when the
/// device is only used from one executor, `CriticalSectionRawMutex` when
/// it is shared between threads. `N` is the notification registry capacity.
pub struct Device<'d, T: Transport, M: RawMutex, const N: usize = DEFAULT_SUBSCRIBERS> {
    transport: T,
    config: DeviceConfig,
    handlers: HandlerTable<'d>,
    lifecycle: Mutex<M, RefCell<Lifecycle>>,
    subscribers: SubscriberRegistry<'d, M, N>,
    connect_result: Signal<M, Result<(), Error>>,
    pending: Pending<M>,
    open: Mutex<M, Cell<bool>>,
    closed: Signal<M, ()>,
}

impl<'d, T: Transport, M: RawMutex, const N: usize> Device<'d, T, M, N> {
    /// Create a device. Nothing is sent until [`Device::init`].
    pub fn new(transport: T, config: DeviceConfig) -> Self {
        Self {
            transport,
            config,
            handlers: HandlerTable::new(),
            lifecycle: Mutex::new(RefCell::new(Lifecycle::new())),
            subscribers: SubscriberRegistry::new(),
            connect_result: Signal::new(),
            pending: Pending::new(),
            open: Mutex::new(Cell::new(false)),
            closed: Signal::new(),
        }
    }

    /// Register a lifecycle callback, replacing any previous one of the same kind.
    pub fn handle(&mut self, handler: Handler<'d>) -> &mut Self {
        self.handlers.set(handler);
        self
    }

    /// Open the transport and make the device ready for use.
    ///
    /// `on_state_changed` is called for every lifecycle transition from now on,
    /// starting with the transport's first power report.
    pub async fn init(&mut self, on_state_changed: StateChangedHandler<'d>) -> Result<(), BridgeError<T::Error>> {
        self.handlers.set(Handler::StateChanged(on_state_changed));
        self.transport.open().await.map_err(BridgeError::Transport)?;
        self.closed.reset();
        self.subscribers.initialize();
        self.open.lock(|o| o.set(true));
        info!("[device] initialized");
        Ok(())
    }

    /// Stop the run loop, fail any waiting request and drop all notification handlers.
    ///
    /// A pending [`Device::connect`] returns [`Error::NotInitialized`] without
    /// invoking the connect handler. The state goes back to [`State::Unknown`]
    /// silently. Every later operation fails with [`Error::NotInitialized`]
    /// and registry calls become logged no-ops until the device is
    /// initialized again.
    pub fn close(&self) {
        self.open.lock(|o| o.set(false));
        self.subscribers.teardown();
        self.pending.abort(Error::NotInitialized);
        self.connect_result.signal(Err(Error::NotInitialized));
        self.with_lifecycle(|l| l.reset());
        self.closed.signal(());
        info!("[device] closed");
    }

    /// Receive and dispatch transport events until the device is closed.
    pub async fn run(&self) -> Result<(), BridgeError<T::Error>> {
        self.ensure_open()?;
        loop {
            match select(self.transport.receive(), self.closed.wait()).await {
                Either::First(event) => {
                    let event = event.map_err(BridgeError::Transport)?;
                    self.dispatch(event);
                }
                Either::Second(_) => {
                    debug!("[device] run loop stopped");
                    return Ok(());
                }
            }
        }
    }

    /// The transport this device talks through.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.with_lifecycle(|l| l.state())
    }

    /// The peripheral being connected to, or the connected one.
    pub fn peer(&self) -> Option<Peripheral> {
        self.with_lifecycle(|l| l.peer().cloned())
    }

    /// Notification handlers of the current connection.
    pub fn subscribers(&self) -> &SubscriberRegistry<'d, M, N> {
        &self.subscribers
    }

    /// Start scanning for advertisements.
    ///
    /// Discovered peripherals are reported to the
    /// [`Handler::PeripheralDiscovered`] callback until
    /// [`Device::stop_scanning`] is called; scanning is not stopped
    /// automatically. Calling this while already scanning re-issues the scan
    /// with the new filter.
    pub async fn scan(&self, services: &[Uuid], allow_duplicates: bool) -> Result<(), BridgeError<T::Error>> {
        self.ensure_open()?;
        let transition = self.with_lifecycle(|l| l.start_scan())?;
        let command = Command::StartScan {
            services,
            allow_duplicates,
        };
        if let Err(e) = self.transport.send(command).await {
            if let Some(t) = transition {
                self.with_lifecycle(|l| l.revert(t));
            }
            return Err(BridgeError::Transport(e));
        }
        if let Some(t) = transition {
            self.notify(t);
        }
        Ok(())
    }

    /// Stop scanning. Does nothing when not scanning.
    pub async fn stop_scanning(&self) -> Result<(), BridgeError<T::Error>> {
        self.ensure_open()?;
        let Some(t) = self.with_lifecycle(|l| l.stop_scan()) else {
            trace!("[device] not scanning");
            return Ok(());
        };
        if let Err(e) = self.transport.send(Command::StopScan).await {
            self.with_lifecycle(|l| l.revert(t));
            return Err(BridgeError::Transport(e));
        }
        self.notify(t);
        Ok(())
    }

    /// Connect to a peripheral and wait for the outcome.
    ///
    /// The [`Handler::PeripheralConnected`] callback is invoked with the
    /// outcome before this returns. On failure the device goes back to the
    /// state the attempt was made from, and a new attempt may be made.
    pub async fn connect(&self, peripheral: &Peripheral) -> Result<(), BridgeError<T::Error>> {
        self.ensure_open()?;
        let t = self.with_lifecycle(|l| l.begin_connect(peripheral))?;
        self.connect_result.reset();
        self.notify(t);

        let id = peripheral.id();
        info!("[device] connecting to {}", id);
        if let Err(e) = self.transport.send(Command::Connect(id)).await {
            if let Some((t, peer)) = self.with_lifecycle(|l| l.connect_failed(id)) {
                warn!("[device] connect command for {} not sent", id);
                self.notify(t);
                self.handlers.connected(&peer, Some(Error::TransportFailed));
            }
            return Err(BridgeError::Transport(e));
        }

        match with_timeout(self.config.connect_timeout, self.connect_result.wait()).await {
            Ok(result) => result.map_err(BridgeError::Bridge),
            // Closed just as the timer fired.
            Err(_) if !self.is_open() => Err(Error::NotInitialized.into()),
            Err(_) => match self.with_lifecycle(|l| l.connect_failed(id)) {
                Some((t, peer)) => {
                    warn!("[device] connection to {} timed out", id);
                    let cancelled = self.transport.send(Command::CancelConnection(id)).await;
                    self.notify(t);
                    self.handlers.connected(&peer, Some(Error::Timeout));
                    cancelled.map_err(BridgeError::Transport)?;
                    Err(Error::Timeout.into())
                }
                // The outcome arrived just as the timer fired.
                None => self.connect_result.wait().await.map_err(BridgeError::Bridge),
            },
        }
    }

    /// Ask the transport to close the connection to `peripheral`, or abort
    /// a pending attempt.
    ///
    /// Returns once the request is sent. Completion is reported through the
    /// [`Handler::PeripheralDisconnected`] callback.
    pub async fn cancel_connection(&self, peripheral: &Peripheral) -> Result<(), BridgeError<T::Error>> {
        self.ensure_open()?;
        self.transport
            .send(Command::CancelConnection(peripheral.id()))
            .await
            .map_err(BridgeError::Transport)
    }

    /// Discover primary services. An empty filter discovers all of them.
    pub async fn discover_services(
        &self,
        peripheral: &Peripheral,
        uuids: &[Uuid],
    ) -> Result<Vec<Service, MAX_SERVICES>, BridgeError<T::Error>> {
        let id = self.ensure_connected(peripheral)?;
        let command = Command::DiscoverServices { id, uuids };
        self.pending
            .exchange(
                self.config.operation_timeout,
                self.transport.send(command),
                |response| match response {
                    Response::Services(services) => Some(services),
                    _ => None,
                },
            )
            .await
    }

    /// Discover the characteristics of `service`. An empty filter discovers all of them.
    pub async fn discover_characteristics(
        &self,
        peripheral: &Peripheral,
        service: &Service,
        uuids: &[Uuid],
    ) -> Result<Vec<Characteristic, MAX_CHARACTERISTICS>, BridgeError<T::Error>> {
        let id = self.ensure_connected(peripheral)?;
        let command = Command::DiscoverCharacteristics { id, service, uuids };
        self.pending
            .exchange(
                self.config.operation_timeout,
                self.transport.send(command),
                |response| match response {
                    Response::Characteristics(characteristics) => Some(characteristics),
                    _ => None,
                },
            )
            .await
    }

    /// Read the value of a characteristic.
    pub async fn read_characteristic(
        &self,
        peripheral: &Peripheral,
        characteristic: &Characteristic,
    ) -> Result<Vec<u8, VALUE_MAX>, BridgeError<T::Error>> {
        let id = self.ensure_connected(peripheral)?;
        let handle = characteristic.value_handle;
        let command = Command::ReadCharacteristic { id, handle };
        self.pending
            .exchange(
                self.config.operation_timeout,
                self.transport.send(command),
                |response| match response {
                    Response::Value { handle: h, result } if h == handle => Some(result),
                    _ => None,
                },
            )
            .await
    }

    /// Write the value of a characteristic.
    ///
    /// With `with_response` the call waits until the peer acknowledges the
    /// write; without, it returns once the transport has taken the command.
    pub async fn write_characteristic(
        &self,
        peripheral: &Peripheral,
        characteristic: &Characteristic,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), BridgeError<T::Error>> {
        self.write(peripheral, characteristic.value_handle, data, with_response)
            .await
    }

    /// Enable notifications (or indications) and route them to `handler`.
    ///
    /// The handler is registered under the characteristic's value handle
    /// before the configuration descriptor is written, so no update is missed.
    pub async fn subscribe_characteristic(
        &self,
        peripheral: &Peripheral,
        characteristic: &Characteristic,
        handler: NotificationHandler<'d>,
    ) -> Result<(), BridgeError<T::Error>> {
        let (Some(cccd), Some(value)) = (characteristic.cccd_handle, characteristic.subscription_value()) else {
            return Err(Error::NotSupported.into());
        };
        self.ensure_connected(peripheral)?;

        let handle = characteristic.value_handle;
        self.subscribers.try_subscribe(handle, handler)?;
        if let Err(e) = self.write(peripheral, cccd, &value, true).await {
            self.subscribers.unsubscribe(handle);
            return Err(e);
        }
        debug!("[device] subscribed to handle {}", handle);
        Ok(())
    }

    /// Disable notifications and drop the handler.
    pub async fn unsubscribe_characteristic(
        &self,
        peripheral: &Peripheral,
        characteristic: &Characteristic,
    ) -> Result<(), BridgeError<T::Error>> {
        let Some(cccd) = characteristic.cccd_handle else {
            return Err(Error::NotSupported.into());
        };
        self.ensure_connected(peripheral)?;
        self.subscribers.unsubscribe(characteristic.value_handle);
        self.write(peripheral, cccd, &CCCD_DISABLED, true).await
    }

    /// Read the signal strength (dBm) of the connection.
    pub async fn read_rssi(&self, peripheral: &Peripheral) -> Result<i8, BridgeError<T::Error>> {
        let id = self.ensure_connected(peripheral)?;
        self.pending
            .exchange(
                self.config.operation_timeout,
                self.transport.send(Command::ReadRssi(id)),
                |response| match response {
                    Response::Rssi(rssi) => Some(rssi),
                    _ => None,
                },
            )
            .await
    }

    async fn write(
        &self,
        peripheral: &Peripheral,
        handle: u16,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), BridgeError<T::Error>> {
        let id = self.ensure_connected(peripheral)?;
        if data.len() > VALUE_MAX {
            return Err(Error::InvalidLength.into());
        }
        let command = Command::WriteCharacteristic {
            id,
            handle,
            data,
            with_response,
        };
        if !with_response {
            return self.transport.send(command).await.map_err(BridgeError::Transport);
        }
        self.pending
            .exchange(
                self.config.operation_timeout,
                self.transport.send(command),
                |response| match response {
                    Response::Written { handle: h, result } if h == handle => Some(result),
                    _ => None,
                },
            )
            .await
    }

    fn is_open(&self) -> bool {
        self.open.lock(|o| o.get())
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn ensure_connected<'p>(&self, peripheral: &'p Peripheral) -> Result<&'p PeripheralId, Error> {
        self.ensure_open()?;
        let id = peripheral.id();
        self.with_lifecycle(|l| l.ensure_connected(id))?;
        Ok(id)
    }

    fn with_lifecycle<R>(&self, f: impl FnOnce(&mut Lifecycle) -> R) -> R {
        self.lifecycle.lock(|l| f(&mut *l.borrow_mut()))
    }

    fn notify(&self, t: Transition) {
        debug!("[device] state {:?} -> {:?}", t.from, t.to);
        self.handlers.state_changed(t.to);
    }

    fn dispatch(&self, event: TransportEvent) {
        match event {
            TransportEvent::PowerState { powered } => self.on_power(powered),
            TransportEvent::AdvertisementReceived {
                peripheral,
                advertisement,
                rssi,
            } => {
                if self.state() != State::Scanning {
                    trace!("[dispatch] advertisement from {} outside of scan, dropped", peripheral.id());
                } else if !self.handlers.discovered(&peripheral, &advertisement, rssi) {
                    trace!("[dispatch] no discovery handler for {}", peripheral.id());
                }
            }
            TransportEvent::ConnectionEstablished { id } => match self.with_lifecycle(|l| l.connected(&id)) {
                Some((t, peer)) => {
                    info!("[dispatch] connected to {}", id);
                    self.notify(t);
                    self.handlers.connected(&peer, None);
                    self.connect_result.signal(Ok(()));
                }
                None => warn!("[dispatch] unexpected connection to {}", id),
            },
            TransportEvent::ConnectionFailed { id, reason } => match self.with_lifecycle(|l| l.connect_failed(&id)) {
                Some((t, peer)) => self.fail_connect(t, &peer, reason),
                None => trace!("[dispatch] stale connection failure for {}", id),
            },
            TransportEvent::ServicesDiscovered { id, services } => self.deliver(&id, Response::Services(services)),
            TransportEvent::CharacteristicsDiscovered { id, characteristics } => {
                self.deliver(&id, Response::Characteristics(characteristics))
            }
            TransportEvent::CharacteristicValue {
                id,
                handle,
                data,
                notification,
                error,
            } => {
                if notification {
                    self.on_notification(&id, handle, &data, error);
                } else {
                    let result = match error {
                        Some(e) => Err(e),
                        None => Ok(data),
                    };
                    self.deliver(&id, Response::Value { handle, result });
                }
            }
            TransportEvent::WriteResponse { id, handle, error } => {
                let result = match error {
                    Some(e) => Err(e),
                    None => Ok(()),
                };
                self.deliver(&id, Response::Written { handle, result });
            }
            TransportEvent::Rssi { id, rssi } => self.deliver(&id, Response::Rssi(rssi)),
            TransportEvent::Disconnected { id, reason } => self.on_disconnected(&id, reason),
        }
    }

    fn on_power(&self, powered: bool) {
        let Some((t, dropped)) = self.with_lifecycle(|l| l.power(powered)) else {
            return;
        };
        if !powered {
            self.pending.abort(Error::PoweredOff);
            self.subscribers.clear();
        }
        self.notify(t);
        if let Some(peer) = dropped {
            match t.from {
                State::Connecting => {
                    self.handlers.connected(&peer, Some(Error::PoweredOff));
                    self.connect_result.signal(Err(Error::PoweredOff));
                }
                _ => self.handlers.disconnected(&peer, Some(Error::PoweredOff)),
            }
        }
    }

    fn on_disconnected(&self, id: &PeripheralId, reason: Option<Error>) {
        match self.with_lifecycle(|l| l.disconnected(id)) {
            Some((t, peer)) if t.from == State::Connecting => {
                self.fail_connect(t, &peer, reason.unwrap_or(Error::Disconnected));
            }
            Some((t, peer)) => {
                info!("[dispatch] disconnected from {}", id);
                self.pending.abort(Error::Disconnected);
                self.subscribers.clear();
                self.notify(t);
                self.handlers.disconnected(&peer, reason);
            }
            None => trace!("[dispatch] disconnect of unknown peripheral {}", id),
        }
    }

    fn fail_connect(&self, t: Transition, peer: &Peripheral, reason: Error) {
        warn!("[dispatch] connection to {} failed: {:?}", peer.id(), reason);
        self.notify(t);
        self.handlers.connected(peer, Some(reason));
        self.connect_result.signal(Err(reason));
    }

    fn on_notification(&self, id: &PeripheralId, handle: u16, data: &[u8], error: Option<Error>) {
        if !self.with_lifecycle(|l| l.is_connected(id)) {
            trace!("[dispatch] notification from {} without a connection, dropped", id);
            return;
        }
        match self.subscribers.lookup(handle) {
            Some(handler) => handler(data, error),
            None => trace!("[dispatch] no subscriber for handle {}", handle),
        }
    }

    fn deliver(&self, id: &PeripheralId, response: Response) {
        if self.with_lifecycle(|l| l.is_connected(id)) {
            self.pending.deliver(response);
        } else {
            trace!("[dispatch] response from {} without a connection, dropped", id);
        }
    }
}
