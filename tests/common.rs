#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::channel::Channel;
use gatt_bridge::prelude::*;
use tokio::time::Duration;

pub const LIGHT_ID: &str = "AA:BB:CC:DD:EE:FF";
pub const LIGHT_NAME: &str = "Light";

pub const SERVICE: Service = Service::new(Uuid::Uuid16([0xe0, 0xff]), 0x000c, 0x0014);
pub const WRITE_CHAR: Characteristic = Characteristic::new(
    Uuid::Uuid16([0xe9, 0xff]),
    0x000d,
    0x000e,
    CharacteristicProps::READ | CharacteristicProps::WRITE | CharacteristicProps::WRITE_WITHOUT_RESPONSE,
);
pub const NOTIFY_CHAR: Characteristic =
    Characteristic::new(Uuid::Uuid16([0xe4, 0xff]), 0x0010, 0x0011, CharacteristicProps::NOTIFY).with_cccd(0x0012);

/// Reason reported for scripted connection failures.
pub const CONNECT_FAILURE: Error = Error::ConnectionFailed(0x3e);

/// A command as the mock recorded it.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    StartScan { services: Vec<Uuid>, allow_duplicates: bool },
    StopScan,
    Connect(String),
    CancelConnection(String),
    DiscoverServices,
    DiscoverCharacteristics(u16),
    Read(u16),
    Write { handle: u16, data: Vec<u8>, with_response: bool },
    ReadRssi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    Rejected,
}

/// In-memory transport that answers commands the way a well behaved
/// native stack would, and remembers written values so reads echo them.
pub struct MockTransport {
    events: Channel<CriticalSectionRawMutex, TransportEvent, 16>,
    sent: StdMutex<Vec<Sent>>,
    values: StdMutex<HashMap<u16, Vec<u8>>>,
    failed_connects: AtomicUsize,
    answer_connects: AtomicBool,
    answer_reads: AtomicBool,
    reject_sends: AtomicBool,
    opened: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            events: Channel::new(),
            sent: StdMutex::new(Vec::new()),
            values: StdMutex::new(HashMap::new()),
            failed_connects: AtomicUsize::new(0),
            answer_connects: AtomicBool::new(true),
            answer_reads: AtomicBool::new(true),
            reject_sends: AtomicBool::new(false),
            opened: AtomicBool::new(false),
        }
    }

    /// Queue an event as if the native stack reported it.
    pub async fn inject(&self, event: TransportEvent) {
        self.events.send(event).await;
    }

    /// Fail the next `n` connection attempts.
    pub fn fail_connects(&self, n: usize) {
        self.failed_connects.store(n, Ordering::SeqCst);
    }

    /// Leave connection attempts unanswered.
    pub fn ignore_connects(&self) {
        self.answer_connects.store(false, Ordering::SeqCst);
    }

    /// Leave reads unanswered.
    pub fn ignore_reads(&self) {
        self.answer_reads.store(false, Ordering::SeqCst);
    }

    pub fn reject_sends(&self, reject: bool) {
        self.reject_sends.store(reject, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn value(&self, handle: u16) -> Option<Vec<u8>> {
        self.values.lock().unwrap().get(&handle).cloned()
    }

    fn record(&self, command: &Command<'_>) {
        let sent = match *command {
            Command::StartScan {
                services,
                allow_duplicates,
            } => Sent::StartScan {
                services: services.to_vec(),
                allow_duplicates,
            },
            Command::StopScan => Sent::StopScan,
            Command::Connect(id) => Sent::Connect(id.as_str().to_string()),
            Command::CancelConnection(id) => Sent::CancelConnection(id.as_str().to_string()),
            Command::DiscoverServices { .. } => Sent::DiscoverServices,
            Command::DiscoverCharacteristics { service, .. } => Sent::DiscoverCharacteristics(service.start),
            Command::ReadCharacteristic { handle, .. } => Sent::Read(handle),
            Command::WriteCharacteristic {
                handle,
                data,
                with_response,
                ..
            } => Sent::Write {
                handle,
                data: data.to_vec(),
                with_response,
            },
            Command::ReadRssi(_) => Sent::ReadRssi,
        };
        self.sent.lock().unwrap().push(sent);
    }

    fn answer(&self, command: &Command<'_>) -> Option<TransportEvent> {
        match *command {
            Command::StartScan { .. } | Command::StopScan => None,
            Command::Connect(id) => {
                if !self.answer_connects.load(Ordering::SeqCst) {
                    return None;
                }
                let failing = self
                    .failed_connects
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                Some(if failing {
                    TransportEvent::ConnectionFailed {
                        id: id.clone(),
                        reason: CONNECT_FAILURE,
                    }
                } else {
                    TransportEvent::ConnectionEstablished { id: id.clone() }
                })
            }
            Command::CancelConnection(id) => Some(TransportEvent::Disconnected {
                id: id.clone(),
                reason: None,
            }),
            Command::DiscoverServices { id, .. } => Some(TransportEvent::ServicesDiscovered {
                id: id.clone(),
                services: heapless::Vec::from_slice(&[SERVICE]).map_err(|_| Error::InsufficientSpace),
            }),
            Command::DiscoverCharacteristics { id, service, .. } => {
                let mut found = heapless::Vec::new();
                for c in [WRITE_CHAR, NOTIFY_CHAR] {
                    if service.contains(c.handle) {
                        let _ = found.push(c);
                    }
                }
                Some(TransportEvent::CharacteristicsDiscovered {
                    id: id.clone(),
                    characteristics: Ok(found),
                })
            }
            Command::ReadCharacteristic { id, handle } => {
                if !self.answer_reads.load(Ordering::SeqCst) {
                    return None;
                }
                let event = match self.value(handle) {
                    Some(data) => TransportEvent::CharacteristicValue {
                        id: id.clone(),
                        handle,
                        data: heapless::Vec::from_slice(&data).unwrap(),
                        notification: false,
                        error: None,
                    },
                    // Attribute not found
                    None => TransportEvent::CharacteristicValue {
                        id: id.clone(),
                        handle,
                        data: heapless::Vec::new(),
                        notification: false,
                        error: Some(Error::Att(0x0a)),
                    },
                };
                Some(event)
            }
            Command::WriteCharacteristic {
                id,
                handle,
                data,
                with_response,
            } => {
                self.values.lock().unwrap().insert(handle, data.to_vec());
                with_response.then(|| TransportEvent::WriteResponse {
                    id: id.clone(),
                    handle,
                    error: None,
                })
            }
            Command::ReadRssi(id) => Some(TransportEvent::Rssi {
                id: id.clone(),
                rssi: Ok(-60),
            }),
        }
    }
}

impl Transport for MockTransport {
    type Error = MockError;

    async fn open(&self) -> Result<(), MockError> {
        self.opened.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, command: Command<'_>) -> Result<(), MockError> {
        if self.reject_sends.load(Ordering::SeqCst) {
            return Err(MockError::Rejected);
        }
        self.record(&command);
        if let Some(event) = self.answer(&command) {
            self.events.send(event).await;
        }
        Ok(())
    }

    async fn receive(&self) -> Result<TransportEvent, MockError> {
        Ok(self.events.receive().await)
    }
}

/// Thread-safe record of callback invocations.
pub struct Calls<T>(StdMutex<Vec<T>>);

impl<T: Clone> Calls<T> {
    pub fn new() -> Self {
        Self(StdMutex::new(Vec::new()))
    }

    pub fn push(&self, value: T) {
        self.0.lock().unwrap().push(value);
    }

    pub fn all(&self) -> Vec<T> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

pub fn light() -> Peripheral {
    Peripheral::new(LIGHT_ID, LIGHT_NAME).unwrap()
}

pub fn light_advertisement() -> TransportEvent {
    TransportEvent::AdvertisementReceived {
        peripheral: light(),
        advertisement: Advertisement::default()
            .with_local_name(LIGHT_NAME)
            .with_service(SERVICE.uuid)
            .unwrap(),
        rssi: -48,
    }
}

/// Run `driver` alongside the device's run loop.
pub async fn drive<M: RawMutex, const N: usize, F: Future>(
    device: &Device<'_, MockTransport, M, N>,
    driver: F,
) -> F::Output {
    match tokio::time::timeout(Duration::from_secs(5), select(device.run(), driver)).await {
        Ok(Either::First(result)) => panic!("run loop exited early: {:?}", result),
        Ok(Either::Second(output)) => output,
        Err(_) => panic!("test timed out"),
    }
}

/// Yield until `cond` holds, letting the run loop dispatch queued events.
pub async fn until(mut cond: impl FnMut() -> bool) {
    while !cond() {
        tokio::task::yield_now().await;
    }
}

/// Yield a few times so anything queued gets dispatched.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
