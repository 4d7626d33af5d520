//! Pairing of transport requests with their responses.
//!
//! The transport answers GATT requests through the same event stream that
//! carries everything else. Only one request is outstanding at a time: the
//! caller holds `lock` from sending the command until the answer arrives,
//! and the run loop drops each answer into `slot`.
use core::future::Future;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};
use heapless::Vec;

use crate::config::{MAX_CHARACTERISTICS, MAX_SERVICES, VALUE_MAX};
use crate::gatt::{Characteristic, Service};
use crate::{BridgeError, Error};

/// Answer to an outstanding request.
pub(crate) enum Response {
    Services(Result<Vec<Service, MAX_SERVICES>, Error>),
    Characteristics(Result<Vec<Characteristic, MAX_CHARACTERISTICS>, Error>),
    Value {
        handle: u16,
        result: Result<Vec<u8, VALUE_MAX>, Error>,
    },
    Written {
        handle: u16,
        result: Result<(), Error>,
    },
    Rssi(Result<i8, Error>),
    /// The link went away before an answer arrived.
    Aborted(Error),
}

pub(crate) struct Pending<M: RawMutex> {
    lock: Mutex<M, ()>,
    slot: Signal<M, Response>,
}

impl<M: RawMutex> Pending<M> {
    pub(crate) const fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            slot: Signal::new(),
        }
    }

    /// Send a request and wait for the response `accept` recognizes.
    ///
    /// `accept` returns `None` for answers that belong to an earlier,
    /// abandoned request; those are discarded.
    pub(crate) async fn exchange<E, R>(
        &self,
        timeout: Duration,
        send: impl Future<Output = Result<(), E>>,
        mut accept: impl FnMut(Response) -> Option<Result<R, Error>>,
    ) -> Result<R, BridgeError<E>> {
        let _guard = self.lock.lock().await;
        self.slot.reset();
        send.await.map_err(BridgeError::Transport)?;

        let answer = async {
            loop {
                match self.slot.wait().await {
                    Response::Aborted(e) => return Err(e),
                    response => match accept(response) {
                        Some(result) => return result,
                        None => trace!("[dispatch] discarding stale response"),
                    },
                }
            }
        };
        match with_timeout(timeout, answer).await {
            Ok(result) => result.map_err(BridgeError::Bridge),
            Err(_) => {
                warn!("[device] request timed out");
                Err(Error::Timeout.into())
            }
        }
    }

    /// Hand an answer to the waiting request, if any.
    pub(crate) fn deliver(&self, response: Response) {
        self.slot.signal(response);
    }

    /// Fail the waiting request, if any.
    pub(crate) fn abort(&self, reason: Error) {
        self.slot.signal(Response::Aborted(reason));
    }
}
