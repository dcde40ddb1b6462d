//! Synchronous exchange coordinator for the handshake phase.
//!
//! Before general asynchronous dispatch begins (version exchange, key
//! exchange, initial authentication), callers need request/response
//! semantics: send a packet, then wait — with a timeout — for the next
//! correlated inbound packet.
//!
//! The coordinator is a single-slot rendezvous built on a oneshot channel.
//! An outer async mutex serializes waiters, so concurrent callers queue
//! naturally through lock contention instead of interleaving partial waits.
//! A timeout is a first-class `Ok(None)` outcome, not an error; a response
//! that races in after the caller gave up is discarded (last write loses).
//! Connection shutdown wakes any parked waiter with a failure result.
//!
//! Once the handshake completes, routing switches permanently to the channel
//! multiplexer and the coordinator is not used again.

use crate::ssh::packet::Packet;
use halyard_platform::{HalyardError, HalyardResult};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

enum Slot {
    /// No waiter armed; inbound packets flow past the coordinator.
    Idle,
    /// A waiter is parked on the other end of this sender.
    Armed(oneshot::Sender<Outcome>),
    /// The connection is gone; all waits fail immediately.
    Shutdown(String),
}

enum Outcome {
    Response(Packet),
    Closed(String),
}

/// Single-slot rendezvous between the receive path and a handshake caller.
pub struct ExchangeCoordinator {
    /// Serializes waiters: only one may be active at a time.
    waiter_lock: tokio::sync::Mutex<()>,
    slot: Mutex<Slot>,
}

impl ExchangeCoordinator {
    /// Creates an idle coordinator.
    pub fn new() -> Self {
        Self {
            waiter_lock: tokio::sync::Mutex::new(()),
            slot: Mutex::new(Slot::Idle),
        }
    }

    /// Sends a packet (by driving `send`), then waits for the next inbound
    /// packet.
    ///
    /// The slot is armed before `send` is driven, so a response cannot slip
    /// past between the send completing and the wait starting.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(packet))` - the correlated response
    /// - `Ok(None)` - no response within `timeout`
    /// - `Err(_)` - the send failed or the connection shut down
    pub async fn send_and_wait<F>(
        &self,
        send: F,
        timeout: Duration,
    ) -> HalyardResult<Option<Packet>>
    where
        F: Future<Output = HalyardResult<()>>,
    {
        let _waiter = self.waiter_lock.lock().await;

        let rx = self.arm()?;
        if let Err(e) = send.await {
            self.disarm();
            return Err(e);
        }
        self.wait(rx, timeout).await
    }

    /// Waits for the next inbound packet without sending anything first.
    ///
    /// Same outcomes as [`ExchangeCoordinator::send_and_wait`].
    pub async fn wait_response(&self, timeout: Duration) -> HalyardResult<Option<Packet>> {
        let _waiter = self.waiter_lock.lock().await;

        let rx = self.arm()?;
        self.wait(rx, timeout).await
    }

    fn arm(&self) -> HalyardResult<oneshot::Receiver<Outcome>> {
        let mut slot = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Slot::Shutdown(reason) = &*slot {
            return Err(HalyardError::Protocol(format!(
                "connection is closed: {}",
                reason
            )));
        }
        let (tx, rx) = oneshot::channel();
        *slot = Slot::Armed(tx);
        Ok(rx)
    }

    fn disarm(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if matches!(&*slot, Slot::Armed(_)) {
            *slot = Slot::Idle;
        }
    }

    async fn wait(
        &self,
        rx: oneshot::Receiver<Outcome>,
        timeout: Duration,
    ) -> HalyardResult<Option<Packet>> {
        let result = tokio::time::timeout(timeout, rx).await;
        self.disarm();

        match result {
            Ok(Ok(Outcome::Response(packet))) => Ok(Some(packet)),
            Ok(Ok(Outcome::Closed(reason))) => Err(HalyardError::Protocol(format!(
                "connection closed while waiting for response: {}",
                reason
            ))),
            // sender dropped without firing: treat like no response
            Ok(Err(_)) => Ok(None),
            Err(_) => Ok(None),
        }
    }

    /// Hands an inbound packet to the parked waiter.
    ///
    /// Returns the packet back when no waiter is armed, so the caller can
    /// route (or drop) it through the ordinary path.
    pub fn deliver(&self, packet: Packet) -> Option<Packet> {
        let mut slot = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match std::mem::replace(&mut *slot, Slot::Idle) {
            Slot::Armed(tx) => {
                // a racing timeout may have dropped the receiver; the
                // response is discarded in that case
                let _ = tx.send(Outcome::Response(packet));
                None
            }
            Slot::Shutdown(reason) => {
                *slot = Slot::Shutdown(reason);
                Some(packet)
            }
            Slot::Idle => Some(packet),
        }
    }

    /// Marks the connection as gone and wakes any parked waiter with a
    /// failure result. All later waits fail immediately.
    pub fn abort(&self, reason: &str) {
        let mut slot = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Slot::Armed(tx) = std::mem::replace(&mut *slot, Slot::Shutdown(reason.to_string())) {
            let _ = tx.send(Outcome::Closed(reason.to_string()));
        }
    }
}

impl Default for ExchangeCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
