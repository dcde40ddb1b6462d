//! Connection core: phase routing, the locked send path and channel handles.
//!
//! One connection owns a receive-side codec, a send path, the handshake
//! coordinator and the channel multiplexer. Inbound packets flow from
//! [`Connection::feed`] to exactly one consumer depending on the connection
//! phase:
//!
//! ```text
//! socket bytes -> codec -> coordinator          (handshake phase)
//!                       -> multiplexer / queue  (established phase)
//! ```
//!
//! The I/O driver that reads the socket only appends bytes and dispatches
//! completed packets; per-channel queues are unbounded, so it never blocks
//! on application logic. Sends serialize on one async lock so no packet's
//! bytes interleave with another's on the wire, and cipher activation takes
//! both the send lock and the codec lock so no packet is split across cipher
//! states.
//!
//! Fatal codec errors surface exactly once on the connection's error channel
//! and wake any handshake waiter with a failure.

use crate::ssh::channel::{Channel, ChannelEvent, ChannelKind};
use crate::ssh::crypto::PacketCipher;
use crate::ssh::exchange::ExchangeCoordinator;
use crate::ssh::message::MessageType;
use crate::ssh::mux::ChannelMultiplexer;
use crate::ssh::packet::Packet;
use crate::ssh::packetizer::Packetizer;
use crate::ssh::version::Version;
use halyard_platform::{HalyardError, HalyardResult};
use rand::{CryptoRng, RngCore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Random source capability for a connection.
///
/// Constructed once (per process or per connection) and passed in
/// explicitly; the engine never reaches for hidden thread-local generator
/// state.
pub trait ConnectionRng: RngCore + CryptoRng + Send {}

impl<T: RngCore + CryptoRng + Send> ConnectionRng for T {}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Our identification string for the version exchange.
    pub version: Version,

    /// Timeout applied to every synchronous handshake exchange.
    pub response_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            version: Version::default_halyard(),
            response_timeout: Duration::from_millis(10_000),
        }
    }
}

struct SendState {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    cipher: Option<Box<dyn PacketCipher + Send>>,
    rng: Box<dyn ConnectionRng>,
}

struct ConnectionInner {
    config: ConnectionConfig,
    send: tokio::sync::Mutex<SendState>,
    codec: Mutex<Packetizer>,
    coordinator: ExchangeCoordinator,
    mux: ChannelMultiplexer,
    /// False during the handshake; flipped exactly once.
    established: AtomicBool,
    fatal_reported: AtomicBool,
    errors_tx: mpsc::UnboundedSender<HalyardError>,
    unhandled_tx: mpsc::UnboundedSender<Packet>,
}

/// Receiving ends of the connection's outbound queues.
pub struct ConnectionEvents {
    /// The connection's single fatal-error channel. Each fatal codec error
    /// arrives here exactly once.
    pub errors: mpsc::UnboundedReceiver<HalyardError>,

    /// Inbound packets no layer handled: unknown message types, global
    /// requests, peer-initiated channel opens.
    pub unhandled: mpsc::UnboundedReceiver<Packet>,
}

/// An SSH client protocol connection.
///
/// Cheap to clone; all clones share one underlying connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Creates a connection over `writer`.
    ///
    /// The caller keeps the read half of the transport and drives
    /// [`Connection::feed`] with whatever bytes arrive.
    pub fn new(
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        rng: Box<dyn ConnectionRng>,
        config: ConnectionConfig,
    ) -> (Self, ConnectionEvents) {
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        let (unhandled_tx, unhandled_rx) = mpsc::unbounded_channel();

        let connection = Self {
            inner: Arc::new(ConnectionInner {
                config,
                send: tokio::sync::Mutex::new(SendState {
                    writer,
                    cipher: None,
                    rng,
                }),
                codec: Mutex::new(Packetizer::new()),
                coordinator: ExchangeCoordinator::new(),
                mux: ChannelMultiplexer::new(),
                established: AtomicBool::new(false),
                fatal_reported: AtomicBool::new(false),
                errors_tx,
                unhandled_tx,
            }),
        };

        (
            connection,
            ConnectionEvents {
                errors: errors_rx,
                unhandled: unhandled_rx,
            },
        )
    }

    /// The connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// The channel multiplexer.
    pub fn mux(&self) -> &ChannelMultiplexer {
        &self.inner.mux
    }

    /// True once the handshake has completed and routing moved to the
    /// multiplexer.
    pub fn is_established(&self) -> bool {
        self.inner.established.load(Ordering::SeqCst)
    }

    /// Switches routing permanently from the handshake coordinator to the
    /// channel multiplexer. Called once, after the initial authentication
    /// succeeds.
    pub fn complete_handshake(&self) {
        self.inner.established.store(true, Ordering::SeqCst);
        debug!("handshake complete; routing switched to the multiplexer");
    }

    /// Feeds raw inbound transport bytes through the codec and routes every
    /// completed packet.
    ///
    /// # Errors
    ///
    /// A fatal codec error halts the connection: it is pushed onto the error
    /// channel (once), any handshake waiter is woken with a failure, and the
    /// error returns to the caller so the read loop can stop.
    pub async fn feed(&self, data: &[u8]) -> HalyardResult<()> {
        let fed = {
            let mut codec = self
                .inner
                .codec
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            codec.feed(data)
        };

        let packets = match fed {
            Ok(packets) => packets,
            Err(error) => {
                let description = error.to_string();
                self.report_fatal(error);
                return Err(HalyardError::Protocol(description));
            }
        };

        for packet in packets {
            self.route(packet).await?;
        }
        Ok(())
    }

    async fn route(&self, packet: Packet) -> HalyardResult<()> {
        if !self.is_established() {
            if let Some(unclaimed) = self.inner.coordinator.deliver(packet) {
                debug!(
                    message_type = unclaimed.message_type(),
                    "handshake packet with no waiter"
                );
                let _ = self.inner.unhandled_tx.send(unclaimed);
            }
            return Ok(());
        }

        match packet.kind() {
            Some(
                MessageType::ChannelOpenConfirmation
                | MessageType::ChannelOpenFailure
                | MessageType::ChannelWindowAdjust
                | MessageType::ChannelData
                | MessageType::ChannelExtendedData
                | MessageType::ChannelEof
                | MessageType::ChannelClose
                | MessageType::ChannelRequest
                | MessageType::ChannelSuccess
                | MessageType::ChannelFailure,
            ) => {
                for (message_type, payload) in self.inner.mux.dispatch(&packet) {
                    self.send(message_type as u8, &payload).await?;
                }
            }
            _ => {
                // unknown and connection-global messages go to the caller
                let _ = self.inner.unhandled_tx.send(packet);
            }
        }
        Ok(())
    }

    /// Frames, optionally encrypts and writes one packet.
    ///
    /// Serialized on the send lock: concurrent senders never interleave
    /// partial frames on the wire.
    pub async fn send(&self, message_type: u8, payload: &[u8]) -> HalyardResult<()> {
        let packet = Packet::new(message_type, payload.to_vec());

        let mut guard = self.inner.send.lock().await;
        let send = &mut *guard;

        let mut image = packet.frame(&mut send.rng)?;
        if let Some(cipher) = &mut send.cipher {
            // the length field is never encrypted
            cipher.encrypt_in_place(&mut image[4..]);
        }

        send.writer.write_all(&image).await?;
        send.writer.flush().await?;
        Ok(())
    }

    /// Sends a packet and waits for the next inbound handshake packet.
    ///
    /// Returns `Ok(None)` when no response arrives within the configured
    /// response timeout (pass `timeout` to override). Timeout is an expected
    /// outcome, distinct from a protocol error.
    pub async fn send_and_wait(
        &self,
        message_type: u8,
        payload: &[u8],
        timeout: Option<Duration>,
    ) -> HalyardResult<Option<Packet>> {
        let timeout = timeout.unwrap_or(self.inner.config.response_timeout);
        self.inner
            .coordinator
            .send_and_wait(self.send(message_type, payload), timeout)
            .await
    }

    /// Waits for the next inbound handshake packet without sending.
    pub async fn wait_response(&self, timeout: Option<Duration>) -> HalyardResult<Option<Packet>> {
        let timeout = timeout.unwrap_or(self.inner.config.response_timeout);
        self.inner.coordinator.wait_response(timeout).await
    }

    /// Installs the newly negotiated ciphers on both directions atomically.
    ///
    /// Holds the send lock and the codec lock together, so no packet is
    /// encrypted or decrypted partly under the old state and partly under
    /// the new one.
    pub async fn activate_ciphers(
        &self,
        send_cipher: Option<Box<dyn PacketCipher + Send>>,
        recv_cipher: Option<Box<dyn PacketCipher + Send>>,
        check_integrity: bool,
    ) {
        let mut send = self.inner.send.lock().await;
        {
            let mut codec = self
                .inner
                .codec
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            codec.set_cipher(recv_cipher, check_integrity);
        }
        send.cipher = send_cipher;
        debug!(check_integrity, "cipher state activated");
    }

    /// Opens a new channel and sends the open request.
    ///
    /// `extra` carries channel-type specific open fields in wire form (see
    /// [`crate::ssh::channel::forwarding_open_extra`]); session-type
    /// channels pass an empty slice.
    pub async fn open_channel(
        &self,
        kind: ChannelKind,
        extra: &[u8],
    ) -> HalyardResult<ChannelHandle> {
        if !self.is_established() {
            return Err(HalyardError::Protocol(
                "cannot open a channel before the handshake completes".to_string(),
            ));
        }

        let local_id = self.inner.mux.allocate_id();
        let channel = Channel::new(local_id, kind);
        let open_payload = channel.open_payload(extra);
        let (shared, events) = self.inner.mux.register(channel);

        if let Err(e) = self.send(MessageType::ChannelOpen as u8, &open_payload).await {
            self.inner.mux.remove(local_id);
            return Err(e);
        }

        Ok(ChannelHandle {
            connection: self.clone(),
            channel: shared,
            events,
            local_id,
        })
    }

    /// Tears the connection down: wakes handshake waiters and halts routing.
    ///
    /// Called on socket close or error by the I/O driver.
    pub fn shutdown(&self, reason: &str) {
        self.inner.coordinator.abort(reason);
        debug!(reason, "connection shut down");
    }

    fn report_fatal(&self, error: HalyardError) {
        self.inner.coordinator.abort(&error.to_string());
        if !self.inner.fatal_reported.swap(true, Ordering::SeqCst) {
            let _ = self.inner.errors_tx.send(error);
        } else {
            warn!(%error, "fatal error after the connection already failed");
        }
    }
}

/// Caller-side handle to one open channel.
///
/// Holds the receiving end of the channel's event queue and a clone of the
/// connection for transmit; dropping the handle does not close the channel.
pub struct ChannelHandle {
    connection: Connection,
    channel: Arc<Mutex<Channel>>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    local_id: u32,
}

impl ChannelHandle {
    /// Local channel ID.
    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    /// Receives the next channel event, in delivery order.
    ///
    /// Returns `None` once the channel is closed and the queue drained.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Non-blocking variant of [`ChannelHandle::next_event`].
    pub fn try_next_event(&mut self) -> Option<ChannelEvent> {
        self.events.try_recv().ok()
    }

    /// Sends data on the channel, splitting at the peer's maximum packet
    /// size and consuming the flow-control window.
    ///
    /// # Errors
    ///
    /// Returns [`HalyardError::Protocol`] if the channel is not `Ready` or
    /// the window is exhausted.
    pub async fn send_data(&self, data: &[u8]) -> HalyardResult<()> {
        let mut offset = 0;
        loop {
            let (payload, chunk_len) = {
                let mut channel = self
                    .channel
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                if !channel.can_send() {
                    return Err(HalyardError::Protocol(format!(
                        "channel {} is not ready for data",
                        self.local_id
                    )));
                }
                let max = channel.remote_max_packet() as usize;
                if max == 0 {
                    return Err(HalyardError::Protocol(
                        "peer advertised a zero maximum packet size".to_string(),
                    ));
                }
                let end = data.len().min(offset + max);
                let chunk = &data[offset..end];
                channel.consume_window(chunk.len() as u32)?;
                (channel.data_payload(chunk)?, chunk.len())
            };

            self.connection
                .send(MessageType::ChannelData as u8, &payload)
                .await?;

            offset += chunk_len;
            if offset >= data.len() {
                return Ok(());
            }
        }
    }

    /// Grants the peer `bytes` of receive window.
    pub async fn grant_window(&self, bytes: u32) -> HalyardResult<()> {
        let payload = self
            .channel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .window_adjust_payload(bytes)?;
        self.connection
            .send(MessageType::ChannelWindowAdjust as u8, &payload)
            .await
    }

    /// Requests a pseudo-terminal on the channel.
    pub async fn request_pty(&self, term: &str, width: u32, height: u32) -> HalyardResult<()> {
        let payload = self
            .channel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pty_request_payload(term, width, height)?;
        self.connection
            .send(MessageType::ChannelRequest as u8, &payload)
            .await
    }

    /// Requests an interactive shell on the channel.
    pub async fn request_shell(&self) -> HalyardResult<()> {
        let payload = self
            .channel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .shell_request_payload()?;
        self.connection
            .send(MessageType::ChannelRequest as u8, &payload)
            .await
    }

    /// Requests execution of a command on the channel.
    pub async fn request_exec(&self, command: &str) -> HalyardResult<()> {
        let payload = self
            .channel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .exec_request_payload(command)?;
        self.connection
            .send(MessageType::ChannelRequest as u8, &payload)
            .await
    }

    /// Requests a subsystem on the channel.
    pub async fn request_subsystem(&self, name: &str) -> HalyardResult<()> {
        let payload = self
            .channel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .subsystem_request_payload(name)?;
        self.connection
            .send(MessageType::ChannelRequest as u8, &payload)
            .await
    }

    /// Signals EOF on the channel.
    pub async fn send_eof(&self) -> HalyardResult<()> {
        let payload = self
            .channel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .eof_payload()?;
        self.connection
            .send(MessageType::ChannelEof as u8, &payload)
            .await
    }

    /// Starts closing the channel.
    ///
    /// A no-op when the channel is unknown or already closing.
    pub async fn close(&self) -> HalyardResult<()> {
        if let Some(payload) = self.connection.inner.mux.begin_close(self.local_id) {
            self.connection
                .send(MessageType::ChannelClose as u8, &payload)
                .await?;
        }
        Ok(())
    }
}
