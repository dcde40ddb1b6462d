//! Channel multiplexer: the ID table and inbound event routing.
//!
//! The multiplexer owns the table of active channels keyed by the locally
//! assigned ID, allocates new IDs monotonically (never reused within a
//! connection), and routes inbound channel-scoped packets to the owning
//! channel's state machine and event queue with O(1) lookup.
//!
//! An event for an unknown ID is logged and dropped — never fatal to the
//! connection. A close arriving before the open completes, or an event for an
//! already-removed ID, is a benign no-op resolved by the state machine.

use crate::ssh::channel::{Channel, ChannelEvent, ChannelState};
use crate::ssh::message::MessageType;
use crate::ssh::packet::Packet;
use crate::ssh::wire::WireReader;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A registered channel: shared state plus its event queue.
#[derive(Clone)]
struct ChannelEntry {
    channel: Arc<Mutex<Channel>>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

/// Owns the ID-to-channel mapping and routes channel-scoped packets.
pub struct ChannelMultiplexer {
    next_id: AtomicU32,
    entries: Mutex<HashMap<u32, ChannelEntry>>,
}

impl ChannelMultiplexer {
    /// Creates an empty multiplexer.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(0),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Allocates the next local channel ID.
    ///
    /// IDs are strictly increasing and never reused for the life of the
    /// connection.
    pub fn allocate_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Registers a channel under its local ID.
    ///
    /// Returns the shared channel state and the receiving end of its event
    /// queue.
    pub fn register(
        &self,
        channel: Channel,
    ) -> (Arc<Mutex<Channel>>, mpsc::UnboundedReceiver<ChannelEvent>) {
        let local_id = channel.local_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(channel));

        let entry = ChannelEntry {
            channel: Arc::clone(&shared),
            events: tx,
        };
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(local_id, entry);
        debug!(local_id, "registered channel");

        (shared, rx)
    }

    /// Looks up a channel by local ID.
    pub fn find(&self, local_id: u32) -> Option<Arc<Mutex<Channel>>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&local_id)
            .map(|e| Arc::clone(&e.channel))
    }

    /// Removes a channel from the table.
    pub fn remove(&self, local_id: u32) {
        if self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&local_id)
            .is_some()
        {
            debug!(local_id, "removed channel");
        }
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// Returns true if no channels are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, local_id: u32) -> Option<ChannelEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&local_id)
            .cloned()
    }

    /// Routes one inbound channel-scoped packet.
    ///
    /// Returns reply payloads (message type plus payload) the connection must
    /// transmit, e.g. the close acknowledgment for a peer-initiated close.
    /// Unknown IDs and malformed channel messages are logged and dropped.
    pub fn dispatch(&self, packet: &Packet) -> Vec<(MessageType, Vec<u8>)> {
        let Some(kind) = packet.kind() else {
            warn!(message_type = packet.message_type(), "undispatchable message");
            return Vec::new();
        };

        let mut reader = WireReader::new(packet.payload());
        let local_id = match reader.read_u32() {
            Ok(id) => id,
            Err(_) => {
                warn!(%kind, "channel message too short for recipient ID");
                return Vec::new();
            }
        };

        let Some(entry) = self.entry(local_id) else {
            warn!(local_id, %kind, "event for unknown channel");
            return Vec::new();
        };

        let mut replies = Vec::new();

        match kind {
            MessageType::ChannelOpenConfirmation => {
                let parsed = (|| {
                    let remote_id = reader.read_u32()?;
                    let window = reader.read_u32()?;
                    let max_packet = reader.read_u32()?;
                    Ok::<_, halyard_platform::HalyardError>((remote_id, window, max_packet))
                })();
                match parsed {
                    Ok((remote_id, window, max_packet)) => {
                        let bound = entry
                            .channel
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner)
                            .bind_remote(remote_id, window, max_packet);
                        match bound {
                            Ok(()) => {
                                let extra = Bytes::copy_from_slice(reader.rest());
                                self.emit(&entry, ChannelEvent::Established { data: extra });
                            }
                            Err(e) => {
                                warn!(local_id, error = %e, "late open confirmation ignored")
                            }
                        }
                    }
                    Err(e) => self.emit(
                        &entry,
                        ChannelEvent::Error {
                            message: format!("malformed open confirmation: {}", e),
                        },
                    ),
                }
            }

            MessageType::ChannelOpenFailure => {
                let mut channel = entry.channel.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                if channel.transition(ChannelState::Failed).is_ok() {
                    drop(channel);
                    self.emit(&entry, ChannelEvent::RequestFailed);
                    self.remove(local_id);
                } else {
                    warn!(local_id, "open failure for a channel past Requested");
                }
            }

            MessageType::ChannelWindowAdjust => match reader.read_u32() {
                Ok(bytes) => {
                    entry
                        .channel
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .replenish_window(bytes);
                }
                Err(_) => warn!(local_id, "malformed window adjust"),
            },

            MessageType::ChannelData => match reader.read_byte_string() {
                Ok(data) => {
                    let data = Bytes::copy_from_slice(data);
                    self.emit(&entry, ChannelEvent::Data { data });
                }
                Err(_) => warn!(local_id, "malformed channel data"),
            },

            MessageType::ChannelExtendedData => {
                let parsed = (|| {
                    let data_type = reader.read_u32()?;
                    let data = reader.read_byte_string()?;
                    Ok::<_, halyard_platform::HalyardError>((data_type, data))
                })();
                match parsed {
                    Ok((data_type, data)) => {
                        let data = Bytes::copy_from_slice(data);
                        self.emit(&entry, ChannelEvent::ExtendedData { data_type, data });
                    }
                    Err(_) => warn!(local_id, "malformed extended data"),
                }
            }

            MessageType::ChannelEof => {
                self.emit(&entry, ChannelEvent::Eof);
            }

            MessageType::ChannelClose => {
                let mut channel = entry.channel.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let by_peer = channel.state() != ChannelState::Closing;
                if by_peer {
                    // acknowledge the peer's close before tearing down
                    if channel.transition(ChannelState::Closing).is_ok() {
                        if let Ok(payload) = channel.close_payload() {
                            replies.push((MessageType::ChannelClose, payload));
                        }
                        drop(channel);
                        self.emit(&entry, ChannelEvent::Closing { by_peer: true });
                        self.finish_close(&entry, local_id, true);
                    }
                } else if channel.transition(ChannelState::Closed).is_ok() {
                    drop(channel);
                    self.emit(&entry, ChannelEvent::Closed { by_peer: false });
                    self.remove(local_id);
                }
            }

            MessageType::ChannelSuccess => {
                let mut channel = entry.channel.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                if channel.state() == ChannelState::Established
                    && channel.transition(ChannelState::Ready).is_ok()
                {
                    drop(channel);
                    self.emit(&entry, ChannelEvent::Ready);
                }
            }

            MessageType::ChannelFailure => {
                self.emit(&entry, ChannelEvent::RequestFailed);
            }

            other => {
                let data = Bytes::copy_from_slice(reader.rest());
                self.emit(
                    &entry,
                    ChannelEvent::UnhandledPacket {
                        message_type: other as u8,
                        data,
                    },
                );
            }
        }

        replies
    }

    /// Completes teardown for a peer-initiated close.
    fn finish_close(&self, entry: &ChannelEntry, local_id: u32, by_peer: bool) {
        let closed = entry
            .channel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .transition(ChannelState::Closed)
            .is_ok();
        if closed {
            self.emit(entry, ChannelEvent::Closed { by_peer });
            self.remove(local_id);
        }
    }

    /// Signals local teardown intent for a channel, returning the close
    /// payload to transmit. No-op if the channel is unknown or already
    /// terminal.
    pub fn begin_close(&self, local_id: u32) -> Option<Vec<u8>> {
        let entry = self.entry(local_id)?;
        let mut channel = entry.channel.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if channel.transition(ChannelState::Closing).is_err() {
            return None;
        }
        let payload = channel.close_payload().ok()?;
        drop(channel);
        self.emit(&entry, ChannelEvent::Closing { by_peer: false });
        Some(payload)
    }

    fn emit(&self, entry: &ChannelEntry, event: ChannelEvent) {
        // receiver dropped means the collaborator went away; nothing to do
        let _ = entry.events.send(event);
    }
}

impl Default for ChannelMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::channel::ChannelKind;
    use crate::ssh::wire::WireWriter;

    fn confirmation_packet(local_id: u32, remote_id: u32) -> Packet {
        let mut w = WireWriter::new();
        w.put_u32(local_id);
        w.put_u32(remote_id);
        w.put_u32(0x100000);
        w.put_u32(0x8000);
        Packet::new(MessageType::ChannelOpenConfirmation as u8, w.into_bytes())
    }

    fn data_packet(local_id: u32, data: &[u8]) -> Packet {
        let mut w = WireWriter::new();
        w.put_u32(local_id);
        w.put_byte_string(data);
        Packet::new(MessageType::ChannelData as u8, w.into_bytes())
    }

    #[test]
    fn test_allocate_ids_strictly_increasing() {
        let mux = ChannelMultiplexer::new();
        let mut previous = None;
        for _ in 0..10_000 {
            let id = mux.allocate_id();
            if let Some(prev) = previous {
                assert!(id > prev, "IDs must be strictly increasing");
            }
            previous = Some(id);
        }
    }

    #[test]
    fn test_register_find_remove() {
        let mux = ChannelMultiplexer::new();
        let id = mux.allocate_id();
        let (_channel, _rx) = mux.register(Channel::new(id, ChannelKind::Session));

        assert!(mux.find(id).is_some());
        assert!(mux.find(id + 1).is_none());

        mux.remove(id);
        assert!(mux.find(id).is_none());
        assert!(mux.is_empty());
    }

    #[test]
    fn test_dispatch_confirmation_then_data() {
        let mux = ChannelMultiplexer::new();
        let id = mux.allocate_id();
        let (channel, mut rx) = mux.register(Channel::new(id, ChannelKind::Session));

        let replies = mux.dispatch(&confirmation_packet(id, 99));
        assert!(replies.is_empty());
        assert_eq!(channel.lock().unwrap().state(), ChannelState::Established);
        assert_eq!(channel.lock().unwrap().remote_id(), Some(99));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ChannelEvent::Established { .. }
        ));

        mux.dispatch(&data_packet(id, b"stdout bytes"));
        match rx.try_recv().unwrap() {
            ChannelEvent::Data { data } => assert_eq!(&data[..], b"stdout bytes"),
            other => panic!("expected Data event, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_channel_is_noop() {
        let mux = ChannelMultiplexer::new();
        let id = mux.allocate_id();
        let (channel, mut rx) = mux.register(Channel::new(id, ChannelKind::Session));
        mux.dispatch(&confirmation_packet(id, 1));
        let _ = rx.try_recv();

        // data for an ID that was never registered
        let replies = mux.dispatch(&data_packet(id + 7, b"nobody home"));
        assert!(replies.is_empty());

        // the registered channel is unaffected
        assert_eq!(channel.lock().unwrap().state(), ChannelState::Established);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_success_moves_established_to_ready() {
        let mux = ChannelMultiplexer::new();
        let id = mux.allocate_id();
        let (channel, mut rx) = mux.register(Channel::new(id, ChannelKind::Shell));
        mux.dispatch(&confirmation_packet(id, 4));
        let _ = rx.try_recv();

        let mut w = WireWriter::new();
        w.put_u32(id);
        mux.dispatch(&Packet::new(MessageType::ChannelSuccess as u8, w.into_bytes()));

        assert_eq!(channel.lock().unwrap().state(), ChannelState::Ready);
        assert!(matches!(rx.try_recv().unwrap(), ChannelEvent::Ready));
    }

    #[test]
    fn test_peer_close_acknowledged_and_removed() {
        let mux = ChannelMultiplexer::new();
        let id = mux.allocate_id();
        let (_channel, mut rx) = mux.register(Channel::new(id, ChannelKind::Session));
        mux.dispatch(&confirmation_packet(id, 4));
        let _ = rx.try_recv();

        let mut w = WireWriter::new();
        w.put_u32(id);
        let replies = mux.dispatch(&Packet::new(MessageType::ChannelClose as u8, w.into_bytes()));

        // our close goes back to the peer
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, MessageType::ChannelClose);

        assert!(matches!(
            rx.try_recv().unwrap(),
            ChannelEvent::Closing { by_peer: true }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ChannelEvent::Closed { by_peer: true }
        ));
        assert!(mux.find(id).is_none());
    }

    #[test]
    fn test_close_before_open_is_benign() {
        let mux = ChannelMultiplexer::new();
        let id = mux.allocate_id();
        let (_channel, _rx) = mux.register(Channel::new(id, ChannelKind::Session));

        // close for a channel still in Requested: the state machine resolves
        // the ordering race without corrupting the table
        let mut w = WireWriter::new();
        w.put_u32(id);
        mux.dispatch(&Packet::new(MessageType::ChannelClose as u8, w.into_bytes()));
        assert!(mux.find(id).is_none());
    }

    #[test]
    fn test_window_adjust_replenishes() {
        let mux = ChannelMultiplexer::new();
        let id = mux.allocate_id();
        let (channel, mut rx) = mux.register(Channel::new(id, ChannelKind::Session));
        mux.dispatch(&confirmation_packet(id, 4));
        let _ = rx.try_recv();

        channel.lock().unwrap().consume_window(0x1000).unwrap();
        let before = channel.lock().unwrap().send_window();

        let mut w = WireWriter::new();
        w.put_u32(id);
        w.put_u32(0x1000);
        mux.dispatch(&Packet::new(
            MessageType::ChannelWindowAdjust as u8,
            w.into_bytes(),
        ));

        assert_eq!(channel.lock().unwrap().send_window(), before + 0x1000);
    }

    #[test]
    fn test_open_failure_emits_request_failed() {
        let mux = ChannelMultiplexer::new();
        let id = mux.allocate_id();
        let (_channel, mut rx) = mux.register(Channel::new(id, ChannelKind::Session));

        let mut w = WireWriter::new();
        w.put_u32(id);
        w.put_u32(1); // administratively prohibited
        w.put_string("prohibited");
        w.put_string("");
        mux.dispatch(&Packet::new(
            MessageType::ChannelOpenFailure as u8,
            w.into_bytes(),
        ));

        assert!(matches!(rx.try_recv().unwrap(), ChannelEvent::RequestFailed));
        assert!(mux.find(id).is_none());
    }

    #[test]
    fn test_unhandled_channel_request_event() {
        let mux = ChannelMultiplexer::new();
        let id = mux.allocate_id();
        let (_channel, mut rx) = mux.register(Channel::new(id, ChannelKind::Session));
        mux.dispatch(&confirmation_packet(id, 4));
        let _ = rx.try_recv();

        let mut w = WireWriter::new();
        w.put_u32(id);
        w.put_string("exit-status");
        w.put_bool(false);
        w.put_u32(0);
        mux.dispatch(&Packet::new(
            MessageType::ChannelRequest as u8,
            w.into_bytes(),
        ));

        match rx.try_recv().unwrap() {
            ChannelEvent::UnhandledPacket { message_type, .. } => {
                assert_eq!(message_type, MessageType::ChannelRequest as u8);
            }
            other => panic!("expected UnhandledPacket, got {:?}", other),
        }
    }
}
