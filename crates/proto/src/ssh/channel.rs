//! Channel entity: lifecycle state machine, flow control and wire builders.
//!
//! A channel is one multiplexed logical stream over the connection. Each
//! channel carries a locally assigned ID (never reused for the life of the
//! connection), the peer-assigned remote ID (bound once at open acceptance),
//! a kind, and a lifecycle state:
//!
//! ```text
//! Requested ---> Established ---> Ready ---> Closing ---> Closed
//!     |                |            |           ^
//!     |                +------------+-----------+
//!     +---> Failed
//! ```
//!
//! Data transmission is permitted only in `Ready`, and only within the
//! peer-granted flow-control window. The window update arithmetic is a
//! pluggable strategy behind the [`FlowControl`] trait.

use crate::ssh::wire::WireWriter;
use bytes::Bytes;
use halyard_platform::{HalyardError, HalyardResult};

/// Default initial window size advertised on channel open (1 MB).
pub const DEFAULT_WINDOW_SIZE: u32 = 0x0010_0000;

/// Default maximum packet size advertised on channel open (32 KB).
pub const DEFAULT_MAX_PACKET_SIZE: u32 = 0x8000;

/// Channel kind.
///
/// Exec, shell and subsystem channels are all "session" channels on the
/// wire; the kind records what the channel is used for so collaborators can
/// dispatch without a class hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Generic session channel.
    Session,
    /// Interactive shell.
    Shell,
    /// Local-to-remote forwarded connection.
    ForwardedLocalToRemote,
    /// Remote-to-local forwarded connection.
    ForwardedRemoteToLocal,
    /// Command execution.
    ExecCommand,
    /// Named subsystem (e.g. "sftp").
    Subsystem,
    /// Agent forwarding.
    AgentForwarding,
    /// Anything else.
    Other,
}

impl ChannelKind {
    /// Returns the channel type name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ChannelKind::Session
            | ChannelKind::Shell
            | ChannelKind::ExecCommand
            | ChannelKind::Subsystem
            | ChannelKind::Other => "session",
            ChannelKind::ForwardedLocalToRemote => "direct-tcpip",
            ChannelKind::ForwardedRemoteToLocal => "forwarded-tcpip",
            ChannelKind::AgentForwarding => "auth-agent@openssh.com",
        }
    }
}

/// Channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Open requested; remote ID not yet bound.
    Requested,
    /// Peer confirmed the open; both IDs bound.
    Established,
    /// Channel-specific setup complete; data transfer permitted.
    Ready,
    /// Close/EOF signalled by either side.
    Closing,
    /// Teardown acknowledged; the entry leaves the ID table.
    Closed,
    /// Peer rejected the open request.
    Failed,
}

/// Flow-control window strategy.
///
/// Tracks how many bytes may still be sent before the peer acknowledges.
/// The exact replenishment arithmetic is protocol-version specific, hence a
/// trait rather than hard-coded accounting.
pub trait FlowControl: Send {
    /// Consumes window space for an outgoing transfer.
    ///
    /// # Errors
    ///
    /// Returns [`HalyardError::Protocol`] if `bytes` exceeds the available
    /// window.
    fn consume(&mut self, bytes: u32) -> HalyardResult<()>;

    /// Returns window space granted by the peer.
    fn replenish(&mut self, bytes: u32);

    /// Bytes currently available to send.
    fn available(&self) -> u32;
}

/// Simple sliding-window accounting.
#[derive(Debug)]
pub struct SlidingWindow {
    window: u32,
}

impl SlidingWindow {
    /// Creates a window with `initial` bytes available.
    pub fn new(initial: u32) -> Self {
        Self { window: initial }
    }
}

impl FlowControl for SlidingWindow {
    fn consume(&mut self, bytes: u32) -> HalyardResult<()> {
        if bytes > self.window {
            return Err(HalyardError::Protocol(format!(
                "not enough window space: need {}, have {}",
                bytes, self.window
            )));
        }
        self.window -= bytes;
        Ok(())
    }

    fn replenish(&mut self, bytes: u32) {
        self.window = self.window.saturating_add(bytes);
    }

    fn available(&self) -> u32 {
        self.window
    }
}

/// Channel lifecycle and data events delivered to collaborators.
///
/// Events arrive in codec emission order on the channel's event queue.
#[derive(Debug)]
pub enum ChannelEvent {
    /// The peer confirmed the channel open (kind-specific data attached).
    Established {
        /// Channel-type specific data from the confirmation.
        data: Bytes,
    },
    /// Channel-specific setup finished; data transfer is now permitted.
    Ready,
    /// Inbound channel data.
    Data {
        /// Payload bytes.
        data: Bytes,
    },
    /// Inbound extended data (e.g. stderr).
    ExtendedData {
        /// Data type discriminator (1 = stderr).
        data_type: u32,
        /// Payload bytes.
        data: Bytes,
    },
    /// The peer will send no more data.
    Eof,
    /// The channel is going down.
    Closing {
        /// True if the peer initiated the close.
        by_peer: bool,
    },
    /// Teardown finished; no further events follow.
    Closed {
        /// True if the peer initiated the close.
        by_peer: bool,
    },
    /// A channel setup request was rejected by the peer.
    RequestFailed,
    /// A channel-scoped error.
    Error {
        /// Describes what went wrong.
        message: String,
    },
    /// A channel-scoped message this engine does not interpret.
    UnhandledPacket {
        /// Message type byte.
        message_type: u8,
        /// Remaining packet bytes after the recipient-channel field.
        data: Bytes,
    },
}

/// Extended-data type code for stderr.
pub const EXTENDED_DATA_STDERR: u32 = 1;

/// One multiplexed logical stream.
///
/// The multiplexer exclusively owns the ID-to-channel mapping; a channel
/// never owns the connection it transmits through.
pub struct Channel {
    local_id: u32,
    remote_id: Option<u32>,
    kind: ChannelKind,
    state: ChannelState,
    flow: Box<dyn FlowControl>,
    remote_max_packet: u32,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("local_id", &self.local_id)
            .field("remote_id", &self.remote_id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("window", &self.flow.available())
            .finish()
    }
}

impl Channel {
    /// Creates a channel in `Requested` state.
    pub fn new(local_id: u32, kind: ChannelKind) -> Self {
        Self {
            local_id,
            remote_id: None,
            kind,
            state: ChannelState::Requested,
            flow: Box::new(SlidingWindow::new(0)),
            remote_max_packet: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    /// Replaces the flow-control strategy.
    pub fn with_flow_control(mut self, flow: Box<dyn FlowControl>) -> Self {
        self.flow = flow;
        self
    }

    /// Local channel ID.
    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    /// Remote channel ID, once bound.
    pub fn remote_id(&self) -> Option<u32> {
        self.remote_id
    }

    /// Channel kind.
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Bytes available in the send window.
    pub fn send_window(&self) -> u32 {
        self.flow.available()
    }

    /// Largest packet the peer accepts on this channel.
    pub fn remote_max_packet(&self) -> u32 {
        self.remote_max_packet
    }

    /// Validates and applies a lifecycle transition.
    ///
    /// Staying in the current state is always permitted; everything else
    /// follows the state diagram.
    pub fn transition(&mut self, next: ChannelState) -> HalyardResult<()> {
        use ChannelState::*;

        let valid = match (self.state, next) {
            (Requested, Established) => true,
            (Requested, Failed) => true,
            (Established, Ready) => true,
            // either side may start teardown from any non-terminal state
            (Requested | Established | Ready, Closing) => true,
            (Closing, Closed) => true,
            (s1, s2) if s1 == s2 => true,
            _ => false,
        };

        if !valid {
            return Err(HalyardError::Protocol(format!(
                "invalid channel state transition: {:?} -> {:?}",
                self.state, next
            )));
        }

        self.state = next;
        Ok(())
    }

    /// Binds the peer's channel parameters on open acceptance and moves the
    /// channel to `Established`.
    pub fn bind_remote(
        &mut self,
        remote_id: u32,
        initial_window: u32,
        max_packet: u32,
    ) -> HalyardResult<()> {
        self.transition(ChannelState::Established)?;
        self.remote_id = Some(remote_id);
        self.flow.replenish(initial_window);
        self.remote_max_packet = max_packet;
        Ok(())
    }

    /// True if data may be sent now.
    pub fn can_send(&self) -> bool {
        self.state == ChannelState::Ready
    }

    /// Consumes send window for `bytes` of outgoing data.
    pub fn consume_window(&mut self, bytes: u32) -> HalyardResult<()> {
        self.flow.consume(bytes)
    }

    /// Credits send window granted by the peer.
    pub fn replenish_window(&mut self, bytes: u32) {
        self.flow.replenish(bytes)
    }

    fn bound_remote_id(&self) -> HalyardResult<u32> {
        self.remote_id.ok_or_else(|| {
            HalyardError::Protocol(format!(
                "channel {} has no remote ID bound yet",
                self.local_id
            ))
        })
    }

    // --- outbound message payloads (message type byte excluded) ---

    /// Builds the channel-open payload for this channel.
    ///
    /// `extra` carries channel-type specific fields already in wire form
    /// (see [`forwarding_open_extra`]).
    pub fn open_payload(&self, extra: &[u8]) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.put_string(self.kind.name());
        w.put_u32(self.local_id);
        w.put_u32(DEFAULT_WINDOW_SIZE);
        w.put_u32(DEFAULT_MAX_PACKET_SIZE);
        w.put_raw(extra);
        w.into_bytes()
    }

    /// Builds a data payload.
    pub fn data_payload(&self, data: &[u8]) -> HalyardResult<Vec<u8>> {
        let mut w = WireWriter::new();
        w.put_u32(self.bound_remote_id()?);
        w.put_byte_string(data);
        Ok(w.into_bytes())
    }

    /// Builds an extended-data payload.
    pub fn extended_data_payload(&self, data_type: u32, data: &[u8]) -> HalyardResult<Vec<u8>> {
        let mut w = WireWriter::new();
        w.put_u32(self.bound_remote_id()?);
        w.put_u32(data_type);
        w.put_byte_string(data);
        Ok(w.into_bytes())
    }

    /// Builds a window-adjust payload granting `bytes` to the peer.
    pub fn window_adjust_payload(&self, bytes: u32) -> HalyardResult<Vec<u8>> {
        let mut w = WireWriter::new();
        w.put_u32(self.bound_remote_id()?);
        w.put_u32(bytes);
        Ok(w.into_bytes())
    }

    /// Builds an EOF payload.
    pub fn eof_payload(&self) -> HalyardResult<Vec<u8>> {
        let mut w = WireWriter::new();
        w.put_u32(self.bound_remote_id()?);
        Ok(w.into_bytes())
    }

    /// Builds a close payload.
    pub fn close_payload(&self) -> HalyardResult<Vec<u8>> {
        let mut w = WireWriter::new();
        w.put_u32(self.bound_remote_id()?);
        Ok(w.into_bytes())
    }

    /// Builds a pty-req channel request payload.
    pub fn pty_request_payload(
        &self,
        term: &str,
        width_chars: u32,
        height_rows: u32,
    ) -> HalyardResult<Vec<u8>> {
        let mut w = WireWriter::new();
        w.put_u32(self.bound_remote_id()?);
        w.put_string("pty-req");
        w.put_bool(true);
        w.put_string(term);
        w.put_u32(width_chars);
        w.put_u32(height_rows);
        w.put_u32(0); // width, pixels
        w.put_u32(0); // height, pixels
        w.put_byte_string(&[0]); // encoded terminal modes: TTY_OP_END
        Ok(w.into_bytes())
    }

    /// Builds a shell channel request payload.
    pub fn shell_request_payload(&self) -> HalyardResult<Vec<u8>> {
        let mut w = WireWriter::new();
        w.put_u32(self.bound_remote_id()?);
        w.put_string("shell");
        w.put_bool(true);
        Ok(w.into_bytes())
    }

    /// Builds an exec channel request payload.
    pub fn exec_request_payload(&self, command: &str) -> HalyardResult<Vec<u8>> {
        let mut w = WireWriter::new();
        w.put_u32(self.bound_remote_id()?);
        w.put_string("exec");
        w.put_bool(true);
        w.put_string(command);
        Ok(w.into_bytes())
    }

    /// Builds a subsystem channel request payload.
    pub fn subsystem_request_payload(&self, name: &str) -> HalyardResult<Vec<u8>> {
        let mut w = WireWriter::new();
        w.put_u32(self.bound_remote_id()?);
        w.put_string("subsystem");
        w.put_bool(true);
        w.put_string(name);
        Ok(w.into_bytes())
    }
}

/// Builds the channel-type specific extra fields for a forwarded channel
/// open (target host/port plus originator host/port).
pub fn forwarding_open_extra(
    host: &str,
    port: u32,
    originator_host: &str,
    originator_port: u32,
) -> Vec<u8> {
    let mut w = WireWriter::new();
    w.put_string(host);
    w.put_u32(port);
    w.put_string(originator_host);
    w.put_u32(originator_port);
    w.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::wire::WireReader;

    #[test]
    fn test_new_channel_state() {
        let channel = Channel::new(0, ChannelKind::Shell);
        assert_eq!(channel.local_id(), 0);
        assert_eq!(channel.remote_id(), None);
        assert_eq!(channel.state(), ChannelState::Requested);
        assert_eq!(channel.send_window(), 0);
    }

    #[test]
    fn test_normal_lifecycle() {
        let mut channel = Channel::new(3, ChannelKind::Session);
        channel.bind_remote(17, 4096, 1024).unwrap();
        assert_eq!(channel.state(), ChannelState::Established);
        assert_eq!(channel.remote_id(), Some(17));
        assert_eq!(channel.send_window(), 4096);
        assert_eq!(channel.remote_max_packet(), 1024);

        channel.transition(ChannelState::Ready).unwrap();
        assert!(channel.can_send());

        channel.transition(ChannelState::Closing).unwrap();
        channel.transition(ChannelState::Closed).unwrap();
        assert!(!channel.can_send());
    }

    #[test]
    fn test_failed_from_requested_only() {
        let mut channel = Channel::new(0, ChannelKind::Session);
        channel.transition(ChannelState::Failed).unwrap();

        let mut channel = Channel::new(1, ChannelKind::Session);
        channel.bind_remote(9, 0, 0).unwrap();
        assert!(channel.transition(ChannelState::Failed).is_err());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut channel = Channel::new(0, ChannelKind::Session);
        assert!(channel.transition(ChannelState::Ready).is_err());
        assert!(channel.transition(ChannelState::Closed).is_err());

        // same state is a no-op
        channel.transition(ChannelState::Requested).unwrap();
    }

    #[test]
    fn test_close_from_any_nonterminal_state() {
        for setup in 0..3 {
            let mut channel = Channel::new(0, ChannelKind::Session);
            if setup >= 1 {
                channel.bind_remote(1, 0, 0).unwrap();
            }
            if setup >= 2 {
                channel.transition(ChannelState::Ready).unwrap();
            }
            channel.transition(ChannelState::Closing).unwrap();
        }
    }

    #[test]
    fn test_window_accounting() {
        let mut channel = Channel::new(0, ChannelKind::Session);
        channel.bind_remote(1, 1000, 32768).unwrap();

        channel.consume_window(600).unwrap();
        assert_eq!(channel.send_window(), 400);

        assert!(channel.consume_window(500).is_err());
        assert_eq!(channel.send_window(), 400);

        channel.replenish_window(600);
        assert_eq!(channel.send_window(), 1000);
    }

    #[test]
    fn test_window_replenish_saturates() {
        let mut window = SlidingWindow::new(u32::MAX - 1);
        window.replenish(100);
        assert_eq!(window.available(), u32::MAX);
    }

    #[test]
    fn test_open_payload() {
        let channel = Channel::new(5, ChannelKind::Shell);
        let payload = channel.open_payload(&[]);

        let mut r = WireReader::new(&payload);
        assert_eq!(r.read_string().unwrap(), "session");
        assert_eq!(r.read_u32().unwrap(), 5);
        assert_eq!(r.read_u32().unwrap(), DEFAULT_WINDOW_SIZE);
        assert_eq!(r.read_u32().unwrap(), DEFAULT_MAX_PACKET_SIZE);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_forwarding_open_payload() {
        let channel = Channel::new(2, ChannelKind::ForwardedLocalToRemote);
        let extra = forwarding_open_extra("example.com", 80, "127.0.0.1", 54321);
        let payload = channel.open_payload(&extra);

        let mut r = WireReader::new(&payload);
        assert_eq!(r.read_string().unwrap(), "direct-tcpip");
        r.read_u32().unwrap();
        r.read_u32().unwrap();
        r.read_u32().unwrap();
        assert_eq!(r.read_string().unwrap(), "example.com");
        assert_eq!(r.read_u32().unwrap(), 80);
        assert_eq!(r.read_string().unwrap(), "127.0.0.1");
        assert_eq!(r.read_u32().unwrap(), 54321);
    }

    #[test]
    fn test_data_payload_requires_bound_remote() {
        let channel = Channel::new(0, ChannelKind::Session);
        assert!(channel.data_payload(b"x").is_err());

        let mut channel = Channel::new(0, ChannelKind::Session);
        channel.bind_remote(42, 100, 100).unwrap();
        let payload = channel.data_payload(b"hello").unwrap();

        let mut r = WireReader::new(&payload);
        assert_eq!(r.read_u32().unwrap(), 42);
        assert_eq!(r.read_byte_string().unwrap(), b"hello");
    }

    #[test]
    fn test_request_payloads() {
        let mut channel = Channel::new(0, ChannelKind::ExecCommand);
        channel.bind_remote(7, 100, 100).unwrap();

        let payload = channel.exec_request_payload("ls -la").unwrap();
        let mut r = WireReader::new(&payload);
        assert_eq!(r.read_u32().unwrap(), 7);
        assert_eq!(r.read_string().unwrap(), "exec");
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_string().unwrap(), "ls -la");

        let payload = channel.pty_request_payload("xterm", 80, 24).unwrap();
        let mut r = WireReader::new(&payload);
        r.read_u32().unwrap();
        assert_eq!(r.read_string().unwrap(), "pty-req");
    }
}
