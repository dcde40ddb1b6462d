//! SSH client protocol engine.
//!
//! # Architecture
//!
//! The engine is layered, leaves first:
//!
//! 1. **Byte plumbing** ([`buffer`], [`wire`], [`crc`]) - stream buffering
//!    and SSH primitive-type encoding
//! 2. **Packet codec** ([`packet`], [`packetizer`]) - framing, optional
//!    encryption and integrity checking over the raw byte stream
//! 3. **Key agreement** ([`ec`], [`kex`]) - ECDH over short-Weierstrass and
//!    Montgomery curves, behind a static algorithm table
//! 4. **Multiplexing** ([`channel`], [`mux`]) - many logical streams over
//!    one connection with per-channel flow control
//! 5. **Connection core** ([`connection`], [`exchange`], [`version`]) -
//!    phase routing between the synchronous handshake coordinator and the
//!    multiplexer, and the locked send path
//!
//! Inbound flow: socket bytes → packet codec (decrypt, verify, strip
//! framing) → synchronous coordinator during the handshake, channel
//! multiplexer afterwards. Outbound flow: payload builders → packet codec
//! (frame, encrypt, check) → socket, serialized under the send lock.
//!
//! # Security Considerations
//!
//! - Packet lengths are validated against protocol bounds before any
//!   allocation; a violation halts the codec permanently
//! - The Montgomery ladder runs a fixed iteration count with
//!   branch-free register swaps
//! - Ephemeral private scalars are erased after the shared secret is
//!   derived
//! - Integrity-check comparison is constant time
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 4254](https://datatracker.ietf.org/doc/html/rfc4254) - SSH Connection Protocol
//! - [RFC 5656](https://datatracker.ietf.org/doc/html/rfc5656) - Elliptic Curve Algorithm Integration
//! - [RFC 7748](https://datatracker.ietf.org/doc/html/rfc7748) - Elliptic Curves for Security

pub mod buffer;
pub mod channel;
pub mod connection;
pub mod crc;
pub mod crypto;
pub mod ec;
pub mod exchange;
pub mod kex;
pub mod message;
pub mod mux;
pub mod packet;
pub mod packetizer;
pub mod version;
pub mod wire;

// Re-export main types
pub use buffer::ByteBuffer;
pub use channel::{
    Channel, ChannelEvent, ChannelKind, ChannelState, FlowControl, SlidingWindow,
};
pub use connection::{ChannelHandle, Connection, ConnectionConfig, ConnectionEvents};
pub use crypto::{derive_key, Aes128Ctr, Aes256Ctr, PacketCipher};
pub use ec::{EcdhKeyExchange, MontgomeryCurve, MontgomeryCurveKind, WeierstrassCurve};
pub use exchange::ExchangeCoordinator;
pub use kex::{negotiate_algorithm, KexAlgorithm};
pub use message::MessageType;
pub use mux::ChannelMultiplexer;
pub use packet::Packet;
pub use packetizer::Packetizer;
pub use version::Version;
pub use wire::{WireReader, WireWriter};
