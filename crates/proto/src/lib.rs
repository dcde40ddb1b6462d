//! SSH client protocol engine for the halyard library.
//!
//! This crate implements the client side of the SSH protocol:
//!
//! - **Packet codec** - framing, optional encryption, integrity checking
//! - **Channel multiplexer** - many logical streams over one connection
//! - **Synchronous exchange coordinator** - request/response during handshake
//! - **ECDH key agreement** - short-Weierstrass and Montgomery curve families
//!
//! # Example
//!
//! ```rust
//! use halyard_proto::ssh::packet::Packet;
//! use halyard_proto::ssh::message::MessageType;
//!
//! // Build a protocol packet and frame it for the wire
//! let packet = Packet::new(MessageType::Ignore as u8, b"keep-alive".to_vec());
//! let wire = packet.frame(&mut rand::thread_rng()).unwrap();
//! // everything after the length field aligns to the 8-byte block unit
//! assert_eq!((wire.len() - 4) % 8, 0);
//! ```
//!
//! # Security
//!
//! - Ephemeral key material is zeroized on drop (`zeroize`)
//! - The Montgomery ladder runs a fixed number of iterations per curve
//! - Integrity-check comparison is constant time (`subtle`)
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 4254](https://datatracker.ietf.org/doc/html/rfc4254) - SSH Connection Protocol
//! - [RFC 5656](https://datatracker.ietf.org/doc/html/rfc5656) - Elliptic Curve Algorithm Integration
//! - [RFC 7748](https://datatracker.ietf.org/doc/html/rfc7748) - Elliptic Curves for Security

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod ssh;
