//! Streaming packet codec: raw socket bytes in, discrete packets out.
//!
//! The packetizer buffers arbitrarily fragmented input (including one byte at
//! a time), reconstructs complete packets, decrypts them once a cipher has
//! been negotiated, verifies the trailing check field when integrity checking
//! is enabled, and emits exactly `message type + payload` in arrival order.
//!
//! An invalid length field or a check mismatch is fatal: the ciphertext
//! stream offers no resynchronization marker, so the codec latches into a
//! halted state and processes nothing further. The error is surfaced once;
//! subsequent `feed` calls are silent no-ops.
//!
//! # Example
//!
//! ```rust
//! use halyard_proto::ssh::packet::Packet;
//! use halyard_proto::ssh::packetizer::Packetizer;
//!
//! let wire = Packet::new(2, b"ping".to_vec())
//!     .frame(&mut rand::thread_rng())
//!     .unwrap();
//!
//! let mut codec = Packetizer::new();
//! // one byte at a time
//! let mut packets = Vec::new();
//! for byte in &wire {
//!     packets.extend(codec.feed(&[*byte]).unwrap());
//! }
//! assert_eq!(packets.len(), 1);
//! assert_eq!(packets[0].payload(), b"ping");
//! ```

use crate::ssh::buffer::ByteBuffer;
use crate::ssh::crc::crc32;
use crate::ssh::crypto::PacketCipher;
use crate::ssh::packet::{
    Packet, CHECK_FIELD_LEN, MAX_PACKET_LENGTH, MIN_PACKET_LENGTH, PACKET_LENGTH_FIELD_LEN,
};
use bytes::Buf;
use halyard_platform::{HalyardError, HalyardResult};
use subtle::ConstantTimeEq;

// Largest possible framed packet: length field + padding + packet body.
const MAX_PACKET_DATA_SIZE: usize =
    MAX_PACKET_LENGTH as usize + 8 + PACKET_LENGTH_FIELD_LEN;

/// Streaming packet codec (receive path).
///
/// Owned behind the connection's codec lock; cipher activation and decoding
/// therefore never race (see the concurrency notes on
/// [`Connection`](crate::ssh::connection::Connection)).
pub struct Packetizer {
    input: ByteBuffer,
    cipher: Option<Box<dyn PacketCipher + Send>>,
    check_integrity: bool,
    /// Length field of the in-flight packet; `None` means it has not been
    /// read yet.
    pending_length: Option<u32>,
    halted: bool,
}

impl std::fmt::Debug for Packetizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packetizer")
            .field("buffered", &self.input.len())
            .field("cipher", &self.cipher.is_some())
            .field("check_integrity", &self.check_integrity)
            .field("pending_length", &self.pending_length)
            .field("halted", &self.halted)
            .finish()
    }
}

impl Packetizer {
    /// Creates a codec with no cipher and integrity checking disabled.
    pub fn new() -> Self {
        Self {
            input: ByteBuffer::new(4096, Some(MAX_PACKET_DATA_SIZE * 16)),
            cipher: None,
            check_integrity: false,
            pending_length: None,
            halted: false,
        }
    }

    /// Installs the negotiated receive-direction cipher settings.
    ///
    /// Applied between packets only: the caller holds the codec lock, so no
    /// packet can be decrypted partly under the old cipher and partly under
    /// the new one.
    pub fn set_cipher(
        &mut self,
        cipher: Option<Box<dyn PacketCipher + Send>>,
        check_integrity: bool,
    ) {
        self.cipher = cipher;
        self.check_integrity = check_integrity;
    }

    /// Returns true if a fatal framing error has halted this codec.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Appends stream bytes and extracts every packet completed by them.
    ///
    /// Packets are returned in frame order. Partial packets stay buffered
    /// losslessly until later `feed` calls complete them.
    ///
    /// # Errors
    ///
    /// Returns [`HalyardError::Protocol`] on an out-of-bounds length field or
    /// a check mismatch. The error is reported once; after that the codec is
    /// halted and `feed` returns an empty list.
    pub fn feed(&mut self, data: &[u8]) -> HalyardResult<Vec<Packet>> {
        if self.halted {
            return Ok(Vec::new());
        }

        match self.process(data) {
            Ok(packets) => Ok(packets),
            Err(e) => {
                self.halted = true;
                Err(e)
            }
        }
    }

    fn process(&mut self, data: &[u8]) -> HalyardResult<Vec<Packet>> {
        self.input.append(data)?;

        let mut packets = Vec::new();
        while let Some(packet) = self.construct_packet()? {
            packets.push(packet);
        }
        Ok(packets)
    }

    /// Extracts one packet from the buffer, or returns `None` if more bytes
    /// are needed.
    fn construct_packet(&mut self) -> HalyardResult<Option<Packet>> {
        let packet_length = match self.pending_length {
            Some(len) => len,
            None => {
                let Some(len) = self.input.peek_u32_be() else {
                    return Ok(None);
                };
                self.input.remove_head(PACKET_LENGTH_FIELD_LEN);

                if !(MIN_PACKET_LENGTH..=MAX_PACKET_LENGTH).contains(&len) {
                    return Err(HalyardError::Protocol(format!(
                        "invalid packet length: {}",
                        len
                    )));
                }

                self.pending_length = Some(len);
                len
            }
        };

        let packet_length = packet_length as usize;
        let padding_length = 8 - (packet_length % 8);
        let required = padding_length + packet_length;

        if self.input.len() < required {
            return Ok(None);
        }

        // padding + type + payload + check
        let mut image = self.input.split_head(required);

        if let Some(cipher) = &mut self.cipher {
            cipher.decrypt_in_place(&mut image);
        }

        if self.check_integrity {
            let computed = crc32(&image[..required - CHECK_FIELD_LEN]);
            let stored = u32::from_be_bytes([
                image[required - 4],
                image[required - 3],
                image[required - 2],
                image[required - 1],
            ]);
            let computed_bytes = computed.to_be_bytes();
            let stored_bytes = stored.to_be_bytes();
            if computed_bytes[..].ct_eq(&stored_bytes[..]).unwrap_u8() == 0 {
                return Err(HalyardError::Protocol("integrity check failed".to_string()));
            }
        }

        // retain only the type and payload fields
        image.advance(padding_length);
        image.truncate(packet_length - CHECK_FIELD_LEN);

        let message_type = image[0];
        image.advance(1);

        // prepare for the next packet
        self.pending_length = None;

        Ok(Some(Packet::from_parts(message_type, image.freeze())))
    }
}

impl Default for Packetizer {
    fn default() -> Self {
        Self::new()
    }
}
