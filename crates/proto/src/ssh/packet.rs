//! SSH binary packet framing.
//!
//! # Packet Format
//!
//! ```text
//! uint32    packet_length  (= type + payload + check; excludes itself and padding)
//! byte[n]   padding        (n = 8 - (packet_length % 8), so 1-8 bytes)
//! byte      message type
//! byte[m]   payload
//! uint32    check          (CRC over padding + type + payload)
//! ```
//!
//! # Constraints
//!
//! - `packet_length` must lie in `[MIN_PACKET_LENGTH, MAX_PACKET_LENGTH]`
//! - `padding + packet_length` is a multiple of 8 (the cipher block unit)
//! - the length field itself is never encrypted; everything after it is
//!   encrypted once a cipher has been negotiated
//!
//! # Example
//!
//! ```rust
//! use halyard_proto::ssh::packet::Packet;
//! use halyard_proto::ssh::message::MessageType;
//!
//! let packet = Packet::new(MessageType::Ignore as u8, vec![]);
//! let wire = packet.frame(&mut rand::thread_rng()).unwrap();
//! // empty payload: length 5, padding 3, 12 bytes on the wire
//! assert_eq!(wire.len(), 12);
//! assert_eq!(&wire[..4], &[0, 0, 0, 5]);
//! ```

use crate::ssh::crc::crc32;
use crate::ssh::message::MessageType;
use bytes::Bytes;
use halyard_platform::{HalyardError, HalyardResult};
use rand::RngCore;

/// Minimum value of the packet length field (type byte + check field).
pub const MIN_PACKET_LENGTH: u32 = 5;

/// Maximum value of the packet length field.
///
/// Bounds memory committed to a single packet; anything larger is treated as
/// a framing error since ciphertext offers no resynchronization point.
pub const MAX_PACKET_LENGTH: u32 = 262144;

/// Size of the packet length field in bytes.
pub const PACKET_LENGTH_FIELD_LEN: usize = 4;

/// Size of the trailing check field in bytes.
pub const CHECK_FIELD_LEN: usize = 4;

/// A discrete protocol packet: message type plus payload.
///
/// Padding and the check field are framing details; they are added by
/// [`Packet::frame`] and stripped by the codec before a packet is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    message_type: u8,
    payload: Bytes,
}

impl Packet {
    /// Creates a packet from a message type byte and payload.
    pub fn new(message_type: u8, payload: Vec<u8>) -> Self {
        Self {
            message_type,
            payload: Bytes::from(payload),
        }
    }

    /// Creates a packet from already-shared payload bytes.
    pub fn from_parts(message_type: u8, payload: Bytes) -> Self {
        Self {
            message_type,
            payload,
        }
    }

    /// Returns the message type byte.
    pub fn message_type(&self) -> u8 {
        self.message_type
    }

    /// Returns the message type as a catalog entry, if known.
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_u8(self.message_type)
    }

    /// Returns the payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the packet and returns its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Value of the packet length field for this packet.
    pub fn packet_length(&self) -> u32 {
        (1 + self.payload.len() + CHECK_FIELD_LEN) as u32
    }

    /// Builds the plaintext wire image of this packet.
    ///
    /// Padding bytes are filled from `rng`. Encryption of everything after
    /// the length field is applied by the send path, under the send lock.
    ///
    /// # Errors
    ///
    /// Returns [`HalyardError::Protocol`] if the payload is too large to
    /// frame.
    pub fn frame(&self, rng: &mut dyn RngCore) -> HalyardResult<Vec<u8>> {
        let packet_length = self.packet_length();
        if packet_length > MAX_PACKET_LENGTH {
            return Err(HalyardError::Protocol(format!(
                "payload too large to frame: packet length {} exceeds {}",
                packet_length, MAX_PACKET_LENGTH
            )));
        }

        let padding_length = 8 - (packet_length as usize % 8);
        let total = PACKET_LENGTH_FIELD_LEN + padding_length + packet_length as usize;

        let mut image = vec![0u8; total];
        image[..4].copy_from_slice(&packet_length.to_be_bytes());
        rng.fill_bytes(&mut image[4..4 + padding_length]);
        image[4 + padding_length] = self.message_type;
        image[4 + padding_length + 1..total - CHECK_FIELD_LEN].copy_from_slice(&self.payload);

        let check = crc32(&image[4..total - CHECK_FIELD_LEN]);
        image[total - CHECK_FIELD_LEN..].copy_from_slice(&check.to_be_bytes());

        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_framing() {
        let packet = Packet::new(1, vec![]);
        let wire = packet.frame(&mut rand::thread_rng()).unwrap();

        // packet_length = 1 + 0 + 4 = 5; padding = 8 - 5 = 3; total = 4 + 3 + 5
        assert_eq!(wire.len(), 12);
        assert_eq!(u32::from_be_bytes([wire[0], wire[1], wire[2], wire[3]]), 5);
        assert_eq!(wire[7], 1); // message type sits after 3 bytes of padding
    }

    #[test]
    fn test_framed_length_is_block_aligned() {
        for payload_len in 0..64 {
            let packet = Packet::new(94, vec![0xab; payload_len]);
            let wire = packet.frame(&mut rand::thread_rng()).unwrap();
            assert_eq!(wire.len() % 8, 4, "padding + length must align to 8");
            assert_eq!(
                wire.len(),
                4 + packet.packet_length() as usize
                    + (8 - packet.packet_length() as usize % 8)
            );
        }
    }

    #[test]
    fn test_check_field_covers_padding_type_payload() {
        let packet = Packet::new(2, b"data".to_vec());
        let wire = packet.frame(&mut rand::thread_rng()).unwrap();

        let body = &wire[4..wire.len() - 4];
        let expected = crc32(body);
        let actual = u32::from_be_bytes([
            wire[wire.len() - 4],
            wire[wire.len() - 3],
            wire[wire.len() - 2],
            wire[wire.len() - 1],
        ]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let packet = Packet::new(94, vec![0; MAX_PACKET_LENGTH as usize]);
        let result = packet.frame(&mut rand::thread_rng());
        assert!(matches!(result, Err(HalyardError::Protocol(_))));
    }

    #[test]
    fn test_kind_lookup() {
        let packet = Packet::new(94, vec![]);
        assert_eq!(packet.kind(), Some(MessageType::ChannelData));

        let packet = Packet::new(255, vec![]);
        assert_eq!(packet.kind(), None);
    }
}
