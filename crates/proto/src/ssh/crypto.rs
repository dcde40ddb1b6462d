//! Symmetric cipher capability and session-key derivation.
//!
//! The packet codec consumes ciphers as an opaque in-place
//! encrypt/decrypt capability ([`PacketCipher`]); the concrete suite is
//! chosen during negotiation. AES-128/256 in counter mode are provided here;
//! other suites plug in through the same trait.
//!
//! Session keys are derived from the key-exchange shared secret with the
//! standard hash chain (RFC 4253 Section 7.2):
//!
//! ```text
//! Initial IV client to server:     HASH(K || H || "A" || session_id)
//! Initial IV server to client:     HASH(K || H || "B" || session_id)
//! Encryption key client to server: HASH(K || H || "C" || session_id)
//! Encryption key server to client: HASH(K || H || "D" || session_id)
//! Integrity key client to server:  HASH(K || H || "E" || session_id)
//! Integrity key server to client:  HASH(K || H || "F" || session_id)
//! ```

use cipher::{KeyIvInit, StreamCipher};
use halyard_platform::{HalyardError, HalyardResult};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::ssh::wire::encode_mpint;

type Aes128CtrInner = ctr::Ctr128BE<aes::Aes128>;
type Aes256CtrInner = ctr::Ctr128BE<aes::Aes256>;

/// In-place symmetric cipher capability used by the packet codec.
///
/// One instance per direction; the codec owns the receive-direction instance
/// and the send path owns its own. Stream position advances with every call,
/// so both ends must process identical byte sequences in identical order.
pub trait PacketCipher {
    /// Encrypts `data` in place.
    fn encrypt_in_place(&mut self, data: &mut [u8]);

    /// Decrypts `data` in place.
    fn decrypt_in_place(&mut self, data: &mut [u8]);

    /// Cipher block size in bytes.
    fn block_size(&self) -> usize;
}

/// AES-128 in counter mode.
pub struct Aes128Ctr {
    inner: Aes128CtrInner,
}

impl Aes128Ctr {
    /// Creates the cipher from 16 bytes of key and 16 bytes of IV.
    pub fn new(key: &[u8], iv: &[u8]) -> HalyardResult<Self> {
        let inner = Aes128CtrInner::new_from_slices(key, iv)
            .map_err(|_| HalyardError::Security("invalid AES-128-CTR key or IV length".to_string()))?;
        Ok(Self { inner })
    }
}

impl PacketCipher for Aes128Ctr {
    fn encrypt_in_place(&mut self, data: &mut [u8]) {
        self.inner.apply_keystream(data);
    }

    fn decrypt_in_place(&mut self, data: &mut [u8]) {
        self.inner.apply_keystream(data);
    }

    fn block_size(&self) -> usize {
        16
    }
}

/// AES-256 in counter mode.
pub struct Aes256Ctr {
    inner: Aes256CtrInner,
}

impl Aes256Ctr {
    /// Creates the cipher from 32 bytes of key and 16 bytes of IV.
    pub fn new(key: &[u8], iv: &[u8]) -> HalyardResult<Self> {
        let inner = Aes256CtrInner::new_from_slices(key, iv)
            .map_err(|_| HalyardError::Security("invalid AES-256-CTR key or IV length".to_string()))?;
        Ok(Self { inner })
    }
}

impl PacketCipher for Aes256Ctr {
    fn encrypt_in_place(&mut self, data: &mut [u8]) {
        self.inner.apply_keystream(data);
    }

    fn decrypt_in_place(&mut self, data: &mut [u8]) {
        self.inner.apply_keystream(data);
    }

    fn block_size(&self) -> usize {
        16
    }
}

/// Derives a session key from the shared secret and exchange hash.
///
/// # Arguments
///
/// * `shared_secret` - big-endian magnitude of K (encoded as mpint for hashing)
/// * `exchange_hash` - exchange hash H
/// * `session_id` - session identifier (H of the first key exchange)
/// * `key_kind` - key kind letter, `b'A'` through `b'F'`
/// * `key_length` - desired key length in bytes
pub fn derive_key(
    shared_secret: &[u8],
    exchange_hash: &[u8],
    session_id: &[u8],
    key_kind: u8,
    key_length: usize,
) -> Vec<u8> {
    let mut k_mpint = encode_mpint(shared_secret);

    let mut key = Vec::with_capacity(key_length);
    let mut hasher = Sha256::new();

    // first block: HASH(K || H || kind || session_id)
    hasher.update(&k_mpint);
    hasher.update(exchange_hash);
    hasher.update([key_kind]);
    hasher.update(session_id);
    let block = hasher.finalize_reset();
    key.extend_from_slice(&block);

    // extend: HASH(K || H || previous output)
    while key.len() < key_length {
        hasher.update(&k_mpint);
        hasher.update(exchange_hash);
        hasher.update(&key);
        let block = hasher.finalize_reset();
        key.extend_from_slice(&block);
    }

    k_mpint.zeroize();
    key.truncate(key_length);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes128_ctr_round_trip() {
        let key = [0x42u8; 16];
        let iv = [0x24u8; 16];

        let mut enc = Aes128Ctr::new(&key, &iv).unwrap();
        let mut dec = Aes128Ctr::new(&key, &iv).unwrap();

        let mut data = b"attack at dawn".to_vec();
        enc.encrypt_in_place(&mut data);
        assert_ne!(&data, b"attack at dawn");

        dec.decrypt_in_place(&mut data);
        assert_eq!(&data, b"attack at dawn");
    }

    #[test]
    fn test_aes256_ctr_round_trip() {
        let key = [0x13u8; 32];
        let iv = [0x37u8; 16];

        let mut enc = Aes256Ctr::new(&key, &iv).unwrap();
        let mut dec = Aes256Ctr::new(&key, &iv).unwrap();

        let mut data = vec![0u8; 100];
        enc.encrypt_in_place(&mut data);
        dec.decrypt_in_place(&mut data);
        assert_eq!(data, vec![0u8; 100]);
    }

    #[test]
    fn test_stream_position_advances() {
        let key = [7u8; 16];
        let iv = [9u8; 16];
        let mut cipher = Aes128Ctr::new(&key, &iv).unwrap();

        let mut first = vec![0u8; 16];
        let mut second = vec![0u8; 16];
        cipher.encrypt_in_place(&mut first);
        cipher.encrypt_in_place(&mut second);
        assert_ne!(first, second);
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        assert!(Aes128Ctr::new(&[0u8; 8], &[0u8; 16]).is_err());
        assert!(Aes256Ctr::new(&[0u8; 32], &[0u8; 4]).is_err());
    }

    #[test]
    fn test_derive_key_length_and_kind() {
        let k = vec![0x42; 32];
        let h = vec![0x01; 32];
        let sid = vec![0x02; 32];

        let key = derive_key(&k, &h, &sid, b'C', 32);
        assert_eq!(key.len(), 32);

        // different kinds give different keys
        let key_a = derive_key(&k, &h, &sid, b'A', 32);
        assert_ne!(key, key_a);

        // 64-byte keys need two hash blocks
        let long = derive_key(&k, &h, &sid, b'C', 64);
        assert_eq!(long.len(), 64);
        assert_eq!(&long[..32], &key[..]);
    }
}
