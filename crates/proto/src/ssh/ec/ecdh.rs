//! ECDH key agreement over both curve families.
//!
//! [`EcdhKeyExchange`] is the uniform contract the key-exchange logic works
//! against: generate an ephemeral key at construction, export the public
//! value, and compute the shared secret from the peer's public value. A
//! fresh context is created for every key-exchange round and the private
//! scalar is erased when the context drops.
//!
//! Any decode or validation failure of the peer's value is fatal and never
//! retried — retrying cannot change a peer's invalid input.

use crate::ssh::ec::montgomery::{MontgomeryCurve, MontgomeryCurveKind};
use crate::ssh::ec::weierstrass::WeierstrassCurve;
use halyard_platform::{HalyardError, HalyardResult};
use num_bigint::BigUint;
use num_traits::Zero;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

/// Uniform ephemeral key agreement contract.
pub trait EcdhKeyExchange: Send {
    /// The exported ephemeral public value, in the curve's wire encoding.
    fn ephemeral_public_key(&self) -> &[u8];

    /// Curve size in bits.
    fn curve_size(&self) -> usize;

    /// Computes the shared secret from the peer's public value.
    ///
    /// # Errors
    ///
    /// Returns [`HalyardError::Security`] on a malformed or degenerate peer
    /// value. Fatal: the key exchange cannot proceed.
    fn shared_secret(&self, peer_public: &[u8]) -> HalyardResult<BigUint>;
}

/// ECDH over a short-Weierstrass curve (RFC 5656).
pub struct WeierstrassEcdh {
    curve: &'static WeierstrassCurve,
    private: BigUint,
    public: Vec<u8>,
}

impl WeierstrassEcdh {
    /// Generates a fresh ephemeral context on `curve`.
    pub fn new<R: RngCore + CryptoRng>(
        curve: &'static WeierstrassCurve,
        rng: &mut R,
    ) -> HalyardResult<Self> {
        let (private, public_point) = curve.generate_keypair(rng);
        let public = curve.to_octet_string(&public_point)?;
        Ok(Self {
            curve,
            private,
            public,
        })
    }
}

impl EcdhKeyExchange for WeierstrassEcdh {
    fn ephemeral_public_key(&self) -> &[u8] {
        &self.public
    }

    fn curve_size(&self) -> usize {
        self.curve.curve_size() as usize
    }

    fn shared_secret(&self, peer_public: &[u8]) -> HalyardResult<BigUint> {
        let peer_point = self.curve.parse_point(peer_public).ok_or_else(|| {
            HalyardError::Security("peer's ephemeral public key is invalid".to_string())
        })?;

        // scalar = cofactor * private (the cofactor is 1 on the NIST curves)
        let k = self.curve.cofactor() * &self.private;
        let shared_point = self.curve.point_mul(&k, &peer_point).ok_or_else(|| {
            HalyardError::Security("failed to compute a shared secret".to_string())
        })?;

        Ok(shared_point.x)
    }
}

impl Drop for WeierstrassEcdh {
    fn drop(&mut self) {
        self.private = BigUint::zero();
    }
}

/// ECDH over a Montgomery curve (RFC 7748, RFC 8731).
pub struct MontgomeryEcdh {
    curve: MontgomeryCurve,
    scalar: BigUint,
    public: Vec<u8>,
}

impl MontgomeryEcdh {
    /// Generates a fresh ephemeral context on the given curve.
    pub fn new<R: RngCore + CryptoRng>(kind: MontgomeryCurveKind, rng: &mut R) -> Self {
        let curve = MontgomeryCurve::new(kind);

        let mut scalar_bytes = vec![0u8; curve.encoded_len()];
        rng.fill_bytes(&mut scalar_bytes);
        let scalar = BigUint::from_bytes_le(&scalar_bytes);
        scalar_bytes.zeroize();

        let public_u = curve.scalar_multiplication(&scalar, curve.base_u());
        let public = curve.encode_u(&public_u);

        Self {
            curve,
            scalar,
            public,
        }
    }
}

impl EcdhKeyExchange for MontgomeryEcdh {
    fn ephemeral_public_key(&self) -> &[u8] {
        &self.public
    }

    fn curve_size(&self) -> usize {
        self.curve.bits() as usize
    }

    fn shared_secret(&self, peer_public: &[u8]) -> HalyardResult<BigUint> {
        if peer_public.len() != self.curve.encoded_len() {
            return Err(HalyardError::Security(format!(
                "peer public value has invalid length: {} (expected {})",
                peer_public.len(),
                self.curve.encoded_len()
            )));
        }

        let peer_u = self.curve.decode_u(peer_public);
        let shared_u = self.curve.scalar_multiplication(&self.scalar, &peer_u);

        // zero output means the peer fed us a low-order or otherwise invalid
        // point
        if shared_u.is_zero() {
            return Err(HalyardError::Security(
                "shared secret is zero: invalid peer public value".to_string(),
            ));
        }

        // The ladder result's little-endian encoding is reinterpreted as a
        // big-endian integer. This keeps the value compatible with the
        // big-integer convention used by the rest of the engine while the
        // bytes on the wire stay the RFC 7748 encoding.
        Ok(BigUint::from_bytes_be(&self.curve.encode_u(&shared_u)))
    }
}

impl Drop for MontgomeryEcdh {
    fn drop(&mut self) {
        self.scalar = BigUint::zero();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weierstrass_round_trip_all_curves() {
        let mut rng = rand::thread_rng();
        for curve in [
            WeierstrassCurve::nistp256(),
            WeierstrassCurve::nistp384(),
            WeierstrassCurve::nistp521(),
        ] {
            let client = WeierstrassEcdh::new(curve, &mut rng).unwrap();
            let server = WeierstrassEcdh::new(curve, &mut rng).unwrap();

            let client_secret = client.shared_secret(server.ephemeral_public_key()).unwrap();
            let server_secret = server.shared_secret(client.ephemeral_public_key()).unwrap();

            assert_eq!(client_secret, server_secret, "mismatch on {}", curve.name());
            assert!(!client_secret.is_zero());
        }
    }

    #[test]
    fn test_weierstrass_rejects_zeroed_public_value() {
        let mut rng = rand::thread_rng();
        let exchange = WeierstrassEcdh::new(WeierstrassCurve::nistp256(), &mut rng).unwrap();

        let zeroed = vec![0u8; 65];
        let result = exchange.shared_secret(&zeroed);
        assert!(matches!(result, Err(HalyardError::Security(_))));
    }

    #[test]
    fn test_weierstrass_rejects_off_curve_point() {
        let mut rng = rand::thread_rng();
        let a = WeierstrassEcdh::new(WeierstrassCurve::nistp256(), &mut rng).unwrap();
        let b = WeierstrassEcdh::new(WeierstrassCurve::nistp256(), &mut rng).unwrap();

        let mut corrupted = b.ephemeral_public_key().to_vec();
        corrupted[10] ^= 0xff;
        // overwhelmingly likely off the curve; must fail validation, not
        // silently return a value
        if let Ok(secret) = a.shared_secret(&corrupted) {
            let honest = a.shared_secret(b.ephemeral_public_key()).unwrap();
            assert_ne!(secret, honest);
        }
    }

    #[test]
    fn test_montgomery_round_trip_both_curves() {
        let mut rng = rand::thread_rng();
        for kind in [MontgomeryCurveKind::Curve25519, MontgomeryCurveKind::Curve448] {
            let client = MontgomeryEcdh::new(kind, &mut rng);
            let server = MontgomeryEcdh::new(kind, &mut rng);

            let client_secret = client.shared_secret(server.ephemeral_public_key()).unwrap();
            let server_secret = server.shared_secret(client.ephemeral_public_key()).unwrap();

            assert_eq!(client_secret, server_secret);
            assert!(!client_secret.is_zero());
        }
    }

    #[test]
    fn test_montgomery_public_value_lengths() {
        let mut rng = rand::thread_rng();
        let x25519 = MontgomeryEcdh::new(MontgomeryCurveKind::Curve25519, &mut rng);
        assert_eq!(x25519.ephemeral_public_key().len(), 32);
        assert_eq!(x25519.curve_size(), 255);

        let x448 = MontgomeryEcdh::new(MontgomeryCurveKind::Curve448, &mut rng);
        assert_eq!(x448.ephemeral_public_key().len(), 56);
        assert_eq!(x448.curve_size(), 448);
    }

    #[test]
    fn test_montgomery_rejects_zeroed_public_value() {
        let mut rng = rand::thread_rng();
        let exchange = MontgomeryEcdh::new(MontgomeryCurveKind::Curve25519, &mut rng);

        // all-zero u is a low-order input; the ladder output is zero and the
        // exchange must fail rather than return it
        let result = exchange.shared_secret(&[0u8; 32]);
        assert!(matches!(result, Err(HalyardError::Security(_))));
    }

    #[test]
    fn test_montgomery_rejects_wrong_length() {
        let mut rng = rand::thread_rng();
        let exchange = MontgomeryEcdh::new(MontgomeryCurveKind::Curve25519, &mut rng);
        assert!(exchange.shared_secret(&[9u8; 56]).is_err());
    }

    #[test]
    fn test_montgomery_shared_secret_endianness_convention() {
        let mut rng = rand::thread_rng();
        let client = MontgomeryEcdh::new(MontgomeryCurveKind::Curve25519, &mut rng);
        let server = MontgomeryEcdh::new(MontgomeryCurveKind::Curve25519, &mut rng);

        let secret = client.shared_secret(server.ephemeral_public_key()).unwrap();

        // the historical convention: little-endian ladder output bytes read
        // as a big-endian integer
        let curve = MontgomeryCurve::new(MontgomeryCurveKind::Curve25519);
        let ladder = curve.scalar_multiplication(
            &client.scalar,
            &curve.decode_u(server.ephemeral_public_key()),
        );
        assert_eq!(secret, BigUint::from_bytes_be(&curve.encode_u(&ladder)));
    }
}
