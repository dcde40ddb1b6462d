//! Key exchange algorithm catalog and negotiation (RFC 4253 Section 7).
//!
//! Algorithms live in a static table mapping each identifier to its protocol
//! name, preference priority and ECDH implementation — no runtime lookup by
//! reflection or registration. Negotiation follows the standard rule: the
//! first algorithm in the client's preference list that the server also
//! supports wins.
//!
//! # Example
//!
//! ```rust
//! use halyard_proto::ssh::kex::{negotiate_algorithm, KexAlgorithm};
//!
//! let client = KexAlgorithm::preferred_name_list();
//! let server = vec![
//!     "ecdh-sha2-nistp256".to_string(),
//!     "curve25519-sha256".to_string(),
//! ];
//! let negotiated = negotiate_algorithm(&client, &server).unwrap();
//! assert_eq!(negotiated, KexAlgorithm::Curve25519Sha256);
//! ```

use crate::ssh::ec::ecdh::{EcdhKeyExchange, MontgomeryEcdh, WeierstrassEcdh};
use crate::ssh::ec::montgomery::MontgomeryCurveKind;
use crate::ssh::ec::weierstrass::WeierstrassCurve;
use halyard_platform::{HalyardError, HalyardResult};
use rand::{CryptoRng, RngCore};

/// Supported key exchange algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KexAlgorithm {
    /// curve25519-sha256 (RFC 8731)
    Curve25519Sha256,
    /// curve25519-sha256@libssh.org (pre-standardization name)
    Curve25519Sha256Libssh,
    /// curve448-sha512 (RFC 8731)
    Curve448Sha512,
    /// ecdh-sha2-nistp256 (RFC 5656)
    EcdhSha2Nistp256,
    /// ecdh-sha2-nistp384 (RFC 5656)
    EcdhSha2Nistp384,
    /// ecdh-sha2-nistp521 (RFC 5656)
    EcdhSha2Nistp521,
}

/// All supported algorithms, highest priority first.
const SUPPORTED: &[KexAlgorithm] = &[
    KexAlgorithm::Curve25519Sha256,
    KexAlgorithm::Curve25519Sha256Libssh,
    KexAlgorithm::Curve448Sha512,
    KexAlgorithm::EcdhSha2Nistp256,
    KexAlgorithm::EcdhSha2Nistp384,
    KexAlgorithm::EcdhSha2Nistp521,
];

impl KexAlgorithm {
    /// The algorithm name used in negotiation.
    pub fn name(&self) -> &'static str {
        match self {
            KexAlgorithm::Curve25519Sha256 => "curve25519-sha256",
            KexAlgorithm::Curve25519Sha256Libssh => "curve25519-sha256@libssh.org",
            KexAlgorithm::Curve448Sha512 => "curve448-sha512",
            KexAlgorithm::EcdhSha2Nistp256 => "ecdh-sha2-nistp256",
            KexAlgorithm::EcdhSha2Nistp384 => "ecdh-sha2-nistp384",
            KexAlgorithm::EcdhSha2Nistp521 => "ecdh-sha2-nistp521",
        }
    }

    /// Looks up an algorithm by its negotiation name.
    pub fn from_name(name: &str) -> Option<Self> {
        SUPPORTED.iter().copied().find(|a| a.name() == name)
    }

    /// Preference priority; higher is preferred.
    pub fn priority(&self) -> u32 {
        let index = SUPPORTED
            .iter()
            .position(|a| a == self)
            .unwrap_or(SUPPORTED.len());
        (SUPPORTED.len() - index) as u32
    }

    /// All supported algorithms, highest priority first.
    pub fn supported() -> &'static [KexAlgorithm] {
        SUPPORTED
    }

    /// The supported algorithm names in preference order, for a KEXINIT
    /// name-list.
    pub fn preferred_name_list() -> Vec<String> {
        SUPPORTED.iter().map(|a| a.name().to_string()).collect()
    }

    /// Creates a fresh ephemeral ECDH context for this algorithm.
    pub fn create_exchange<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> HalyardResult<Box<dyn EcdhKeyExchange + Send>> {
        let exchange: Box<dyn EcdhKeyExchange + Send> = match self {
            KexAlgorithm::Curve25519Sha256 | KexAlgorithm::Curve25519Sha256Libssh => {
                Box::new(MontgomeryEcdh::new(MontgomeryCurveKind::Curve25519, rng))
            }
            KexAlgorithm::Curve448Sha512 => {
                Box::new(MontgomeryEcdh::new(MontgomeryCurveKind::Curve448, rng))
            }
            KexAlgorithm::EcdhSha2Nistp256 => {
                Box::new(WeierstrassEcdh::new(WeierstrassCurve::nistp256(), rng)?)
            }
            KexAlgorithm::EcdhSha2Nistp384 => {
                Box::new(WeierstrassEcdh::new(WeierstrassCurve::nistp384(), rng)?)
            }
            KexAlgorithm::EcdhSha2Nistp521 => {
                Box::new(WeierstrassEcdh::new(WeierstrassCurve::nistp521(), rng)?)
            }
        };
        Ok(exchange)
    }
}

impl std::fmt::Display for KexAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Negotiates the key exchange algorithm.
///
/// The first name in the client's preference list that the server also
/// offers — and this engine implements — wins.
///
/// # Errors
///
/// Returns [`HalyardError::Protocol`] when no common algorithm exists.
pub fn negotiate_algorithm(
    client_list: &[String],
    server_list: &[String],
) -> HalyardResult<KexAlgorithm> {
    for name in client_list {
        if server_list.iter().any(|s| s == name) {
            if let Some(algorithm) = KexAlgorithm::from_name(name) {
                return Ok(algorithm);
            }
        }
    }
    Err(HalyardError::Protocol(
        "no common key exchange algorithm".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_lookup_round_trip() {
        for algorithm in KexAlgorithm::supported() {
            assert_eq!(KexAlgorithm::from_name(algorithm.name()), Some(*algorithm));
        }
        assert_eq!(KexAlgorithm::from_name("diffie-hellman-group1-sha1"), None);
    }

    #[test]
    fn test_priority_order() {
        assert!(
            KexAlgorithm::Curve25519Sha256.priority()
                > KexAlgorithm::EcdhSha2Nistp521.priority()
        );
    }

    #[test]
    fn test_negotiate_first_client_preference() {
        let client = KexAlgorithm::preferred_name_list();
        let server = vec![
            "ecdh-sha2-nistp384".to_string(),
            "curve448-sha512".to_string(),
        ];
        assert_eq!(
            negotiate_algorithm(&client, &server).unwrap(),
            KexAlgorithm::Curve448Sha512
        );
    }

    #[test]
    fn test_negotiate_no_common_algorithm() {
        let client = KexAlgorithm::preferred_name_list();
        let server = vec!["diffie-hellman-group1-sha1".to_string()];
        assert!(negotiate_algorithm(&client, &server).is_err());
    }

    #[test]
    fn test_negotiate_skips_unsupported_common_names() {
        // both sides list an algorithm this engine does not implement ahead
        // of one it does
        let client = vec![
            "diffie-hellman-group14-sha256".to_string(),
            "curve25519-sha256".to_string(),
        ];
        let server = client.clone();
        assert_eq!(
            negotiate_algorithm(&client, &server).unwrap(),
            KexAlgorithm::Curve25519Sha256
        );
    }

    #[test]
    fn test_create_exchange_round_trip() {
        let mut rng = rand::thread_rng();
        for algorithm in [
            KexAlgorithm::Curve25519Sha256,
            KexAlgorithm::EcdhSha2Nistp256,
        ] {
            let a = algorithm.create_exchange(&mut rng).unwrap();
            let b = algorithm.create_exchange(&mut rng).unwrap();
            assert_eq!(
                a.shared_secret(b.ephemeral_public_key()).unwrap(),
                b.shared_secret(a.ephemeral_public_key()).unwrap(),
            );
        }
    }
}
