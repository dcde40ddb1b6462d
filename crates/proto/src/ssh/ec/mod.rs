//! Elliptic curve arithmetic and ECDH key agreement.
//!
//! Two curve families are supported, selected by the negotiated algorithm
//! name:
//!
//! - **Short-Weierstrass** ([`weierstrass`]) - nistp256/nistp384/nistp521
//!   with affine point arithmetic and uncompressed octet-string encodings
//!   (RFC 5656)
//! - **Montgomery** ([`montgomery`]) - Curve25519/Curve448 with the
//!   constant-time ladder and little-endian fixed-length encodings
//!   (RFC 7748)
//!
//! [`ecdh`] wraps both behind a uniform generate/export/agree contract;
//! [`ring`] supplies the shared modular arithmetic.

pub mod ecdh;
pub mod montgomery;
pub mod ring;
pub mod weierstrass;

pub use ecdh::{EcdhKeyExchange, MontgomeryEcdh, WeierstrassEcdh};
pub use montgomery::{MontgomeryCurve, MontgomeryCurveKind};
pub use ring::ModulusRing;
pub use weierstrass::{EcPoint, WeierstrassCurve};
