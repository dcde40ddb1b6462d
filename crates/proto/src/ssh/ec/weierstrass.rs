//! Short-Weierstrass curves: y² = x³ + ax + b over Fp (RFC 5656).
//!
//! Affine point arithmetic for the NIST prime curves. [`EcPoint`] cannot
//! represent the point at infinity; operations that may produce it return
//! `Option<EcPoint>` with `None` standing for infinity.
//!
//! Domain parameters are built lazily on first use and shared for the
//! process lifetime.

use crate::ssh::ec::ring::ModulusRing;
use halyard_platform::{HalyardError, HalyardResult};
use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use once_cell::sync::Lazy;
use rand::{CryptoRng, RngCore};

/// An affine elliptic curve point.
///
/// Cannot represent the point at infinity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcPoint {
    /// X coordinate.
    pub x: BigUint,
    /// Y coordinate.
    pub y: BigUint,
}

impl EcPoint {
    /// Parses a point stored in the uncompressed form (0x04 || X || Y).
    ///
    /// Consistency with a particular curve is not checked here; use
    /// [`WeierstrassCurve::parse_point`] for a validating parse. Returns
    /// `None` for all-zero input (the point at infinity), a missing 0x04
    /// prefix, or a malformed length. The compressed form is not supported —
    /// interoperating implementations do not emit it.
    pub fn parse_uncompressed(data: &[u8]) -> Option<EcPoint> {
        if data.iter().all(|&b| b == 0) {
            return None;
        }
        if data.len() < 3 || data[0] != 0x04 {
            return None;
        }
        if (data.len() - 1) % 2 != 0 {
            return None;
        }

        let element_len = (data.len() - 1) / 2;
        Some(EcPoint {
            x: BigUint::from_bytes_be(&data[1..1 + element_len]),
            y: BigUint::from_bytes_be(&data[1 + element_len..]),
        })
    }
}

/// Elliptic curve domain parameters over Fp.
pub struct WeierstrassCurve {
    name: &'static str,
    a: BigUint,
    b: BigUint,
    g: EcPoint,
    n: BigUint,
    h: BigUint,
    ring: ModulusRing,
}

impl std::fmt::Debug for WeierstrassCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeierstrassCurve")
            .field("name", &self.name)
            .finish()
    }
}

fn big(hex: &str) -> BigUint {
    BigUint::from_bytes_be(&hex::decode(hex).expect("invalid curve constant"))
}

static NISTP256: Lazy<WeierstrassCurve> = Lazy::new(|| WeierstrassCurve {
    name: "nistp256",
    a: big("ffffffff00000001000000000000000000000000fffffffffffffffffffffffc"),
    b: big("5ac635d8aa3a93e7b3ebbd55769886bc651d06b0cc53b0f63bce3c3e27d2604b"),
    g: EcPoint::parse_uncompressed(
        &hex::decode(
            "046b17d1f2e12c4247f8bce6e563a440f277037d812deb33a0f4a13945d898c2\
             964fe342e2fe1a7f9b8ee7eb4a7c0f9e162bce33576b315ececbb6406837bf51f5",
        )
        .expect("invalid curve constant"),
    )
    .expect("invalid base point"),
    n: big("ffffffff00000000ffffffffffffffffbce6faada7179e84f3b9cac2fc632551"),
    h: BigUint::one(),
    ring: ModulusRing::new(big(
        "ffffffff00000001000000000000000000000000ffffffffffffffffffffffff",
    )),
});

static NISTP384: Lazy<WeierstrassCurve> = Lazy::new(|| WeierstrassCurve {
    name: "nistp384",
    a: big(
        "fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffe\
         ffffffff0000000000000000fffffffc",
    ),
    b: big(
        "b3312fa7e23ee7e4988e056be3f82d19181d9c6efe8141120314088f5013875a\
         c656398d8a2ed19d2a85c8edd3ec2aef",
    ),
    g: EcPoint::parse_uncompressed(
        &hex::decode(
            "04aa87ca22be8b05378eb1c71ef320ad746e1d3b628ba79b9859f741e082542a\
             385502f25dbf55296c3a545e3872760ab73617de4a96262c6f5d9e98bf9292dc\
             29f8f41dbd289a147ce9da3113b5f0b8c00a60b1ce1d7e819d7a431d7c90ea0e5f",
        )
        .expect("invalid curve constant"),
    )
    .expect("invalid base point"),
    n: big(
        "ffffffffffffffffffffffffffffffffffffffffffffffffc7634d81f4372ddf\
         581a0db248b0a77aecec196accc52973",
    ),
    h: BigUint::one(),
    ring: ModulusRing::new(big(
        "fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffe\
         ffffffff0000000000000000ffffffff",
    )),
});

static NISTP521: Lazy<WeierstrassCurve> = Lazy::new(|| WeierstrassCurve {
    name: "nistp521",
    a: big(
        "01ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff\
         ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff\
         fffffffc",
    ),
    b: big(
        "0051953eb9618e1c9a1f929a21a0b68540eea2da725b99b315f3b8b489918ef1\
         09e156193951ec7e937b1652c0bd3bb1bf073573df883d2c34f1ef451fd46b50\
         3f00",
    ),
    g: EcPoint::parse_uncompressed(
        &hex::decode(
            "0400c6858e06b70404e9cd9e3ecb662395b4429c648139053fb521f828af606b\
             4d3dbaa14b5e77efe75928fe1dc127a2ffa8de3348b3c1856a429bf97e7e31c2\
             e5bd66011839296a789a3bc0045c8a5fb42c7d1bd998f54449579b446817afbd\
             17273e662c97ee72995ef42640c550b9013fad0761353c7086a272c24088be94\
             769fd16650",
        )
        .expect("invalid curve constant"),
    )
    .expect("invalid base point"),
    n: big(
        "01fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffa\
         51868783bf2f966b7fcc0148f709a5d03bb5c9b8899c47aebb6fb71e91386409",
    ),
    h: BigUint::one(),
    ring: ModulusRing::new(big(
        "01ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff\
         ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff\
         ffffffff",
    )),
});

impl WeierstrassCurve {
    /// The nistp256 (secp256r1) domain parameters.
    pub fn nistp256() -> &'static WeierstrassCurve {
        &NISTP256
    }

    /// The nistp384 (secp384r1) domain parameters.
    pub fn nistp384() -> &'static WeierstrassCurve {
        &NISTP384
    }

    /// The nistp521 (secp521r1) domain parameters.
    pub fn nistp521() -> &'static WeierstrassCurve {
        &NISTP521
    }

    /// Finds a curve by its identifier.
    pub fn find_by_name(name: &str) -> Option<&'static WeierstrassCurve> {
        match name {
            "nistp256" => Some(Self::nistp256()),
            "nistp384" => Some(Self::nistp384()),
            "nistp521" => Some(Self::nistp521()),
            _ => None,
        }
    }

    /// Curve identifier.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Base point G.
    pub fn base_point(&self) -> &EcPoint {
        &self.g
    }

    /// Order of G.
    pub fn order(&self) -> &BigUint {
        &self.n
    }

    /// Cofactor.
    pub fn cofactor(&self) -> &BigUint {
        &self.h
    }

    /// Curve size in bits.
    pub fn curve_size(&self) -> u64 {
        self.n.bits()
    }

    /// Field element length in bytes.
    pub fn element_len(&self) -> usize {
        ((self.curve_size() + 7) / 8) as usize
    }

    /// Validates that `(x, y)` satisfies the curve equation and lies within
    /// the field.
    pub fn validate_point(&self, point: &EcPoint) -> bool {
        let p = self.ring.modulus();
        if point.x.is_zero() || point.x >= *p || point.y.is_zero() || point.y >= *p {
            return false;
        }
        let y2 = self.ring.sqr(&point.y);
        let x3 = self.ring.mul(&self.ring.sqr(&point.x), &point.x);
        let fx = self
            .ring
            .add(&self.ring.add(&x3, &self.ring.mul(&self.a, &point.x)), &self.b);
        y2 == fx
    }

    /// Point addition. `None` is the point at infinity.
    pub fn point_add(&self, p1: &EcPoint, p2: &EcPoint) -> Option<EcPoint> {
        if p1.x == p2.x {
            if p1.y == p2.y {
                return self.point_double(p1);
            }
            // x1 == x2, y1 == -y2: vertical line
            return None;
        }

        // lambda = (y2 - y1) / (x2 - x1)
        let lambda = self.ring.mul(
            &self.ring.sub(&p2.y, &p1.y),
            &self.ring.inv(&self.ring.sub(&p2.x, &p1.x)),
        );
        let x3 = self
            .ring
            .sub(&self.ring.sqr(&lambda), &self.ring.add(&p1.x, &p2.x));
        let y3 = self
            .ring
            .sub(&self.ring.mul(&lambda, &self.ring.sub(&p1.x, &x3)), &p1.y);
        Some(EcPoint { x: x3, y: y3 })
    }

    /// Point doubling. `None` is the point at infinity.
    pub fn point_double(&self, p1: &EcPoint) -> Option<EcPoint> {
        if p1.y.is_zero() {
            return None;
        }

        // lambda = (3 * x1^2 + a) / (2 * y1)
        let x1_sq = self.ring.sqr(&p1.x);
        let three_x1_sq = self.ring.add(&self.ring.add(&x1_sq, &x1_sq), &x1_sq);
        let lambda = self.ring.mul(
            &self.ring.add(&three_x1_sq, &self.a),
            &self.ring.inv(&self.ring.add(&p1.y, &p1.y)),
        );
        let x3 = self
            .ring
            .sub(&self.ring.sqr(&lambda), &self.ring.add(&p1.x, &p1.x));
        let y3 = self
            .ring
            .sub(&self.ring.mul(&lambda, &self.ring.sub(&p1.x, &x3)), &p1.y);
        Some(EcPoint { x: x3, y: y3 })
    }

    /// Scalar multiplication `k * t` by double-and-add.
    ///
    /// Returns `None` for `k = 0` or any other product that lands on the
    /// point at infinity.
    pub fn point_mul(&self, k: &BigUint, t: &EcPoint) -> Option<EcPoint> {
        let mut acc: Option<EcPoint> = None;
        for i in (0..k.bits()).rev() {
            if let Some(point) = &acc {
                acc = self.point_double(point);
            }
            if k.bit(i) {
                acc = match &acc {
                    None => Some(t.clone()),
                    Some(point) => self.point_add(point, t),
                };
            }
        }
        acc
    }

    /// Validating parse of an uncompressed octet-string point.
    ///
    /// Rejects the point at infinity, wrong lengths for this curve, and
    /// points that do not satisfy the curve equation.
    pub fn parse_point(&self, data: &[u8]) -> Option<EcPoint> {
        if data.len() != 1 + 2 * self.element_len() {
            return None;
        }
        let point = EcPoint::parse_uncompressed(data)?;
        if !self.validate_point(&point) {
            return None;
        }
        Some(point)
    }

    /// Encodes a point as an uncompressed octet string.
    pub fn to_octet_string(&self, point: &EcPoint) -> HalyardResult<Vec<u8>> {
        let element_len = self.element_len();
        let mut buff = vec![0u8; 1 + element_len * 2];
        buff[0] = 0x04;

        let x = point.x.to_bytes_be();
        if x.len() > element_len {
            return Err(HalyardError::Security("invalid public key value".to_string()));
        }
        buff[1 + element_len - x.len()..1 + element_len].copy_from_slice(&x);

        let y = point.y.to_bytes_be();
        if y.len() > element_len {
            return Err(HalyardError::Security("invalid public key value".to_string()));
        }
        buff[1 + element_len * 2 - y.len()..].copy_from_slice(&y);

        Ok(buff)
    }

    /// Generates an ephemeral key pair: a random scalar in `[1, n)` and the
    /// matching public point.
    pub fn generate_keypair<R: RngCore + CryptoRng>(&self, rng: &mut R) -> (BigUint, EcPoint) {
        loop {
            let k = rng.gen_biguint_range(&BigUint::one(), &self.n);
            if let Some(q) = self.point_mul(&k, &self.g) {
                return (k, q);
            }
        }
    }
}
