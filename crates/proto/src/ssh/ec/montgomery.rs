//! Montgomery curves: X25519 and X448 scalar multiplication (RFC 7748).
//!
//! Scalars are clamped before use (low bits cleared per the cofactor, the
//! curve-specific high bits set or cleared) and multiplied with the
//! Montgomery ladder. The ladder always runs the curve's full bit count and
//! swaps its working registers through masked arithmetic, so neither the
//! iteration count nor the swap pattern depends on the scalar — a security
//! property, not an optimization. The final projective-to-affine division
//! uses Fermat's little theorem (`z^(p-2) mod p`).
//!
//! Public values travel as fixed-length little-endian strings: 32 bytes for
//! Curve25519, 56 bytes for Curve448.

use crate::ssh::ec::ring::ModulusRing;
use num_bigint::BigUint;
use num_traits::{One, Zero};

/// Supported Montgomery curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MontgomeryCurveKind {
    /// Curve25519 (255-bit).
    Curve25519,
    /// Curve448 (448-bit).
    Curve448,
}

/// Montgomery curve parameters and scalar multiplication.
#[derive(Debug)]
pub struct MontgomeryCurve {
    kind: MontgomeryCurveKind,
    ring: ModulusRing,
    a24: BigUint,
    base_u: BigUint,
    bits: u64,
    encoded_len: usize,
}

impl MontgomeryCurve {
    /// Creates the parameter set for `kind`.
    pub fn new(kind: MontgomeryCurveKind) -> Self {
        match kind {
            MontgomeryCurveKind::Curve25519 => {
                // p = 2^255 - 19
                let p = (BigUint::one() << 255u32) - BigUint::from(19u32);
                Self {
                    kind,
                    ring: ModulusRing::new(p),
                    a24: BigUint::from(121665u32),
                    base_u: BigUint::from(9u32),
                    bits: 255,
                    encoded_len: 32,
                }
            }
            MontgomeryCurveKind::Curve448 => {
                // p = 2^448 - 2^224 - 1
                let p = (BigUint::one() << 448u32)
                    - (BigUint::one() << 224u32)
                    - BigUint::one();
                Self {
                    kind,
                    ring: ModulusRing::new(p),
                    a24: BigUint::from(39081u32),
                    base_u: BigUint::from(5u32),
                    bits: 448,
                    encoded_len: 56,
                }
            }
        }
    }

    /// The curve this instance parameterizes.
    pub fn kind(&self) -> MontgomeryCurveKind {
        self.kind
    }

    /// Curve size in bits (and ladder iteration count).
    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Length of the fixed little-endian public value encoding.
    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }

    /// The base point u-coordinate.
    pub fn base_u(&self) -> &BigUint {
        &self.base_u
    }

    /// Clamps a scalar into the curve's valid range.
    ///
    /// Curve25519 clears the three low bits, clears bit 255 and sets bit
    /// 254; Curve448 clears the two low bits and sets bit 447.
    pub fn clamp_scalar(&self, k: &BigUint) -> BigUint {
        let mut bytes = k.to_bytes_le();
        bytes.resize(self.encoded_len, 0);
        match self.kind {
            MontgomeryCurveKind::Curve25519 => {
                bytes[0] &= 0xf8;
                bytes[31] &= 0x7f;
                bytes[31] |= 0x40;
            }
            MontgomeryCurveKind::Curve448 => {
                bytes[0] &= 0xfc;
                bytes[55] |= 0x80;
            }
        }
        BigUint::from_bytes_le(&bytes)
    }

    /// Normalizes an input u-coordinate.
    ///
    /// Curve25519 masks the unused top bit of the final byte; Curve448 has
    /// no spare bit to mask. Values at or above the field prime reduce
    /// implicitly in the ladder arithmetic.
    pub fn fix_u(&self, u: &BigUint) -> BigUint {
        match self.kind {
            MontgomeryCurveKind::Curve25519 => u & ((BigUint::one() << 255u32) - BigUint::one()),
            MontgomeryCurveKind::Curve448 => u.clone(),
        }
    }

    /// Computes `k * u` with the Montgomery ladder.
    ///
    /// The scalar is clamped and the u-coordinate normalized internally.
    /// Exactly `bits` iterations run regardless of the scalar value.
    pub fn scalar_multiplication(&self, k: &BigUint, u: &BigUint) -> BigUint {
        let k = self.clamp_scalar(k);
        let x1 = self.fix_u(u);

        let mut x2 = BigUint::one();
        let mut z2 = BigUint::zero();
        let mut x3 = x1.clone();
        let mut z3 = BigUint::one();
        let mut swap = 0u8;

        for t in (0..self.bits).rev() {
            let k_t = u8::from(k.bit(t));
            swap ^= k_t;
            conditional_swap(swap, &mut x2, &mut x3);
            conditional_swap(swap, &mut z2, &mut z3);
            swap = k_t;

            let a = self.ring.add(&x2, &z2);
            let aa = self.ring.sqr(&a);
            let b = self.ring.sub(&x2, &z2);
            let bb = self.ring.sqr(&b);
            let e = self.ring.sub(&aa, &bb);
            let c = self.ring.add(&x3, &z3);
            let d = self.ring.sub(&x3, &z3);
            let da = self.ring.mul(&d, &a);
            let cb = self.ring.mul(&c, &b);

            x3 = self.ring.sqr(&self.ring.add(&da, &cb));
            z3 = self.ring.mul(&x1, &self.ring.sqr(&self.ring.sub(&da, &cb)));
            x2 = self.ring.mul(&aa, &bb);
            z2 = self.ring.mul(&e, &self.ring.add(&aa, &self.ring.mul(&self.a24, &e)));
        }

        conditional_swap(swap, &mut x2, &mut x3);
        conditional_swap(swap, &mut z2, &mut z3);

        self.ring.mul(&x2, &self.ring.inv(&z2))
    }

    /// Encodes a field element as the fixed-length little-endian string.
    pub fn encode_u(&self, value: &BigUint) -> Vec<u8> {
        let mut bytes = value.to_bytes_le();
        bytes.resize(self.encoded_len, 0);
        bytes
    }

    /// Decodes a little-endian string as a field element.
    pub fn decode_u(&self, bytes: &[u8]) -> BigUint {
        BigUint::from_bytes_le(bytes)
    }
}

/// Swaps `a` and `b` when `swap` is 1, through masked arithmetic rather
/// than a data-dependent branch.
fn conditional_swap(swap: u8, a: &mut BigUint, b: &mut BigUint) {
    let mask = BigUint::from(swap);
    let t = (&*a ^ &*b) * &mask;
    *a ^= &t;
    *b ^= &t;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le(hex: &str) -> BigUint {
        BigUint::from_bytes_le(&hex::decode(hex).unwrap())
    }

    fn dec(s: &str) -> BigUint {
        BigUint::parse_bytes(s.as_bytes(), 10).unwrap()
    }

    // test vectors from RFC 7748 Section 5.2

    #[test]
    fn test_x25519_vector_1() {
        let curve = MontgomeryCurve::new(MontgomeryCurveKind::Curve25519);

        let k = le("a546e36bf0527c9d3b16154b82465edd62144c0ac1fc5a18506a2244ba449ac4");
        let u = le("e6db6867583030db3594c1a424b15f7c726624ec26b3353b10a903a6d0ab1c4c");

        assert_eq!(
            curve.clamp_scalar(&k),
            dec("31029842492115040904895560451863089656472772604678260265531221036453811406496")
        );
        assert_eq!(
            curve.fix_u(&u),
            dec("34426434033919594451155107781188821651316167215306631574996226621102155684838")
        );

        let r = curve.scalar_multiplication(&k, &u);
        assert_eq!(
            curve.encode_u(&r),
            hex::decode("c3da55379de9c6908e94ea4df28d084f32eccf03491c71f754b4075577a28552")
                .unwrap()
        );
    }

    #[test]
    fn test_x25519_vector_2() {
        let curve = MontgomeryCurve::new(MontgomeryCurveKind::Curve25519);

        let k = le("4b66e9d4d1b4673c5ad22691957d6af5c11b6421e0ea01d42ca4169e7918ba0d");
        let u = le("e5210f12786811d3f4b7959d0538ae2c31dbe7106fc03c3efc4cd549c715a493");

        let r = curve.scalar_multiplication(&k, &u);
        assert_eq!(
            curve.encode_u(&r),
            hex::decode("95cbde9476e8907d7aade45cb4b873f88b595a68799fa152e6f8f7647aac7957")
                .unwrap()
        );
    }

    #[test]
    fn test_x448_vector_1() {
        let curve = MontgomeryCurve::new(MontgomeryCurveKind::Curve448);

        let k = le(
            "3d262fddf9ec8e88495266fea19a34d28882acef045104d0d1aae121700a779c\
             984c24f8cdd78fbff44943eba368f54b29259a4f1c600ad3",
        );
        let u = le(
            "06fce640fa3487bfda5f6cf2d5263f8aad88334cbd07437f020f08f9814dc031\
             ddbdc38c19c6da2583fa5429db94ada18aa7a7fb4ef8a086",
        );

        assert_eq!(
            curve.clamp_scalar(&k),
            dec(
                "599189175373896402783756016145213256157230856085026129926891459468622403380588\
                 640249457727683869421921443004045221642549886377526240828"
            )
        );

        let r = curve.scalar_multiplication(&k, &u);
        assert_eq!(
            curve.encode_u(&r),
            hex::decode(
                "ce3e4ff95a60dc6697da1db1d85e6afbdf79b50a2412d7546d5f239fe14fbaad\
                 eb445fc66a01b0779d98223961111e21766282f73dd96b6f"
            )
            .unwrap()
        );
    }

    #[test]
    fn test_x448_vector_2() {
        let curve = MontgomeryCurve::new(MontgomeryCurveKind::Curve448);

        let k = le(
            "203d494428b8399352665ddca42f9de8fef600908e0d461cb021f8c538345dd7\
             7c3e4806e25f46d3315c44e0a5b4371282dd2c8d5be3095f",
        );
        let u = le(
            "0fbcc2f993cd56d3305b0b7d9e55d4c1a8fb5dbb52f8e9a1e9b6201b165d0158\
             94e56c4d3570bee52fe205e28a78b91cdfbde71ce8d157db",
        );

        let r = curve.scalar_multiplication(&k, &u);
        assert_eq!(
            curve.encode_u(&r),
            hex::decode(
                "884a02576239ff7a2f2f63b2db6a9ff37047ac13568e1e30fe63c4a7ad1b3ee3\
                 a5700df34321d62077e63633c575c1c954514e99da7c179d"
            )
            .unwrap()
        );
    }

    #[test]
    fn test_ladder_is_deterministic() {
        let curve = MontgomeryCurve::new(MontgomeryCurveKind::Curve25519);
        let k = le("a546e36bf0527c9d3b16154b82465edd62144c0ac1fc5a18506a2244ba449ac4");
        let u = curve.base_u().clone();

        let first = curve.scalar_multiplication(&k, &u);
        let second = curve.scalar_multiplication(&k, &u);
        assert_eq!(first, second);
    }

    #[test]
    fn test_iterated_base_point_x25519() {
        // first step of the RFC 7748 iteration test: k = u = base encoding
        let curve = MontgomeryCurve::new(MontgomeryCurveKind::Curve25519);
        let initial = le("0900000000000000000000000000000000000000000000000000000000000000");

        let r = curve.scalar_multiplication(&initial, &initial);
        assert_eq!(
            curve.encode_u(&r),
            hex::decode("422c8e7a6227d7bca1350b3e2bb7279f7897b87bb6854b783c60e80311ae3079")
                .unwrap()
        );
    }

    #[test]
    fn test_iterated_base_point_x448() {
        let curve = MontgomeryCurve::new(MontgomeryCurveKind::Curve448);
        let initial = le(
            "0500000000000000000000000000000000000000000000000000000000000000\
             000000000000000000000000000000000000000000000000",
        );

        let r = curve.scalar_multiplication(&initial, &initial);
        assert_eq!(
            curve.encode_u(&r),
            hex::decode(
                "3f482c8a9f19b01e6c46ee9711d9dc14fd4bf67af30765c2ae2b846a4d23a8cd\
                 0db897086239492caf350b51f833868b9bc2b3bca9cf4113"
            )
            .unwrap()
        );
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let curve = MontgomeryCurve::new(MontgomeryCurveKind::Curve25519);
        let value = le("e6db6867583030db3594c1a424b15f7c726624ec26b3353b10a903a6d0ab1c4c");
        assert_eq!(curve.decode_u(&curve.encode_u(&value)), value);
        assert_eq!(curve.encode_u(&BigUint::zero()).len(), 32);
    }
}
