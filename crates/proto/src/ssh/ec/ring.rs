//! Modular arithmetic over a prime field.
//!
//! Every operation reduces modulo the field prime before returning, so
//! intermediate values never grow past one multiplication. The modular
//! inverse uses Fermat's little theorem (`z^(p-2) mod p`), which is valid
//! because the modulus is prime.

use num_bigint::BigUint;
use num_traits::{One, Zero};

/// Arithmetic ring modulo a prime `p`.
#[derive(Debug, Clone)]
pub struct ModulusRing {
    p: BigUint,
}

impl ModulusRing {
    /// Creates a ring modulo `p`.
    pub fn new(p: BigUint) -> Self {
        Self { p }
    }

    /// The modulus.
    pub fn modulus(&self) -> &BigUint {
        &self.p
    }

    /// `(a + b) mod p`
    pub fn add(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a + b) % &self.p
    }

    /// `(a - b) mod p`, kept non-negative.
    pub fn sub(&self, a: &BigUint, b: &BigUint) -> BigUint {
        let a = a % &self.p;
        let b = b % &self.p;
        if a >= b {
            a - b
        } else {
            &self.p - b + a
        }
    }

    /// `(a * b) mod p`
    pub fn mul(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a * b) % &self.p
    }

    /// `(a * a) mod p`
    pub fn sqr(&self, a: &BigUint) -> BigUint {
        self.mul(a, a)
    }

    /// `a^e mod p`
    pub fn pow(&self, a: &BigUint, e: &BigUint) -> BigUint {
        a.modpow(e, &self.p)
    }

    /// Modular inverse via Fermat: `a^(p-2) mod p`.
    ///
    /// Returns zero for `a ≡ 0`, which has no inverse; callers treat a zero
    /// result on a division path as a degenerate case.
    pub fn inv(&self, a: &BigUint) -> BigUint {
        if (a % &self.p).is_zero() {
            return BigUint::zero();
        }
        let exponent = &self.p - BigUint::from(2u32);
        a.modpow(&exponent, &self.p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> ModulusRing {
        ModulusRing::new(BigUint::from(97u32))
    }

    #[test]
    fn test_add_sub_wrap() {
        let r = ring();
        assert_eq!(r.add(&BigUint::from(90u32), &BigUint::from(10u32)), BigUint::from(3u32));
        assert_eq!(r.sub(&BigUint::from(3u32), &BigUint::from(10u32)), BigUint::from(90u32));
        assert_eq!(r.sub(&BigUint::from(10u32), &BigUint::from(3u32)), BigUint::from(7u32));
    }

    #[test]
    fn test_mul_and_sqr() {
        let r = ring();
        assert_eq!(r.mul(&BigUint::from(12u32), &BigUint::from(9u32)), BigUint::from(11u32));
        assert_eq!(r.sqr(&BigUint::from(10u32)), BigUint::from(3u32));
    }

    #[test]
    fn test_inverse() {
        let r = ring();
        for value in 1u32..97 {
            let v = BigUint::from(value);
            let inv = r.inv(&v);
            assert_eq!(r.mul(&v, &inv), BigUint::one());
        }
    }

    #[test]
    fn test_inverse_of_zero_is_zero() {
        let r = ring();
        assert!(r.inv(&BigUint::zero()).is_zero());
        assert!(r.inv(&BigUint::from(97u32)).is_zero());
    }
}
