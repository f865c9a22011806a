//! Arithmetic modulo a word-sized prime.

pub mod primes;

use crate::{Error, Result};
use itertools::Itertools;
use rand::{CryptoRng, RngCore};

/// A prime modulus smaller than 2^62, together with precomputation-friendly
/// primitives for arithmetic modulo it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modulus {
    pub(crate) p: u64,
}

impl Modulus {
    /// Create a modulus operator for `p`.
    ///
    /// Returns an error if `p < 2` or `p >= 2^62`; the 62-bit bound keeps the
    /// lazy reductions of the NTT free of overflow.
    pub fn new(p: u64) -> Result<Self> {
        if p < 2 || p >= (1u64 << 62) {
            Err(Error::InvalidModulus(p))
        } else {
            Ok(Self { p })
        }
    }

    /// The value of the modulus.
    pub const fn modulus(&self) -> u64 {
        self.p
    }

    /// Conditional subtraction: reduce `a < 2p` to `a mod p`.
    pub(crate) const fn reduce1(a: u64, p: u64) -> u64 {
        if a >= p {
            a - p
        } else {
            a
        }
    }

    /// Modular addition of `a` and `b`, both already reduced.
    pub fn add(&self, a: u64, b: u64) -> u64 {
        debug_assert!(a < self.p && b < self.p);
        Self::reduce1(a + b, self.p)
    }

    /// Modular subtraction of `b` from `a`, both already reduced.
    pub fn sub(&self, a: u64, b: u64) -> u64 {
        debug_assert!(a < self.p && b < self.p);
        Self::reduce1(a + self.p - b, self.p)
    }

    /// Modular negation of `a`, already reduced.
    pub fn neg(&self, a: u64) -> u64 {
        debug_assert!(a < self.p);
        Self::reduce1(self.p - a, self.p)
    }

    /// Modular multiplication of `a` and `b`, both already reduced.
    pub fn mul(&self, a: u64, b: u64) -> u64 {
        debug_assert!(a < self.p && b < self.p);
        ((a as u128 * b as u128) % self.p as u128) as u64
    }

    /// Reduce `a` modulo `p`.
    pub fn reduce(&self, a: u64) -> u64 {
        a % self.p
    }

    /// Reduce a 128-bit value modulo `p`.
    pub fn reduce_u128(&self, a: u128) -> u64 {
        (a % self.p as u128) as u64
    }

    /// Reduce a signed value modulo `p`, mapping negative values to their
    /// positive representatives.
    pub fn reduce_i64(&self, a: i64) -> u64 {
        a.rem_euclid(self.p as i64) as u64
    }

    /// The Shoup representation of `a`, i.e. floor(a * 2^64 / p).
    pub fn shoup(&self, a: u64) -> u64 {
        debug_assert!(a < self.p);
        (((a as u128) << 64) / self.p as u128) as u64
    }

    /// The Shoup representation of every element of `v`.
    pub fn shoup_vec(&self, v: &[u64]) -> Vec<u64> {
        v.iter().map(|vi| self.shoup(*vi)).collect_vec()
    }

    /// Lazy Shoup multiplication of `a` by `b`; the result is smaller than
    /// `2p` but not fully reduced.
    pub fn lazy_mul_shoup(&self, a: u64, b: u64, b_shoup: u64) -> u64 {
        debug_assert!(b < self.p);
        debug_assert_eq!(b_shoup, self.shoup(b));

        let q = ((a as u128 * b_shoup as u128) >> 64) as u64;
        let r = a.wrapping_mul(b).wrapping_sub(q.wrapping_mul(self.p));
        debug_assert!(r < 2 * self.p);

        r
    }

    /// Shoup multiplication of `a` by `b`.
    pub fn mul_shoup(&self, a: u64, b: u64, b_shoup: u64) -> u64 {
        Self::reduce1(self.lazy_mul_shoup(a, b, b_shoup), self.p)
    }

    /// Modular exponentiation of `base` by `exp`.
    pub fn pow(&self, base: u64, exp: u64) -> u64 {
        debug_assert!(base < self.p);

        let mut result = 1u64;
        let mut base = base;
        let mut exp = exp;
        while exp > 0 {
            if exp & 1 == 1 {
                result = self.mul(result, base);
            }
            base = self.mul(base, base);
            exp >>= 1;
        }
        result
    }

    /// Modular inverse of `a`, or `None` when `a` is not invertible.
    pub fn inv(&self, a: u64) -> Option<u64> {
        if a == 0 {
            return None;
        }
        let r = self.pow(self.reduce(a), self.p - 2);
        if self.mul(self.reduce(a), r) == 1 {
            Some(r)
        } else {
            None
        }
    }

    /// Elementwise `a[i] = (a[i] + b[i]) mod p`.
    pub fn add_vec(&self, a: &mut [u64], b: &[u64]) {
        debug_assert_eq!(a.len(), b.len());
        for (ai, bi) in a.iter_mut().zip(b.iter()) {
            *ai = self.add(*ai, *bi);
        }
    }

    /// Elementwise `a[i] = (a[i] - b[i]) mod p`.
    pub fn sub_vec(&self, a: &mut [u64], b: &[u64]) {
        debug_assert_eq!(a.len(), b.len());
        for (ai, bi) in a.iter_mut().zip(b.iter()) {
            *ai = self.sub(*ai, *bi);
        }
    }

    /// Elementwise `a[i] = -a[i] mod p`.
    pub fn neg_vec(&self, a: &mut [u64]) {
        for ai in a.iter_mut() {
            *ai = self.neg(*ai);
        }
    }

    /// Elementwise `a[i] = (a[i] * b[i]) mod p`.
    pub fn mul_vec(&self, a: &mut [u64], b: &[u64]) {
        debug_assert_eq!(a.len(), b.len());
        for (ai, bi) in a.iter_mut().zip(b.iter()) {
            *ai = self.mul(*ai, *bi);
        }
    }

    /// Elementwise `a[i] = (a[i] * b) mod p`.
    pub fn scalar_mul_vec(&self, a: &mut [u64], b: u64) {
        for ai in a.iter_mut() {
            *ai = self.mul(*ai, b);
        }
    }

    /// Elementwise reduction of `a` modulo `p`.
    pub fn reduce_vec(&self, a: &mut [u64]) {
        for ai in a.iter_mut() {
            *ai = self.reduce(*ai);
        }
    }

    /// Sample `size` values uniformly below `p` by masked rejection.
    pub fn random_vec<R: RngCore + CryptoRng>(&self, size: usize, rng: &mut R) -> Vec<u64> {
        let nbits = 64 - self.p.leading_zeros();
        let mask = if nbits == 64 {
            u64::MAX
        } else {
            (1u64 << nbits) - 1
        };
        (0..size)
            .map(|_| loop {
                let v = rng.next_u64() & mask;
                if v < self.p {
                    break v;
                }
            })
            .collect_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::Modulus;
    use proptest::prelude::*;
    use rand::thread_rng;

    const MODULI: &[u64] = &[1153, 4611686018326724609, 0x1ffffff0001];

    #[test]
    fn constructor() {
        assert!(Modulus::new(0).is_err());
        assert!(Modulus::new(1).is_err());
        assert!(Modulus::new(1 << 62).is_err());
        for p in MODULI {
            assert!(Modulus::new(*p).is_ok());
        }
    }

    #[test]
    fn inv_is_multiplicative_inverse() {
        for p in MODULI {
            let q = Modulus::new(*p).unwrap();
            assert_eq!(q.inv(0), None);
            for a in [1u64, 2, 7, p - 1] {
                let inv = q.inv(a).unwrap();
                assert_eq!(q.mul(a, inv), 1);
            }
        }
    }

    #[test]
    fn random_vec_is_reduced() {
        let mut rng = thread_rng();
        for p in MODULI {
            let q = Modulus::new(*p).unwrap();
            assert!(q.random_vec(1024, &mut rng).iter().all(|v| *v < *p));
        }
    }

    proptest! {
        #[test]
        fn shoup_mul_matches_mul(a in 0u64..4611686018326724609, b in 0u64..4611686018326724609) {
            let q = Modulus::new(4611686018326724609).unwrap();
            let b_shoup = q.shoup(b);
            prop_assert_eq!(q.mul_shoup(a, b, b_shoup), q.mul(a, b));
        }

        #[test]
        fn sub_add_round_trip(a in 0u64..1153, b in 0u64..1153) {
            let q = Modulus::new(1153).unwrap();
            prop_assert_eq!(q.add(q.sub(a, b), b), a);
        }
    }
}
