//! Number-theoretic transforms over NTT-friendly prime moduli.

use crate::zq::Modulus;
use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::iter::successors;

/// Returns whether the modulus `p` supports the negacyclic NTT of the given
/// size, i.e. whether `p = 1 (mod 2 * size)` for a power-of-two size >= 8.
pub fn supports_ntt(p: u64, size: usize) -> bool {
    size.is_power_of_two() && size >= 8 && p % ((size as u64) << 1) == 1
}

/// Number-Theoretic Transform operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NttOperator {
    p: Modulus,
    p_twice: u64,
    size: usize,
    omegas: Box<[u64]>,
    omegas_shoup: Box<[u64]>,
    zetas_inv: Box<[u64]>,
    zetas_inv_shoup: Box<[u64]>,
    size_inv: u64,
    size_inv_shoup: u64,
}

impl NttOperator {
    /// Create an NTT operator given a modulus for a specific size.
    ///
    /// Returns None if the modulus does not support the NTT for this specific
    /// size.
    pub fn new(p: &Modulus, size: usize) -> Option<Self> {
        if !supports_ntt(p.p, size) {
            None
        } else {
            let size_inv = p.inv(size as u64)?;

            let omega = Self::primitive_root(size, p);
            let omega_inv = p.inv(omega)?;

            let powers = successors(Some(1u64), |n| Some(p.mul(*n, omega)))
                .take(size)
                .collect_vec();
            let powers_inv = successors(Some(omega_inv), |n| Some(p.mul(*n, omega_inv)))
                .take(size)
                .collect_vec();

            let mut omegas = Vec::with_capacity(size);
            let mut zetas_inv = Vec::with_capacity(size);
            for i in 0..size {
                let j = i.reverse_bits() >> (size.leading_zeros() + 1);
                omegas.push(powers[j]);
                zetas_inv.push(powers_inv[j]);
            }

            let omegas_shoup = p.shoup_vec(&omegas);
            let zetas_inv_shoup = p.shoup_vec(&zetas_inv);

            Some(Self {
                p: p.clone(),
                p_twice: p.p * 2,
                size,
                omegas: omegas.into_boxed_slice(),
                omegas_shoup: omegas_shoup.into_boxed_slice(),
                zetas_inv: zetas_inv.into_boxed_slice(),
                zetas_inv_shoup: zetas_inv_shoup.into_boxed_slice(),
                size_inv,
                size_inv_shoup: p.shoup(size_inv),
            })
        }
    }

    /// Compute the forward NTT in place.
    /// Aborts if a is not of the size handled by the operator.
    pub fn forward(&self, a: &mut [u64]) {
        debug_assert_eq!(a.len(), self.size);

        let n = self.size;

        let mut l = n >> 1;
        let mut m = 1;
        let mut k = 1;
        while l > 0 {
            for i in 0..m {
                let omega = self.omegas[k];
                let omega_shoup = self.omegas_shoup[k];
                k += 1;

                let s = 2 * i * l;
                if l == 1 {
                    // The last level reduces the output.
                    let (x, y) = Self::pair_mut(a, s, s + l);
                    self.butterfly(x, y, omega, omega_shoup);
                    *x = self.reduce3(*x);
                    *y = self.reduce3(*y);
                } else {
                    for j in s..(s + l) {
                        let (x, y) = Self::pair_mut(a, j, j + l);
                        self.butterfly(x, y, omega, omega_shoup);
                    }
                }
            }
            l >>= 1;
            m <<= 1;
        }
    }

    /// Compute the backward NTT in place.
    /// Aborts if a is not of the size handled by the operator.
    pub fn backward(&self, a: &mut [u64]) {
        debug_assert_eq!(a.len(), self.size);

        let mut k = 0;
        let mut m = self.size >> 1;
        let mut l = 1;
        while m > 0 {
            for i in 0..m {
                let s = 2 * i * l;
                let zeta_inv = self.zetas_inv[k];
                let zeta_inv_shoup = self.zetas_inv_shoup[k];
                k += 1;
                for j in s..(s + l) {
                    let (x, y) = Self::pair_mut(a, j, j + l);
                    self.inv_butterfly(x, y, zeta_inv, zeta_inv_shoup);
                }
            }
            l <<= 1;
            m >>= 1;
        }

        a.iter_mut().for_each(|ai| {
            *ai = self
                .p
                .mul_shoup(Modulus::reduce1(*ai, self.p_twice), self.size_inv, self.size_inv_shoup)
        });
    }

    /// Borrow two distinct slice elements mutably; `i < j` always holds here.
    fn pair_mut(a: &mut [u64], i: usize, j: usize) -> (&mut u64, &mut u64) {
        debug_assert!(i < j);
        let (lo, hi) = a.split_at_mut(j);
        (&mut lo[i], &mut hi[0])
    }

    /// Reduce a modulo p.
    ///
    /// Aborts if a >= 4 * p.
    const fn reduce3(&self, a: u64) -> u64 {
        debug_assert!(a < 4 * self.p.p);

        let y = Modulus::reduce1(a, 2 * self.p.p);
        Modulus::reduce1(y, self.p.p)
    }

    /// NTT Butterfly; inputs and outputs stay below 4p.
    fn butterfly(&self, x: &mut u64, y: &mut u64, w: u64, w_shoup: u64) {
        debug_assert!(*x < 4 * self.p.p);
        debug_assert!(*y < 4 * self.p.p);
        debug_assert!(w < self.p.p);
        debug_assert_eq!(self.p.shoup(w), w_shoup);

        *x = Modulus::reduce1(*x, self.p_twice);
        let t = self.p.lazy_mul_shoup(*y, w, w_shoup);
        *y = *x + self.p_twice - t;
        *x += t;

        debug_assert!(*x < 4 * self.p.p);
        debug_assert!(*y < 4 * self.p.p);
    }

    /// Inverse NTT butterfly; inputs and outputs stay below 2p.
    fn inv_butterfly(&self, x: &mut u64, y: &mut u64, z: u64, z_shoup: u64) {
        debug_assert!(*x < self.p_twice);
        debug_assert!(*y < self.p_twice);
        debug_assert!(z < self.p.p);
        debug_assert_eq!(self.p.shoup(z), z_shoup);

        let t = *x;
        *x = Modulus::reduce1(*y + t, self.p_twice);
        *y = self.p.lazy_mul_shoup(self.p_twice + t - *y, z, z_shoup);

        debug_assert!(*x < self.p_twice);
        debug_assert!(*y < self.p_twice);
    }

    /// Returns a 2n-th primitive root modulo p.
    ///
    /// Aborts if p is not prime or n is not a power of 2 that is >= 8.
    fn primitive_root(n: usize, p: &Modulus) -> u64 {
        debug_assert!(supports_ntt(p.p, n));

        let lambda = (p.p - 1) / (2 * n as u64);

        let mut rng: ChaCha8Rng = SeedableRng::seed_from_u64(0);
        for _ in 0..100 {
            let mut root = rng.gen_range(0..p.p);
            root = p.pow(root, lambda);
            if Self::is_primitive_root(root, 2 * n, p) {
                return root;
            }
        }

        debug_assert!(false, "Couldn't find primitive root");
        0
    }

    /// Returns whether a is a n-th primitive root of unity.
    ///
    /// Aborts if a >= p in debug mode.
    fn is_primitive_root(a: u64, n: usize, p: &Modulus) -> bool {
        debug_assert!(a < p.p);

        // A primitive root of unity is such that x^n = 1 mod p, and x^(n/2) != 1 mod p.
        (p.pow(a, n as u64) == 1) && (p.pow(a, (n / 2) as u64) != 1)
    }
}

#[cfg(test)]
mod tests {
    use super::{supports_ntt, NttOperator};
    use crate::zq::Modulus;
    use rand::thread_rng;

    const MODULI: &[u64] = &[1153, 4611686018326724609];

    #[test]
    fn support() {
        assert!(supports_ntt(1153, 8));
        assert!(supports_ntt(1153, 16));
        assert!(!supports_ntt(1153, 4096));
        assert!(!supports_ntt(1154, 8));
    }

    #[test]
    fn forward_backward_round_trip() {
        let mut rng = thread_rng();
        for p in MODULI {
            let q = Modulus::new(*p).unwrap();
            for size in [8usize, 16, 32] {
                if !supports_ntt(*p, size) {
                    continue;
                }
                let op = NttOperator::new(&q, size).unwrap();
                for _ in 0..50 {
                    let a = q.random_vec(size, &mut rng);
                    let mut b = a.clone();
                    op.forward(&mut b);
                    op.backward(&mut b);
                    assert_eq!(a, b);
                }
            }
        }
    }

    #[test]
    fn ntt_is_multiplicative() {
        // The NTT of the product of two polynomials is the pointwise product
        // of their NTTs; check with x * x^2 = x^3 in the negacyclic ring.
        let q = Modulus::new(1153).unwrap();
        let op = NttOperator::new(&q, 8).unwrap();

        let mut x1 = vec![0u64; 8];
        x1[1] = 1;
        let mut x2 = vec![0u64; 8];
        x2[2] = 1;
        op.forward(&mut x1);
        op.forward(&mut x2);
        q.mul_vec(&mut x1, &x2);
        op.backward(&mut x1);

        let mut expected = vec![0u64; 8];
        expected[3] = 1;
        assert_eq!(x1, expected);
    }
}
