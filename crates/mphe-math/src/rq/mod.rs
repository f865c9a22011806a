//! Polynomials in the cyclotomic ring R_q = Z_q[x] / (x^N + 1), with
//! coefficients in RNS representation.

mod context;
pub mod sampler;
pub mod scaler;

pub use context::Context;
pub use scaler::Scaler;

use crate::{Error, Result};
use itertools::izip;
use mphe_traits::{BinarySize, ByteReader, ByteWriter, Decode, Encode, SerialError};
use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use std::sync::Arc;
use zeroize::Zeroize;

/// The representation of the polynomial coefficients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Representation {
    /// Coefficients of the polynomial in the power basis.
    PowerBasis,
    /// Evaluations of the polynomial at the 2N-th roots of unity.
    Ntt,
}

/// A polynomial over one RNS modulus chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poly {
    ctx: Arc<Context>,
    representation: Representation,
    coefficients: Array2<u64>,
}

impl AsRef<Poly> for Poly {
    fn as_ref(&self) -> &Poly {
        self
    }
}

impl AsMut<Poly> for Poly {
    fn as_mut(&mut self) -> &mut Poly {
        self
    }
}

impl Poly {
    /// Creates a polynomial with all coefficients set to zero.
    pub fn zero(ctx: &Arc<Context>, representation: Representation) -> Self {
        Self {
            ctx: ctx.clone(),
            representation,
            coefficients: Array2::zeros((ctx.moduli.len(), ctx.degree)),
        }
    }

    /// The context of the polynomial.
    pub fn ctx(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// The current representation of the polynomial.
    pub fn representation(&self) -> &Representation {
        &self.representation
    }

    /// A read-only view of the coefficients, indexed by
    /// `[modulus-index][coefficient-index]`.
    pub fn coefficients(&self) -> ArrayView2<'_, u64> {
        self.coefficients.view()
    }

    /// A mutable view of the coefficients. The caller is responsible for
    /// keeping the coefficients reduced and consistent with the current
    /// representation.
    pub fn coefficients_mut(&mut self) -> ArrayViewMut2<'_, u64> {
        self.coefficients.view_mut()
    }

    /// Converts the polynomial to the given representation in place.
    pub fn change_representation(&mut self, to: Representation) {
        if self.representation == to {
            return;
        }
        let rows = self
            .coefficients
            .as_slice_mut()
            .expect("coefficient rows are contiguous");
        match to {
            Representation::Ntt => {
                for (row, op) in rows.chunks_mut(self.ctx.degree).zip(self.ctx.ops.iter()) {
                    op.forward(row);
                }
            }
            Representation::PowerBasis => {
                for (row, op) in rows.chunks_mut(self.ctx.degree).zip(self.ctx.ops.iter()) {
                    op.backward(row);
                }
            }
        }
        self.representation = to;
    }

    /// Samples a polynomial with coefficients uniform over the context.
    pub fn random<R: RngCore + CryptoRng>(
        ctx: &Arc<Context>,
        representation: Representation,
        rng: &mut R,
    ) -> Self {
        let mut out = Self::zero(ctx, representation);
        let rows = out
            .coefficients
            .as_slice_mut()
            .expect("coefficient rows are contiguous");
        for (row, q) in rows.chunks_mut(ctx.degree).zip(ctx.q.iter()) {
            row.copy_from_slice(&q.random_vec(ctx.degree, rng));
        }
        out
    }

    /// Samples a uniform polynomial from a keyed pseudo-random generator
    /// derived from a 32-byte seed. The draw sequence is deterministic: with
    /// the same seed and the same context, the output is byte-identical.
    pub fn random_from_seed(
        ctx: &Arc<Context>,
        representation: Representation,
        seed: <ChaCha8Rng as SeedableRng>::Seed,
    ) -> Self {
        let mut prng = ChaCha8Rng::from_seed(seed);
        Self::random(ctx, representation, &mut prng)
    }

    /// Samples a polynomial with small coefficients from the centered
    /// binomial distribution of the given variance.
    pub fn small<R: RngCore + CryptoRng>(
        ctx: &Arc<Context>,
        representation: Representation,
        variance: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let coeffs = sampler::sample_vec_cbd(ctx.degree, variance, rng)?;
        Self::try_convert_from(&coeffs, ctx, representation)
    }

    /// Samples a polynomial with coefficients from the discrete Gaussian of
    /// standard deviation `sigma`, truncated at 6 sigma.
    pub fn gaussian<R: RngCore + CryptoRng>(
        ctx: &Arc<Context>,
        representation: Representation,
        sigma: f64,
        rng: &mut R,
    ) -> Result<Self> {
        let coeffs = sampler::sample_vec_gaussian(ctx.degree, sigma, rng)?;
        Self::try_convert_from(&coeffs, ctx, representation)
    }

    /// Builds a polynomial from centered signed coefficients.
    pub fn try_convert_from(
        v: &[i64],
        ctx: &Arc<Context>,
        representation: Representation,
    ) -> Result<Self> {
        if v.len() != ctx.degree {
            return Err(Error::Default(format!(
                "expected {} coefficients, got {}",
                ctx.degree,
                v.len()
            )));
        }
        let mut out = Self::zero(ctx, Representation::PowerBasis);
        let rows = out
            .coefficients
            .as_slice_mut()
            .expect("coefficient rows are contiguous");
        for (row, q) in rows.chunks_mut(ctx.degree).zip(ctx.q.iter()) {
            for (ri, vi) in row.iter_mut().zip(v.iter()) {
                *ri = q.reduce_i64(*vi);
            }
        }
        out.change_representation(representation);
        Ok(out)
    }

    /// Builds a polynomial from unsigned coefficients, reduced modulo each
    /// modulus of the context.
    pub fn try_convert_from_u64(
        v: &[u64],
        ctx: &Arc<Context>,
        representation: Representation,
    ) -> Result<Self> {
        if v.len() != ctx.degree {
            return Err(Error::Default(format!(
                "expected {} coefficients, got {}",
                ctx.degree,
                v.len()
            )));
        }
        let mut out = Self::zero(ctx, Representation::PowerBasis);
        let rows = out
            .coefficients
            .as_slice_mut()
            .expect("coefficient rows are contiguous");
        for (row, q) in rows.chunks_mut(ctx.degree).zip(ctx.q.iter()) {
            for (ri, vi) in row.iter_mut().zip(v.iter()) {
                *ri = q.reduce(*vi);
            }
        }
        out.change_representation(representation);
        Ok(out)
    }

    /// Multiplies every residue of row `i` by a scalar already reduced
    /// modulo the i-th modulus.
    pub fn scalar_mul_rows(&mut self, scalars: &[u64]) {
        debug_assert_eq!(scalars.len(), self.ctx.moduli.len());
        let degree = self.ctx.degree;
        let ctx = self.ctx.clone();
        let rows = self
            .coefficients
            .as_slice_mut()
            .expect("coefficient rows are contiguous");
        for (row, qi, si) in izip!(rows.chunks_mut(degree), ctx.q.iter(), scalars.iter()) {
            qi.scalar_mul_vec(row, *si);
        }
    }
}

impl From<&Poly> for Vec<u64> {
    fn from(p: &Poly) -> Self {
        p.coefficients
            .as_slice()
            .expect("coefficient rows are contiguous")
            .to_vec()
    }
}

impl Zeroize for Poly {
    fn zeroize(&mut self) {
        if let Some(s) = self.coefficients.as_slice_mut() {
            s.zeroize();
        }
    }
}

impl AddAssign<&Poly> for Poly {
    fn add_assign(&mut self, rhs: &Poly) {
        debug_assert_eq!(self.ctx, rhs.ctx);
        debug_assert_eq!(self.representation, rhs.representation);
        let degree = self.ctx.degree;
        let ctx = self.ctx.clone();
        let lhs = self
            .coefficients
            .as_slice_mut()
            .expect("coefficient rows are contiguous");
        let rhs = rhs
            .coefficients
            .as_slice()
            .expect("coefficient rows are contiguous");
        for (a, b, qi) in izip!(lhs.chunks_mut(degree), rhs.chunks(degree), ctx.q.iter()) {
            qi.add_vec(a, b);
        }
    }
}

impl SubAssign<&Poly> for Poly {
    fn sub_assign(&mut self, rhs: &Poly) {
        debug_assert_eq!(self.ctx, rhs.ctx);
        debug_assert_eq!(self.representation, rhs.representation);
        let degree = self.ctx.degree;
        let ctx = self.ctx.clone();
        let lhs = self
            .coefficients
            .as_slice_mut()
            .expect("coefficient rows are contiguous");
        let rhs = rhs
            .coefficients
            .as_slice()
            .expect("coefficient rows are contiguous");
        for (a, b, qi) in izip!(lhs.chunks_mut(degree), rhs.chunks(degree), ctx.q.iter()) {
            qi.sub_vec(a, b);
        }
    }
}

impl MulAssign<&Poly> for Poly {
    fn mul_assign(&mut self, rhs: &Poly) {
        debug_assert_eq!(self.ctx, rhs.ctx);
        debug_assert_eq!(self.representation, Representation::Ntt);
        debug_assert_eq!(rhs.representation, Representation::Ntt);
        let degree = self.ctx.degree;
        let ctx = self.ctx.clone();
        let lhs = self
            .coefficients
            .as_slice_mut()
            .expect("coefficient rows are contiguous");
        let rhs = rhs
            .coefficients
            .as_slice()
            .expect("coefficient rows are contiguous");
        for (a, b, qi) in izip!(lhs.chunks_mut(degree), rhs.chunks(degree), ctx.q.iter()) {
            qi.mul_vec(a, b);
        }
    }
}

impl Add<&Poly> for &Poly {
    type Output = Poly;
    fn add(self, rhs: &Poly) -> Poly {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl Sub<&Poly> for &Poly {
    type Output = Poly;
    fn sub(self, rhs: &Poly) -> Poly {
        let mut out = self.clone();
        out -= rhs;
        out
    }
}

impl Mul<&Poly> for &Poly {
    type Output = Poly;
    fn mul(self, rhs: &Poly) -> Poly {
        let mut out = self.clone();
        out *= rhs;
        out
    }
}

impl Neg for &Poly {
    type Output = Poly;
    fn neg(self) -> Poly {
        let mut out = self.clone();
        let degree = out.ctx.degree;
        let ctx = out.ctx.clone();
        let rows = out
            .coefficients
            .as_slice_mut()
            .expect("coefficient rows are contiguous");
        for (row, qi) in rows.chunks_mut(degree).zip(ctx.q.iter()) {
            qi.neg_vec(row);
        }
        out
    }
}

impl BinarySize for Poly {
    fn binary_size(&self) -> usize {
        16 + 8 * self.ctx.moduli.len() * self.ctx.degree
    }
}

impl Encode for Poly {
    fn encode_into(&self, buf: &mut [u8]) -> std::result::Result<usize, SerialError> {
        let mut w = ByteWriter::new(buf);
        w.write_u64(self.ctx.moduli.len() as u64, "Poly.rows")?;
        w.write_u64(self.ctx.degree as u64, "Poly.degree")?;
        w.write_u64_slice(
            self.coefficients
                .as_slice()
                .expect("coefficient rows are contiguous"),
            "Poly.coefficients",
        )?;
        Ok(w.written())
    }
}

impl Decode for Poly {
    fn decode_from(&mut self, buf: &[u8]) -> std::result::Result<usize, SerialError> {
        let mut r = ByteReader::new(buf);
        let rows = r.read_u64("Poly.rows")? as usize;
        if rows != self.ctx.moduli.len() {
            return Err(SerialError::Malformed {
                context: "Poly.rows",
                consumed: r.consumed(),
                reason: format!("expected {} rows, got {rows}", self.ctx.moduli.len()),
            });
        }
        let degree = r.read_u64("Poly.degree")? as usize;
        if degree != self.ctx.degree {
            return Err(SerialError::Malformed {
                context: "Poly.degree",
                consumed: r.consumed(),
                reason: format!("expected degree {}, got {degree}", self.ctx.degree),
            });
        }
        r.read_u64_slice(
            self.coefficients
                .as_slice_mut()
                .expect("coefficient rows are contiguous"),
            "Poly.coefficients",
        )?;
        Ok(r.consumed())
    }
}

#[cfg(test)]
mod tests {
    use super::{Context, Poly, Representation};
    use mphe_traits::{Decode, Encode};
    use rand::thread_rng;

    const MODULI: &[u64] = &[1153, 4611686018326724609, 4611686018309947393];

    #[test]
    fn representation_round_trip() {
        let mut rng = thread_rng();
        let ctx = Context::new_arc(MODULI, 16).unwrap();
        for _ in 0..30 {
            let p = Poly::random(&ctx, Representation::PowerBasis, &mut rng);
            let mut q = p.clone();
            q.change_representation(Representation::Ntt);
            assert_ne!(p, q);
            q.change_representation(Representation::PowerBasis);
            assert_eq!(p, q);
        }
    }

    #[test]
    fn arithmetic_is_consistent() {
        let mut rng = thread_rng();
        let ctx = Context::new_arc(MODULI, 16).unwrap();
        for _ in 0..30 {
            let a = Poly::random(&ctx, Representation::Ntt, &mut rng);
            let b = Poly::random(&ctx, Representation::Ntt, &mut rng);

            let s = &a + &b;
            assert_eq!(&(&s - &b), &a);
            assert_eq!(&(&s - &a), &b);

            let zero = &a - &a;
            assert_eq!(zero, Poly::zero(&ctx, Representation::Ntt));
            assert_eq!(&(&a + &(-&a)), &zero);
        }
    }

    #[test]
    fn mul_commutes_with_ntt() {
        // (a * b) computed pointwise in NTT equals the negacyclic product.
        let ctx = Context::new_arc(&[1153], 8).unwrap();
        let a = Poly::try_convert_from(&[1, 1, 0, 0, 0, 0, 0, 0], &ctx, Representation::Ntt)
            .unwrap();
        let b = Poly::try_convert_from(&[0, 0, 0, 0, 0, 0, 0, 1], &ctx, Representation::Ntt)
            .unwrap();
        let mut c = &a * &b;
        c.change_representation(Representation::PowerBasis);
        // (1 + x) * x^7 = x^7 + x^8 = x^7 - 1 mod (x^8 + 1)
        let expected =
            Poly::try_convert_from(&[-1, 0, 0, 0, 0, 0, 0, 1], &ctx, Representation::PowerBasis)
                .unwrap();
        assert_eq!(c, expected);
    }

    #[test]
    fn small_is_small() {
        let mut rng = thread_rng();
        let ctx = Context::new_arc(MODULI, 16).unwrap();
        for variance in 1..=16 {
            let p = Poly::small(&ctx, Representation::PowerBasis, variance, &mut rng).unwrap();
            for c in p.coefficients().row(0) {
                let centered = std::cmp::min(*c, 1153 - c);
                assert!(centered <= 2 * variance as u64);
            }
        }
    }

    #[test]
    fn seeded_sampling_is_deterministic() {
        let ctx = Context::new_arc(MODULI, 16).unwrap();
        let seed = [7u8; 32];
        let a = Poly::random_from_seed(&ctx, Representation::Ntt, seed);
        let b = Poly::random_from_seed(&ctx, Representation::Ntt, seed);
        assert_eq!(a, b);
        let c = Poly::random_from_seed(&ctx, Representation::Ntt, [8u8; 32]);
        assert_ne!(a, c);
    }

    #[test]
    fn serialization_round_trip() {
        let mut rng = thread_rng();
        let ctx = Context::new_arc(MODULI, 16).unwrap();
        let p = Poly::random(&ctx, Representation::Ntt, &mut rng);
        let bytes = p.to_bytes();
        let mut q = Poly::zero(&ctx, Representation::Ntt);
        let consumed = q.decode_from(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(p, q);
    }
}
