//! Polynomials split over a ciphertext modulus chain Q and an optional
//! auxiliary switching chain P, and the basis extension operations moving
//! elements between the two.

use crate::{
    rns::biguint_mod_u64,
    rq::{sampler, Context, Poly, Representation},
    Error, Result,
};
use mphe_traits::{BinarySize, ByteReader, ByteWriter, Decode, Encode, SerialError};
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use std::sync::Arc;
use zeroize::Zeroize;

/// A polynomial over the Q chain, optionally extended over the P chain.
///
/// Both parts always share the same ring degree. The P part is absent when
/// no switching modulus is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolyQP {
    /// The Q-chain part.
    pub q: Poly,
    /// The P-chain part, if a switching modulus is configured.
    pub p: Option<Poly>,
}

impl AsRef<PolyQP> for PolyQP {
    fn as_ref(&self) -> &PolyQP {
        self
    }
}

impl AsMut<PolyQP> for PolyQP {
    fn as_mut(&mut self) -> &mut PolyQP {
        self
    }
}

impl PolyQP {
    /// Creates a zero polynomial over the given chains.
    pub fn zero(
        ctx_q: &Arc<Context>,
        ctx_p: Option<&Arc<Context>>,
        representation: Representation,
    ) -> Self {
        Self {
            q: Poly::zero(ctx_q, representation.clone()),
            p: ctx_p.map(|ctx| Poly::zero(ctx, representation)),
        }
    }

    /// Samples a polynomial with uniform coefficients. The Q rows are drawn
    /// before the P rows; this order is part of the deterministic-replay
    /// contract of seeded sampling.
    pub fn random<R: RngCore + CryptoRng>(
        ctx_q: &Arc<Context>,
        ctx_p: Option<&Arc<Context>>,
        representation: Representation,
        rng: &mut R,
    ) -> Self {
        let q = Poly::random(ctx_q, representation.clone(), rng);
        let p = ctx_p.map(|ctx| Poly::random(ctx, representation, rng));
        Self { q, p }
    }

    /// Builds a polynomial from centered signed coefficients, placing the
    /// same integer in both chains (small-norm-preserving basis extension).
    pub fn try_convert_from(
        v: &[i64],
        ctx_q: &Arc<Context>,
        ctx_p: Option<&Arc<Context>>,
        representation: Representation,
    ) -> Result<Self> {
        let q = Poly::try_convert_from(v, ctx_q, representation.clone())?;
        let p = ctx_p
            .map(|ctx| Poly::try_convert_from(v, ctx, representation))
            .transpose()?;
        Ok(Self { q, p })
    }

    /// Samples a small polynomial from the centered binomial distribution,
    /// extended onto the P chain.
    pub fn small<R: RngCore + CryptoRng>(
        ctx_q: &Arc<Context>,
        ctx_p: Option<&Arc<Context>>,
        variance: usize,
        representation: Representation,
        rng: &mut R,
    ) -> Result<Self> {
        let coeffs = sampler::sample_vec_cbd(ctx_q.degree(), variance, rng)?;
        Self::try_convert_from(&coeffs, ctx_q, ctx_p, representation)
    }

    /// Samples a discrete Gaussian polynomial of deviation `sigma` (truncated
    /// at 6 sigma), extended onto the P chain.
    pub fn gaussian<R: RngCore + CryptoRng>(
        ctx_q: &Arc<Context>,
        ctx_p: Option<&Arc<Context>>,
        sigma: f64,
        representation: Representation,
        rng: &mut R,
    ) -> Result<Self> {
        let coeffs = sampler::sample_vec_gaussian(ctx_q.degree(), sigma, rng)?;
        Self::try_convert_from(&coeffs, ctx_q, ctx_p, representation)
    }

    /// Converts both parts to the given representation in place.
    pub fn change_representation(&mut self, to: Representation) {
        self.q.change_representation(to.clone());
        if let Some(p) = self.p.as_mut() {
            p.change_representation(to);
        }
    }

    /// The representation of the polynomial.
    pub fn representation(&self) -> &Representation {
        self.q.representation()
    }

    /// The level of the Q part, i.e. its number of moduli minus one.
    pub fn level_q(&self) -> usize {
        self.q.ctx().moduli().len() - 1
    }

    /// The level of the P part, or `None` when it is absent.
    pub fn level_p(&self) -> Option<usize> {
        self.p.as_ref().map(|p| p.ctx().moduli().len() - 1)
    }
}

impl Zeroize for PolyQP {
    fn zeroize(&mut self) {
        self.q.zeroize();
        if let Some(p) = self.p.as_mut() {
            p.zeroize();
        }
    }
}

impl AddAssign<&PolyQP> for PolyQP {
    fn add_assign(&mut self, rhs: &PolyQP) {
        self.q += &rhs.q;
        debug_assert_eq!(self.p.is_some(), rhs.p.is_some());
        if let (Some(p), Some(rp)) = (self.p.as_mut(), rhs.p.as_ref()) {
            *p += rp;
        }
    }
}

impl SubAssign<&PolyQP> for PolyQP {
    fn sub_assign(&mut self, rhs: &PolyQP) {
        self.q -= &rhs.q;
        debug_assert_eq!(self.p.is_some(), rhs.p.is_some());
        if let (Some(p), Some(rp)) = (self.p.as_mut(), rhs.p.as_ref()) {
            *p -= rp;
        }
    }
}

impl MulAssign<&PolyQP> for PolyQP {
    fn mul_assign(&mut self, rhs: &PolyQP) {
        self.q *= &rhs.q;
        debug_assert_eq!(self.p.is_some(), rhs.p.is_some());
        if let (Some(p), Some(rp)) = (self.p.as_mut(), rhs.p.as_ref()) {
            *p *= rp;
        }
    }
}

impl Add<&PolyQP> for &PolyQP {
    type Output = PolyQP;
    fn add(self, rhs: &PolyQP) -> PolyQP {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl Sub<&PolyQP> for &PolyQP {
    type Output = PolyQP;
    fn sub(self, rhs: &PolyQP) -> PolyQP {
        let mut out = self.clone();
        out -= rhs;
        out
    }
}

impl Mul<&PolyQP> for &PolyQP {
    type Output = PolyQP;
    fn mul(self, rhs: &PolyQP) -> PolyQP {
        let mut out = self.clone();
        out *= rhs;
        out
    }
}

impl Neg for &PolyQP {
    type Output = PolyQP;
    fn neg(self) -> PolyQP {
        PolyQP {
            q: -&self.q,
            p: self.p.as_ref().map(|p| -p),
        }
    }
}

impl BinarySize for PolyQP {
    fn binary_size(&self) -> usize {
        1 + self.q.binary_size() + self.p.as_ref().map_or(0, |p| p.binary_size())
    }
}

impl Encode for PolyQP {
    fn encode_into(&self, buf: &mut [u8]) -> std::result::Result<usize, SerialError> {
        let mut n = self.q.encode_into(buf)?;
        let mut w = ByteWriter::new(&mut buf[n..]);
        w.write_u8(self.p.is_some() as u8, "PolyQP.p_present")?;
        n += w.written();
        if let Some(p) = self.p.as_ref() {
            n += p.encode_into(&mut buf[n..])?;
        }
        Ok(n)
    }
}

impl Decode for PolyQP {
    fn decode_from(&mut self, buf: &[u8]) -> std::result::Result<usize, SerialError> {
        let mut n = self.q.decode_from(buf)?;
        let mut r = ByteReader::new(&buf[n..]);
        let p_present = r.read_u8("PolyQP.p_present")? == 1;
        n += r.consumed();
        if p_present != self.p.is_some() {
            return Err(SerialError::Malformed {
                context: "PolyQP.p_present",
                consumed: n,
                reason: format!(
                    "expected P part present = {}, got {p_present}",
                    self.p.is_some()
                ),
            });
        }
        if let Some(p) = self.p.as_mut() {
            n += p.decode_from(&buf[n..])?;
        }
        Ok(n)
    }
}

/// Extends a small-norm polynomial over Q onto the P chain: the coefficients
/// of the first Q modulus are centered and reduced modulo each P modulus.
///
/// The input must be in power basis, with coefficients whose centered
/// magnitude is below half the first Q modulus.
pub fn extend_basis_small_norm_and_center(a: &Poly, ctx_p: &Arc<Context>) -> Result<Poly> {
    if a.representation() != &Representation::PowerBasis {
        return Err(Error::IncorrectRepresentation(
            a.representation().clone(),
            Representation::PowerBasis,
        ));
    }

    let q0 = a.ctx().moduli()[0];
    let half_q0 = q0 >> 1;
    let centered = a
        .coefficients()
        .row(0)
        .iter()
        .map(|v| {
            if *v > half_q0 {
                *v as i64 - q0 as i64
            } else {
                *v as i64
            }
        })
        .collect::<Vec<_>>();
    Poly::try_convert_from(&centered, ctx_p, Representation::PowerBasis)
}

/// Basis extension between a Q chain and a P chain: multiplication by P and
/// exact division by P with rounding (mod-down).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasisExtender {
    ctx_q: Arc<Context>,
    ctx_p: Arc<Context>,
    // P mod q_i and its inverse mod q_i
    p_mod_q: Box<[u64]>,
    p_inv_mod_q: Box<[u64]>,
    half_p: BigUint,
}

impl BasisExtender {
    /// Creates an extender between the given chains. Fails if P is not
    /// invertible modulo every Q modulus.
    pub fn new(ctx_q: &Arc<Context>, ctx_p: &Arc<Context>) -> Result<Self> {
        let p_big = ctx_p.modulus();
        let mut p_mod_q = Vec::with_capacity(ctx_q.moduli().len());
        let mut p_inv_mod_q = Vec::with_capacity(ctx_q.moduli().len());
        for qi in ctx_q.moduli_operators() {
            let pm = biguint_mod_u64(p_big, qi.modulus());
            let inv = qi
                .inv(pm)
                .ok_or_else(|| Error::Default("P is not invertible modulo Q".to_string()))?;
            p_mod_q.push(pm);
            p_inv_mod_q.push(inv);
        }
        Ok(Self {
            ctx_q: ctx_q.clone(),
            ctx_p: ctx_p.clone(),
            p_mod_q: p_mod_q.into_boxed_slice(),
            p_inv_mod_q: p_inv_mod_q.into_boxed_slice(),
            half_p: p_big >> 1,
        })
    }

    /// The product of the P moduli.
    pub fn p_modulus(&self) -> &BigUint {
        self.ctx_p.modulus()
    }

    /// Multiplies a polynomial over Q by the full product P, in place. Valid
    /// in any representation.
    pub fn mul_by_p(&self, a: &mut Poly) {
        debug_assert_eq!(a.ctx(), &self.ctx_q);
        a.scalar_mul_rows(&self.p_mod_q);
    }

    /// Divides the value represented by `(a_q, a_p)` by P with rounding,
    /// returning the result over the Q chain. Both inputs must be in power
    /// basis.
    pub fn mod_down(&self, a_q: &Poly, a_p: &Poly) -> Result<Poly> {
        if a_q.ctx() != &self.ctx_q || a_p.ctx() != &self.ctx_p {
            return Err(Error::InvalidContext);
        }
        if a_q.representation() != &Representation::PowerBasis
            || a_p.representation() != &Representation::PowerBasis
        {
            return Err(Error::IncorrectRepresentation(
                a_q.representation().clone(),
                Representation::PowerBasis,
            ));
        }

        let degree = self.ctx_q.degree();
        let mut out = a_q.clone();
        let mut residues = vec![0u64; self.ctx_p.moduli().len()];
        for j in 0..degree {
            for (ri, row) in residues.iter_mut().zip(a_p.coefficients().outer_iter()) {
                *ri = row[j];
            }
            // Centered remainder of the value modulo P.
            let v = self.ctx_p.rns().lift(&residues);
            let negative = v > self.half_p;
            for (i, qi) in self.ctx_q.moduli_operators().iter().enumerate() {
                let mut r = biguint_mod_u64(&v, qi.modulus());
                if negative {
                    r = qi.add(r, qi.neg(self.p_mod_q[i]));
                }
                let x = out.coefficients()[[i, j]];
                let centered = qi.sub(x, r);
                let scaled = qi.mul(centered, self.p_inv_mod_q[i]);
                out.coefficients_mut()[[i, j]] = scaled;
            }
        }
        Ok(out)
    }

    /// Divides a QP polynomial by P with rounding, returning the Q part.
    pub fn mod_down_qp(&self, a: &PolyQP) -> Result<Poly> {
        let p = a
            .p
            .as_ref()
            .ok_or_else(|| Error::Default("missing P part for mod-down".to_string()))?;
        self.mod_down(&a.q, p)
    }
}

#[cfg(test)]
mod tests {
    use super::{extend_basis_small_norm_and_center, BasisExtender, PolyQP};
    use crate::rq::{Context, Poly, Representation};
    use rand::thread_rng;

    const MODULI_Q: &[u64] = &[4611686018326724609, 4611686018309947393];
    const MODULI_P: &[u64] = &[4611686018232352769];

    #[test]
    fn mul_by_p_then_mod_down_is_identity() {
        let mut rng = thread_rng();
        let ctx_q = Context::new_arc(MODULI_Q, 16).unwrap();
        let ctx_p = Context::new_arc(MODULI_P, 16).unwrap();
        let extender = BasisExtender::new(&ctx_q, &ctx_p).unwrap();

        for _ in 0..20 {
            let a = Poly::random(&ctx_q, Representation::PowerBasis, &mut rng);
            let mut b = a.clone();
            extender.mul_by_p(&mut b);
            // P * a has no remainder modulo P.
            let zero_p = Poly::zero(&ctx_p, Representation::PowerBasis);
            let c = extender.mod_down(&b, &zero_p).unwrap();
            assert_eq!(a, c);
        }
    }

    #[test]
    fn mod_down_rounds_small_errors_away() {
        let mut rng = thread_rng();
        let ctx_q = Context::new_arc(MODULI_Q, 16).unwrap();
        let ctx_p = Context::new_arc(MODULI_P, 16).unwrap();
        let extender = BasisExtender::new(&ctx_q, &ctx_p).unwrap();

        for _ in 0..20 {
            let a = Poly::random(&ctx_q, Representation::PowerBasis, &mut rng);
            let mut b = a.clone();
            extender.mul_by_p(&mut b);

            // Add a small error in both chains; the error vanishes under the
            // rounded division by P.
            let e = PolyQP::gaussian(
                &ctx_q,
                Some(&ctx_p),
                3.2,
                Representation::PowerBasis,
                &mut rng,
            )
            .unwrap();
            b += &e.q;
            let c = extender.mod_down(&b, e.p.as_ref().unwrap()).unwrap();
            assert_eq!(a, c);
        }
    }

    #[test]
    fn small_norm_extension_preserves_the_integer() {
        let mut rng = thread_rng();
        let ctx_q = Context::new_arc(MODULI_Q, 16).unwrap();
        let ctx_p = Context::new_arc(MODULI_P, 16).unwrap();

        let e = Poly::small(&ctx_q, Representation::PowerBasis, 10, &mut rng).unwrap();
        let extended = extend_basis_small_norm_and_center(&e, &ctx_p).unwrap();

        let q0 = MODULI_Q[0];
        let p0 = MODULI_P[0];
        for (eq, ep) in e
            .coefficients()
            .row(0)
            .iter()
            .zip(extended.coefficients().row(0).iter())
        {
            let centered = if *eq > q0 / 2 {
                *eq as i64 - q0 as i64
            } else {
                *eq as i64
            };
            assert_eq!(*ep, centered.rem_euclid(p0 as i64) as u64);
        }
    }
}
