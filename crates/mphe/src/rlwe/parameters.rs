//! Create parameters for the RLWE key material and protocols.

use crate::{Error, ParametersError, Result};
use mphe_math::{
    ntt::NttOperator,
    rq::{Context, Poly, Representation, Scaler},
    rqp::BasisExtender,
    zq::{primes::generate_prime, Modulus},
};
use mphe_traits::FheParameters;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use std::fmt::Debug;
use std::sync::Arc;

/// Parameters for the RLWE scheme layer.
///
/// Levels count moduli from the bottom of the chain: level `L` works over
/// `moduli()[..L+1]`, and `max_level()` uses the full chain.
#[derive(PartialEq)]
pub struct RlweParameters {
    /// Number of coefficients in a polynomial.
    polynomial_degree: usize,

    /// Modulus of the plaintext.
    plaintext_modulus: u64,

    /// Vector of coprime moduli q_i for the ciphertext chain Q.
    moduli_q: Box<[u64]>,

    /// Vector of coprime moduli p_j for the auxiliary switching chain P.
    /// Empty when no switching modulus is configured.
    moduli_p: Box<[u64]>,

    /// Variance of the centered binomial distribution for secrets and
    /// encryption randomness.
    variance: usize,

    /// Standard deviation of the discrete Gaussian error distribution,
    /// truncated at 6 sigma.
    sigma: f64,

    /// Contexts for the Q chain, indexed by level.
    ctx_q: Vec<Arc<Context>>,

    /// Contexts for the P chain, indexed by level. Empty when no switching
    /// modulus is configured.
    ctx_p: Vec<Arc<Context>>,

    /// Basis extenders between each Q level and the full P chain.
    extenders: Vec<BasisExtender>,

    /// Ntt operator for the SIMD plaintext, if possible.
    op: Option<Arc<NttOperator>>,

    /// Plaintext modulus operator.
    pub(crate) plaintext: Modulus,

    /// floor(Q/t) modulo each q_i, per level.
    delta: Vec<Box<[u64]>>,

    /// Down scalers to the plaintext modulus, per level.
    scalers: Vec<Scaler>,

    /// Slot-index table for the SIMD encoding and the permute protocol.
    index_map: Arc<[usize]>,
}

impl Eq for RlweParameters {}

impl Debug for RlweParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RlweParameters")
            .field("polynomial_degree", &self.polynomial_degree)
            .field("plaintext_modulus", &self.plaintext_modulus)
            .field("moduli_q", &self.moduli_q)
            .field("moduli_p", &self.moduli_p)
            .finish()
    }
}

impl FheParameters for RlweParameters {}

impl RlweParameters {
    /// Returns the underlying polynomial degree.
    pub const fn degree(&self) -> usize {
        self.polynomial_degree
    }

    /// Returns the plaintext modulus.
    pub const fn plaintext(&self) -> u64 {
        self.plaintext_modulus
    }

    /// Returns a reference to the ciphertext moduli.
    pub fn moduli(&self) -> &[u64] {
        &self.moduli_q
    }

    /// Returns a reference to the auxiliary switching moduli.
    pub fn moduli_p(&self) -> &[u64] {
        &self.moduli_p
    }

    /// Returns the variance of the centered binomial distribution.
    pub const fn variance(&self) -> usize {
        self.variance
    }

    /// Returns the standard deviation of the error distribution.
    pub const fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Returns the maximum level of the ciphertext chain.
    pub fn max_level(&self) -> usize {
        self.moduli_q.len() - 1
    }

    /// Returns the maximum level of the switching chain, or `None` when no
    /// switching modulus is configured.
    pub fn max_level_p(&self) -> Option<usize> {
        if self.moduli_p.is_empty() {
            None
        } else {
            Some(self.moduli_p.len() - 1)
        }
    }

    /// Returns the 2N-th cyclotomic order tag carried by Galois keys.
    pub const fn nth_root(&self) -> u64 {
        (self.polynomial_degree as u64) << 1
    }

    /// Returns the Q context at the given level.
    pub fn ctx_at_level(&self, level: usize) -> Result<&Arc<Context>> {
        self.ctx_q.get(level).ok_or(Error::ParametersError(
            ParametersError::InvalidLevel(level, self.moduli_q.len() - 1),
        ))
    }

    /// Returns the P context at the given level.
    pub fn ctx_p_at_level(&self, level: usize) -> Result<&Arc<Context>> {
        self.ctx_p.get(level).ok_or(Error::ParametersError(
            ParametersError::InvalidLevel(level, self.moduli_p.len().wrapping_sub(1)),
        ))
    }

    /// Returns the full P context, if a switching modulus is configured.
    pub fn ctx_p_full(&self) -> Option<&Arc<Context>> {
        self.ctx_p.last()
    }

    /// Returns the level of a given Q context.
    pub(crate) fn level_of_ctx(&self, ctx: &Arc<Context>) -> Result<usize> {
        self.ctx_q
            .iter()
            .position(|c| c == ctx)
            .ok_or(Error::MathError(mphe_math::Error::InvalidContext))
    }

    /// Returns the basis extender between the Q chain at `level` and the
    /// full P chain.
    pub(crate) fn extender_at_level(&self, level: usize) -> Result<&BasisExtender> {
        if self.extenders.is_empty() {
            return Err(Error::DefaultError(
                "no auxiliary switching modulus configured".to_string(),
            ));
        }
        self.extenders.get(level).ok_or(Error::ParametersError(
            ParametersError::InvalidLevel(level, self.moduli_q.len() - 1),
        ))
    }

    /// Returns floor(Q/t) modulo each q_i at the given level.
    pub(crate) fn delta_at_level(&self, level: usize) -> &[u64] {
        &self.delta[level]
    }

    /// Returns the down scaler at the given level.
    pub(crate) fn scaler_at_level(&self, level: usize) -> &Scaler {
        &self.scalers[level]
    }

    /// Returns the plaintext NTT operator, when the plaintext modulus
    /// supports the SIMD encoding.
    pub(crate) fn plaintext_op(&self) -> Option<&Arc<NttOperator>> {
        self.op.as_ref()
    }

    /// Returns the slot-index table.
    pub(crate) fn index_map(&self) -> &Arc<[usize]> {
        &self.index_map
    }

    /// Lifts plaintext coefficients into the Q chain at the given level by
    /// scaling them by floor(Q/t). The result is in power basis.
    pub(crate) fn lift(&self, coeffs: &[u64], level: usize) -> Result<Poly> {
        let ctx = self.ctx_at_level(level)?;
        let mut p = Poly::try_convert_from_u64(coeffs, ctx, Representation::PowerBasis)
            .map_err(Error::MathError)?;
        p.scalar_mul_rows(&self.delta[level]);
        Ok(p)
    }

    /// Returns the Galois element for a rotation of the plaintext columns by
    /// `step` slots.
    pub fn galois_element(&self, step: i64) -> u64 {
        let m = self.nth_root();
        let order = (self.polynomial_degree >> 1) as i64;
        let exp = step.rem_euclid(order) as u64;
        pow_mod(3, exp, m)
    }

    /// Returns the Galois element swapping the rows of the plaintext.
    pub fn galois_element_rows(&self) -> u64 {
        self.nth_root() - 1
    }

    /// Returns the inverse of a Galois element modulo 2N.
    pub(crate) fn galois_element_inverse(&self, el: u64) -> u64 {
        let m = self.nth_root();
        // For odd el, el^(lambda(2^k)) = el^(m/4) = 1.
        pow_mod(el % m, m / 4 - 1, m)
    }
}

fn pow_mod(base: u64, exp: u64, m: u64) -> u64 {
    let mut result = 1u64;
    let mut base = (base % m) as u128;
    let mut exp = exp;
    let m = m as u128;
    while exp > 0 {
        if exp & 1 == 1 {
            result = ((result as u128 * base) % m) as u64;
        }
        base = (base * base) % m;
        exp >>= 1;
    }
    result
}

fn residues(v: &BigUint, moduli: &[u64]) -> Vec<u64> {
    moduli
        .iter()
        .map(|m| {
            (v % BigUint::from(*m))
                .to_u64()
                .expect("a residue modulo a u64 fits in a u64")
        })
        .collect()
}

/// Builder for parameters of the RLWE scheme layer.
#[derive(Debug)]
pub struct RlweParametersBuilder {
    degree: usize,
    plaintext: u64,
    variance: usize,
    sigma: f64,
    moduli_q: Vec<u64>,
    moduli_q_sizes: Vec<usize>,
    moduli_p: Vec<u64>,
    moduli_p_sizes: Vec<usize>,
}

impl RlweParametersBuilder {
    /// Creates a new instance of the builder.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            degree: Default::default(),
            plaintext: Default::default(),
            variance: 10,
            sigma: 3.2,
            moduli_q: Default::default(),
            moduli_q_sizes: Default::default(),
            moduli_p: Default::default(),
            moduli_p_sizes: Default::default(),
        }
    }

    /// Sets the polynomial degree. The degree must be a power of two larger
    /// or equal to 8.
    pub fn set_degree(&mut self, degree: usize) -> &mut Self {
        self.degree = degree;
        self
    }

    /// Sets the plaintext modulus.
    pub fn set_plaintext_modulus(&mut self, plaintext: u64) -> &mut Self {
        self.plaintext = plaintext;
        self
    }

    /// Sets the ciphertext moduli to use. Only one of `set_moduli_sizes` and
    /// `set_moduli` can be specified.
    pub fn set_moduli(&mut self, moduli: &[u64]) -> &mut Self {
        self.moduli_q = moduli.to_owned();
        self
    }

    /// Sets the sizes of the ciphertext moduli. Only one of
    /// `set_moduli_sizes` and `set_moduli` can be specified.
    pub fn set_moduli_sizes(&mut self, sizes: &[usize]) -> &mut Self {
        self.moduli_q_sizes = sizes.to_owned();
        self
    }

    /// Sets the auxiliary switching moduli to use. Only one of
    /// `set_auxiliary_moduli_sizes` and `set_auxiliary_moduli` can be
    /// specified.
    pub fn set_auxiliary_moduli(&mut self, moduli: &[u64]) -> &mut Self {
        self.moduli_p = moduli.to_owned();
        self
    }

    /// Sets the sizes of the auxiliary switching moduli. Only one of
    /// `set_auxiliary_moduli_sizes` and `set_auxiliary_moduli` can be
    /// specified.
    pub fn set_auxiliary_moduli_sizes(&mut self, sizes: &[usize]) -> &mut Self {
        self.moduli_p_sizes = sizes.to_owned();
        self
    }

    /// Sets the variance of the centered binomial distribution. The variance
    /// must be between one and sixteen.
    pub fn set_variance(&mut self, variance: usize) -> &mut Self {
        self.variance = variance;
        self
    }

    /// Sets the standard deviation of the error distribution.
    pub fn set_sigma(&mut self, sigma: f64) -> &mut Self {
        self.sigma = sigma;
        self
    }

    /// Generate moduli with the specified sizes, avoiding the ones in `used`.
    fn generate_moduli(
        moduli_sizes: &[usize],
        degree: usize,
        used: &[u64],
    ) -> Result<Vec<u64>> {
        let mut moduli = vec![];
        for size in moduli_sizes {
            if *size > 62 || *size < 10 {
                return Err(Error::ParametersError(ParametersError::InvalidModulusSize(
                    *size, 10, 62,
                )));
            }

            let mut upper_bound = 1 << size;
            loop {
                if let Some(prime) = generate_prime(*size, 2 * degree as u64, upper_bound) {
                    if !moduli.contains(&prime) && !used.contains(&prime) {
                        moduli.push(prime);
                        break;
                    } else {
                        upper_bound = prime;
                    }
                } else {
                    return Err(Error::ParametersError(ParametersError::NotEnoughPrimes(
                        *size, degree,
                    )));
                }
            }
        }

        Ok(moduli)
    }

    /// Build a new `RlweParameters` inside an `Arc`.
    pub fn build_arc(&self) -> Result<Arc<RlweParameters>> {
        self.build().map(Arc::new)
    }

    /// Build a new `RlweParameters`.
    pub fn build(&self) -> Result<RlweParameters> {
        if self.degree < 8 || !self.degree.is_power_of_two() {
            return Err(Error::ParametersError(ParametersError::InvalidDegree(
                self.degree,
            )));
        }

        let plaintext_modulus = Modulus::new(self.plaintext).map_err(|e| {
            Error::ParametersError(ParametersError::InvalidPlaintext(e.to_string()))
        })?;

        if !(1..=16).contains(&self.variance) {
            return Err(Error::ParametersError(ParametersError::InvalidDistribution(
                format!("variance {} is out of [1, 16]", self.variance),
            )));
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(Error::ParametersError(ParametersError::InvalidDistribution(
                format!("noise deviation {} is not a positive finite value", self.sigma),
            )));
        }

        if !self.moduli_q.is_empty() && !self.moduli_q_sizes.is_empty() {
            return Err(Error::ParametersError(ParametersError::TooManySpecified(
                "only one of `moduli` and `moduli_sizes` can be specified".to_string(),
            )));
        } else if self.moduli_q.is_empty() && self.moduli_q_sizes.is_empty() {
            return Err(Error::ParametersError(ParametersError::TooFewSpecified(
                "one of `moduli` and `moduli_sizes` must be specified".to_string(),
            )));
        }
        if !self.moduli_p.is_empty() && !self.moduli_p_sizes.is_empty() {
            return Err(Error::ParametersError(ParametersError::TooManySpecified(
                "only one of `auxiliary_moduli` and `auxiliary_moduli_sizes` can be specified"
                    .to_string(),
            )));
        }

        let mut moduli_q = self.moduli_q.clone();
        if !self.moduli_q_sizes.is_empty() {
            moduli_q = Self::generate_moduli(&self.moduli_q_sizes, self.degree, &[])?
        }

        let mut moduli_p = self.moduli_p.clone();
        if !self.moduli_p_sizes.is_empty() {
            moduli_p = Self::generate_moduli(&self.moduli_p_sizes, self.degree, &moduli_q)?
        }

        let op = NttOperator::new(&plaintext_modulus, self.degree).map(Arc::new);

        let mut ctx_q = Vec::with_capacity(moduli_q.len());
        let mut delta = Vec::with_capacity(moduli_q.len());
        let mut scalers = Vec::with_capacity(moduli_q.len());
        for level in 0..moduli_q.len() {
            let ctx = Context::new_arc(&moduli_q[..level + 1], self.degree)
                .map_err(Error::MathError)?;
            let delta_big = ctx.modulus() / plaintext_modulus.modulus();
            delta.push(residues(&delta_big, ctx.moduli()).into_boxed_slice());
            scalers.push(Scaler::new(&ctx, &plaintext_modulus));
            ctx_q.push(ctx);
        }

        let mut ctx_p = Vec::with_capacity(moduli_p.len());
        for level in 0..moduli_p.len() {
            ctx_p.push(
                Context::new_arc(&moduli_p[..level + 1], self.degree)
                    .map_err(Error::MathError)?,
            );
        }

        let mut extenders = Vec::new();
        if let Some(ctx_p_full) = ctx_p.last() {
            for ctx in ctx_q.iter() {
                extenders.push(BasisExtender::new(ctx, ctx_p_full).map_err(Error::MathError)?);
            }
        }

        Ok(RlweParameters {
            polynomial_degree: self.degree,
            plaintext_modulus: self.plaintext,
            moduli_q: moduli_q.into_boxed_slice(),
            moduli_p: moduli_p.into_boxed_slice(),
            variance: self.variance,
            sigma: self.sigma,
            ctx_q,
            ctx_p,
            extenders,
            op,
            plaintext: plaintext_modulus,
            delta,
            scalers,
            index_map: super::slot_index_map(self.degree),
        })
    }
}

#[cfg(test)]
impl RlweParameters {
    /// Default test parameters without a switching modulus.
    pub fn default_arc(num_moduli: usize, degree: usize) -> Arc<Self> {
        RlweParametersBuilder::new()
            .set_degree(degree)
            .set_plaintext_modulus(1153)
            .set_moduli_sizes(&vec![62usize; num_moduli])
            .build_arc()
            .unwrap()
    }

    /// Default test parameters with a switching modulus.
    pub fn default_arc_with_auxiliary(num_q: usize, num_p: usize, degree: usize) -> Arc<Self> {
        RlweParametersBuilder::new()
            .set_degree(degree)
            .set_plaintext_modulus(1153)
            .set_moduli_sizes(&vec![62usize; num_q])
            .set_auxiliary_moduli_sizes(&vec![62usize; num_p])
            .build_arc()
            .unwrap()
    }
}
