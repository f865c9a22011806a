//! Secret keys for the RLWE scheme layer.

use crate::rlwe::{Ciphertext, Plaintext, RlweParameters};
use crate::{Error, Result};
use mphe_math::{
    rq::{sampler::sample_vec_cbd, Poly, Representation},
    rqp::PolyQP,
};
use mphe_traits::{FheDecrypter, FheParametrized};
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Secret key for the RLWE scheme layer.
///
/// A party in the multiparty protocols holds such a key as its additive
/// share of the (never materialized) collective secret.
#[derive(Debug, PartialEq, Clone)]
pub struct SecretKey {
    /// The scheme parameters.
    pub(crate) par: Arc<RlweParameters>,
    /// The secret key coefficients.
    pub(crate) coeffs: Box<[i64]>,
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.coeffs.zeroize();
    }
}

impl ZeroizeOnDrop for SecretKey {}

impl SecretKey {
    /// Generate a random [`SecretKey`] from the centered binomial
    /// distribution of the parameters.
    pub fn random<R: RngCore + CryptoRng>(par: &Arc<RlweParameters>, rng: &mut R) -> Self {
        let coeffs = sample_vec_cbd(par.degree(), par.variance(), rng)
            .expect("the builder validated the variance");
        Self::new(coeffs, par)
    }

    /// Generate a [`SecretKey`] from its coefficients.
    pub fn new(coeffs: Vec<i64>, par: &Arc<RlweParameters>) -> Self {
        Self {
            par: par.clone(),
            coeffs: coeffs.into_boxed_slice(),
        }
    }

    /// The secret as an NTT polynomial over the Q chain at the given level.
    pub(crate) fn poly_at_level(&self, level: usize) -> Result<Zeroizing<Poly>> {
        let ctx = self.par.ctx_at_level(level)?;
        Ok(Zeroizing::new(
            Poly::try_convert_from(&self.coeffs, ctx, Representation::Ntt)
                .map_err(Error::MathError)?,
        ))
    }

    /// The secret as an NTT polynomial over the Q chain at `level_q`,
    /// extended onto the P chain at `level_p`.
    pub(crate) fn poly_qp(
        &self,
        level_q: usize,
        level_p: Option<usize>,
    ) -> Result<Zeroizing<PolyQP>> {
        let ctx_q = self.par.ctx_at_level(level_q)?;
        let ctx_p = match level_p {
            Some(lp) => Some(self.par.ctx_p_at_level(lp)?),
            None => None,
        };
        Ok(Zeroizing::new(
            PolyQP::try_convert_from(&self.coeffs, ctx_q, ctx_p, Representation::Ntt)
                .map_err(Error::MathError)?,
        ))
    }
}

impl FheParametrized for SecretKey {
    type Parameters = RlweParameters;
}

impl FheDecrypter<Plaintext, Ciphertext> for SecretKey {
    type Error = Error;

    fn try_decrypt(&self, ct: &Ciphertext) -> Result<Plaintext> {
        if self.par != ct.par {
            return Err(Error::DefaultError("incompatible parameters".to_string()));
        }

        let s = self.poly_at_level(ct.level)?;
        let mut si = s.clone();

        // c0 + c1 s + c2 s^2 + ...
        let mut c = Zeroizing::new(ct.c[0].clone());
        for ci in ct.c[1..].iter() {
            let cis = Zeroizing::new(ci * si.as_ref());
            *c.as_mut() += cis.as_ref();
            *si.as_mut() *= s.as_ref();
        }
        c.change_representation(Representation::PowerBasis);

        let value = self.par.scaler_at_level(ct.level).scale(&c)?;

        Ok(Plaintext {
            par: self.par.clone(),
            value: value.into_boxed_slice(),
            encoding: None,
            level: ct.level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::SecretKey;
    use crate::rlwe::RlweParameters;
    use rand::thread_rng;

    #[test]
    fn keygen_produces_small_coefficients() {
        let mut rng = thread_rng();
        let par = RlweParameters::default_arc(1, 16);
        let sk = SecretKey::random(&par, &mut rng);
        assert_eq!(sk.par, par);
        assert!(sk
            .coeffs
            .iter()
            .all(|c| c.unsigned_abs() <= 2 * par.variance() as u64));
    }

    #[test]
    fn polynomial_conversions_agree() {
        let mut rng = thread_rng();
        let par = RlweParameters::default_arc_with_auxiliary(2, 1, 16);
        let sk = SecretKey::random(&par, &mut rng);

        let s_q = sk.poly_at_level(par.max_level()).unwrap();
        let s_qp = sk.poly_qp(par.max_level(), par.max_level_p()).unwrap();
        assert_eq!(&s_qp.q, s_q.as_ref());
        assert!(s_qp.p.is_some());

        assert!(sk.poly_at_level(5).is_err());
        assert!(sk.poly_qp(0, Some(3)).is_err());
    }
}
