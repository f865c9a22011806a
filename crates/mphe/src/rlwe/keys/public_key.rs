//! Public keys for the RLWE scheme layer.

use crate::rlwe::{Ciphertext, Plaintext, RlweParameters};
use crate::{Error, Result};
use mphe_math::{
    rq::{Poly, Representation},
    rqp::PolyQP,
};
use mphe_traits::{
    BinarySize, Decode, Encode, FheEncrypter, FheParametrized, SerialError,
};
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use zeroize::Zeroizing;

use super::SecretKey;

/// Public key for the RLWE scheme layer, in the two-component form
/// `(-a s + e, a)` over the full Q and P chains.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicKey {
    /// The scheme parameters.
    pub(crate) par: Arc<RlweParameters>,
    /// The two key components, in NTT representation.
    pub c: [PolyQP; 2],
}

impl FheParametrized for PublicKey {
    type Parameters = RlweParameters;
}

impl PublicKey {
    /// Generate a new [`PublicKey`] from a [`SecretKey`].
    pub fn new<R: RngCore + CryptoRng>(sk: &SecretKey, rng: &mut R) -> Result<Self> {
        let par = sk.par.clone();
        let ctx_q = par.ctx_at_level(par.max_level())?;
        let ctx_p = par.ctx_p_full();

        let s = sk.poly_qp(par.max_level(), par.max_level_p())?;
        let a = PolyQP::random(ctx_q, ctx_p, Representation::Ntt, rng);
        let e = PolyQP::gaussian(ctx_q, ctx_p, par.sigma(), Representation::Ntt, rng)
            .map_err(Error::MathError)?;

        let mut p0 = e;
        p0 -= &(&a * s.as_ref());

        Ok(Self { par, c: [p0, a] })
    }

    /// Returns a [`PublicKey`] with zero components, used as a decoding
    /// target.
    pub fn zero(par: &Arc<RlweParameters>) -> Result<Self> {
        let ctx_q = par.ctx_at_level(par.max_level())?;
        let ctx_p = par.ctx_p_full();
        Ok(Self {
            par: par.clone(),
            c: [
                PolyQP::zero(ctx_q, ctx_p, Representation::Ntt),
                PolyQP::zero(ctx_q, ctx_p, Representation::Ntt),
            ],
        })
    }
}

impl FheEncrypter<Plaintext, Ciphertext> for PublicKey {
    type Error = Error;

    fn try_encrypt<R: RngCore + CryptoRng>(
        &self,
        pt: &Plaintext,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        if self.par != pt.par {
            return Err(Error::DefaultError("incompatible parameters".to_string()));
        }
        if pt.level != self.par.max_level() {
            return Err(Error::DefaultError(
                "public-key encryption is only supported at the top level".to_string(),
            ));
        }

        let ctx = self.par.ctx_at_level(pt.level)?;
        let u = Zeroizing::new(
            Poly::small(ctx, Representation::Ntt, self.par.variance(), rng)
                .map_err(Error::MathError)?,
        );
        let e0 = Zeroizing::new(
            Poly::gaussian(ctx, Representation::Ntt, self.par.sigma(), rng)
                .map_err(Error::MathError)?,
        );
        let e1 = Zeroizing::new(
            Poly::gaussian(ctx, Representation::Ntt, self.par.sigma(), rng)
                .map_err(Error::MathError)?,
        );
        let m = Zeroizing::new(pt.to_poly()?);

        let mut c0 = &self.c[0].q * u.as_ref();
        c0 += e0.as_ref();
        c0 += m.as_ref();
        let mut c1 = &self.c[1].q * u.as_ref();
        c1 += e1.as_ref();

        Ciphertext::new(vec![c0, c1], &self.par)
    }
}

impl BinarySize for PublicKey {
    fn binary_size(&self) -> usize {
        self.c[0].binary_size() + self.c[1].binary_size()
    }
}

impl Encode for PublicKey {
    fn encode_into(&self, buf: &mut [u8]) -> std::result::Result<usize, SerialError> {
        let mut n = self.c[0].encode_into(buf)?;
        n += self.c[1].encode_into(&mut buf[n..])?;
        Ok(n)
    }
}

impl Decode for PublicKey {
    fn decode_from(&mut self, buf: &[u8]) -> std::result::Result<usize, SerialError> {
        let mut n = self.c[0].decode_from(buf)?;
        n += self.c[1].decode_from(&buf[n..])?;
        Ok(n)
    }
}
