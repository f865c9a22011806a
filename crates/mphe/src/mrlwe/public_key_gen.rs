//! Collective public-key generation.

use crate::rlwe::{PublicKey, RlweParameters, SecretKey};
use crate::{Error, Result};
use mphe_math::{
    rq::{Poly, Representation},
    rqp::{extend_basis_small_norm_and_center, PolyQP},
};
use mphe_traits::{BinarySize, Decode, Encode, SerialError};
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use zeroize::Zeroizing;

use super::{Aggregate, CommonRandomPoly};

/// A party's share in the collective public-key generation protocol.
///
/// Each party computes `e - s_i a` over a common random polynomial `a`; the
/// sum of all shares together with `a` forms the public key of the combined
/// secret. The fresh Gaussian error statistically hides the party's secret
/// under the decisional-RLWE assumption; aggregating n shares grows the
/// error variance by a factor n, which is expected.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicKeyShare {
    pub(crate) par: Arc<RlweParameters>,
    pub(crate) crp: CommonRandomPoly,
    pub(crate) p0_share: PolyQP,
}

impl PublicKeyShare {
    /// Participate in a new collective key generation round.
    ///
    /// 1. *Private input*: the party's additive secret key share
    /// 2. *Public input*: the common random polynomial
    pub fn new<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        crp: CommonRandomPoly,
        rng: &mut R,
    ) -> Result<Self> {
        let par = sk_share.par.clone();
        let ctx_q = par.ctx_at_level(par.max_level())?;

        // Error over Q, extended onto P with its norm preserved.
        let e_q = Poly::gaussian(ctx_q, Representation::PowerBasis, par.sigma(), rng)
            .map_err(Error::MathError)?;
        let e_p = match par.ctx_p_full() {
            Some(ctx_p) => {
                Some(extend_basis_small_norm_and_center(&e_q, ctx_p).map_err(Error::MathError)?)
            }
            None => None,
        };
        let mut e = PolyQP { q: e_q, p: e_p };
        e.change_representation(Representation::Ntt);

        let s = sk_share.poly_qp(par.max_level(), par.max_level_p())?;
        let sa = Zeroizing::new(&crp.poly * s.as_ref());

        let mut p0_share = e;
        p0_share -= sa.as_ref();

        Ok(Self { par, crp, p0_share })
    }

    /// Deserialize a share from bytes with the given parameters and CRP.
    pub fn deserialize(
        bytes: &[u8],
        par: &Arc<RlweParameters>,
        crp: CommonRandomPoly,
    ) -> Result<Self> {
        let ctx_q = par.ctx_at_level(par.max_level())?;
        let mut share = Self {
            par: par.clone(),
            crp,
            p0_share: PolyQP::zero(ctx_q, par.ctx_p_full(), Representation::Ntt),
        };
        share
            .decode_from(bytes)
            .map_err(Error::SerializationError)?;
        Ok(share)
    }
}

impl Aggregate<PublicKeyShare> for PublicKeyShare {
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = PublicKeyShare>,
    {
        let mut shares = iter.into_iter();
        let mut share = shares.next().ok_or(Error::TooFewValues(0, 1))?;
        for sh in shares {
            share.p0_share += &sh.p0_share;
        }
        Ok(share)
    }
}

impl Aggregate<PublicKeyShare> for PublicKey {
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = PublicKeyShare>,
    {
        let share = PublicKeyShare::from_shares(iter)?;
        Ok(PublicKey {
            par: share.par,
            c: [share.p0_share, share.crp.poly],
        })
    }
}

impl BinarySize for PublicKeyShare {
    fn binary_size(&self) -> usize {
        self.p0_share.binary_size()
    }
}

impl Encode for PublicKeyShare {
    fn encode_into(&self, buf: &mut [u8]) -> std::result::Result<usize, SerialError> {
        self.p0_share.encode_into(buf)
    }
}

impl Decode for PublicKeyShare {
    fn decode_from(&mut self, buf: &[u8]) -> std::result::Result<usize, SerialError> {
        self.p0_share.decode_from(buf)
    }
}
