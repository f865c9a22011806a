//! Common random polynomials sampled from a common reference string.

use crate::rlwe::RlweParameters;
use crate::{Error, Result};
use mphe_math::{rq::Representation, rqp::PolyQP};
use mphe_traits::{BinarySize, Decode, Encode, SerialError};
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// A polynomial over the full Q and P chains, sampled from a common
/// reference string shared by all protocol participants.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonRandomPoly {
    pub(crate) poly: PolyQP,
}

impl CommonRandomPoly {
    /// Samples a new random CRP at the maximum level.
    pub fn new<R: RngCore + CryptoRng>(par: &Arc<RlweParameters>, rng: &mut R) -> Result<Self> {
        Self::new_leveled(par, par.max_level(), rng)
    }

    /// Samples a new CRP from a shared deterministic seed: parties sharing
    /// the seed obtain identical polynomials.
    pub fn new_deterministic(
        par: &Arc<RlweParameters>,
        seed: <ChaCha8Rng as SeedableRng>::Seed,
    ) -> Result<Self> {
        Self::new_leveled_deterministic(par, par.max_level(), seed)
    }

    /// Samples a new random CRP at the given level of the Q chain.
    pub fn new_leveled<R: RngCore + CryptoRng>(
        par: &Arc<RlweParameters>,
        level: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let ctx_q = par.ctx_at_level(level)?;
        let poly = PolyQP::random(ctx_q, par.ctx_p_full(), Representation::Ntt, rng);
        Ok(Self { poly })
    }

    /// Samples a new deterministic CRP at the given level of the Q chain.
    pub fn new_leveled_deterministic(
        par: &Arc<RlweParameters>,
        level: usize,
        seed: <ChaCha8Rng as SeedableRng>::Seed,
    ) -> Result<Self> {
        let mut prng = ChaCha8Rng::from_seed(seed);
        Self::new_leveled(par, level, &mut prng)
    }

    /// Deserializes a CRP at the maximum level.
    pub fn deserialize(bytes: &[u8], par: &Arc<RlweParameters>) -> Result<Self> {
        let ctx_q = par.ctx_at_level(par.max_level())?;
        let mut crp = Self {
            poly: PolyQP::zero(ctx_q, par.ctx_p_full(), Representation::Ntt),
        };
        crp.decode_from(bytes).map_err(Error::SerializationError)?;
        Ok(crp)
    }
}

impl BinarySize for CommonRandomPoly {
    fn binary_size(&self) -> usize {
        self.poly.binary_size()
    }
}

impl Encode for CommonRandomPoly {
    fn encode_into(&self, buf: &mut [u8]) -> std::result::Result<usize, SerialError> {
        self.poly.encode_into(buf)
    }
}

impl Decode for CommonRandomPoly {
    fn decode_from(&mut self, buf: &[u8]) -> std::result::Result<usize, SerialError> {
        self.poly.decode_from(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::CommonRandomPoly;
    use crate::rlwe::RlweParameters;
    use mphe_traits::{Decode, Encode};
    use rand::thread_rng;

    #[test]
    fn deterministic_sampling_agrees_across_parties() {
        let par = RlweParameters::default_arc_with_auxiliary(2, 1, 16);
        let seed = [42u8; 32];
        let a = CommonRandomPoly::new_deterministic(&par, seed).unwrap();
        let b = CommonRandomPoly::new_deterministic(&par, seed).unwrap();
        assert_eq!(a, b);
        assert!(a.poly.p.is_some());

        let c = CommonRandomPoly::new_deterministic(&par, [43u8; 32]).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn serialization_round_trip() {
        let mut rng = thread_rng();
        let par = RlweParameters::default_arc_with_auxiliary(2, 1, 16);
        let crp = CommonRandomPoly::new(&par, &mut rng).unwrap();

        let bytes = crp.to_bytes();
        let decoded = CommonRandomPoly::deserialize(&bytes, &par).unwrap();
        assert_eq!(crp, decoded);

        let mut decoded2 = decoded.clone();
        assert_eq!(decoded2.decode_from(&bytes).unwrap(), bytes.len());
    }
}
