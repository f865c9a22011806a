//! Collective refresh with plaintext slot permutation.
//!
//! Parties holding additive shares of the secret jointly mask-decrypt a
//! ciphertext, permute its plaintext slots, and re-encrypt it under the same
//! collective key, without any party learning the plaintext or the combined
//! secret. The revealed intermediate value is blinded by a fresh uniform
//! mask per party, and every share carries a Gaussian error sampled at the
//! extended QP level and divided by P, flooding the information the share
//! would otherwise leak.

use crate::rlwe::{Ciphertext, RlweParameters, SecretKey};
use crate::{Error, Result};
use mphe_math::{
    rq::{Poly, Representation},
    rqp::PolyQP,
};
use mphe_traits::{BinarySize, Decode, Encode, SerialError};
use rand::{CryptoRng, RngCore};
use std::sync::Arc;

use super::{Aggregate, CommonRandomPoly};

/// A party's share in the collective permute protocol: a masked decryption
/// share and a re-encryption share, both over the Q chain of the ciphertext
/// level.
#[derive(Debug, Clone, PartialEq)]
pub struct PermuteShare {
    pub(crate) par: Arc<RlweParameters>,
    pub(crate) decrypt_share: Poly,
    pub(crate) recrypt_share: Poly,
    pub(crate) level: usize,
}

impl PermuteShare {
    /// Participate in a new collective permute round.
    ///
    /// 1. *Private input*: the party's additive secret key share
    /// 2. *Public input*: the ciphertext to refresh
    /// 3. *Public input*: the common random polynomial of the round
    /// 4. *Public input*: the slot permutation
    ///
    /// The same `permutation` must be supplied by every party and again at
    /// finalization; the protocol does not check this, and a mismatch yields
    /// garbage without an error.
    pub fn new<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        ct: &Ciphertext,
        crs: &CommonRandomPoly,
        permutation: &[usize],
        rng: &mut R,
    ) -> Result<Self> {
        let par = sk_share.par.clone();
        if ct.c.len() != 2 {
            return Err(Error::TooManyValues(ct.c.len(), 2));
        }

        let level = ct.level();
        let ctx_q = par.ctx_at_level(level)?;
        let ctx_p = par
            .ctx_p_full()
            .ok_or_else(|| {
                Error::DefaultError(
                    "the permute protocol requires an auxiliary switching modulus".to_string(),
                )
            })?
            .clone();
        let extender = par.extender_at_level(level)?;
        let op = par.plaintext_op().ok_or_else(|| {
            Error::DefaultError(
                "the plaintext modulus does not support the SIMD encoding".to_string(),
            )
        })?;

        let s_q = sk_share.poly_at_level(level)?;
        let s_qp = sk_share.poly_qp(level, par.max_level_p())?;

        // Decrypt share: (P (s c1) + e) / P, the division flooding the
        // error leaked by the opened decryption.
        let mut h = &ct.c[1] * s_q.as_ref();
        h.change_representation(Representation::PowerBasis);
        extender.mul_by_p(&mut h);
        let e = PolyQP::gaussian(
            ctx_q,
            Some(&ctx_p),
            par.sigma(),
            Representation::PowerBasis,
            rng,
        )
        .map_err(Error::MathError)?;
        h += &e.q;
        let mut decrypt_share =
            extender.mod_down(&h, e.p.as_ref().expect("sampled with a P part"))?;

        // Recrypt share: (-s crs + e') / P.
        let t = &crs.poly * s_qp.as_ref();
        let mut t = -&t;
        t.change_representation(Representation::PowerBasis);
        let e = PolyQP::gaussian(
            ctx_q,
            Some(&ctx_p),
            par.sigma(),
            Representation::PowerBasis,
            rng,
        )
        .map_err(Error::MathError)?;
        t += &e;
        let mut recrypt_share = extender.mod_down_qp(&t)?;

        // Fresh uniform mask over the plaintext ring, lifted by floor(Q/t):
        // it blinds the plaintext revealed during the open decryption.
        let mask = par.plaintext.random_vec(par.degree(), rng);
        decrypt_share += &par.lift(&mask, level)?;

        // The same mask, permuted in the plaintext NTT domain and lifted
        // again, cancels out of the recombined plaintext so that the net
        // effect is exactly the permutation.
        let mut mask_ntt = mask;
        op.forward(&mut mask_ntt);
        let mut permuted = permute_with_index(&mask_ntt, permutation, par.index_map());
        op.backward(&mut permuted);
        recrypt_share -= &par.lift(&permuted, level)?;

        Ok(Self {
            par,
            decrypt_share,
            recrypt_share,
            level,
        })
    }

    /// Masked decryption: adds the aggregated decryption share to `c0`,
    /// revealing the blinded plaintext in power basis.
    pub fn decrypt(&self, ct: &Ciphertext) -> Result<Poly> {
        let mut c0 = ct.c[0].clone();
        c0.change_representation(Representation::PowerBasis);
        c0 += &self.decrypt_share;
        Ok(c0)
    }

    /// Rescales the masked plaintext to the plaintext modulus, applies the
    /// permutation in the plaintext NTT domain, and lifts the result back by
    /// floor(Q/t).
    ///
    /// The permutation must be the one used by every party during share
    /// generation for this ciphertext.
    pub fn permute(
        par: &Arc<RlweParameters>,
        masked: &Poly,
        permutation: &[usize],
    ) -> Result<Poly> {
        let level = par.level_of_ctx(masked.ctx())?;
        let op = par.plaintext_op().ok_or_else(|| {
            Error::DefaultError(
                "the plaintext modulus does not support the SIMD encoding".to_string(),
            )
        })?;

        let mut coeffs = par.scaler_at_level(level).scale(masked)?;
        op.forward(&mut coeffs);
        let mut permuted = permute_with_index(&coeffs, permutation, par.index_map());
        op.backward(&mut permuted);
        par.lift(&permuted, level)
    }

    /// Re-encryption: combines the permuted plaintext with the aggregated
    /// re-encryption share into a fresh ciphertext `(pt + h1, crs / P)`.
    pub fn recrypt(&self, permuted: &Poly, crs: &CommonRandomPoly) -> Result<Ciphertext> {
        let mut c0 = permuted + &self.recrypt_share;
        c0.change_representation(Representation::Ntt);

        let extender = self.par.extender_at_level(self.level)?;
        let mut crs_pb = crs.poly.clone();
        crs_pb.change_representation(Representation::PowerBasis);
        let mut c1 = extender.mod_down_qp(&crs_pb)?;
        c1.change_representation(Representation::Ntt);

        Ciphertext::new(vec![c0, c1], &self.par)
    }

    /// Applies the masked decryption, the permutation and the re-encryption
    /// in sequence.
    pub fn finalize(
        &self,
        ct: &Ciphertext,
        permutation: &[usize],
        crs: &CommonRandomPoly,
    ) -> Result<Ciphertext> {
        let masked = self.decrypt(ct)?;
        let permuted = Self::permute(&self.par, &masked, permutation)?;
        self.recrypt(&permuted, crs)
    }
}

/// Applies a slot permutation through the slot-index table: output slot `j`
/// takes the value of input slot `permutation[j]`.
fn permute_with_index(values: &[u64], permutation: &[usize], index: &[usize]) -> Vec<u64> {
    debug_assert_eq!(values.len(), permutation.len());
    let mut out = vec![0u64; values.len()];
    for j in 0..values.len() {
        out[index[j]] = values[index[permutation[j]]];
    }
    out
}

impl Aggregate<PermuteShare> for PermuteShare {
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = PermuteShare>,
    {
        let mut shares = iter.into_iter();
        let mut share = shares.next().ok_or(Error::TooFewValues(0, 1))?;
        for sh in shares {
            share.decrypt_share += &sh.decrypt_share;
            share.recrypt_share += &sh.recrypt_share;
        }
        Ok(share)
    }
}

impl BinarySize for PermuteShare {
    fn binary_size(&self) -> usize {
        self.decrypt_share.binary_size() + self.recrypt_share.binary_size()
    }
}

impl Encode for PermuteShare {
    fn encode_into(&self, buf: &mut [u8]) -> std::result::Result<usize, SerialError> {
        let mut n = self.decrypt_share.encode_into(buf)?;
        n += self.recrypt_share.encode_into(&mut buf[n..])?;
        Ok(n)
    }
}

impl Decode for PermuteShare {
    fn decode_from(&mut self, buf: &[u8]) -> std::result::Result<usize, SerialError> {
        let mut n = self.decrypt_share.decode_from(buf)?;
        n += self.recrypt_share.decode_from(&buf[n..])?;
        Ok(n)
    }
}
