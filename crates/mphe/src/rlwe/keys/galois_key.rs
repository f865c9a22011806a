//! Galois keys: evaluation keys for ring automorphisms.

use crate::rlwe::RlweParameters;
use crate::{Error, Result};
use mphe_math::rqp::PolyQP;
use mphe_math::rq::Representation;
use mphe_traits::{BinarySize, ByteReader, ByteWriter, Decode, Encode, SerialError};
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use zeroize::Zeroizing;

use super::{EvaluationKey, EvaluationKeyParameters, GadgetCiphertext, SecretKey};

/// An evaluation key for the automorphism `X^i -> X^(i * galois_element)`.
///
/// The key re-encrypts from the automorphism of the secret back to the
/// secret. It is generated for the *inverse* element of the automorphism the
/// caller intends to apply: the evaluator first switches the key, then
/// applies the automorphism once to the final result, which is cheaper than
/// applying it to every decomposed digit.
#[derive(Debug, Clone, PartialEq)]
pub struct GaloisKey {
    pub(crate) galois_element: u64,
    pub(crate) nth_root: u64,
    pub(crate) evk: EvaluationKey,
}

impl GaloisKey {
    /// Generates a [`GaloisKey`] for the given element from a [`SecretKey`].
    pub fn new<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        galois_element: u64,
        rng: &mut R,
    ) -> Result<Self> {
        Self::new_with_params(sk, galois_element, &EvaluationKeyParameters::default(), rng)
    }

    /// Generates a [`GaloisKey`] with explicit key parameters.
    pub fn new_with_params<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        galois_element: u64,
        evk_params: &EvaluationKeyParameters,
        rng: &mut R,
    ) -> Result<Self> {
        let par = &sk.par;
        let nth_root = par.nth_root();
        if galois_element % 2 == 0 || galois_element >= nth_root {
            return Err(Error::DefaultError(format!(
                "invalid galois element {galois_element}: must be odd and smaller than {nth_root}"
            )));
        }

        let (level_q, level_p, _, _) = evk_params.resolve(par);
        let ctx_q = par.ctx_at_level(level_q)?;
        let ctx_p = match level_p {
            Some(lp) => Some(par.ctx_p_at_level(lp)?),
            None => None,
        };

        // The key re-encrypts pi^{-1}(s) to s.
        let inv = par.galois_element_inverse(galois_element);
        let s_auto = Zeroizing::new(substitute(&sk.coeffs, inv, par.degree()));
        let s_in = Zeroizing::new(
            PolyQP::try_convert_from(&s_auto, ctx_q, ctx_p, Representation::Ntt)
                .map_err(Error::MathError)?,
        );

        Ok(Self {
            galois_element,
            nth_root,
            evk: EvaluationKey::generate(sk, s_in.as_ref(), evk_params, rng)?,
        })
    }

    /// The Galois element of the automorphism.
    pub fn galois_element(&self) -> u64 {
        self.galois_element
    }

    /// The 2N-th cyclotomic order of the ring.
    pub fn nth_root(&self) -> u64 {
        self.nth_root
    }

    /// The underlying evaluation key.
    pub fn evaluation_key(&self) -> &EvaluationKey {
        &self.evk
    }

    /// Whether the key is compressed.
    pub fn is_compressed(&self) -> bool {
        self.evk.is_compressed()
    }

    /// Decompresses the key; see [`EvaluationKey::expand`].
    pub fn expand(
        &self,
        par: &Arc<RlweParameters>,
        buffer: Option<GadgetCiphertext>,
    ) -> Result<GaloisKey> {
        Ok(GaloisKey {
            galois_element: self.galois_element,
            nth_root: self.nth_root,
            evk: self.evk.expand(par, buffer)?,
        })
    }
}

/// Applies `X^i -> X^(i * exponent)` to signed coefficients in the power
/// basis; `exponent` must be odd so that the map is a bijection.
fn substitute(coeffs: &[i64], exponent: u64, degree: usize) -> Vec<i64> {
    debug_assert_eq!(exponent % 2, 1);
    let m = 2 * degree as u64;
    let mut out = vec![0i64; degree];
    for (i, c) in coeffs.iter().enumerate() {
        let j = ((i as u64 * exponent) % m) as usize;
        if j < degree {
            out[j] = *c;
        } else {
            out[j - degree] = -*c;
        }
    }
    out
}

impl BinarySize for GaloisKey {
    fn binary_size(&self) -> usize {
        16 + self.evk.binary_size()
    }
}

impl Encode for GaloisKey {
    fn encode_into(&self, buf: &mut [u8]) -> std::result::Result<usize, SerialError> {
        let mut w = ByteWriter::new(buf);
        w.write_u64(self.galois_element, "GaloisKey.galois_element")?;
        w.write_u64(self.nth_root, "GaloisKey.nth_root")?;
        let mut n = w.written();
        n += self.evk.encode_into(&mut buf[n..])?;
        Ok(n)
    }
}

impl Decode for GaloisKey {
    fn decode_from(&mut self, buf: &[u8]) -> std::result::Result<usize, SerialError> {
        let mut r = ByteReader::new(buf);
        self.galois_element = r.read_u64("GaloisKey.galois_element")?;
        self.nth_root = r.read_u64("GaloisKey.nth_root")?;
        let mut n = r.consumed();
        n += self.evk.decode_from(&buf[n..])?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::{substitute, GaloisKey};
    use crate::rlwe::{EvaluationKeyParameters, GadgetCiphertext, RlweParameters, SecretKey};
    use crate::rlwe::keys::EvaluationKey;
    use mphe_traits::{Decode, Encode};
    use rand::thread_rng;

    #[test]
    fn substitution_is_an_automorphism() {
        // x -> x^3 on 1 + 2x + 3x^7 in Z[x]/(x^8 + 1):
        // 1 + 2x^3 + 3x^21 = 1 + 2x^3 + 3x^5 (x^16 = 1, x^21 = x^5).
        let mut coeffs = vec![0i64; 8];
        coeffs[0] = 1;
        coeffs[1] = 2;
        coeffs[7] = 3;
        let out = substitute(&coeffs, 3, 8);
        assert_eq!(out, vec![1, 0, 0, 2, 0, 3, 0, 0]);

        // An automorphism composed with its inverse is the identity.
        let inv = 11; // 3 * 11 = 33 = 1 mod 16
        let back = substitute(&substitute(&coeffs, 3, 8), inv, 8);
        assert_eq!(back, coeffs);
    }

    #[test]
    fn generation_carries_the_tags() {
        let mut rng = thread_rng();
        let par = RlweParameters::default_arc_with_auxiliary(2, 1, 16);
        let sk = SecretKey::random(&par, &mut rng);

        let el = par.galois_element(1);
        let gk = GaloisKey::new(&sk, el, &mut rng).unwrap();
        assert_eq!(gk.galois_element(), el);
        assert_eq!(gk.nth_root(), par.nth_root());
        assert!(!gk.is_compressed());

        // Even or oversized elements are rejected.
        assert!(GaloisKey::new(&sk, 2, &mut rng).is_err());
        assert!(GaloisKey::new(&sk, par.nth_root() + 1, &mut rng).is_err());
    }

    #[test]
    fn compressed_generation_and_expansion() {
        let mut rng = thread_rng();
        let par = RlweParameters::default_arc_with_auxiliary(2, 1, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let evk_params = EvaluationKeyParameters {
            compressed: true,
            ..Default::default()
        };

        let gk =
            GaloisKey::new_with_params(&sk, par.galois_element_rows(), &evk_params, &mut rng)
                .unwrap();
        assert!(gk.is_compressed());
        let expanded = gk.expand(&par, None).unwrap();
        assert!(!expanded.is_compressed());
        assert_eq!(expanded.galois_element(), gk.galois_element());
        assert_eq!(expanded.nth_root(), gk.nth_root());
    }

    #[test]
    fn serialization_round_trip() {
        let mut rng = thread_rng();
        let par = RlweParameters::default_arc_with_auxiliary(2, 1, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let gk = GaloisKey::new(&sk, par.galois_element(2), &mut rng).unwrap();

        let bytes = gk.to_bytes();
        let mut decoded = GaloisKey {
            galois_element: 0,
            nth_root: 0,
            evk: EvaluationKey {
                gct: GadgetCiphertext::new(&par, 1, par.max_level(), par.max_level_p(), 0)
                    .unwrap(),
                seed: None,
            },
        };
        let consumed = decoded.decode_from(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(gk, decoded);
    }
}
