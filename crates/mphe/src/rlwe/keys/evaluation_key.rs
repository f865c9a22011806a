//! Evaluation keys: re-encryption key material for key switching.

use crate::rlwe::RlweParameters;
use crate::{Error, Result};
use mphe_math::{
    rq::{Context, Representation},
    rqp::PolyQP,
};
use mphe_traits::{BinarySize, ByteReader, ByteWriter, Decode, Encode, SerialError};
use rand::{CryptoRng, Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use zeroize::Zeroizing;

use super::{GadgetCiphertext, SecretKey};

/// Optional parameters for the generation of an evaluation key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationKeyParameters {
    /// The level of the Q chain; defaults to the maximum level.
    pub level_q: Option<usize>,
    /// The level of the P chain; defaults to the maximum configured level
    /// (absent when no switching modulus is configured).
    pub level_p: Option<usize>,
    /// The base-2 decomposition (0 to disable).
    pub base_two_decomposition: usize,
    /// Whether to generate the key in compressed (seed-only) form.
    pub compressed: bool,
}

impl EvaluationKeyParameters {
    pub(crate) fn resolve(
        &self,
        par: &RlweParameters,
    ) -> (usize, Option<usize>, usize, bool) {
        (
            self.level_q.unwrap_or_else(|| par.max_level()),
            self.level_p.or_else(|| par.max_level_p()),
            self.base_two_decomposition,
            self.compressed,
        )
    }
}

/// An evaluation key: a gadget ciphertext re-encrypting a ciphertext from
/// one secret to another, plus a seed when the key is compressed.
///
/// The seed is present if and only if the key is compressed (degree 0);
/// [`EvaluationKey::expand`] is the only way to obtain a usable degree-1 key
/// from a compressed one.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationKey {
    pub(crate) gct: GadgetCiphertext,
    pub(crate) seed: Option<[u8; 32]>,
}

impl EvaluationKey {
    /// Generates an evaluation key re-encrypting from the secret represented
    /// by `s_in` (an NTT polynomial over the key's chains) to `sk`.
    pub(crate) fn generate<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        s_in: &PolyQP,
        evk_params: &EvaluationKeyParameters,
        rng: &mut R,
    ) -> Result<Self> {
        let (level_q, level_p, base2, compressed) = evk_params.resolve(&sk.par);
        let degree = if compressed { 0 } else { 1 };
        let mut gct = GadgetCiphertext::new(&sk.par, degree, level_q, level_p, base2)?;

        let seed = if compressed {
            let mut seed = [0u8; 32];
            rng.fill(&mut seed);
            Some(seed)
        } else {
            None
        };
        gct.encrypt_secret(sk, s_in, seed, rng)?;

        Ok(Self { gct, seed })
    }

    /// Whether the key is compressed.
    pub fn is_compressed(&self) -> bool {
        self.gct.degree() == 0
    }

    /// The seed of a compressed key.
    pub fn seed(&self) -> Option<&[u8; 32]> {
        self.seed.as_ref()
    }

    /// The underlying gadget ciphertext.
    pub fn gadget_ciphertext(&self) -> &GadgetCiphertext {
        &self.gct
    }

    /// Decompresses the key from `(-a s + w P s' + e)` to
    /// `(-a s + w P s' + e, a)` by replaying the keyed generator derived
    /// from the seed, in row-major digit order.
    ///
    /// A caller may provide a degree-1 buffer of matching shape so that
    /// repeated expansions reuse its memory; the buffer shape is validated
    /// field by field. Given the same seed, expansion is deterministic and
    /// reproduces byte-identical randomness every call.
    pub fn expand(
        &self,
        par: &Arc<RlweParameters>,
        buffer: Option<GadgetCiphertext>,
    ) -> Result<EvaluationKey> {
        if !self.is_compressed() {
            return Err(Error::NotCompressed);
        }
        let seed = self.seed.ok_or(Error::SeedMissing)?;

        let level_q = self.gct.level_q();
        let level_p = self.gct.level_p();

        let mut out = match buffer {
            Some(buffer) => {
                if buffer.degree() != 1 {
                    return Err(Error::BufferMismatch {
                        field: "degree",
                        expected: "1".to_string(),
                        found: buffer.degree().to_string(),
                    });
                }
                if buffer.rns_digit_count() != self.gct.rns_digit_count() {
                    return Err(Error::BufferMismatch {
                        field: "rns_digit_count",
                        expected: self.gct.rns_digit_count().to_string(),
                        found: buffer.rns_digit_count().to_string(),
                    });
                }
                if buffer.base_two_digit_counts() != self.gct.base_two_digit_counts() {
                    return Err(Error::BufferMismatch {
                        field: "base_two_digit_counts",
                        expected: format!("{:?}", self.gct.base_two_digit_counts()),
                        found: format!("{:?}", buffer.base_two_digit_counts()),
                    });
                }
                if buffer.level_q() != level_q {
                    return Err(Error::BufferMismatch {
                        field: "level_q",
                        expected: level_q.to_string(),
                        found: buffer.level_q().to_string(),
                    });
                }
                if buffer.level_p() != level_p {
                    return Err(Error::BufferMismatch {
                        field: "level_p",
                        expected: format!("{level_p:?}"),
                        found: format!("{:?}", buffer.level_p()),
                    });
                }
                buffer
            }
            None => GadgetCiphertext::new(
                par,
                1,
                level_q,
                level_p,
                self.gct.base_two_decomposition(),
            )?,
        };

        let ctx_q: Arc<Context> = par.ctx_at_level(level_q)?.clone();
        let ctx_p: Option<Arc<Context>> = match level_p {
            Some(lp) => Some(par.ctx_p_at_level(lp)?.clone()),
            None => None,
        };

        // The keyed stream is constructed locally and moved into this single
        // draw sequence; the draws replay exactly the ones consumed when the
        // compressed key was generated.
        let mut prng = ChaCha8Rng::from_seed(seed);
        for i in 0..self.gct.rns_digit_count() {
            for j in 0..self.gct.base_two_digit_counts()[i] {
                out.cell_mut(i, j, 0).clone_from(self.gct.cell(i, j, 0));
                *out.cell_mut(i, j, 1) =
                    PolyQP::random(&ctx_q, ctx_p.as_ref(), Representation::Ntt, &mut prng);
            }
        }

        Ok(EvaluationKey {
            gct: out,
            seed: None,
        })
    }
}

impl BinarySize for EvaluationKey {
    fn binary_size(&self) -> usize {
        if self.is_compressed() {
            self.gct.binary_size() + 32
        } else {
            self.gct.binary_size()
        }
    }
}

impl Encode for EvaluationKey {
    fn encode_into(&self, buf: &mut [u8]) -> std::result::Result<usize, SerialError> {
        let mut n = self.gct.encode_into(buf)?;
        if self.is_compressed() {
            // Sanity check, cannot happen unless the key was manually edited.
            let seed = self.seed.ok_or_else(|| SerialError::Malformed {
                context: "EvaluationKey.seed",
                consumed: n,
                reason: "compressed evaluation key without a seed".to_string(),
            })?;
            let mut w = ByteWriter::new(&mut buf[n..]);
            w.write_bytes(&seed, "EvaluationKey.seed")?;
            n += w.written();
        }
        Ok(n)
    }
}

impl Decode for EvaluationKey {
    fn decode_from(&mut self, buf: &[u8]) -> std::result::Result<usize, SerialError> {
        let mut n = self.gct.decode_from(buf)?;
        if self.gct.degree() == 0 {
            let mut r = ByteReader::new(&buf[n..]);
            let bytes = r.read_bytes(32, "EvaluationKey.seed")?;
            let mut seed = [0u8; 32];
            seed.copy_from_slice(bytes);
            self.seed = Some(seed);
            n += r.consumed();
        } else {
            self.seed = None;
        }
        Ok(n)
    }
}

/// A relinearization key: an evaluation key re-encrypting the degree-2 term
/// of a ciphertext (decryptable under s^2) into a degree-1 term.
#[derive(Debug, Clone, PartialEq)]
pub struct RelinearizationKey {
    pub(crate) evk: EvaluationKey,
}

impl RelinearizationKey {
    /// Generates a [`RelinearizationKey`] from a [`SecretKey`].
    pub fn new<R: RngCore + CryptoRng>(sk: &SecretKey, rng: &mut R) -> Result<Self> {
        Self::new_with_params(sk, &EvaluationKeyParameters::default(), rng)
    }

    /// Generates a [`RelinearizationKey`] with explicit key parameters.
    pub fn new_with_params<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        evk_params: &EvaluationKeyParameters,
        rng: &mut R,
    ) -> Result<Self> {
        let (level_q, level_p, _, _) = evk_params.resolve(&sk.par);
        let s = sk.poly_qp(level_q, level_p)?;
        let s2 = Zeroizing::new(s.as_ref() * s.as_ref());
        Ok(Self {
            evk: EvaluationKey::generate(sk, s2.as_ref(), evk_params, rng)?,
        })
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
    ) -> Result<RelinearizationKey> {
        Ok(RelinearizationKey {
            evk: self.evk.expand(par, buffer)?,
        })
    }
}

impl BinarySize for RelinearizationKey {
    fn binary_size(&self) -> usize {
        self.evk.binary_size()
    }
}

impl Encode for RelinearizationKey {
    fn encode_into(&self, buf: &mut [u8]) -> std::result::Result<usize, SerialError> {
        self.evk.encode_into(buf)
    }
}

impl Decode for RelinearizationKey {
    fn decode_from(&mut self, buf: &[u8]) -> std::result::Result<usize, SerialError> {
        self.evk.decode_from(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::{EvaluationKey, EvaluationKeyParameters, RelinearizationKey};
    use crate::rlwe::{GadgetCiphertext, RlweParameters, SecretKey};
    use crate::Error;
    use mphe_math::rqp::PolyQP;
    use mphe_math::rq::Representation;
    use mphe_traits::{Decode, Encode};
    use rand::thread_rng;

    fn compressed_params(base2: usize) -> EvaluationKeyParameters {
        EvaluationKeyParameters {
            base_two_decomposition: base2,
            compressed: true,
            ..Default::default()
        }
    }

    #[test]
    fn compressed_key_invariant() {
        let mut rng = thread_rng();
        let par = RlweParameters::default_arc_with_auxiliary(2, 1, 16);
        let sk = SecretKey::random(&par, &mut rng);

        let rlk = RelinearizationKey::new(&sk, &mut rng).unwrap();
        assert!(!rlk.is_compressed());
        assert!(rlk.evaluation_key().seed().is_none());
        assert!(matches!(
            rlk.evaluation_key().expand(&par, None),
            Err(Error::NotCompressed)
        ));

        let rlk = RelinearizationKey::new_with_params(&sk, &compressed_params(0), &mut rng)
            .unwrap();
        assert!(rlk.is_compressed());
        assert!(rlk.evaluation_key().seed().is_some());
    }

    #[test]
    fn expansion_replays_the_seeded_randomness() {
        let mut rng = thread_rng();
        for par in [
            RlweParameters::default_arc(2, 16),
            RlweParameters::default_arc_with_auxiliary(3, 1, 16),
        ] {
            for base2 in [0usize, 16] {
                let sk = SecretKey::random(&par, &mut rng);
                let rlk =
                    RelinearizationKey::new_with_params(&sk, &compressed_params(base2), &mut rng)
                        .unwrap();
                let expanded = rlk.expand(&par, None).unwrap();
                assert!(!expanded.is_compressed());

                // The replayed public randomness matches a manual replay of
                // the keyed generator, drawn in row-major digit order.
                let seed = *rlk.evaluation_key().seed().unwrap();
                let mut prng: rand_chacha::ChaCha8Rng = rand::SeedableRng::from_seed(seed);
                let ctx_q = par.ctx_at_level(par.max_level()).unwrap();
                let ctx_p = par.ctx_p_full();
                let gct = expanded.evaluation_key().gadget_ciphertext();
                for i in 0..gct.rns_digit_count() {
                    for j in 0..gct.base_two_digit_counts()[i] {
                        let a =
                            PolyQP::random(ctx_q, ctx_p, Representation::Ntt, &mut prng);
                        assert_eq!(gct.cell(i, j, 1), &a);
                        assert_eq!(
                            gct.cell(i, j, 0),
                            rlk.evaluation_key().gadget_ciphertext().cell(i, j, 0)
                        );
                    }
                }

                // Expansion is deterministic across calls.
                let expanded2 = rlk.expand(&par, None).unwrap();
                assert_eq!(expanded, expanded2);
            }
        }
    }

    #[test]
    fn expansion_validates_the_buffer_per_field() {
        let mut rng = thread_rng();
        let par = RlweParameters::default_arc_with_auxiliary(2, 1, 16);
        let sk = SecretKey::random(&par, &mut rng);
        let rlk =
            RelinearizationKey::new_with_params(&sk, &compressed_params(0), &mut rng).unwrap();

        // A matching buffer is accepted and reused.
        let buffer = GadgetCiphertext::new(&par, 1, par.max_level(), par.max_level_p(), 0)
            .unwrap();
        assert!(rlk.expand(&par, Some(buffer)).is_ok());

        // A degree-0 buffer is reported by field.
        let buffer = GadgetCiphertext::new(&par, 0, par.max_level(), par.max_level_p(), 0)
            .unwrap();
        assert!(matches!(
            rlk.expand(&par, Some(buffer)),
            Err(Error::BufferMismatch { field: "degree", .. })
        ));

        // A wrong level is reported by field.
        let buffer = GadgetCiphertext::new(&par, 1, 0, par.max_level_p(), 0).unwrap();
        match rlk.expand(&par, Some(buffer)) {
            Err(Error::BufferMismatch { field, .. }) => {
                assert!(field == "rns_digit_count" || field == "level_q")
            }
            other => panic!("unexpected result: {other:?}"),
        }

        // A wrong digit shape is reported by field.
        let buffer = GadgetCiphertext::new(&par, 1, par.max_level(), par.max_level_p(), 16)
            .unwrap();
        assert!(matches!(
            rlk.expand(&par, Some(buffer)),
            Err(Error::BufferMismatch {
                field: "base_two_digit_counts",
                ..
            })
        ));
    }

    #[test]
    fn serialization_round_trip_for_both_forms() {
        let mut rng = thread_rng();
        let par = RlweParameters::default_arc_with_auxiliary(2, 1, 16);
        let sk = SecretKey::random(&par, &mut rng);

        for compressed in [false, true] {
            let evk_params = EvaluationKeyParameters {
                base_two_decomposition: 16,
                compressed,
                ..Default::default()
            };
            let rlk = RelinearizationKey::new_with_params(&sk, &evk_params, &mut rng).unwrap();
            let bytes = rlk.to_bytes();

            let degree = usize::from(!compressed);
            let mut decoded = RelinearizationKey {
                evk: EvaluationKey {
                    gct: GadgetCiphertext::new(
                        &par,
                        degree,
                        par.max_level(),
                        par.max_level_p(),
                        16,
                    )
                    .unwrap(),
                    seed: None,
                },
            };
            let consumed = decoded.decode_from(&bytes).unwrap();
            assert_eq!(consumed, bytes.len());
            assert_eq!(rlk, decoded);
        }
    }
}
