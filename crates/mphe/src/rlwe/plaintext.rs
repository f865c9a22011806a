//! Plaintext type and encodings for the RLWE scheme layer.

use crate::rlwe::RlweParameters;
use crate::{Error, Result};
use mphe_math::rq::{Poly, Representation};
use mphe_traits::{FheDecoder, FheEncoder, FheParametrized};
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// An encoding for the plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    pub(crate) kind: EncodingKind,
    pub(crate) level: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EncodingKind {
    /// Values are the coefficients of the plaintext polynomial.
    Poly,
    /// Values are placed in the plaintext slots through the index map.
    Simd,
}

impl Encoding {
    /// A poly encoding at the maximum level.
    pub fn poly() -> Self {
        Self {
            kind: EncodingKind::Poly,
            level: None,
        }
    }

    /// A SIMD encoding at the maximum level. Requires the plaintext modulus
    /// to support the NTT of the ring degree.
    pub fn simd() -> Self {
        Self {
            kind: EncodingKind::Simd,
            level: None,
        }
    }

    /// A poly encoding at the given level.
    pub fn poly_at_level(level: usize) -> Self {
        Self {
            kind: EncodingKind::Poly,
            level: Some(level),
        }
    }

    /// A SIMD encoding at the given level.
    pub fn simd_at_level(level: usize) -> Self {
        Self {
            kind: EncodingKind::Simd,
            level: Some(level),
        }
    }

    fn resolve_level(&self, par: &RlweParameters) -> Result<usize> {
        match self.level {
            None => Ok(par.max_level()),
            Some(level) if level <= par.max_level() => Ok(level),
            Some(level) => Err(Error::ParametersError(
                crate::ParametersError::InvalidLevel(level, par.max_level()),
            )),
        }
    }
}

/// A plaintext: a vector of values modulo the plaintext modulus, at a level
/// of the ciphertext chain.
#[derive(Debug, Clone)]
pub struct Plaintext {
    /// The parameters of the scheme.
    pub(crate) par: Arc<RlweParameters>,
    /// The plaintext coefficients, reduced modulo the plaintext modulus.
    pub(crate) value: Box<[u64]>,
    /// The encoding used to produce this plaintext, if known.
    pub(crate) encoding: Option<Encoding>,
    /// The level of the plaintext.
    pub(crate) level: usize,
}

impl FheParametrized for Plaintext {
    type Parameters = RlweParameters;
}

impl PartialEq for Plaintext {
    fn eq(&self, other: &Self) -> bool {
        // The encoding is deliberately ignored: a decrypted plaintext carries
        // no encoding but must compare equal to the value it encrypts.
        self.par == other.par && self.value == other.value && self.level == other.level
    }
}

impl Eq for Plaintext {}

impl Zeroize for Plaintext {
    fn zeroize(&mut self) {
        self.value.zeroize();
    }
}

impl ZeroizeOnDrop for Plaintext {}

impl Plaintext {
    /// The level of the plaintext.
    pub fn level(&self) -> usize {
        self.level
    }

    /// The raw plaintext coefficients.
    pub fn value(&self) -> &[u64] {
        &self.value
    }

    /// The encoding that produced this plaintext, when known. Decrypted
    /// plaintexts carry no encoding.
    pub fn encoding(&self) -> Option<&Encoding> {
        self.encoding.as_ref()
    }

    /// Lifts the plaintext into the Q chain at its level by scaling the
    /// coefficients by floor(Q/t). The result is in NTT representation.
    pub(crate) fn to_poly(&self) -> Result<Poly> {
        let mut p = self.par.lift(&self.value, self.level)?;
        p.change_representation(Representation::Ntt);
        Ok(p)
    }
}

impl FheEncoder<&[u64]> for Plaintext {
    type Error = Error;
    type Encoding = Encoding;

    fn try_encode(value: &[u64], encoding: Encoding, par: &Arc<RlweParameters>) -> Result<Self> {
        if value.len() > par.degree() {
            return Err(Error::TooManyValues(value.len(), par.degree()));
        }
        let level = encoding.resolve_level(par)?;

        let mut v = vec![0u64; par.degree()];
        v[..value.len()].copy_from_slice(value);
        par.plaintext.reduce_vec(&mut v);

        match encoding.kind {
            EncodingKind::Poly => {}
            EncodingKind::Simd => {
                let op = par.plaintext_op().ok_or_else(|| {
                    Error::DefaultError(
                        "the plaintext modulus does not support the SIMD encoding".to_string(),
                    )
                })?;
                let mut w = vec![0u64; par.degree()];
                for (i, vi) in v.iter().enumerate() {
                    w[par.index_map()[i]] = *vi;
                }
                op.backward(&mut w);
                v = w;
            }
        }

        Ok(Self {
            par: par.clone(),
            value: v.into_boxed_slice(),
            encoding: Some(encoding),
            level,
        })
    }
}

impl FheDecoder<Plaintext> for Vec<u64> {
    type Error = Error;
    type Encoding = Encoding;

    fn try_decode(pt: &Plaintext, encoding: Encoding) -> Result<Self> {
        match encoding.kind {
            EncodingKind::Poly => Ok(pt.value.to_vec()),
            EncodingKind::Simd => {
                let op = pt.par.plaintext_op().ok_or_else(|| {
                    Error::DefaultError(
                        "the plaintext modulus does not support the SIMD encoding".to_string(),
                    )
                })?;
                let mut w = pt.value.to_vec();
                op.forward(&mut w);
                let mut out = vec![0u64; pt.par.degree()];
                for (i, oi) in out.iter_mut().enumerate() {
                    *oi = w[pt.par.index_map()[i]];
                }
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Encoding, Plaintext};
    use crate::rlwe::RlweParameters;
    use mphe_traits::{FheDecoder, FheEncoder};
    use rand::{thread_rng, RngCore};

    fn random_values(n: usize, t: u64) -> Vec<u64> {
        let mut rng = thread_rng();
        (0..n).map(|_| rng.next_u64() % t).collect()
    }

    #[test]
    fn poly_encoding_round_trip() {
        let par = RlweParameters::default_arc(2, 16);
        let v = random_values(16, par.plaintext());
        let pt = Plaintext::try_encode(&v, Encoding::poly(), &par).unwrap();
        assert_eq!(pt.level(), par.max_level());
        assert_eq!(Vec::<u64>::try_decode(&pt, Encoding::poly()).unwrap(), v);
    }

    #[test]
    fn simd_encoding_round_trip() {
        let par = RlweParameters::default_arc(2, 16);
        let v = random_values(16, par.plaintext());
        let pt = Plaintext::try_encode(&v, Encoding::simd(), &par).unwrap();
        assert_eq!(Vec::<u64>::try_decode(&pt, Encoding::simd()).unwrap(), v);
        // The two encodings differ unless the input is degenerate.
        let pt2 = Plaintext::try_encode(&v, Encoding::poly(), &par).unwrap();
        assert_ne!(pt, pt2);
    }

    #[test]
    fn short_inputs_are_padded() {
        let par = RlweParameters::default_arc(1, 16);
        let pt = Plaintext::try_encode(&[1, 2, 3], Encoding::poly(), &par).unwrap();
        let v = Vec::<u64>::try_decode(&pt, Encoding::poly()).unwrap();
        assert_eq!(&v[..3], &[1, 2, 3]);
        assert!(v[3..].iter().all(|x| *x == 0));
    }

    #[test]
    fn oversized_inputs_are_rejected() {
        let par = RlweParameters::default_arc(1, 16);
        assert!(Plaintext::try_encode(&vec![0u64; 17], Encoding::poly(), &par).is_err());
        assert!(
            Plaintext::try_encode(&[0u64; 4], Encoding::poly_at_level(3), &par).is_err()
        );
    }
}
