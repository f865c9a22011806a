//! Evaluation key sets: the lookup capability an evaluator queries for its
//! relinearization and Galois keys.

use crate::rlwe::RlweParameters;
use crate::{Error, Result};
use itertools::Itertools;
use mphe_traits::{BinarySize, ByteReader, ByteWriter, Decode, Encode, SerialError};
use std::collections::HashMap;
use std::sync::Arc;

use super::{EvaluationKey, GadgetCiphertext, GaloisKey, RelinearizationKey};

/// Lookup capability for the keys used during homomorphic evaluation.
///
/// Implementations must be safe for concurrent reads; population is assumed
/// to happen before concurrent readers exist.
pub trait EvaluationKeySet: Send + Sync {
    /// Retrieves the Galois key for the automorphism
    /// `X^i -> X^(i * galois_element)`.
    fn galois_key(&self, galois_element: u64) -> Result<Arc<GaloisKey>>;

    /// Returns the elements for which a Galois key exists, in unspecified
    /// order.
    fn galois_elements(&self) -> Vec<u64>;

    /// Retrieves the relinearization key.
    fn relinearization_key(&self) -> Result<Arc<RelinearizationKey>>;

    /// Returns a handle aliasing the same underlying keys, so that many
    /// evaluator threads can share one key set.
    fn shallow_copy(&self) -> Box<dyn EvaluationKeySet>;
}

/// A basic in-memory implementation of [`EvaluationKeySet`].
#[derive(Debug, Clone)]
pub struct MemEvaluationKeySet {
    pub(crate) par: Arc<RlweParameters>,
    pub(crate) relinearization_key: Option<Arc<RelinearizationKey>>,
    pub(crate) galois_keys: Arc<HashMap<u64, Arc<GaloisKey>>>,
}

impl MemEvaluationKeySet {
    /// Creates a key set with the provided relinearization and Galois keys.
    pub fn new(
        par: &Arc<RlweParameters>,
        relinearization_key: Option<RelinearizationKey>,
        galois_keys: impl IntoIterator<Item = GaloisKey>,
    ) -> Self {
        let galois_keys = galois_keys
            .into_iter()
            .map(|gk| (gk.galois_element(), Arc::new(gk)))
            .collect::<HashMap<_, _>>();
        Self {
            par: par.clone(),
            relinearization_key: relinearization_key.map(Arc::new),
            galois_keys: Arc::new(galois_keys),
        }
    }
}

impl EvaluationKeySet for MemEvaluationKeySet {
    fn galois_key(&self, galois_element: u64) -> Result<Arc<GaloisKey>> {
        self.galois_keys
            .get(&galois_element)
            .cloned()
            .ok_or(Error::GaloisKeyNotFound(galois_element))
    }

    fn galois_elements(&self) -> Vec<u64> {
        self.galois_keys.keys().copied().collect()
    }

    fn relinearization_key(&self) -> Result<Arc<RelinearizationKey>> {
        self.relinearization_key
            .clone()
            .ok_or(Error::RelinearizationKeyAbsent)
    }

    fn shallow_copy(&self) -> Box<dyn EvaluationKeySet> {
        Box::new(self.clone())
    }
}

impl BinarySize for MemEvaluationKeySet {
    fn binary_size(&self) -> usize {
        let mut size = 2;
        if let Some(rlk) = self.relinearization_key.as_ref() {
            size += rlk.binary_size();
        }
        if !self.galois_keys.is_empty() {
            size += 8;
            for gk in self.galois_keys.values() {
                size += 8 + gk.binary_size();
            }
        }
        size
    }
}

impl Encode for MemEvaluationKeySet {
    fn encode_into(&self, buf: &mut [u8]) -> std::result::Result<usize, SerialError> {
        let mut w = ByteWriter::new(buf);
        w.write_u8(
            self.relinearization_key.is_some() as u8,
            "MemEvaluationKeySet.relinearization_key_present",
        )?;
        let mut n = w.written();
        if let Some(rlk) = self.relinearization_key.as_ref() {
            n += rlk.encode_into(&mut buf[n..])?;
        }

        let mut w = ByteWriter::new(&mut buf[n..]);
        w.write_u8(
            !self.galois_keys.is_empty() as u8,
            "MemEvaluationKeySet.galois_keys_present",
        )?;
        n += w.written();
        if !self.galois_keys.is_empty() {
            let mut w = ByteWriter::new(&mut buf[n..]);
            w.write_u64(
                self.galois_keys.len() as u64,
                "MemEvaluationKeySet.galois_keys",
            )?;
            n += w.written();
            // Ascending element order keeps the encoding deterministic.
            for el in self.galois_keys.keys().sorted() {
                let mut w = ByteWriter::new(&mut buf[n..]);
                w.write_u64(*el, "MemEvaluationKeySet.galois_element")?;
                n += w.written();
                n += self.galois_keys[el].encode_into(&mut buf[n..])?;
            }
        }
        Ok(n)
    }
}

impl Decode for MemEvaluationKeySet {
    fn decode_from(&mut self, buf: &[u8]) -> std::result::Result<usize, SerialError> {
        let mut r = ByteReader::new(buf);
        let has_rlk = r.read_u8("MemEvaluationKeySet.relinearization_key_present")? == 1;
        let mut n = r.consumed();
        self.relinearization_key = if has_rlk {
            let mut rlk = RelinearizationKey {
                evk: placeholder_evk(&self.par, n)?,
            };
            n += rlk.decode_from(&buf[n..])?;
            Some(Arc::new(rlk))
        } else {
            None
        };

        let mut r = ByteReader::new(&buf[n..]);
        let has_galois = r.read_u8("MemEvaluationKeySet.galois_keys_present")? == 1;
        n += r.consumed();
        let mut galois_keys = HashMap::new();
        if has_galois {
            let mut r = ByteReader::new(&buf[n..]);
            let count = r.read_u64("MemEvaluationKeySet.galois_keys")? as usize;
            n += r.consumed();
            for _ in 0..count {
                let mut r = ByteReader::new(&buf[n..]);
                let el = r.read_u64("MemEvaluationKeySet.galois_element")?;
                n += r.consumed();
                let mut gk = GaloisKey {
                    galois_element: 0,
                    nth_root: 0,
                    evk: placeholder_evk(&self.par, n)?,
                };
                n += gk.decode_from(&buf[n..])?;
                if gk.galois_element() != el {
                    return Err(SerialError::Malformed {
                        context: "MemEvaluationKeySet.galois_element",
                        consumed: n,
                        reason: format!(
                            "map key {el} does not match the key's element {}",
                            gk.galois_element()
                        ),
                    });
                }
                galois_keys.insert(el, Arc::new(gk));
            }
        }
        self.galois_keys = Arc::new(galois_keys);
        Ok(n)
    }
}

/// A minimal evaluation key whose gadget ciphertext is reshaped by decoding.
fn placeholder_evk(
    par: &Arc<RlweParameters>,
    consumed: usize,
) -> std::result::Result<EvaluationKey, SerialError> {
    Ok(EvaluationKey {
        gct: GadgetCiphertext::new(par, 0, 0, None, 0).map_err(|e| SerialError::Malformed {
            context: "MemEvaluationKeySet.placeholder",
            consumed,
            reason: e.to_string(),
        })?,
        seed: None,
    })
}

#[cfg(test)]
mod tests {
    use super::{EvaluationKeySet, MemEvaluationKeySet};
    use crate::rlwe::{GaloisKey, RelinearizationKey, RlweParameters, SecretKey};
    use crate::Error;
    use mphe_traits::{Decode, Encode};
    use rand::thread_rng;
    use std::collections::HashSet;

    fn test_key_set() -> (std::sync::Arc<RlweParameters>, MemEvaluationKeySet, Vec<u64>) {
        let mut rng = thread_rng();
        let par = RlweParameters::default_arc_with_auxiliary(2, 1, 16);
        let sk = SecretKey::random(&par, &mut rng);

        let rlk = RelinearizationKey::new(&sk, &mut rng).unwrap();
        let elements = vec![par.galois_element(1), par.galois_element(2)];
        let galois_keys = elements
            .iter()
            .map(|el| GaloisKey::new(&sk, *el, &mut rng).unwrap())
            .collect::<Vec<_>>();

        (
            par.clone(),
            MemEvaluationKeySet::new(&par, Some(rlk), galois_keys),
            elements,
        )
    }

    #[test]
    fn lookup_hits_and_misses() {
        let (par, eks, elements) = test_key_set();

        for el in &elements {
            let gk = eks.galois_key(*el).unwrap();
            assert_eq!(gk.galois_element(), *el);
        }
        assert_eq!(
            eks.galois_elements().into_iter().collect::<HashSet<_>>(),
            elements.iter().copied().collect::<HashSet<_>>()
        );
        assert!(eks.relinearization_key().is_ok());

        let missing = par.galois_element(5);
        assert!(matches!(
            eks.galois_key(missing),
            Err(Error::GaloisKeyNotFound(el)) if el == missing
        ));

        let empty = MemEvaluationKeySet::new(&par, None, []);
        assert!(matches!(
            empty.relinearization_key(),
            Err(Error::RelinearizationKeyAbsent)
        ));
    }

    #[test]
    fn shallow_copies_share_the_keys_across_threads() {
        let (_, eks, elements) = test_key_set();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let copy = eks.shallow_copy();
                let elements = elements.clone();
                scope.spawn(move || {
                    for _ in 0..100 {
                        for el in &elements {
                            assert_eq!(copy.galois_key(*el).unwrap().galois_element(), *el);
                        }
                        assert!(copy.relinearization_key().is_ok());
                    }
                });
            }
        });

        // The copies alias the same keys rather than deep-copying them.
        let copy = eks.clone();
        assert!(std::sync::Arc::ptr_eq(&copy.galois_keys, &eks.galois_keys));
    }

    #[test]
    fn serialization_round_trip() {
        let (par, eks, _) = test_key_set();

        let bytes = eks.to_bytes();
        let mut decoded = MemEvaluationKeySet::new(&par, None, []);
        let consumed = decoded.decode_from(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());

        assert_eq!(
            decoded.relinearization_key().unwrap(),
            eks.relinearization_key().unwrap()
        );
        for el in eks.galois_elements() {
            assert_eq!(decoded.galois_key(el).unwrap(), eks.galois_key(el).unwrap());
        }

        // A key set without any keys round-trips too.
        let empty = MemEvaluationKeySet::new(&par, None, []);
        let bytes = empty.to_bytes();
        let mut decoded = MemEvaluationKeySet::new(&par, None, []);
        assert_eq!(decoded.decode_from(&bytes).unwrap(), bytes.len());
        assert!(decoded.relinearization_key().is_err());
        assert!(decoded.galois_elements().is_empty());
    }
}
