//! RLWE scheme layer: parameters, plaintexts, ciphertexts and key material.

mod ciphertext;
mod keys;
mod parameters;
mod plaintext;

pub use ciphertext::Ciphertext;
pub use keys::{
    EvaluationKey, EvaluationKeyParameters, EvaluationKeySet, GadgetCiphertext, GaloisKey,
    MemEvaluationKeySet, PublicKey, RelinearizationKey, SecretKey,
};
pub use parameters::{RlweParameters, RlweParametersBuilder};
pub use plaintext::{Encoding, Plaintext};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

static INDEX_MAPS: OnceLock<Mutex<HashMap<usize, Arc<[usize]>>>> = OnceLock::new();

/// The slot-index table mapping plaintext slot `j` to its position in the
/// plaintext NTT domain.
///
/// This is a pure function of the ring degree, built once per degree from the
/// powers of a fixed generator modulo 2N through bit-reversal, then shared
/// read-only by every encoder and protocol instance for that degree.
pub(crate) fn slot_index_map(degree: usize) -> Arc<[usize]> {
    debug_assert!(degree.is_power_of_two() && degree >= 8);
    let maps = INDEX_MAPS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = maps.lock().expect("slot index map cache lock");
    guard
        .entry(degree)
        .or_insert_with(|| build_index_map(degree))
        .clone()
}

fn build_index_map(degree: usize) -> Arc<[usize]> {
    let row_size = degree >> 1;
    let m = degree << 1;
    let gen: usize = 3;
    let mut pos = 1;
    let mut map = vec![0usize; degree];
    for i in 0..row_size {
        let index1 = (pos - 1) >> 1;
        let index2 = (m - pos - 1) >> 1;
        map[i] = index1.reverse_bits() >> (degree.leading_zeros() + 1);
        map[row_size | i] = index2.reverse_bits() >> (degree.leading_zeros() + 1);
        pos *= gen;
        pos &= m - 1;
    }
    map.into()
}

#[cfg(test)]
mod tests {
    use super::slot_index_map;

    #[test]
    fn index_map_is_a_permutation() {
        for degree in [8usize, 16, 32, 64] {
            let map = slot_index_map(degree);
            assert_eq!(map.len(), degree);
            let mut seen = vec![false; degree];
            for i in map.iter() {
                assert!(*i < degree);
                assert!(!seen[*i]);
                seen[*i] = true;
            }
        }
    }

    #[test]
    fn index_map_is_memoized() {
        let a = slot_index_map(16);
        let b = slot_index_map(16);
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }
}
