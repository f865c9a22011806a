use itertools::Itertools;
use num_bigint::BigUint;
use std::fmt::Debug;
use std::sync::Arc;

use crate::{ntt::NttOperator, rns::RnsContext, zq::Modulus, Error, Result};

/// Struct that holds the context associated with elements in rq.
#[derive(Clone, PartialEq, Eq)]
pub struct Context {
    /// List of prime moduli
    pub(crate) moduli: Box<[u64]>,
    /// Modulus operators for each prime
    pub(crate) q: Box<[Modulus]>,
    /// RNS context for CRT operations
    pub(crate) rns: Arc<RnsContext>,
    /// NTT operators for each prime
    pub(crate) ops: Box<[NttOperator]>,
    /// Polynomial degree (must be a power of 2)
    pub(crate) degree: usize,
}

impl Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("moduli", &self.moduli)
            .field("degree", &self.degree)
            .finish()
    }
}

impl Context {
    /// Creates a context from a list of moduli and a polynomial degree.
    ///
    /// Returns an error if the moduli are not primes less than 62 bits which
    /// support the NTT of size `degree`.
    pub fn new(moduli: &[u64], degree: usize) -> Result<Self> {
        if !degree.is_power_of_two() || degree < 8 {
            return Err(Error::InvalidDegree(degree));
        }

        let mut q = Vec::with_capacity(moduli.len());
        let mut ops = Vec::with_capacity(moduli.len());
        let rns = Arc::new(RnsContext::new(moduli)?);
        for modulus in moduli {
            let qi = Modulus::new(*modulus)?;
            match NttOperator::new(&qi, degree) {
                Some(op) => {
                    q.push(qi);
                    ops.push(op);
                }
                None => {
                    return Err(Error::Default(format!(
                        "modulus {modulus} does not support the NTT of size {degree}"
                    )))
                }
            }
        }

        Ok(Self {
            moduli: moduli.to_owned().into_boxed_slice(),
            q: q.into_boxed_slice(),
            rns,
            ops: ops.into_boxed_slice(),
            degree,
        })
    }

    /// Creates a context in an `Arc`.
    pub fn new_arc(moduli: &[u64], degree: usize) -> Result<Arc<Self>> {
        Self::new(moduli, degree).map(Arc::new)
    }

    /// Returns the modulus as a BigUint.
    pub fn modulus(&self) -> &BigUint {
        self.rns.modulus()
    }

    /// Returns a reference to the moduli in this context.
    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    /// Returns a reference to the moduli operators in this context.
    pub fn moduli_operators(&self) -> &[Modulus] {
        &self.q
    }

    /// Returns the RNS context.
    pub fn rns(&self) -> &Arc<RnsContext> {
        &self.rns
    }

    /// Returns the polynomial degree.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Returns the bit sizes of the moduli.
    pub fn moduli_sizes(&self) -> Vec<usize> {
        self.moduli
            .iter()
            .map(|m| 64 - m.leading_zeros() as usize)
            .collect_vec()
    }
}
