//! Ciphertext type in the RLWE scheme layer.

use crate::rlwe::RlweParameters;
use crate::{Error, Result};
use mphe_math::rq::{Poly, Representation};
use mphe_traits::FheParametrized;
use std::sync::Arc;

/// A ciphertext encrypting a plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    /// The parameters of the scheme.
    pub(crate) par: Arc<RlweParameters>,

    /// The ciphertext elements, in NTT representation.
    pub c: Vec<Poly>,

    /// The ciphertext level.
    pub(crate) level: usize,
}

impl FheParametrized for Ciphertext {
    type Parameters = RlweParameters;
}

impl Ciphertext {
    /// Create a ciphertext from a vector of polynomials.
    ///
    /// A ciphertext must contain at least two polynomials, all in NTT
    /// representation and with the same context.
    pub fn new(c: Vec<Poly>, par: &Arc<RlweParameters>) -> Result<Self> {
        if c.len() < 2 {
            return Err(Error::TooFewValues(c.len(), 2));
        }

        let ctx = c[0].ctx();
        let level = par.level_of_ctx(ctx)?;

        for ci in c.iter() {
            if ci.representation() != &Representation::Ntt {
                return Err(Error::MathError(mphe_math::Error::IncorrectRepresentation(
                    ci.representation().clone(),
                    Representation::Ntt,
                )));
            }
            if ci.ctx() != ctx {
                return Err(Error::MathError(mphe_math::Error::InvalidContext));
            }
        }

        Ok(Self {
            par: par.clone(),
            c,
            level,
        })
    }

    /// The level of the ciphertext.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Get the i-th polynomial of the ciphertext.
    pub fn get(&self, i: usize) -> Option<&Poly> {
        self.c.get(i)
    }
}

#[cfg(test)]
mod tests {
    use super::Ciphertext;
    use crate::rlwe::RlweParameters;
    use mphe_math::rq::{Poly, Representation};
    use rand::thread_rng;

    #[test]
    fn constructor_checks_shape() {
        let mut rng = thread_rng();
        let par = RlweParameters::default_arc(2, 16);
        let ctx = par.ctx_at_level(par.max_level()).unwrap();

        let c0 = Poly::random(ctx, Representation::Ntt, &mut rng);
        let c1 = Poly::random(ctx, Representation::Ntt, &mut rng);
        let ct = Ciphertext::new(vec![c0.clone(), c1.clone()], &par).unwrap();
        assert_eq!(ct.level(), par.max_level());
        assert_eq!(ct.get(0), Some(&c0));
        assert_eq!(ct.get(2), None);

        // Too few polynomials.
        assert!(Ciphertext::new(vec![c0.clone()], &par).is_err());

        // Wrong representation.
        let mut c0_pb = c0.clone();
        c0_pb.change_representation(Representation::PowerBasis);
        assert!(Ciphertext::new(vec![c0_pb, c1.clone()], &par).is_err());

        // Mismatched contexts.
        let ctx0 = par.ctx_at_level(0).unwrap();
        let d = Poly::random(ctx0, Representation::Ntt, &mut rng);
        assert!(Ciphertext::new(vec![c0, d], &par).is_err());
    }
}
