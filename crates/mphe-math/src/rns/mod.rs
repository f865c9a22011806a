//! Residue number system utilities built on the Chinese remainder theorem.

use crate::{zq::Modulus, Error, Result};
use num_bigint::BigUint;
use num_traits::ToPrimitive;

/// CRT context over a basis of pairwise distinct prime moduli.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RnsContext {
    moduli: Box<[u64]>,
    q: Box<[Modulus]>,
    product: BigUint,
    // q_star[i] = product / moduli[i], q_tilde[i] = q_star[i]^{-1} mod moduli[i]
    q_star: Box<[BigUint]>,
    q_tilde: Box<[u64]>,
}

impl RnsContext {
    /// Create an RNS context over the given moduli.
    ///
    /// Returns an error if the basis is empty or contains a repeated or
    /// invalid modulus.
    pub fn new(moduli: &[u64]) -> Result<Self> {
        if moduli.is_empty() {
            return Err(Error::Default("empty moduli basis".to_string()));
        }

        let mut q = Vec::with_capacity(moduli.len());
        let mut product = BigUint::from(1u64);
        for (i, modulus) in moduli.iter().enumerate() {
            if moduli[..i].contains(modulus) {
                return Err(Error::InvalidModulus(*modulus));
            }
            q.push(Modulus::new(*modulus)?);
            product *= *modulus;
        }

        let mut q_star = Vec::with_capacity(moduli.len());
        let mut q_tilde = Vec::with_capacity(moduli.len());
        for (qi, modulus) in q.iter().zip(moduli.iter()) {
            let star = &product / modulus;
            let star_mod_qi = biguint_mod_u64(&star, *modulus);
            let tilde = qi
                .inv(star_mod_qi)
                .ok_or_else(|| Error::InvalidModulus(*modulus))?;
            q_star.push(star);
            q_tilde.push(tilde);
        }

        Ok(Self {
            moduli: moduli.to_owned().into_boxed_slice(),
            q: q.into_boxed_slice(),
            product,
            q_star: q_star.into_boxed_slice(),
            q_tilde: q_tilde.into_boxed_slice(),
        })
    }

    /// The product of the moduli.
    pub fn modulus(&self) -> &BigUint {
        &self.product
    }

    /// The moduli of the basis.
    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    /// Lift RNS residues, one per modulus, to the unique representative in
    /// `[0, product)`.
    pub fn lift(&self, residues: &[u64]) -> BigUint {
        debug_assert_eq!(residues.len(), self.moduli.len());

        let mut acc = BigUint::from(0u64);
        for (i, ri) in residues.iter().enumerate() {
            acc += &self.q_star[i] * self.q[i].mul(self.q[i].reduce(*ri), self.q_tilde[i]);
        }
        acc % &self.product
    }
}

/// Reduce a `BigUint` modulo a word-sized value.
pub(crate) fn biguint_mod_u64(v: &BigUint, m: u64) -> u64 {
    (v % BigUint::from(m))
        .to_u64()
        .expect("a residue modulo a u64 fits in a u64")
}

#[cfg(test)]
mod tests {
    use super::RnsContext;
    use num_bigint::BigUint;

    #[test]
    fn lift_round_trip() {
        let moduli = [17u64, 97, 1153];
        let rns = RnsContext::new(&moduli).unwrap();
        assert_eq!(rns.modulus(), &BigUint::from(17u64 * 97 * 1153));

        for x in [0u64, 1, 42, 17 * 97, 17 * 97 * 1153 - 1] {
            let residues = moduli.map(|m| x % m);
            assert_eq!(rns.lift(&residues), BigUint::from(x));
        }
    }

    #[test]
    fn rejects_bad_bases() {
        assert!(RnsContext::new(&[]).is_err());
        assert!(RnsContext::new(&[17, 17]).is_err());
    }
}
