//! Exact down-scaling of ring elements from the ciphertext modulus to the
//! plaintext modulus.

use super::{Context, Poly, Representation};
use crate::{rns::biguint_mod_u64, zq::Modulus, Error, Result};
use num_bigint::BigUint;
use std::sync::Arc;

/// Scales a polynomial over Q down to T, computing round(t * x / q) mod t
/// coefficient-wise with exact integer arithmetic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scaler {
    from: Arc<Context>,
    t: Modulus,
    q: BigUint,
    half_q: BigUint,
}

impl Scaler {
    /// Creates a scaler from the context of the input polynomials to the
    /// plaintext modulus `t`.
    pub fn new(from: &Arc<Context>, t: &Modulus) -> Self {
        let q = from.modulus().clone();
        let half_q = &q >> 1;
        Self {
            from: from.clone(),
            t: t.clone(),
            q,
            half_q,
        }
    }

    /// Scales `p`, which must be in power basis over the source context, and
    /// returns its coefficients modulo `t`.
    pub fn scale(&self, p: &Poly) -> Result<Vec<u64>> {
        if p.ctx() != &self.from {
            return Err(Error::InvalidContext);
        }
        if p.representation() != &Representation::PowerBasis {
            return Err(Error::IncorrectRepresentation(
                p.representation().clone(),
                Representation::PowerBasis,
            ));
        }

        let t = BigUint::from(self.t.modulus());
        let coefficients = p.coefficients();
        let mut out = Vec::with_capacity(self.from.degree());
        let mut residues = vec![0u64; self.from.moduli().len()];
        for j in 0..self.from.degree() {
            for (ri, row) in residues.iter_mut().zip(coefficients.outer_iter()) {
                *ri = row[j];
            }
            let x = self.from.rns().lift(&residues);
            let y = (&t * x + &self.half_q) / &self.q;
            out.push(self.t.reduce(biguint_mod_u64(&y, self.t.modulus())));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::Scaler;
    use crate::rq::{Context, Poly, Representation};
    use crate::zq::Modulus;
    use num_bigint::BigUint;
    use num_traits::ToPrimitive;
    use rand::thread_rng;

    #[test]
    fn scaling_matches_exact_rational_rounding() {
        let mut rng = thread_rng();
        let ctx = Context::new_arc(&[4611686018326724609, 4611686018309947393], 16).unwrap();
        let t = Modulus::new(1153).unwrap();
        let scaler = Scaler::new(&ctx, &t);

        for _ in 0..20 {
            let p = Poly::random(&ctx, Representation::PowerBasis, &mut rng);
            let scaled = scaler.scale(&p).unwrap();

            let q = ctx.modulus();
            let half_q = q >> 1;
            for (j, s) in scaled.iter().enumerate() {
                let mut residues = vec![];
                for row in p.coefficients().outer_iter() {
                    residues.push(row[j]);
                }
                let x = ctx.rns().lift(&residues);
                let expected: BigUint = ((BigUint::from(1153u64) * x + &half_q) / q)
                    % BigUint::from(1153u64);
                assert_eq!(*s, expected.to_u64().unwrap());
            }
        }
    }

    #[test]
    fn scaling_delta_times_message_recovers_message() {
        // round(t * (floor(q/t) * m + small) / q) = m mod t for small noise.
        let ctx = Context::new_arc(&[4611686018326724609], 16).unwrap();
        let t = Modulus::new(1153).unwrap();
        let scaler = Scaler::new(&ctx, &t);

        let q = 4611686018326724609u64;
        let delta = q / 1153;
        let m = 777u64;
        let noisy = delta * m + 12345;
        let p = Poly::try_convert_from_u64(
            &std::iter::once(noisy)
                .chain(std::iter::repeat(0).take(15))
                .collect::<Vec<_>>(),
            &ctx,
            Representation::PowerBasis,
        )
        .unwrap();
        let scaled = scaler.scale(&p).unwrap();
        assert_eq!(scaled[0], m);
        assert!(scaled[1..].iter().all(|c| *c == 0));
    }
}
