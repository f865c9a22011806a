//! Gadget-decomposed ciphertexts, the storage format of evaluation keys.

use crate::rlwe::RlweParameters;
use crate::{Error, ParametersError, Result};
use mphe_math::{
    rq::{Context, Representation},
    rqp::PolyQP,
};
use mphe_traits::{BinarySize, ByteReader, ByteWriter, Decode, Encode, SerialError};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::ops::Range;
use std::sync::Arc;

use super::SecretKey;

/// A gadget ciphertext: a jagged table of RLWE samples, one row per RNS
/// digit and one column per base-2 digit within that digit.
///
/// The table is stored as an arena: the per-row column counts and
/// precomputed row offsets index a single flat buffer of polynomials, with
/// `degree + 1` polynomials per cell. A `degree = 0` table stores only the
/// masked secret component `-a s + w P s' + e`; `degree = 1` also stores
/// the public randomness `a`.
///
/// The table is allocated once for a fixed shape and never resized; a
/// different shape requires a new instance.
#[derive(Debug, Clone, PartialEq)]
pub struct GadgetCiphertext {
    pub(crate) par: Arc<RlweParameters>,
    degree: usize,
    base_two_decomposition: usize,
    level_q: usize,
    level_p: Option<usize>,
    cols: Box<[usize]>,
    // offsets[i] is the first cell of row i; offsets[rows] is the cell count.
    offsets: Box<[usize]>,
    polys: Vec<PolyQP>,
}

impl GadgetCiphertext {
    /// Allocates a zero-valued gadget ciphertext for the given shape.
    ///
    /// Fails when the degree is not 0 or 1, or when a level exceeds the
    /// configured chains.
    pub fn new(
        par: &Arc<RlweParameters>,
        degree: usize,
        level_q: usize,
        level_p: Option<usize>,
        base_two_decomposition: usize,
    ) -> Result<Self> {
        if degree > 1 {
            return Err(Error::DefaultError(format!(
                "gadget ciphertext degree must be 0 or 1, got {degree}"
            )));
        }
        let cols = Self::shape(par, level_q, level_p, base_two_decomposition)?;

        let mut offsets = Vec::with_capacity(cols.len() + 1);
        let mut total = 0usize;
        for c in cols.iter() {
            offsets.push(total);
            total += c;
        }
        offsets.push(total);

        let ctx_q = par.ctx_at_level(level_q)?;
        let ctx_p = match level_p {
            Some(lp) => Some(par.ctx_p_at_level(lp)?),
            None => None,
        };
        let polys = (0..total * (degree + 1))
            .map(|_| PolyQP::zero(ctx_q, ctx_p, Representation::Ntt))
            .collect();

        Ok(Self {
            par: par.clone(),
            degree,
            base_two_decomposition,
            level_q,
            level_p,
            cols: cols.into_boxed_slice(),
            offsets: offsets.into_boxed_slice(),
            polys,
        })
    }

    /// Computes the per-row base-2 digit counts for a shape.
    fn shape(
        par: &Arc<RlweParameters>,
        level_q: usize,
        level_p: Option<usize>,
        base_two_decomposition: usize,
    ) -> Result<Vec<usize>> {
        if level_q > par.max_level() {
            return Err(Error::ParametersError(ParametersError::InvalidLevel(
                level_q,
                par.max_level(),
            )));
        }
        if let Some(lp) = level_p {
            match par.max_level_p() {
                Some(max) if lp <= max => {}
                _ => {
                    return Err(Error::ParametersError(ParametersError::InvalidLevel(
                        lp,
                        par.max_level_p().map_or(0, |m| m),
                    )))
                }
            }
        }

        let rows = match level_p {
            Some(lp) => (level_q + 1).div_ceil(lp + 1),
            None => level_q + 1,
        };

        let mut cols = Vec::with_capacity(rows);
        for i in 0..rows {
            if base_two_decomposition == 0 {
                cols.push(1);
            } else {
                let max_bits = Self::row_block(i, level_q, level_p)
                    .map(|u| 64 - par.moduli()[u].leading_zeros() as usize)
                    .max()
                    .expect("a digit covers at least one modulus");
                cols.push(max_bits.div_ceil(base_two_decomposition));
            }
        }
        Ok(cols)
    }

    /// The range of Q moduli covered by RNS digit `i`.
    fn row_block(i: usize, level_q: usize, level_p: Option<usize>) -> Range<usize> {
        match level_p {
            Some(lp) => {
                let width = lp + 1;
                i * width..usize::min((i + 1) * width, level_q + 1)
            }
            None => i..i + 1,
        }
    }

    /// The degree of the RLWE samples in the table (0 or 1).
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// The base-2 decomposition (0 when disabled).
    pub fn base_two_decomposition(&self) -> usize {
        self.base_two_decomposition
    }

    /// The level of the Q chain.
    pub fn level_q(&self) -> usize {
        self.level_q
    }

    /// The level of the P chain, or `None` when the samples carry no P part.
    pub fn level_p(&self) -> Option<usize> {
        self.level_p
    }

    /// The number of RNS digits (rows of the table).
    pub fn rns_digit_count(&self) -> usize {
        self.cols.len()
    }

    /// The number of base-2 digits of each RNS digit (columns per row).
    pub fn base_two_digit_counts(&self) -> &[usize] {
        &self.cols
    }

    pub(crate) fn cell(&self, i: usize, j: usize, k: usize) -> &PolyQP {
        debug_assert!(j < self.cols[i] && k <= self.degree);
        &self.polys[(self.offsets[i] + j) * (self.degree + 1) + k]
    }

    pub(crate) fn cell_mut(&mut self, i: usize, j: usize, k: usize) -> &mut PolyQP {
        debug_assert!(j < self.cols[i] && k <= self.degree);
        &mut self.polys[(self.offsets[i] + j) * (self.degree + 1) + k]
    }

    /// Fills the table with RLWE samples hiding `w P s_in` under `sk`, where
    /// `s_in` is provided as an NTT polynomial over the table's chains.
    ///
    /// When `seed` is provided, the public randomness `a` of every cell is
    /// drawn from the keyed generator derived from it, in row-major digit
    /// order; this is the draw sequence replayed by the expansion of a
    /// compressed key. Errors are always drawn from `rng`.
    pub(crate) fn encrypt_secret<R: RngCore + CryptoRng>(
        &mut self,
        sk: &SecretKey,
        s_in: &PolyQP,
        seed: Option<[u8; 32]>,
        rng: &mut R,
    ) -> Result<()> {
        debug_assert_eq!(s_in.representation(), &Representation::Ntt);
        debug_assert_eq!(s_in.level_q(), self.level_q);

        let par = self.par.clone();
        let ctx_q: Arc<Context> = par.ctx_at_level(self.level_q)?.clone();
        let ctx_p: Option<Arc<Context>> = match self.level_p {
            Some(lp) => Some(par.ctx_p_at_level(lp)?.clone()),
            None => None,
        };

        let s_out = sk.poly_qp(self.level_q, self.level_p)?;

        // P mod q_u for the selected switching moduli (1 when P is absent).
        let p_mod_q: Vec<u64> = match ctx_p.as_ref() {
            Some(ctx) => {
                let p_big = ctx.modulus();
                ctx_q
                    .moduli_operators()
                    .iter()
                    .map(|qu| {
                        (p_big % BigUint::from(qu.modulus()))
                            .to_u64()
                            .expect("a residue modulo a u64 fits in a u64")
                    })
                    .collect()
            }
            None => vec![1; ctx_q.moduli().len()],
        };

        // The single-consumption keyed stream for the public randomness.
        let mut keyed = seed.map(ChaCha8Rng::from_seed);

        for i in 0..self.cols.len() {
            for j in 0..self.cols[i] {
                let a = match keyed.as_mut() {
                    Some(prng) => {
                        PolyQP::random(&ctx_q, ctx_p.as_ref(), Representation::Ntt, prng)
                    }
                    None => PolyQP::random(&ctx_q, ctx_p.as_ref(), Representation::Ntt, rng),
                };
                let e = PolyQP::gaussian(
                    &ctx_q,
                    ctx_p.as_ref(),
                    par.sigma(),
                    Representation::Ntt,
                    rng,
                )
                .map_err(Error::MathError)?;

                let mut c0 = e;
                c0 -= &(&a * s_out.as_ref());

                // Add w P s_in on the Q rows of digit i, with
                // w = 2^(j * base_two_decomposition).
                let shift = (j * self.base_two_decomposition) as u64;
                let s_in_q = s_in.q.coefficients();
                let mut c0_q = c0.q.coefficients_mut();
                for u in Self::row_block(i, self.level_q, self.level_p) {
                    let qu = &ctx_q.moduli_operators()[u];
                    let factor = qu.mul(p_mod_q[u], qu.pow(2, shift));
                    for x in 0..ctx_q.degree() {
                        c0_q[[u, x]] = qu.add(c0_q[[u, x]], qu.mul(factor, s_in_q[[u, x]]));
                    }
                }
                drop(c0_q);

                *self.cell_mut(i, j, 0) = c0;
                if self.degree == 1 {
                    *self.cell_mut(i, j, 1) = a;
                }
            }
        }
        Ok(())
    }
}

impl BinarySize for GadgetCiphertext {
    fn binary_size(&self) -> usize {
        // base2, degree, level_q, level_p + 1, row count
        let mut size = 5 * 8;
        let cell_size: usize = (self.degree + 1) * self.polys[0].binary_size();
        for c in self.cols.iter() {
            // column count, then one length-prefixed degree vector per cell
            size += 8 + c * (8 + cell_size);
        }
        size
    }
}

impl Encode for GadgetCiphertext {
    fn encode_into(&self, buf: &mut [u8]) -> std::result::Result<usize, SerialError> {
        let mut w = ByteWriter::new(buf);
        w.write_u64(
            self.base_two_decomposition as u64,
            "GadgetCiphertext.base_two_decomposition",
        )?;
        w.write_u64(self.degree as u64, "GadgetCiphertext.degree")?;
        w.write_u64(self.level_q as u64, "GadgetCiphertext.level_q")?;
        w.write_u64(
            self.level_p.map_or(0, |lp| lp as u64 + 1),
            "GadgetCiphertext.level_p",
        )?;
        w.write_u64(self.cols.len() as u64, "GadgetCiphertext.rows")?;
        let mut n = w.written();

        for i in 0..self.cols.len() {
            let mut w = ByteWriter::new(&mut buf[n..]);
            w.write_u64(self.cols[i] as u64, "GadgetCiphertext.columns")?;
            n += w.written();
            for j in 0..self.cols[i] {
                let mut w = ByteWriter::new(&mut buf[n..]);
                w.write_u64((self.degree + 1) as u64, "GadgetCiphertext.cell")?;
                n += w.written();
                for k in 0..=self.degree {
                    n += self.cell(i, j, k).encode_into(&mut buf[n..])?;
                }
            }
        }
        Ok(n)
    }
}

impl Decode for GadgetCiphertext {
    fn decode_from(&mut self, buf: &[u8]) -> std::result::Result<usize, SerialError> {
        let mut r = ByteReader::new(buf);
        let base2 = r.read_u64("GadgetCiphertext.base_two_decomposition")? as usize;
        let degree = r.read_u64("GadgetCiphertext.degree")? as usize;
        let level_q = r.read_u64("GadgetCiphertext.level_q")? as usize;
        let level_p = match r.read_u64("GadgetCiphertext.level_p")? {
            0 => None,
            lp => Some(lp as usize - 1),
        };
        let rows = r.read_u64("GadgetCiphertext.rows")? as usize;

        // Reallocate only when the encoded shape differs from the current one.
        if base2 != self.base_two_decomposition
            || degree != self.degree
            || level_q != self.level_q
            || level_p != self.level_p
        {
            *self = GadgetCiphertext::new(&self.par, degree, level_q, level_p, base2).map_err(
                |e| SerialError::Malformed {
                    context: "GadgetCiphertext.header",
                    consumed: r.consumed(),
                    reason: e.to_string(),
                },
            )?;
        }
        if rows != self.cols.len() {
            return Err(SerialError::Malformed {
                context: "GadgetCiphertext.rows",
                consumed: r.consumed(),
                reason: format!("expected {} rows, got {rows}", self.cols.len()),
            });
        }
        let mut n = r.consumed();

        for i in 0..self.cols.len() {
            let mut r = ByteReader::new(&buf[n..]);
            let cols = r.read_u64("GadgetCiphertext.columns")? as usize;
            n += r.consumed();
            if cols != self.cols[i] {
                return Err(SerialError::Malformed {
                    context: "GadgetCiphertext.columns",
                    consumed: n,
                    reason: format!("expected {} columns in row {i}, got {cols}", self.cols[i]),
                });
            }
            for j in 0..self.cols[i] {
                let mut r = ByteReader::new(&buf[n..]);
                let len = r.read_u64("GadgetCiphertext.cell")? as usize;
                n += r.consumed();
                if len != self.degree + 1 {
                    return Err(SerialError::Malformed {
                        context: "GadgetCiphertext.cell",
                        consumed: n,
                        reason: format!("expected {} polynomials, got {len}", self.degree + 1),
                    });
                }
                for k in 0..=self.degree {
                    n += self.cell_mut(i, j, k).decode_from(&buf[n..])?;
                }
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::GadgetCiphertext;
    use crate::rlwe::{RlweParameters, SecretKey};
    use crate::Error;
    use mphe_math::rqp::PolyQP;
    use mphe_traits::{BinarySize, Decode, Encode};
    use rand::thread_rng;

    #[test]
    fn shape_is_jagged_per_digit() {
        let par = RlweParameters::default_arc(3, 16);
        // Without P, one RNS digit per modulus.
        let gct = GadgetCiphertext::new(&par, 1, 2, None, 20).unwrap();
        assert_eq!(gct.rns_digit_count(), 3);
        // 62-bit moduli split into ceil(62/20) = 4 base-2 digits.
        assert_eq!(gct.base_two_digit_counts(), &[4, 4, 4]);

        let par = RlweParameters::default_arc_with_auxiliary(3, 2, 16);
        let gct = GadgetCiphertext::new(&par, 1, 2, Some(1), 0).unwrap();
        // ceil(3 / 2) = 2 digits: one covering two moduli, one covering one.
        assert_eq!(gct.rns_digit_count(), 2);
        assert_eq!(gct.base_two_digit_counts(), &[1, 1]);
        assert_eq!(gct.level_p(), Some(1));
    }

    #[test]
    fn constructor_rejects_invalid_shapes() {
        let par = RlweParameters::default_arc(2, 16);
        assert!(matches!(
            GadgetCiphertext::new(&par, 2, 1, None, 0),
            Err(Error::DefaultError(_))
        ));
        assert!(matches!(
            GadgetCiphertext::new(&par, 1, 2, None, 0),
            Err(Error::ParametersError(_))
        ));
        // No P chain configured.
        assert!(matches!(
            GadgetCiphertext::new(&par, 1, 1, Some(0), 0),
            Err(Error::ParametersError(_))
        ));
    }

    #[test]
    fn serialization_round_trip() {
        let mut rng = thread_rng();
        for par in [
            RlweParameters::default_arc(2, 16),
            RlweParameters::default_arc_with_auxiliary(3, 1, 16),
        ] {
            for degree in [0usize, 1] {
                for base2 in [0usize, 16] {
                    for level_q in 0..=par.max_level() {
                        let level_p = par.max_level_p();
                        let mut gct =
                            GadgetCiphertext::new(&par, degree, level_q, level_p, base2)
                                .unwrap();
                        let sk = SecretKey::random(&par, &mut rng);
                        let s_in = sk.poly_qp(level_q, level_p).unwrap();
                        gct.encrypt_secret(&sk, s_in.as_ref(), None, &mut rng).unwrap();

                        let bytes = gct.to_bytes();
                        assert_eq!(bytes.len(), gct.binary_size());

                        let mut decoded =
                            GadgetCiphertext::new(&par, degree, level_q, level_p, base2)
                                .unwrap();
                        let consumed = decoded.decode_from(&bytes).unwrap();
                        assert_eq!(consumed, bytes.len());
                        assert_eq!(gct, decoded);
                    }
                }
            }
        }
    }

    #[test]
    fn decoding_reallocates_on_shape_mismatch() {
        let mut rng = thread_rng();
        let par = RlweParameters::default_arc(2, 16);
        let mut gct = GadgetCiphertext::new(&par, 1, 1, None, 16).unwrap();
        let sk = SecretKey::random(&par, &mut rng);
        let s_in: PolyQP = sk.poly_qp(1, None).unwrap().as_ref().clone();
        gct.encrypt_secret(&sk, &s_in, None, &mut rng).unwrap();

        let bytes = gct.to_bytes();
        // Start from a differently shaped instance.
        let mut decoded = GadgetCiphertext::new(&par, 0, 0, None, 0).unwrap();
        decoded.decode_from(&bytes).unwrap();
        assert_eq!(gct, decoded);
    }

    #[test]
    fn truncated_input_is_rejected_with_context() {
        let mut rng = thread_rng();
        let par = RlweParameters::default_arc(1, 16);
        let mut gct = GadgetCiphertext::new(&par, 1, 0, None, 0).unwrap();
        let sk = SecretKey::random(&par, &mut rng);
        let s_in = sk.poly_qp(0, None).unwrap();
        gct.encrypt_secret(&sk, s_in.as_ref(), None, &mut rng).unwrap();

        let bytes = gct.to_bytes();
        let mut decoded = GadgetCiphertext::new(&par, 1, 0, None, 0).unwrap();
        let err = decoded.decode_from(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }
}
