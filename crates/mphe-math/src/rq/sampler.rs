//! Samplers for the small-coefficient distributions used by the scheme.

use crate::{Error, Result};
use rand::{CryptoRng, RngCore};
use rand_distr::{Distribution, Normal};

/// Sample a vector of independent centered binomial values of the given
/// variance. Returns an error if the variance is not in [1, 16].
pub fn sample_vec_cbd<R: RngCore + CryptoRng>(
    size: usize,
    variance: usize,
    rng: &mut R,
) -> Result<Vec<i64>> {
    if !(1..=16).contains(&variance) {
        return Err(Error::Default(format!(
            "variance {variance} is out of [1, 16]"
        )));
    }

    // 2 * variance bits per half, so Var = 4 * variance * 1/4.
    let nbits = 2 * variance as u32;
    let mask = (1u64 << nbits) - 1;

    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        let r = rng.next_u64();
        let a = (r & mask).count_ones() as i64;
        let b = ((r >> 32) & mask).count_ones() as i64;
        out.push(a - b);
    }
    Ok(out)
}

/// Sample a vector of independent discrete Gaussian values of standard
/// deviation `sigma`, truncated by rejection at 6 sigma. Returns an error
/// when `sigma` is not a positive finite value.
pub fn sample_vec_gaussian<R: RngCore + CryptoRng>(
    size: usize,
    sigma: f64,
    rng: &mut R,
) -> Result<Vec<i64>> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(Error::Default(format!("invalid noise deviation {sigma}")));
    }

    let bound = (6.0 * sigma).ceil();
    let normal = Normal::new(0.0, sigma)
        .map_err(|e| Error::Default(format!("normal distribution: {e}")))?;

    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        let v = loop {
            let x = normal.sample(rng);
            if x.abs() <= bound {
                break x.round() as i64;
            }
        };
        out.push(v);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{sample_vec_cbd, sample_vec_gaussian};
    use rand::thread_rng;

    #[test]
    fn cbd_respects_bounds() {
        let mut rng = thread_rng();
        for variance in 1..=16 {
            let v = sample_vec_cbd(4096, variance, &mut rng).unwrap();
            assert_eq!(v.len(), 4096);
            assert!(v.iter().all(|x| x.unsigned_abs() <= 2 * variance as u64));
        }
        assert!(sample_vec_cbd(16, 0, &mut rng).is_err());
        assert!(sample_vec_cbd(16, 17, &mut rng).is_err());
    }

    #[test]
    fn cbd_is_roughly_centered() {
        let mut rng = thread_rng();
        let v = sample_vec_cbd(1 << 16, 10, &mut rng).unwrap();
        let mean = v.iter().sum::<i64>() as f64 / v.len() as f64;
        assert!(mean.abs() < 0.5);
    }

    #[test]
    fn gaussian_respects_truncation() {
        let mut rng = thread_rng();
        let sigma = 3.2;
        let v = sample_vec_gaussian(1 << 16, sigma, &mut rng).unwrap();
        let bound = (6.0 * sigma).ceil() as i64;
        assert!(v.iter().all(|x| x.abs() <= bound));

        let mean = v.iter().sum::<i64>() as f64 / v.len() as f64;
        assert!(mean.abs() < 0.5);

        assert!(sample_vec_gaussian(16, 0.0, &mut rng).is_err());
        assert!(sample_vec_gaussian(16, f64::NAN, &mut rng).is_err());
    }
}
