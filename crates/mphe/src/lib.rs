#![crate_name = "mphe"]
#![crate_type = "lib"]
#![warn(missing_docs, unused_imports)]

//! RLWE key material and multiparty protocols.
//!
//! This crate implements the evaluation-key layer of an RNS-flavoured RLWE
//! scheme (gadget ciphertexts, relinearization and Galois keys, key sets)
//! together with two threshold protocols: collective public-key generation
//! and collective refresh with plaintext slot permutation.

pub mod mrlwe;
pub mod rlwe;

use mphe_traits::SerialError;
use thiserror::Error;

/// The errors of this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration error raised at construction time; never recoverable
    /// by retrying with the same inputs.
    #[error("{0}")]
    ParametersError(#[from] ParametersError),

    /// An error in the mathematical layer.
    #[error("math error: {0}")]
    MathError(#[from] mphe_math::Error),

    /// An error during binary encoding or decoding.
    #[error("serialization error: {0}")]
    SerializationError(#[from] SerialError),

    /// The evaluation key is not compressed.
    #[error("evaluation key is not compressed")]
    NotCompressed,

    /// The compressed evaluation key has no seed.
    #[error("seed is missing")]
    SeedMissing,

    /// A caller-supplied expansion buffer has the wrong shape. Reported per
    /// mismatching field.
    #[error("invalid buffer {field}: should be {expected} but is {found}")]
    BufferMismatch {
        /// The mismatching field.
        field: &'static str,
        /// The value the buffer should have.
        expected: String,
        /// The value the buffer has.
        found: String,
    },

    /// No Galois key is available for the requested element.
    #[error("galois key for element {0} is absent")]
    GaloisKeyNotFound(u64),

    /// No relinearization key is available.
    #[error("relinearization key is absent")]
    RelinearizationKeyAbsent,

    /// Too few values were provided.
    #[error("{0} values provided, expected at least {1}")]
    TooFewValues(usize, usize),

    /// Too many values were provided.
    #[error("{0} values provided, expected at most {1}")]
    TooManyValues(usize, usize),

    /// Generic error.
    #[error("{0}")]
    DefaultError(String),
}

/// Separate enum for configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParametersError {
    /// The degree is invalid.
    #[error("invalid degree: {0}")]
    InvalidDegree(usize),

    /// The plaintext modulus is invalid.
    #[error("invalid plaintext modulus: {0}")]
    InvalidPlaintext(String),

    /// The modulus size is invalid.
    #[error("invalid modulus size: {0}, expected an integer between {1} and {2}")]
    InvalidModulusSize(usize, usize, usize),

    /// Not enough primes could be generated.
    #[error("not enough primes of size {0} for degree {1}")]
    NotEnoughPrimes(usize, usize),

    /// A level is out of range.
    #[error("invalid level: {0}, maximum is {1}")]
    InvalidLevel(usize, usize),

    /// A noise distribution parameter is out of range.
    #[error("invalid distribution parameter: {0}")]
    InvalidDistribution(String),

    /// Too many parameters were specified.
    #[error("{0}")]
    TooManySpecified(String),

    /// Too few parameters were specified.
    #[error("{0}")]
    TooFewSpecified(String),
}

/// Convenience alias over the crate error.
pub type Result<T> = std::result::Result<T, Error>;
