#![crate_name = "mphe_math"]
#![crate_type = "lib"]
#![warn(missing_docs, unused_imports)]

//! Mathematical layer of the mphe library: modular arithmetic, number
//! theoretic transforms, RNS utilities, and polynomial rings over one or two
//! residue chains.

pub mod ntt;
pub mod rns;
pub mod rq;
pub mod rqp;
pub mod zq;

use thiserror::Error;

/// The errors of the mathematical layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Generic error.
    #[error("{0}")]
    Default(String),

    /// The polynomial contexts do not match.
    #[error("invalid context")]
    InvalidContext,

    /// The modulus cannot be used.
    #[error("invalid modulus: {0}")]
    InvalidModulus(u64),

    /// The polynomial degree cannot be used.
    #[error("invalid degree: {0}")]
    InvalidDegree(usize),

    /// The polynomial is in the wrong representation for the operation.
    #[error("incorrect representation: got {0:?}, expected {1:?}")]
    IncorrectRepresentation(rq::Representation, rq::Representation),
}

/// Convenience alias over the crate error.
pub type Result<T> = std::result::Result<T, Error>;
