#![crate_name = "mphe_traits"]
#![crate_type = "lib"]
#![warn(missing_docs, unused_imports)]

//! Traits and serialization contracts used throughout the mphe ecosystem.

mod serialize;

pub use serialize::{BinarySize, ByteReader, ByteWriter, Decode, Encode, SerialError};

use rand::{CryptoRng, RngCore};
use std::sync::Arc;

/// Marker trait for the parameters of a homomorphic encryption scheme.
pub trait FheParameters {}

/// Indicates that an object is parametrized by a set of scheme parameters.
pub trait FheParametrized {
    /// The type of the scheme parameters.
    type Parameters: FheParameters;
}

/// Encode a value into a plaintext.
pub trait FheEncoder<V>: Sized + FheParametrized {
    /// The error type returned on invalid encodings.
    type Error;

    /// The encoding specification.
    type Encoding;

    /// Attempt to encode `value` with the given `encoding`.
    fn try_encode(
        value: V,
        encoding: Self::Encoding,
        par: &Arc<Self::Parameters>,
    ) -> Result<Self, Self::Error>;
}

/// Decode a plaintext back into a value.
pub trait FheDecoder<Pt>: Sized {
    /// The error type returned on invalid decodings.
    type Error;

    /// The encoding specification.
    type Encoding;

    /// Attempt to decode `pt`, optionally overriding its encoding.
    fn try_decode(pt: &Pt, encoding: Self::Encoding) -> Result<Self, Self::Error>;
}

/// Encrypt a plaintext into a ciphertext.
pub trait FheEncrypter<Pt, Ct>: FheParametrized {
    /// The error type returned on failed encryptions.
    type Error;

    /// Attempt to encrypt `pt`.
    fn try_encrypt<R: RngCore + CryptoRng>(
        &self,
        pt: &Pt,
        rng: &mut R,
    ) -> Result<Ct, Self::Error>;
}

/// Decrypt a ciphertext into a plaintext.
pub trait FheDecrypter<Pt, Ct>: FheParametrized {
    /// The error type returned on failed decryptions.
    type Error;

    /// Attempt to decrypt `ct`.
    fn try_decrypt(&self, ct: &Ct) -> Result<Pt, Self::Error>;
}
