//! Key material for the RLWE scheme layer.

mod evaluation_key;
mod gadget_ciphertext;
mod galois_key;
mod key_set;
mod public_key;
mod secret_key;

pub use evaluation_key::{EvaluationKey, EvaluationKeyParameters, RelinearizationKey};
pub use gadget_ciphertext::GadgetCiphertext;
pub use galois_key::GaloisKey;
pub use key_set::{EvaluationKeySet, MemEvaluationKeySet};
pub use public_key::PublicKey;
pub use secret_key::SecretKey;
