/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The definitions and re-exports in this module provide two categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: provided by the [`sha2`] crate.
//! 2. **Digital Signatures**: provided by the library user through the pluggable [`SignatureScheme`]
//!    trait, since QBFT needs an *aggregate* signature scheme (e.g., BLS) to produce decided messages.

use std::fmt::{self, Display, Formatter};

use super::{
    committee::Operator,
    data_types::{CryptoHash, SignatureBytes},
};

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

/// Signs, verifies and aggregates signatures over message roots.
///
/// # Required properties
///
/// 1. Every signature produced by [`sign`](Self::sign) or [`aggregate`](Self::aggregate) must be
///    exactly [`SIGNATURE_LENGTH`](super::data_types::SIGNATURE_LENGTH) bytes long.
/// 2. `verify(root, aggregate([sign_1(root), .., sign_k(root)]), [op_1, .., op_k])` must succeed, where
///    `sign_i` is `sign` as performed by the `SignatureScheme` of operator `op_i`.
/// 3. All three methods must be deterministic and must not perform I/O.
pub trait SignatureScheme {
    /// Sign `root` with the local operator's secret key.
    fn sign(&self, root: &CryptoHash) -> SignatureBytes;

    /// Verify that `signature` is the (aggregate) signature of exactly `signers` over `root`.
    fn verify(
        &self,
        root: &CryptoHash,
        signature: &SignatureBytes,
        signers: &[&Operator],
    ) -> Result<(), SignatureError>;

    /// Combine `signatures` into a single aggregate signature.
    fn aggregate(&self, signatures: &[&SignatureBytes]) -> Result<SignatureBytes, SignatureError>;
}

/// Error returned by a [`SignatureScheme`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The signature does not verify against the given root and signers.
    Invalid,

    /// The signature bytes could not be interpreted by the scheme.
    Malformed,

    /// The given signatures could not be aggregated.
    Aggregation { reason: String },
}

impl Display for SignatureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SignatureError::Invalid => write!(f, "signature does not verify"),
            SignatureError::Malformed => write!(f, "malformed signature bytes"),
            SignatureError::Aggregation { reason } => {
                write!(f, "failed to aggregate signatures: {}", reason)
            }
        }
    }
}

impl std::error::Error for SignatureError {}
