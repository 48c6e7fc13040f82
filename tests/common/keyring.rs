//! A deterministic stand-in for an aggregate signature scheme.
//!
//! The signature share of an operator over a root is three SHA256 hashes of its public key, the root,
//! and a counter. Aggregation XORs shares together, so an aggregate verifies against a set of signers
//! iff it equals the XOR of their shares. This is not secure, but has the algebraic properties the
//! protocol relies on.

use qbft_rs::types::{
    committee::Operator,
    crypto_primitives::{CryptoHasher, Digest, SignatureError, SignatureScheme},
    data_types::{CryptoHash, OperatorId, PublicKeyBytes, SignatureBytes, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH},
};

/// The public key of the operator with id `id`.
pub(crate) fn public_key(id: OperatorId) -> PublicKeyBytes {
    let mut bytes = [0xA5; PUBLIC_KEY_LENGTH];
    bytes[..8].copy_from_slice(&id.int().to_le_bytes());
    PublicKeyBytes::new(bytes)
}

#[derive(Clone)]
pub(crate) struct TestSigner {
    public_key: PublicKeyBytes,
}

impl TestSigner {
    pub(crate) fn new(id: OperatorId) -> TestSigner {
        TestSigner {
            public_key: public_key(id),
        }
    }
}

fn share(public_key: &PublicKeyBytes, root: &CryptoHash) -> [u8; SIGNATURE_LENGTH] {
    let mut share = [0u8; SIGNATURE_LENGTH];
    for (counter, chunk) in share.chunks_mut(32).enumerate() {
        let mut hasher = CryptoHasher::new();
        hasher.update(public_key.bytes());
        hasher.update(root.bytes());
        hasher.update([counter as u8]);
        chunk.copy_from_slice(&hasher.finalize());
    }
    share
}

fn xor_into(acc: &mut [u8; SIGNATURE_LENGTH], bytes: &[u8]) {
    for (a, b) in acc.iter_mut().zip(bytes) {
        *a ^= b;
    }
}

impl SignatureScheme for TestSigner {
    fn sign(&self, root: &CryptoHash) -> SignatureBytes {
        SignatureBytes::new(share(&self.public_key, root).to_vec())
    }

    fn verify(
        &self,
        root: &CryptoHash,
        signature: &SignatureBytes,
        signers: &[&Operator],
    ) -> Result<(), SignatureError> {
        if signature.len() != SIGNATURE_LENGTH {
            return Err(SignatureError::Malformed);
        }
        if signers.is_empty() {
            return Err(SignatureError::Invalid);
        }

        let mut expected = [0u8; SIGNATURE_LENGTH];
        for signer in signers {
            xor_into(&mut expected, &share(&signer.public_key, root));
        }

        if expected.as_slice() == signature.bytes() {
            Ok(())
        } else {
            Err(SignatureError::Invalid)
        }
    }

    fn aggregate(&self, signatures: &[&SignatureBytes]) -> Result<SignatureBytes, SignatureError> {
        if signatures.is_empty() {
            return Err(SignatureError::Aggregation {
                reason: String::from("nothing to aggregate"),
            });
        }

        let mut aggregate = [0u8; SIGNATURE_LENGTH];
        for signature in signatures {
            if signature.len() != SIGNATURE_LENGTH {
                return Err(SignatureError::Malformed);
            }
            xor_into(&mut aggregate, signature.bytes());
        }
        Ok(SignatureBytes::new(aggregate.to_vec()))
    }
}
