/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes or integers, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::Add,
};

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::Digest;

use super::crypto_primitives::CryptoHasher;

/// Length in bytes of every signature that appears on the wire, aggregate or not.
pub const SIGNATURE_LENGTH: usize = 96;

/// Length in bytes of an operator's public key.
pub const PUBLIC_KEY_LENGTH: usize = 48;

pub const FIRST_HEIGHT: u64 = 0;

pub const FIRST_ROUND: u64 = 1;

/// Round number that marks a RoundChange sender as never prepared.
pub const NO_ROUND: u64 = 0;

/// Sequence number of a consensus instance.
///
/// Every height has exactly one instance, and so exactly one decided value. The first instance a
/// [`Controller`](crate::controller::Controller) starts runs at [`Height::first`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Height(u64);

impl Height {
    /// Create a new `Height` with an `int` inner value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the height of the first instance, which is 0.
    pub const fn first() -> Self {
        Self(FIRST_HEIGHT)
    }

    /// Get the inner `u64` value of this `Height`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for Height {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Saturates at `u64::MAX`.
impl Add<u64> for Height {
    type Output = Height;
    fn add(self, rhs: u64) -> Self::Output {
        Height::new(self.0.saturating_add(rhs))
    }
}

/// Attempt counter inside a single height.
///
/// Rounds start at [`Round::first`] (1). [`Round::none`] (0) is never a valid message round, and is
/// used inside [`RoundChangeData`](crate::messages::RoundChangeData) to say "never prepared".
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Round(u64);

impl Round {
    /// Create a new `Round` with an `int` inner value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the round every instance starts in, which is 1.
    pub const fn first() -> Self {
        Self(FIRST_ROUND)
    }

    /// Get the "no round" marker, which is 0.
    pub const fn none() -> Self {
        Self(NO_ROUND)
    }

    /// Get the inner `u64` value of this `Round`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Check whether this is the "no round" marker.
    pub const fn is_none(&self) -> bool {
        self.0 == NO_ROUND
    }
}

impl Display for Round {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Saturates at `u64::MAX`.
impl Add<u64> for Round {
    type Output = Round;
    fn add(self, rhs: u64) -> Self::Output {
        Round::new(self.0.saturating_add(rhs))
    }
}

/// Stable numeric identifier of a committee member. Operator ids start at 1.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct OperatorId(u64);

impl OperatorId {
    /// Create a new `OperatorId` with an `int` inner value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `OperatorId`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for OperatorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// 32-byte SHA256 hash.
///
/// Within qbft_rs, `CryptoHash`es are the "roots" of messages and values, and of controller state
/// snapshots.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Compute the SHA256 hash of `bytes`.
    pub fn digest(bytes: &[u8]) -> Self {
        let mut hasher = CryptoHasher::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Signature bytes as they appear on the wire.
///
/// The wire format does not fix the length of the inner vector, so that messages carrying a
/// signature of the wrong length decode successfully and are then rejected by
/// [validation](crate::messages::validation) instead. Well-formed signatures are exactly
/// [`SIGNATURE_LENGTH`] bytes long.
#[derive(Clone, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes(Vec<u8>);

impl SignatureBytes {
    /// Create a new `SignatureBytes` wrapping `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get a reference to the inner bytes of this `SignatureBytes`.
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the number of bytes in this signature.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether this signature contains no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureBytes({} bytes)", self.0.len())
    }
}

/// Public key of an operator, used by [`SignatureScheme`](super::crypto_primitives::SignatureScheme)
/// implementations to verify signatures.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKeyBytes([u8; PUBLIC_KEY_LENGTH]);

impl PublicKeyBytes {
    /// Create a new `PublicKeyBytes` wrapping `bytes`.
    pub const fn new(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the inner bytes of this `PublicKeyBytes`.
    pub const fn bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.0
    }
}

impl Debug for PublicKeyBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyBytes({:?}..)", &self.0[..4])
    }
}

/// Opaque payload that a committee agrees on.
///
/// Whether a `Value` is admissible is decided by the user's
/// [`ValueCheck`](crate::app::ValueCheck) implementation.
#[derive(Clone, Default, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Value(Vec<u8>);

impl Value {
    /// Create a new `Value` wrapping `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get a reference to the inner bytes of this `Value`.
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Check whether this `Value` contains no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the SHA256 hash of the bytes of this `Value`.
    ///
    /// Prepare and Commit messages are grouped by this root.
    pub fn root(&self) -> CryptoHash {
        CryptoHash::digest(&self.0)
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Value({:?})", self.0)
    }
}
