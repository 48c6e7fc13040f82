/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Identifiers that say which validator duty a consensus message belongs to.

use std::fmt::{self, Debug, Formatter};

use super::data_types::{PublicKeyBytes, PUBLIC_KEY_LENGTH};

/// Length in bytes of an encoded [`MessageId`].
pub const MESSAGE_ID_LENGTH: usize = PUBLIC_KEY_LENGTH + 4;

/// Duty that a committee runs consensus for. Each role of each validator gets its own
/// [`Controller`](crate::controller::Controller).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Attester,
    Aggregator,
    Proposer,
    SyncCommittee,
    SyncCommitteeContribution,
}

impl Role {
    /// Every role, in the order of their wire codes.
    pub const ALL: [Role; 5] = [
        Role::Attester,
        Role::Aggregator,
        Role::Proposer,
        Role::SyncCommittee,
        Role::SyncCommitteeContribution,
    ];

    /// Get the code this role is encoded as inside a [`MessageId`].
    pub const fn code(&self) -> u32 {
        match self {
            Role::Attester => 0,
            Role::Aggregator => 1,
            Role::Proposer => 2,
            Role::SyncCommittee => 3,
            Role::SyncCommitteeContribution => 4,
        }
    }

    /// Get the role encoded as `code`, if any.
    pub fn from_code(code: u32) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.code() == code)
    }
}

/// Identifier carried by every [`Message`](crate::messages::Message): the public key of the validator
/// whose duty is being agreed on, followed by the little-endian code of the [`Role`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId([u8; MESSAGE_ID_LENGTH]);

impl MessageId {
    /// Create the `MessageId` for `role` of the validator with public key `validator`.
    pub fn new(validator: &PublicKeyBytes, role: Role) -> Self {
        let mut bytes = [0u8; MESSAGE_ID_LENGTH];
        bytes[..PUBLIC_KEY_LENGTH].copy_from_slice(&validator.bytes());
        bytes[PUBLIC_KEY_LENGTH..].copy_from_slice(&role.code().to_le_bytes());
        Self(bytes)
    }

    /// Interpret `bytes` as a `MessageId`. Returns `None` if `bytes` has the wrong length.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; MESSAGE_ID_LENGTH] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Get the encoded bytes of this `MessageId`.
    pub const fn bytes(&self) -> &[u8; MESSAGE_ID_LENGTH] {
        &self.0
    }

    /// Get the encoded bytes of this `MessageId` as a `Vec`, as stored in a message.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Get the public key of the validator this `MessageId` belongs to.
    pub fn validator(&self) -> PublicKeyBytes {
        let mut bytes = [0u8; PUBLIC_KEY_LENGTH];
        bytes.copy_from_slice(&self.0[..PUBLIC_KEY_LENGTH]);
        PublicKeyBytes::new(bytes)
    }

    /// Get the role this `MessageId` is for. Returns `None` if the role code is unknown.
    pub fn role(&self) -> Option<Role> {
        let mut code = [0u8; 4];
        code.copy_from_slice(&self.0[PUBLIC_KEY_LENGTH..]);
        Role::from_code(u32::from_le_bytes(code))
    }
}

impl Debug for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({:?}.., {:?})", &self.0[..4], self.role())
    }
}
