/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trait for pluggable persistence of decided messages.
//!
//! Library users provide a raw key-value interface ([`get`](Storage::get) and [`set`](Storage::set)),
//! and qbft_rs provides typed methods on top of it through the trait's default methods.
//!
//! ## Keys
//!
//! The highest decided message of each duty is stored under
//! `concat(HIGHEST_DECIDED, msg_id.bytes())` as the borsh encoding of a
//! [`SignedMessage`].

use std::fmt::{self, Display, Formatter};

use crate::{
    messages::{DecodeError, SignedMessage},
    types::message_id::MessageId,
};

/// Prefix of the keys that hold highest decided messages.
pub const HIGHEST_DECIDED: [u8; 1] = [0];

pub trait Storage {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StorageError>;

    /* ↓↓↓ Highest decided ↓↓↓ */

    /// Get the decided message with the highest height stored for `msg_id`, if any.
    fn highest_decided(&self, msg_id: &MessageId) -> Result<Option<SignedMessage>, StorageError> {
        if let Some(bytes) = self.get(&concat(&HIGHEST_DECIDED, msg_id.bytes())) {
            Ok(Some(SignedMessage::decode(&bytes).map_err(|err| {
                StorageError::DeserializeValueError {
                    msg_id: *msg_id,
                    source: err,
                }
            })?))
        } else {
            Ok(None)
        }
    }

    /// Store `decided` as the highest decided message of `msg_id`, unless a decided message with a
    /// higher height is already stored. A decided message with the same height replaces the stored one.
    fn save_highest_decided(
        &mut self,
        msg_id: &MessageId,
        decided: &SignedMessage,
    ) -> Result<(), StorageError> {
        if let Some(stored) = self.highest_decided(msg_id)? {
            if stored.message.height > decided.message.height {
                return Ok(());
            }
        }

        self.set(&concat(&HIGHEST_DECIDED, msg_id.bytes()), decided.encode())
    }
}

/// Takes references to two byteslices and returns a vector containing the bytes of the first one, and
/// then the bytes of the second one.
pub(crate) fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}

#[derive(Debug)]
pub enum StorageError {
    DeserializeValueError {
        msg_id: MessageId,
        source: DecodeError,
    },
    WriteError {
        reason: String,
    },
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::DeserializeValueError { msg_id, source } => {
                write!(f, "stored decided message for {:?} is corrupt: {}", msg_id, source)
            }
            StorageError::WriteError { reason } => write!(f, "failed to write: {}", reason),
        }
    }
}

impl std::error::Error for StorageError {}
