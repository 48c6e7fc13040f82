/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for structured messages that are sent between replicas, and their wire codec.
//!
//! ## Layers
//!
//! Every consensus message travels as a [`SignedMessage`], which wraps a [`Message`] with a signature
//! and the (sorted) ids of its signers. A `Message` in turn carries its type-specific payload as opaque
//! `data` bytes, so that the outer envelope can be hashed and checked before the payload is touched.
//! The payload is decoded on demand with [`Message::payload`] into the [`MessageData`] tagged union.
//!
//! ## Encoding
//!
//! All structures are encoded with [borsh](https://docs.rs/borsh). Borsh encodings are canonical, so
//! `encode(decode(bytes)) == bytes` for every `bytes` that decodes successfully.
//!
//! ## Roots
//!
//! The [`root`](Message::root) of a message is the SHA256 hash of its encoding. Signatures are made over
//! roots, and a `SignedMessage` has the same root as its inner `Message`.

pub mod validation;

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    crypto_primitives::SignatureScheme,
    data_types::{CryptoHash, Height, OperatorId, Round, SignatureBytes, Value},
    message_id::MessageId,
};

/// Kind of a consensus [`Message`], which also determines how its `data` is decoded.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub enum MessageType {
    Proposal,
    Prepare,
    Commit,
    RoundChange,
}

impl Display for MessageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Proposal => "Proposal",
            MessageType::Prepare => "Prepare",
            MessageType::Commit => "Commit",
            MessageType::RoundChange => "RoundChange",
        };
        write!(f, "{}", name)
    }
}

/// The part of a consensus message that signatures are made over.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Message {
    pub msg_type: MessageType,
    pub height: Height,
    pub round: Round,
    pub identifier: Vec<u8>,
    pub data: Vec<u8>,
}

impl Message {
    /// Create a message carrying `data` for `identifier` at `height` and `round`. The message type
    /// follows from the variant of `data`.
    pub fn new(height: Height, round: Round, identifier: &MessageId, data: &MessageData) -> Message {
        Message {
            msg_type: data.msg_type(),
            height,
            round,
            identifier: identifier.to_vec(),
            data: data.encode(),
        }
    }

    /// Get the borsh encoding of this message.
    pub fn encode(&self) -> Vec<u8> {
        self.try_to_vec().unwrap()
    }

    /// Get the SHA256 hash of the encoding of this message.
    pub fn root(&self) -> CryptoHash {
        CryptoHash::digest(&self.encode())
    }

    /// Decode `data` into the payload variant implied by `msg_type`.
    pub fn payload(&self) -> Result<MessageData, DecodeError> {
        match self.msg_type {
            MessageType::Proposal => ProposalData::decode(&self.data).map(MessageData::Proposal),
            MessageType::Prepare => PrepareData::decode(&self.data).map(MessageData::Prepare),
            MessageType::Commit => CommitData::decode(&self.data).map(MessageData::Commit),
            MessageType::RoundChange => {
                RoundChangeData::decode(&self.data).map(MessageData::RoundChange)
            }
        }
    }
}

/// A [`Message`] together with the (possibly aggregate) signature of `signers` over its root.
///
/// `signers` must be sorted in strictly increasing order. Only decided Commit messages carry more than
/// one signer.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignedMessage {
    pub signature: SignatureBytes,
    pub signers: Vec<OperatorId>,
    pub message: Message,
}

impl SignedMessage {
    /// Sign `message` as `me` using `signer`.
    pub fn sign<S: SignatureScheme>(message: Message, me: OperatorId, signer: &S) -> SignedMessage {
        let signature = signer.sign(&message.root());
        SignedMessage {
            signature,
            signers: vec![me],
            message,
        }
    }

    /// Get the borsh encoding of this signed message. This is what goes on the wire.
    pub fn encode(&self) -> Vec<u8> {
        self.try_to_vec().unwrap()
    }

    /// Decode a signed message from wire bytes. Fails if `bytes` is malformed or has trailing bytes.
    pub fn decode(bytes: &[u8]) -> Result<SignedMessage, DecodeError> {
        SignedMessage::try_from_slice(bytes).map_err(|source| DecodeError {
            target: DecodeTarget::SignedMessage,
            source,
        })
    }

    /// Get the root of the inner message.
    pub fn root(&self) -> CryptoHash {
        self.message.root()
    }

    /// Get the signer of a single-signer message.
    pub(crate) fn first_signer(&self) -> Option<OperatorId> {
        self.signers.first().copied()
    }
}

/// Payload of a [`Message`], one variant per [`MessageType`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageData {
    Proposal(ProposalData),
    Prepare(PrepareData),
    Commit(CommitData),
    RoundChange(RoundChangeData),
}

impl MessageData {
    pub fn msg_type(&self) -> MessageType {
        match self {
            MessageData::Proposal(_) => MessageType::Proposal,
            MessageData::Prepare(_) => MessageType::Prepare,
            MessageData::Commit(_) => MessageType::Commit,
            MessageData::RoundChange(_) => MessageType::RoundChange,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            MessageData::Proposal(data) => data.try_to_vec(),
            MessageData::Prepare(data) => data.try_to_vec(),
            MessageData::Commit(data) => data.try_to_vec(),
            MessageData::RoundChange(data) => data.try_to_vec(),
        }
        .unwrap()
    }
}

/// Payload of a Proposal.
///
/// For proposals in rounds after the first, `round_change_justification` must hold a quorum of
/// RoundChange messages for the proposal's round, and if any of them reports a preparation,
/// `prepare_justification` must hold the Prepare quorum for the highest one reported.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ProposalData {
    pub value: Value,
    pub round_change_justification: Vec<SignedMessage>,
    pub prepare_justification: Vec<SignedMessage>,
}

/// Payload of a Prepare.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PrepareData {
    pub value: Value,
}

/// Payload of a Commit, decided or not.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CommitData {
    pub value: Value,
}

/// Payload of a RoundChange.
///
/// A sender that was never prepared in the current height sends an empty `prepared_value`,
/// [`Round::none`] and no justification. Otherwise `prepared_value` and `prepared_round` are those of
/// its highest preparation, and `prepare_justification` is the Prepare quorum that prepared it.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RoundChangeData {
    pub prepared_value: Value,
    pub prepared_round: Round,
    pub prepare_justification: Vec<SignedMessage>,
}

impl RoundChangeData {
    /// Payload of a sender that was never prepared.
    pub fn unprepared() -> RoundChangeData {
        RoundChangeData {
            prepared_value: Value::default(),
            prepared_round: Round::none(),
            prepare_justification: Vec::new(),
        }
    }

    /// Check whether the sender reports a previous preparation.
    pub fn prepared(&self) -> bool {
        !self.prepared_round.is_none() || !self.prepared_value.is_empty()
    }
}

macro_rules! impl_decode {
    ($payload:ident, $target:expr) => {
        impl $payload {
            pub fn decode(bytes: &[u8]) -> Result<$payload, DecodeError> {
                $payload::try_from_slice(bytes).map_err(|source| DecodeError {
                    target: $target,
                    source,
                })
            }
        }
    };
}

impl_decode!(ProposalData, DecodeTarget::ProposalData);
impl_decode!(PrepareData, DecodeTarget::PrepareData);
impl_decode!(CommitData, DecodeTarget::CommitData);
impl_decode!(RoundChangeData, DecodeTarget::RoundChangeData);

/// Wire structure that failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeTarget {
    SignedMessage,
    ProposalData,
    PrepareData,
    CommitData,
    RoundChangeData,
}

/// Error when bytes do not decode into the expected wire structure.
#[derive(Debug)]
pub struct DecodeError {
    pub target: DecodeTarget,
    pub source: std::io::Error,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "failed to decode {:?}: {}", self.target, self.source)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
