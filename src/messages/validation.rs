/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Structural validation of messages, and the errors every validation step reports.
//!
//! The checks in this module only look at a message itself. Checks that need the committee or the
//! state of an instance (signatures, quorums, proposer identity) live in
//! [`qbft::justification`](crate::qbft::justification) and in the [`Instance`](crate::qbft::Instance).

use std::fmt::{self, Display, Formatter};

use super::{Message, MessageData, MessageType, RoundChangeData, SignedMessage};
use crate::types::{
    data_types::{Height, OperatorId, Round, SIGNATURE_LENGTH},
    message_id::MESSAGE_ID_LENGTH,
};

impl SignedMessage {
    /// Check the envelope of this signed message: signature length, signer list, and the inner
    /// [`Message`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.signature.len() != SIGNATURE_LENGTH {
            return Err(ValidationError::BadSignatureLength {
                length: self.signature.len(),
            });
        }

        if self.signers.is_empty() {
            return Err(ValidationError::NoSigners);
        }

        for pair in self.signers.windows(2) {
            if pair[0] == pair[1] {
                return Err(ValidationError::DuplicateSigner { signer: pair[0] });
            }
            if pair[0] > pair[1] {
                return Err(ValidationError::UnsortedSigners);
            }
        }

        if let Some(reserved) = self.signers.iter().find(|signer| signer.int() == 0) {
            return Err(ValidationError::UnknownSigner { signer: *reserved });
        }

        if self.signers.len() > 1 && self.message.msg_type != MessageType::Commit {
            return Err(ValidationError::MultipleSigners {
                msg_type: self.message.msg_type,
            });
        }

        self.message.validate()
    }
}

impl Message {
    /// Check the fields of this message that do not depend on its payload.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.identifier.len() != MESSAGE_ID_LENGTH {
            return Err(ValidationError::BadIdentifier {
                length: self.identifier.len(),
            });
        }

        if self.round.is_none() {
            return Err(ValidationError::BadRound { round: self.round });
        }

        if self.data.is_empty() {
            return Err(ValidationError::EmptyData);
        }

        Ok(())
    }
}

impl MessageData {
    /// Check the payload-specific fields that can be checked without the committee.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            MessageData::Proposal(data) => non_empty_value(data.value.is_empty()),
            MessageData::Prepare(data) => non_empty_value(data.value.is_empty()),
            MessageData::Commit(data) => non_empty_value(data.value.is_empty()),
            MessageData::RoundChange(data) => data.validate(),
        }
    }
}

impl RoundChangeData {
    /// Check that the prepared fields are either all set or all unset, and that the justification
    /// only holds Prepare messages that agree with them.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.prepared() {
            return if self.prepare_justification.is_empty() {
                Ok(())
            } else {
                Err(ValidationError::InvalidJustification(
                    JustificationFault::UnexpectedJustification,
                ))
            };
        }

        if self.prepared_round.is_none() {
            return Err(ValidationError::BadRound {
                round: self.prepared_round,
            });
        }

        if self.prepared_value.is_empty() {
            return Err(ValidationError::BadValue {
                reason: String::from("prepared value is empty"),
            });
        }

        if self.prepare_justification.is_empty() {
            return Err(ValidationError::MissingJustification);
        }

        for prepare in &self.prepare_justification {
            if prepare.message.msg_type != MessageType::Prepare {
                return Err(ValidationError::InvalidJustification(
                    JustificationFault::WrongMessageType {
                        expected: MessageType::Prepare,
                        actual: prepare.message.msg_type,
                    },
                ));
            }
            if prepare.message.round != self.prepared_round {
                return Err(ValidationError::InvalidJustification(
                    JustificationFault::RoundMismatch {
                        expected: self.prepared_round,
                        actual: prepare.message.round,
                    },
                ));
            }
        }

        Ok(())
    }
}

fn non_empty_value(is_empty: bool) -> Result<(), ValidationError> {
    if is_empty {
        Err(ValidationError::BadValue {
            reason: String::from("value is empty"),
        })
    } else {
        Ok(())
    }
}

/// Reason a message was found inadmissible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    BadHeight { expected: Height, actual: Height },
    BadRound { round: Round },
    PastRound { current: Round, round: Round },
    BadIdentifier { length: usize },
    EmptyData,
    NoSigners,
    UnsortedSigners,
    DuplicateSigner { signer: OperatorId },
    MultipleSigners { msg_type: MessageType },
    UnknownSigner { signer: OperatorId },
    DuplicateMessage { msg_type: MessageType, round: Round },
    BadSignatureLength { length: usize },
    BadSignature,
    BadValue { reason: String },
    MissingJustification,
    InvalidJustification(JustificationFault),
    WrongProposer { expected: OperatorId, actual: OperatorId },
    NoPreviousProposal { round: Round },
    WrongData { round: Round },
    NoPrevAcceptedProposal,
    DuplicateProposal { round: Round },
    WrongMessageType { expected: MessageType, actual: MessageType },
}

/// Reason a justification (a list of signed messages proving a precondition) was found invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JustificationFault {
    /// Fewer distinct signers than a quorum.
    NoQuorum { msg_type: MessageType, signers: usize },
    WrongMessageType { expected: MessageType, actual: MessageType },
    RoundMismatch { expected: Round, actual: Round },
    /// A RoundChange reports a preparation in a round that is not before its own.
    PreparedRoundTooHigh { prepared_round: Round, round: Round },
    /// The proposed value is not the highest prepared value reported by the round changes.
    NotHighestPrepared,
    /// A justification was attached where none is expected.
    UnexpectedJustification,
    /// The payload of a member does not decode as its type says.
    Undecodable { msg_type: MessageType },
    /// A member of the justification is itself invalid.
    Member(Box<ValidationError>),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::BadHeight { expected, actual } => {
                write!(f, "wrong height: expected {}, got {}", expected, actual)
            }
            ValidationError::BadRound { round } => write!(f, "invalid round {}", round),
            ValidationError::PastRound { current, round } => {
                write!(f, "round {} is before current round {}", round, current)
            }
            ValidationError::BadIdentifier { length } => {
                write!(f, "identifier has length {}", length)
            }
            ValidationError::EmptyData => write!(f, "message data is empty"),
            ValidationError::NoSigners => write!(f, "message has no signers"),
            ValidationError::UnsortedSigners => write!(f, "signers are not sorted"),
            ValidationError::DuplicateSigner { signer } => {
                write!(f, "signer {} appears more than once", signer)
            }
            ValidationError::MultipleSigners { msg_type } => {
                write!(f, "{} message has more than one signer", msg_type)
            }
            ValidationError::UnknownSigner { signer } => {
                write!(f, "signer {} is not in the committee", signer)
            }
            ValidationError::DuplicateMessage { msg_type, round } => {
                write!(f, "duplicate {} message in round {}", msg_type, round)
            }
            ValidationError::BadSignatureLength { length } => {
                write!(f, "signature has length {}", length)
            }
            ValidationError::BadSignature => write!(f, "signature does not verify"),
            ValidationError::BadValue { reason } => write!(f, "invalid value: {}", reason),
            ValidationError::MissingJustification => write!(f, "missing justification"),
            ValidationError::InvalidJustification(fault) => {
                write!(f, "invalid justification: {:?}", fault)
            }
            ValidationError::WrongProposer { expected, actual } => {
                write!(f, "proposal from {}, but proposer is {}", actual, expected)
            }
            ValidationError::NoPreviousProposal { round } => {
                write!(f, "no accepted proposal in round {}", round)
            }
            ValidationError::WrongData { round } => {
                write!(f, "value differs from accepted proposal in round {}", round)
            }
            ValidationError::NoPrevAcceptedProposal => {
                write!(f, "value matches no accepted proposal")
            }
            ValidationError::DuplicateProposal { round } => {
                write!(f, "already accepted a proposal in round {}", round)
            }
            ValidationError::WrongMessageType { expected, actual } => {
                write!(f, "expected {} message, got {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for ValidationError {}
