/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Predicates that decide whether signed messages, and the justifications carried inside them, are
//! admissible for a given height and round of a committee.
//!
//! These checks complement the structural ones in [`messages::validation`](crate::messages::validation):
//! they verify signatures and count distinct signers against the committee's quorum, and so need the
//! [`Committee`] and a [`SignatureScheme`].
//!
//! ## Justifications
//!
//! A **RoundChange** that reports a preparation must carry a quorum of valid Prepares for the reported
//! round and value, and the reported round must be before the RoundChange's own round.
//!
//! A **Proposal** for a round after the first must carry a quorum of valid RoundChanges for its round.
//! If any of them reports a preparation, the proposal must propose the value of the one with the
//! highest prepared round, and carry a quorum of valid Prepares for that round and value.

use std::collections::BTreeSet;

use crate::{
    messages::{
        validation::{JustificationFault, ValidationError},
        MessageType, PrepareData, ProposalData, RoundChangeData, SignedMessage,
    },
    types::{
        committee::{Committee, Operator},
        crypto_primitives::SignatureScheme,
        data_types::{CryptoHash, Height, Round},
    },
};

/// Check that every signer of `msg` is in `committee`, and that `msg.signature` is their signature
/// over the root of `msg`.
pub(crate) fn verify_signature<S: SignatureScheme>(
    msg: &SignedMessage,
    committee: &Committee,
    signer: &S,
) -> Result<(), ValidationError> {
    let operators = msg
        .signers
        .iter()
        .map(|id| {
            committee
                .operator(id)
                .ok_or(ValidationError::UnknownSigner { signer: *id })
        })
        .collect::<Result<Vec<&Operator>, ValidationError>>()?;

    signer
        .verify(&msg.root(), &msg.signature, &operators)
        .map_err(|_| ValidationError::BadSignature)
}

/// Check that `msg` is a structurally valid message of `msg_type` for `height` and `round`.
fn check_envelope(
    msg: &SignedMessage,
    msg_type: MessageType,
    height: Height,
    round: Round,
) -> Result<(), ValidationError> {
    msg.validate()?;

    if msg.message.msg_type != msg_type {
        return Err(ValidationError::WrongMessageType {
            expected: msg_type,
            actual: msg.message.msg_type,
        });
    }

    if msg.message.height != height {
        return Err(ValidationError::BadHeight {
            expected: height,
            actual: msg.message.height,
        });
    }

    if msg.message.round != round {
        return Err(ValidationError::InvalidJustification(
            JustificationFault::RoundMismatch {
                expected: round,
                actual: msg.message.round,
            },
        ));
    }

    Ok(())
}

/// Check that `msg` is a validly signed Prepare for `value_root` in `round` of `height`.
pub(crate) fn valid_signed_prepare<S: SignatureScheme>(
    msg: &SignedMessage,
    height: Height,
    round: Round,
    value_root: &CryptoHash,
    committee: &Committee,
    signer: &S,
) -> Result<(), ValidationError> {
    check_envelope(msg, MessageType::Prepare, height, round)?;
    verify_signature(msg, committee, signer)?;

    let data = PrepareData::decode(&msg.message.data).map_err(|_| undecodable(MessageType::Prepare))?;
    if data.value.root() != *value_root {
        return Err(ValidationError::WrongData { round });
    }

    Ok(())
}

/// Check that `msg`, whose decoded payload is `data`, is a valid RoundChange for `round` of `height`,
/// including the Prepare justification of a reported preparation.
pub(crate) fn valid_round_change<S: SignatureScheme>(
    msg: &SignedMessage,
    data: &RoundChangeData,
    height: Height,
    round: Round,
    committee: &Committee,
    signer: &S,
) -> Result<(), ValidationError> {
    check_envelope(msg, MessageType::RoundChange, height, round)?;
    verify_signature(msg, committee, signer)?;
    data.validate()?;

    if !data.prepared() {
        return Ok(());
    }

    if data.prepared_round >= round {
        return Err(ValidationError::InvalidJustification(
            JustificationFault::PreparedRoundTooHigh {
                prepared_round: data.prepared_round,
                round,
            },
        ));
    }

    let value_root = data.prepared_value.root();
    for prepare in &data.prepare_justification {
        valid_signed_prepare(
            prepare,
            height,
            data.prepared_round,
            &value_root,
            committee,
            signer,
        )
        .map_err(member)?;
    }

    check_quorum(&data.prepare_justification, MessageType::Prepare, committee)
}

/// Check that `data`, the payload of a Proposal for `round` of `height`, carries the justification a
/// proposal in that round needs. The value itself is checked by the caller.
pub(crate) fn is_proposal_justified<S: SignatureScheme>(
    data: &ProposalData,
    height: Height,
    round: Round,
    committee: &Committee,
    signer: &S,
) -> Result<(), ValidationError> {
    if round <= Round::first() {
        return Ok(());
    }

    if data.round_change_justification.is_empty() {
        return Err(ValidationError::MissingJustification);
    }

    let mut round_changes = Vec::with_capacity(data.round_change_justification.len());
    for round_change in &data.round_change_justification {
        if round_change.message.msg_type != MessageType::RoundChange {
            return Err(member(ValidationError::WrongMessageType {
                expected: MessageType::RoundChange,
                actual: round_change.message.msg_type,
            }));
        }
        let round_change_data = RoundChangeData::decode(&round_change.message.data)
            .map_err(|_| member(undecodable(MessageType::RoundChange)))?;
        valid_round_change(
            round_change,
            &round_change_data,
            height,
            round,
            committee,
            signer,
        )
        .map_err(member)?;
        round_changes.push(round_change_data);
    }

    check_quorum(
        &data.round_change_justification,
        MessageType::RoundChange,
        committee,
    )?;

    let highest = match highest_prepared(&round_changes) {
        Some(highest) => highest,
        None => return Ok(()),
    };

    if data.value != highest.prepared_value {
        return Err(ValidationError::InvalidJustification(
            JustificationFault::NotHighestPrepared,
        ));
    }

    if data.prepare_justification.is_empty() {
        return Err(ValidationError::MissingJustification);
    }

    let value_root = highest.prepared_value.root();
    for prepare in &data.prepare_justification {
        valid_signed_prepare(
            prepare,
            height,
            highest.prepared_round,
            &value_root,
            committee,
            signer,
        )
        .map_err(member)?;
    }

    check_quorum(&data.prepare_justification, MessageType::Prepare, committee)
}

/// Get the RoundChange that reports the highest prepared round. Among RoundChanges that report the
/// same prepared round, the first one wins.
pub(crate) fn highest_prepared<'a>(
    round_changes: impl IntoIterator<Item = &'a RoundChangeData>,
) -> Option<&'a RoundChangeData> {
    let mut highest: Option<&RoundChangeData> = None;
    for round_change in round_changes {
        if !round_change.prepared() {
            continue;
        }
        if highest.map_or(true, |highest| round_change.prepared_round > highest.prepared_round) {
            highest = Some(round_change);
        }
    }
    highest
}

fn check_quorum(
    msgs: &[SignedMessage],
    msg_type: MessageType,
    committee: &Committee,
) -> Result<(), ValidationError> {
    let signers: BTreeSet<_> = msgs.iter().flat_map(|msg| msg.signers.iter()).collect();
    if signers.len() < committee.quorum() {
        return Err(ValidationError::InvalidJustification(
            JustificationFault::NoQuorum {
                msg_type,
                signers: signers.len(),
            },
        ));
    }
    Ok(())
}

fn member(err: ValidationError) -> ValidationError {
    ValidationError::InvalidJustification(JustificationFault::Member(Box::new(err)))
}

fn undecodable(msg_type: MessageType) -> ValidationError {
    ValidationError::InvalidJustification(JustificationFault::Undecodable { msg_type })
}
