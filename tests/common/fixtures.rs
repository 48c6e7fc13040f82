//! Committees, controllers and signed messages shared by the integration tests.

use qbft_rs::{
    app::InvalidValue,
    controller::{Configuration, Controller, ControllerSpec},
    messages::{
        CommitData, Message, MessageData, PrepareData, ProposalData, RoundChangeData, SignedMessage,
    },
    types::{
        committee::{Committee, Operator},
        crypto_primitives::SignatureScheme,
        data_types::{Height, OperatorId, PublicKeyBytes, Round, Value},
        message_id::{MessageId, Role},
    },
};

use super::{
    keyring::{public_key, TestSigner},
    mem_db::MemDB,
    network::NetworkStub,
};

pub(crate) type ValueCheckFn = fn(&Value) -> Result<(), InvalidValue>;

pub(crate) type TestController = Controller<NetworkStub, MemDB, ValueCheckFn, TestSigner>;

/// Public key of the validator whose duties the tests agree on.
pub(crate) const VALIDATOR: [u8; 48] = [7; 48];

pub(crate) fn identifier() -> MessageId {
    identifier_for(Role::Attester)
}

pub(crate) fn identifier_for(role: Role) -> MessageId {
    MessageId::new(&PublicKeyBytes::new(VALIDATOR), role)
}

/// A committee of operators `1..=n`.
pub(crate) fn committee(n: u64) -> Committee {
    Committee::new((1..=n).map(|id| Operator::new(OperatorId::new(id), public_key(OperatorId::new(id)))))
        .unwrap()
}

pub(crate) fn value(bytes: &[u8]) -> Value {
    Value::new(bytes.to_vec())
}

/// Accepts every value.
pub(crate) fn accept_all(_: &Value) -> Result<(), InvalidValue> {
    Ok(())
}

/// Rejects values that start with `0xFF`.
pub(crate) fn reject_ff(value: &Value) -> Result<(), InvalidValue> {
    if value.bytes().first() == Some(&0xFF) {
        Err(InvalidValue::new("starts with 0xFF"))
    } else {
        Ok(())
    }
}

pub(crate) fn configuration(me: u64, n: u64, role: Role) -> Configuration {
    Configuration::builder()
        .me(OperatorId::new(me))
        .identifier(identifier_for(role))
        .committee(committee(n))
        .log_events(false)
        .build()
}

/// Build the controller of operator `me` in a committee of `n` for the attester duty.
pub(crate) fn controller(me: u64, n: u64, network: NetworkStub, storage: MemDB) -> TestController {
    ControllerSpec::builder()
        .network(network)
        .storage(storage)
        .value_check(reject_ff as ValueCheckFn)
        .signer(TestSigner::new(OperatorId::new(me)))
        .configuration(configuration(me, n, Role::Attester))
        .build()
        .start()
}

/* ↓↓↓ Signed messages ↓↓↓ */

pub(crate) fn sign(signer: u64, height: u64, round: u64, data: MessageData) -> SignedMessage {
    sign_for(identifier(), signer, height, round, data)
}

pub(crate) fn sign_for(
    msg_id: MessageId,
    signer: u64,
    height: u64,
    round: u64,
    data: MessageData,
) -> SignedMessage {
    let message = Message::new(Height::new(height), Round::new(round), &msg_id, &data);
    SignedMessage::sign(
        message,
        OperatorId::new(signer),
        &TestSigner::new(OperatorId::new(signer)),
    )
}

pub(crate) fn proposal(signer: u64, height: u64, round: u64, value: &Value) -> SignedMessage {
    justified_proposal(signer, height, round, value, Vec::new(), Vec::new())
}

pub(crate) fn justified_proposal(
    signer: u64,
    height: u64,
    round: u64,
    value: &Value,
    round_change_justification: Vec<SignedMessage>,
    prepare_justification: Vec<SignedMessage>,
) -> SignedMessage {
    sign(
        signer,
        height,
        round,
        MessageData::Proposal(ProposalData {
            value: value.clone(),
            round_change_justification,
            prepare_justification,
        }),
    )
}

pub(crate) fn prepare(signer: u64, height: u64, round: u64, value: &Value) -> SignedMessage {
    sign(
        signer,
        height,
        round,
        MessageData::Prepare(PrepareData {
            value: value.clone(),
        }),
    )
}

pub(crate) fn commit(signer: u64, height: u64, round: u64, value: &Value) -> SignedMessage {
    sign(
        signer,
        height,
        round,
        MessageData::Commit(CommitData {
            value: value.clone(),
        }),
    )
}

/// An aggregate Commit signed by every operator in `signers`, which must be sorted.
pub(crate) fn aggregate_commit(signers: &[u64], height: u64, round: u64, value: &Value) -> SignedMessage {
    let commits: Vec<SignedMessage> = signers
        .iter()
        .map(|signer| commit(*signer, height, round, value))
        .collect();
    let signatures: Vec<_> = commits.iter().map(|commit| &commit.signature).collect();
    let signature = TestSigner::new(OperatorId::new(signers[0]))
        .aggregate(&signatures)
        .unwrap();
    SignedMessage {
        signature,
        signers: signers.iter().map(|id| OperatorId::new(*id)).collect(),
        message: commits[0].message.clone(),
    }
}

pub(crate) fn round_change(signer: u64, height: u64, round: u64) -> SignedMessage {
    sign(
        signer,
        height,
        round,
        MessageData::RoundChange(RoundChangeData::unprepared()),
    )
}

/// A RoundChange that reports a preparation of `value` in `prepared_round`, justified by Prepares from
/// `preparers`.
pub(crate) fn prepared_round_change(
    signer: u64,
    height: u64,
    round: u64,
    prepared_round: u64,
    value: &Value,
    preparers: &[u64],
) -> SignedMessage {
    sign(
        signer,
        height,
        round,
        MessageData::RoundChange(RoundChangeData {
            prepared_value: value.clone(),
            prepared_round: Round::new(prepared_round),
            prepare_justification: preparers
                .iter()
                .map(|preparer| prepare(*preparer, height, prepared_round, value))
                .collect(),
        }),
    )
}

/// Get the proposer of round 1 at `height` in a committee of operators `1..=n`.
pub(crate) fn first_round_proposer(height: u64, n: u64) -> u64 {
    height % n + 1
}

/// Drive `controller` through round 1 at `height` to a decision on `value`, with every message coming
/// from operators `1..=3` of a committee of 4.
pub(crate) fn decide(controller: &mut TestController, height: u64, value: &Value) -> SignedMessage {
    let proposer = first_round_proposer(height, 4);
    controller
        .process_msg(&proposal(proposer, height, 1, value))
        .unwrap();
    for signer in 1..=3 {
        controller
            .process_msg(&prepare(signer, height, 1, value))
            .unwrap();
    }
    let mut decided = None;
    for signer in 1..=3 {
        decided = controller
            .process_msg(&commit(signer, height, 1, value))
            .unwrap();
    }
    decided.unwrap()
}
