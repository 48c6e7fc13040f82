//! Tests of the controller: the sequence of instances, message routing by height and identifier,
//! retention, batches, and what happens when the network or storage fail.

use log::LevelFilter;
use qbft_rs::{
    controller::{Configuration, Controller, ControllerSpec},
    errors::{QbftError, StateError},
    messages::{validation::ValidationError, MessageData, SignedMessage},
    qbft::types::Phase,
    storage::Storage,
    types::{
        data_types::{Height, OperatorId, Round, SignatureBytes},
        message_id::Role,
    },
};

mod common;

use crate::common::{
    fixtures::*,
    keyring::TestSigner,
    logging::setup_logger,
    mem_db::MemDB,
    network::{DownNetwork, NetworkStub},
};

fn controller_with_capacity(me: u64, capacity: usize) -> TestController {
    ControllerSpec::builder()
        .network(NetworkStub::new(OperatorId::new(me)))
        .storage(MemDB::new())
        .value_check(accept_all as ValueCheckFn)
        .signer(TestSigner::new(OperatorId::new(me)))
        .configuration(
            Configuration::builder()
                .me(OperatorId::new(me))
                .identifier(identifier())
                .committee(committee(4))
                .historical_instance_capacity(capacity)
                .log_events(true)
                .build(),
        )
        .build()
        .start()
}

#[test]
fn new_instance_waits_for_decision() {
    setup_logger(LevelFilter::Trace);
    let mut controller = controller(4, 4, NetworkStub::new(OperatorId::new(4)), MemDB::new());
    assert_eq!(controller.height(), None);

    controller.start_new_instance(value(b"v")).unwrap();
    assert_eq!(controller.height(), Some(Height::new(0)));

    assert!(matches!(
        controller.start_new_instance(value(b"w")),
        Err(QbftError::State(StateError::PreviousInstanceNotDecided { height })) if height == Height::new(0)
    ));
    assert_eq!(controller.height(), Some(Height::new(0)));
}

#[test]
fn new_instance_needs_admissible_value() {
    setup_logger(LevelFilter::Trace);
    let mut controller = controller(4, 4, NetworkStub::new(OperatorId::new(4)), MemDB::new());

    assert!(matches!(
        controller.start_new_instance(value(&[0xFF, 1])),
        Err(QbftError::Validation(ValidationError::BadValue { .. }))
    ));
    assert_eq!(controller.height(), None);
}

#[test]
fn heights_follow_decisions() {
    setup_logger(LevelFilter::Trace);
    let storage = MemDB::new();
    let mut controller = controller(4, 4, NetworkStub::new(OperatorId::new(4)), storage.clone());
    let v = value(b"v");
    let w = value(b"w");

    controller.start_new_instance(v.clone()).unwrap();
    decide(&mut controller, 0, &v);
    controller.start_new_instance(w.clone()).unwrap();
    assert_eq!(controller.height(), Some(Height::new(1)));
    assert_eq!(controller.current_instance().unwrap().phase(), Phase::AwaitingProposal(Round::new(1)));
    assert!(controller.instance(Height::new(0)).unwrap().is_decided());

    let decided = decide(&mut controller, 1, &w);
    assert_eq!(decided.message.height, Height::new(1));
    match decided.message.payload().unwrap() {
        MessageData::Commit(data) => assert_eq!(data.value, w),
        other => panic!("expected a commit, got {:?}", other),
    }

    // Only the highest decided message is kept.
    assert_eq!(storage.len(), 1);
    assert_eq!(controller.highest_decided().unwrap(), Some(decided));
}

#[test]
fn message_for_unknown_height_is_rejected() {
    setup_logger(LevelFilter::Trace);
    let mut controller = controller(4, 4, NetworkStub::new(OperatorId::new(4)), MemDB::new());

    assert!(matches!(
        controller.process_msg(&prepare(1, 0, 1, &value(b"v"))),
        Err(QbftError::State(StateError::NoInstanceRunning { .. }))
    ));

    controller.start_new_instance(value(b"v")).unwrap();
    assert!(matches!(
        controller.process_msg(&proposal(2, 1, 1, &value(b"v"))),
        Err(QbftError::State(StateError::NoInstanceRunning { height })) if height == Height::new(1)
    ));
}

#[test]
fn oldest_instances_are_dropped() {
    setup_logger(LevelFilter::Trace);
    let mut controller = controller_with_capacity(4, 2);
    for height in 0..3 {
        let v = value(&[height as u8 + 1]);
        controller.start_new_instance(v.clone()).unwrap();
        decide(&mut controller, height, &v);
    }

    assert!(controller.instance(Height::new(0)).is_none());
    assert!(controller.instance(Height::new(1)).is_some());
    assert!(controller.instance(Height::new(2)).is_some());

    assert!(matches!(
        controller.process_msg(&commit(4, 0, 1, &value(&[1]))),
        Err(QbftError::State(StateError::NoInstanceRunning { .. }))
    ));
    assert!(matches!(
        controller.process_msg(&commit(4, 1, 1, &value(&[2]))),
        Err(QbftError::State(StateError::PostDecided { .. }))
    ));
}

#[test]
fn zero_capacity_keeps_latest_instance() {
    setup_logger(LevelFilter::Trace);
    let mut controller = controller_with_capacity(4, 0);
    let v = value(b"v");
    controller.start_new_instance(v.clone()).unwrap();
    decide(&mut controller, 0, &v);
    controller.start_new_instance(v).unwrap();

    assert!(controller.instance(Height::new(0)).is_none());
    assert_eq!(controller.current_instance().unwrap().height(), Height::new(1));
}

#[test]
fn message_for_other_duty_is_rejected() {
    setup_logger(LevelFilter::Trace);
    let mut controller = controller(4, 4, NetworkStub::new(OperatorId::new(4)), MemDB::new());
    controller.start_new_instance(value(b"v")).unwrap();
    let root_before = controller.root();

    let foreign = sign_for(
        identifier_for(Role::Aggregator),
        1,
        0,
        1,
        MessageData::Proposal(qbft_rs::messages::ProposalData {
            value: value(b"v"),
            round_change_justification: Vec::new(),
            prepare_justification: Vec::new(),
        }),
    );
    assert!(matches!(
        controller.process_msg(&foreign),
        Err(QbftError::State(StateError::InvalidIdentifier))
    ));
    assert_eq!(controller.root(), root_before);
}

#[test]
fn malformed_messages_are_rejected() {
    setup_logger(LevelFilter::Trace);
    let mut controller = controller(4, 4, NetworkStub::new(OperatorId::new(4)), MemDB::new());
    controller.start_new_instance(value(b"v")).unwrap();

    assert!(matches!(
        controller.process_encoded_msg(&[1, 2, 3]),
        Err(QbftError::Decode(_))
    ));

    let mut short_signature = proposal(1, 0, 1, &value(b"v"));
    short_signature.signature = SignatureBytes::new(vec![0; 10]);
    assert!(matches!(
        controller.process_msg(&short_signature),
        Err(QbftError::Validation(ValidationError::BadSignatureLength { length: 10 }))
    ));

    let mut no_signers = proposal(1, 0, 1, &value(b"v"));
    no_signers.signers.clear();
    assert!(matches!(
        controller.process_msg(&no_signers),
        Err(QbftError::Validation(ValidationError::NoSigners))
    ));

    // The encoded form of a valid message goes through.
    assert_eq!(
        controller
            .process_encoded_msg(&proposal(1, 0, 1, &value(b"v")).encode())
            .unwrap(),
        None
    );
}

#[test]
fn batch_keeps_going_after_rejections() {
    setup_logger(LevelFilter::Trace);
    let mut controller = controller(4, 4, NetworkStub::new(OperatorId::new(4)), MemDB::new());
    let v = value(b"v");
    controller.start_new_instance(v.clone()).unwrap();

    let mut batch = vec![proposal(1, 0, 1, &v), proposal(1, 0, 1, &v)];
    batch.extend((1..=3).map(|signer| prepare(signer, 0, 1, &v)));
    batch.extend((1..=3).map(|signer| commit(signer, 0, 1, &v)));
    let outcome = controller.process_msg_batch(&batch);

    assert!(outcome.decided.is_some());
    assert!(matches!(
        outcome.last_error,
        Some(QbftError::Validation(ValidationError::DuplicateProposal { .. }))
    ));
    assert!(controller.current_instance().unwrap().is_decided());

    // A message after the decision is the last error of its batch.
    let outcome = controller.process_msg_batch(&[prepare(1, 0, 2, &v), commit(4, 0, 1, &v)]);
    assert!(outcome.decided.is_none());
    assert!(matches!(
        outcome.last_error,
        Some(QbftError::State(StateError::PostDecided { .. }))
    ));
}

#[test]
fn network_failure_keeps_state_changes() {
    setup_logger(LevelFilter::Trace);
    let mut controller: Controller<DownNetwork, MemDB, ValueCheckFn, TestSigner> =
        ControllerSpec::builder()
            .network(DownNetwork)
            .storage(MemDB::new())
            .value_check(accept_all as ValueCheckFn)
            .signer(TestSigner::new(OperatorId::new(2)))
            .configuration(configuration(2, 4, Role::Attester))
            .build()
            .start();
    let v = value(b"v");
    controller.start_new_instance(v.clone()).unwrap();

    assert!(matches!(
        controller.process_msg(&proposal(1, 0, 1, &v)),
        Err(QbftError::Network(_))
    ));
    assert_eq!(
        controller.current_instance().unwrap().phase(),
        Phase::Proposed(Round::new(1))
    );

    controller.process_msg(&prepare(1, 0, 1, &v)).unwrap();
    controller.process_msg(&prepare(3, 0, 1, &v)).unwrap();
    assert!(matches!(
        controller.process_msg(&prepare(4, 0, 1, &v)),
        Err(QbftError::Network(_))
    ));
    assert_eq!(
        controller.current_instance().unwrap().phase(),
        Phase::Prepared(Round::new(1))
    );

    controller.process_msg(&commit(1, 0, 1, &v)).unwrap();
    controller.process_msg(&commit(3, 0, 1, &v)).unwrap();
    let decided = controller.process_msg(&commit(4, 0, 1, &v)).unwrap();
    assert!(decided.is_some());
    assert_eq!(controller.highest_decided().unwrap(), decided);
}

#[test]
fn network_failure_on_timeout_keeps_new_round() {
    setup_logger(LevelFilter::Trace);
    let mut controller: Controller<DownNetwork, MemDB, ValueCheckFn, TestSigner> =
        ControllerSpec::builder()
            .network(DownNetwork)
            .storage(MemDB::new())
            .value_check(accept_all as ValueCheckFn)
            .signer(TestSigner::new(OperatorId::new(1)))
            .configuration(configuration(1, 4, Role::Attester))
            .build()
            .start();

    // Operator 1 leads round 1, so starting broadcasts a proposal.
    assert!(matches!(
        controller.start_new_instance(value(b"v")),
        Err(QbftError::Network(_))
    ));
    assert_eq!(controller.height(), Some(Height::new(0)));

    assert!(matches!(
        controller.upon_round_timeout(),
        Err(QbftError::Network(_))
    ));
    assert_eq!(controller.current_instance().unwrap().round(), Round::new(2));
}

#[test]
fn same_inputs_give_same_root() {
    setup_logger(LevelFilter::Trace);
    let v = value(b"v");
    let inputs: Vec<SignedMessage> = vec![
        proposal(1, 0, 1, &v),
        prepare(1, 0, 1, &v),
        prepare(3, 0, 1, &v),
        round_change(4, 0, 3),
    ];

    let mut a = controller(2, 4, NetworkStub::new(OperatorId::new(2)), MemDB::new());
    let mut b = controller(2, 4, NetworkStub::new(OperatorId::new(2)), MemDB::new());
    assert_eq!(a.root(), b.root());

    for controller in [&mut a, &mut b] {
        controller.start_new_instance(v.clone()).unwrap();
        for msg in &inputs {
            controller.process_msg(msg).unwrap();
        }
    }
    assert_eq!(a.root(), b.root());

    a.process_msg(&prepare(4, 0, 1, &v)).unwrap();
    assert_ne!(a.root(), b.root());
}

#[test]
fn stored_decision_only_moves_forward() {
    let mut storage = MemDB::new();
    let v = value(b"v");
    let first = aggregate_commit(&[1, 2, 3], 1, 1, &v);
    let earlier = aggregate_commit(&[1, 2, 3], 0, 1, &v);
    let replacement = aggregate_commit(&[2, 3, 4], 1, 1, &v);

    storage.save_highest_decided(&identifier(), &first).unwrap();
    storage.save_highest_decided(&identifier(), &earlier).unwrap();
    assert_eq!(storage.highest_decided(&identifier()).unwrap(), Some(first));

    storage
        .save_highest_decided(&identifier(), &replacement)
        .unwrap();
    assert_eq!(
        storage.highest_decided(&identifier()).unwrap(),
        Some(replacement)
    );
    assert!(storage
        .highest_decided(&identifier_for(Role::Proposer))
        .unwrap()
        .is_none());
}
