//! Tests of routing messages to the controller of their duty role.

use log::LevelFilter;
use qbft_rs::{
    controller::ControllerSpec,
    errors::{QbftError, StateError},
    messages::{MessageData, PrepareData, SignedMessage},
    router::RoleRouter,
    types::{
        data_types::{Height, OperatorId},
        message_id::{MessageId, Role},
    },
};

mod common;

use crate::common::{
    fixtures::*, keyring::TestSigner, logging::setup_logger, mem_db::MemDB, network::NetworkStub,
};

type TestRouter = RoleRouter<NetworkStub, MemDB, ValueCheckFn, TestSigner>;

fn role_controller(role: Role, network: &NetworkStub) -> TestController {
    ControllerSpec::builder()
        .network(network.clone())
        .storage(MemDB::new())
        .value_check(accept_all as ValueCheckFn)
        .signer(TestSigner::new(OperatorId::new(2)))
        .configuration(configuration(2, 4, role))
        .build()
        .start()
}

fn router(network: &NetworkStub) -> TestRouter {
    RoleRouter::new(
        [Role::Attester, Role::Proposer]
            .into_iter()
            .map(|role| (role, role_controller(role, network))),
    )
}

fn proposal_for(role: Role, height: u64) -> SignedMessage {
    sign_for(
        identifier_for(role),
        first_round_proposer(height, 4),
        height,
        1,
        MessageData::Proposal(qbft_rs::messages::ProposalData {
            value: value(b"v"),
            round_change_justification: Vec::new(),
            prepare_justification: Vec::new(),
        }),
    )
}

#[test]
fn messages_reach_controller_of_their_role() {
    setup_logger(LevelFilter::Trace);
    let network = NetworkStub::new(OperatorId::new(2));
    let mut router = router(&network);
    assert_eq!(router.roles().collect::<Vec<_>>(), vec![Role::Attester, Role::Proposer]);

    for role in [Role::Attester, Role::Proposer] {
        router
            .controller_mut(role)
            .unwrap()
            .start_new_instance(value(b"v"))
            .unwrap();
    }

    router.process_msg(&proposal_for(Role::Proposer, 0)).unwrap();

    let proposer_instance = router.controller(Role::Proposer).unwrap().current_instance().unwrap();
    assert!(proposer_instance.state().accepted_proposal(qbft_rs::types::data_types::Round::first()).is_some());
    let attester_instance = router.controller(Role::Attester).unwrap().current_instance().unwrap();
    assert!(attester_instance.state().accepted_proposal(qbft_rs::types::data_types::Round::first()).is_none());

    // The Prepare goes out under the proposer duty's identifier.
    assert_eq!(network.sent_identifiers(), vec![identifier_for(Role::Proposer)]);

    // Encoded messages are routed the same way.
    router
        .process_encoded_msg(&proposal_for(Role::Attester, 0).encode())
        .unwrap();
    assert_eq!(network.sent_identifiers().len(), 2);
    assert_eq!(network.sent_identifiers()[1], identifier_for(Role::Attester));
}

#[test]
fn unroutable_messages_are_rejected() {
    setup_logger(LevelFilter::Trace);
    let network = NetworkStub::new(OperatorId::new(2));
    let mut router = router(&network);

    // No controller for the role.
    assert!(matches!(
        router.process_msg(&proposal_for(Role::SyncCommittee, 0)),
        Err(QbftError::State(StateError::InvalidIdentifier))
    ));

    // A role code that does not exist.
    let mut unknown_role = identifier().to_vec();
    let code_start = unknown_role.len() - 4;
    unknown_role[code_start..].copy_from_slice(&9u32.to_le_bytes());
    let mut msg = proposal_for(Role::Attester, 0);
    msg.message.identifier = unknown_role;
    assert!(matches!(
        router.process_msg(&msg),
        Err(QbftError::State(StateError::InvalidIdentifier))
    ));

    // An identifier of the wrong length.
    let mut msg = sign(
        1,
        0,
        1,
        MessageData::Prepare(PrepareData { value: value(b"v") }),
    );
    msg.message.identifier.truncate(10);
    assert!(matches!(
        router.process_msg(&msg),
        Err(QbftError::State(StateError::InvalidIdentifier))
    ));

    assert!(matches!(
        router.process_encoded_msg(&[0xFF; 5]),
        Err(QbftError::Decode(_))
    ));
}

#[test]
fn controllers_keep_separate_heights() {
    setup_logger(LevelFilter::Trace);
    let network = NetworkStub::new(OperatorId::new(2));
    let mut router = router(&network);
    let v = value(b"v");

    let attester = router.controller_mut(Role::Attester).unwrap();
    attester.start_new_instance(v.clone()).unwrap();
    decide(attester, 0, &v);
    attester.start_new_instance(v).unwrap();

    assert_eq!(router.controller(Role::Attester).unwrap().height(), Some(Height::new(1)));
    assert_eq!(router.controller(Role::Proposer).unwrap().height(), None);
    assert!(router
        .controller(Role::Proposer)
        .unwrap()
        .highest_decided()
        .unwrap()
        .is_none());
    assert_eq!(
        MessageId::from_bytes(&router.controller(Role::Attester).unwrap().config().identifier.to_vec())
            .and_then(|msg_id| msg_id.role()),
        Some(Role::Attester)
    );
}
