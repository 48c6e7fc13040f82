//! Definitions of qbft_rs events for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Events are published
//! synchronously, in the thread that called into the [`Controller`](crate::controller::Controller),
//! right after the action they describe. Every event carries the wall-clock time at which it was
//! published; the protocol itself never reads the clock.

use std::time::SystemTime;

use crate::{
    event_bus::EventHandlers,
    messages::SignedMessage,
    types::data_types::{CryptoHash, Height, OperatorId, Round, Value},
};

pub enum Event {
    // Instance lifecycle.
    StartInstance(StartInstanceEvent),
    // Events that involve broadcasting a message.
    Propose(ProposeEvent),
    Prepare(PrepareEvent),
    Commit(CommitEvent),
    RoundChange(RoundChangeEvent),
    // Events that involve receiving a message.
    ReceiveProposal(ReceiveProposalEvent),
    ReceivePrepare(ReceivePrepareEvent),
    ReceiveCommit(ReceiveCommitEvent),
    ReceiveRoundChange(ReceiveRoundChangeEvent),
    // Events that change the state of an instance.
    AcceptProposal(AcceptProposalEvent),
    UpdatePrepared(UpdatePreparedEvent),
    ChangeRound(ChangeRoundEvent),
    Decide(DecideEvent),
}

impl Event {
    pub(crate) fn publish(self, event_handlers: &EventHandlers) {
        if !event_handlers.is_empty() {
            event_handlers.fire_handlers(self)
        }
    }
}

/// The controller started an instance at `height` with `value` as the value it proposes if it leads.
pub struct StartInstanceEvent {
    pub timestamp: SystemTime,
    pub height: Height,
    pub value: Value,
}

pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub proposal: SignedMessage,
}

pub struct PrepareEvent {
    pub timestamp: SystemTime,
    pub prepare: SignedMessage,
}

pub struct CommitEvent {
    pub timestamp: SystemTime,
    pub commit: SignedMessage,
}

pub struct RoundChangeEvent {
    pub timestamp: SystemTime,
    pub round_change: SignedMessage,
}

pub struct ReceiveProposalEvent {
    pub timestamp: SystemTime,
    pub origin: OperatorId,
    pub proposal: SignedMessage,
}

pub struct ReceivePrepareEvent {
    pub timestamp: SystemTime,
    pub origin: OperatorId,
    pub prepare: SignedMessage,
}

/// Commits may be aggregates, so they are identified by all of their signers.
pub struct ReceiveCommitEvent {
    pub timestamp: SystemTime,
    pub signers: Vec<OperatorId>,
    pub commit: SignedMessage,
}

pub struct ReceiveRoundChangeEvent {
    pub timestamp: SystemTime,
    pub origin: OperatorId,
    pub round_change: SignedMessage,
}

pub struct AcceptProposalEvent {
    pub timestamp: SystemTime,
    pub height: Height,
    pub round: Round,
    pub value_root: CryptoHash,
}

/// A Prepare quorum formed in `round`, which is now the highest prepared round.
pub struct UpdatePreparedEvent {
    pub timestamp: SystemTime,
    pub height: Height,
    pub round: Round,
    pub value_root: CryptoHash,
}

pub struct ChangeRoundEvent {
    pub timestamp: SystemTime,
    pub height: Height,
    pub round: Round,
    pub cause: ChangeRoundCause,
}

/// Why an instance moved to a higher round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeRoundCause {
    /// A quorum of RoundChanges for the round.
    Quorum,
    /// RoundChanges for later rounds from a partial quorum of operators.
    Speedup,
    /// An accepted, justified proposal for the round.
    Proposal,
    /// The caller reported that the previous round timed out.
    Timeout,
}

pub struct DecideEvent {
    pub timestamp: SystemTime,
    pub height: Height,
    pub round: Round,
    pub value: Value,
    pub signers: Vec<OperatorId>,
}
