/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Event-driven implementation of a single QBFT instance.
//!
//! Main type: [`Instance`].

use std::time::SystemTime;

use crate::{
    app::ValueCheck,
    errors::{QbftError, StateError},
    event_bus::EventHandlers,
    events::{
        AcceptProposalEvent, ChangeRoundCause, ChangeRoundEvent, CommitEvent, DecideEvent, Event,
        PrepareEvent, ProposeEvent, ReceiveCommitEvent, ReceivePrepareEvent, ReceiveProposalEvent,
        ReceiveRoundChangeEvent, RoundChangeEvent, UpdatePreparedEvent,
    },
    messages::{
        validation::ValidationError, CommitData, Message, MessageData, MessageType, PrepareData,
        ProposalData, RoundChangeData, SignedMessage,
    },
    qbft::{
        justification::{highest_prepared, is_proposal_justified, valid_round_change, verify_signature},
        roles::{is_proposer, select_proposer},
        types::{longest_unique_signers, AcceptedProposal, Decided, InstanceState, Phase},
    },
    types::{
        committee::Committee,
        crypto_primitives::{SignatureError, SignatureScheme},
        data_types::{CryptoHash, Height, OperatorId, Round, SignatureBytes, Value},
        message_id::MessageId,
    },
};

/// Everything an [`Instance`] needs from its owner to process an input.
pub(crate) struct InstanceContext<'a, V: ValueCheck, S: SignatureScheme> {
    pub(crate) me: OperatorId,
    pub(crate) identifier: &'a MessageId,
    pub(crate) committee: &'a Committee,
    pub(crate) value_check: &'a V,
    pub(crate) signer: &'a S,
    pub(crate) event_handlers: &'a EventHandlers,
}

/// What an [`Instance`] asks its owner to do after processing an input.
#[derive(Debug, Default)]
pub(crate) struct InstanceOutput {
    /// Messages this replica signed, in the order they must be broadcast.
    pub(crate) broadcasts: Vec<SignedMessage>,
    /// The decided message, on the input that completed the Commit quorum.
    pub(crate) decided: Option<SignedMessage>,
}

/// A single participant in the QBFT agreement on the value of one height.
///
/// # Usage
///
/// An `Instance` is driven by three inputs, all called by the
/// [`Controller`](crate::controller::Controller) that owns it:
/// 1. `start`: called once, right after creation. Proposes the start value if this replica leads the
///    first round.
/// 2. `process_msg`: called for every signed message of this height, including the ones this replica
///    emitted itself.
/// 3. `upon_round_timeout`: called when the caller's round timer expires.
///
/// Every input either fails without changing the instance, or applies its effects and returns the
/// messages to broadcast. The instance never records its own messages before they are delivered back
/// through `process_msg`.
pub struct Instance {
    state: InstanceState,
}

impl Instance {
    pub(crate) fn new(height: Height, start_value: Value) -> Instance {
        Instance {
            state: InstanceState::new(height, start_value),
        }
    }

    pub fn state(&self) -> &InstanceState {
        &self.state
    }

    pub fn height(&self) -> Height {
        self.state.height()
    }

    pub fn round(&self) -> Round {
        self.state.round()
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn is_decided(&self) -> bool {
        self.state.is_decided()
    }

    /// Get the decided message of this instance, if it decided.
    pub fn decided_message(&self) -> Option<&SignedMessage> {
        self.state.decided().map(|decided| &decided.message)
    }

    pub fn root(&self) -> CryptoHash {
        self.state.root()
    }

    /// Start the first round. If this replica is its proposer, propose the start value.
    pub(crate) fn start<V: ValueCheck, S: SignatureScheme>(
        &mut self,
        ctx: &InstanceContext<V, S>,
    ) -> InstanceOutput {
        let mut output = InstanceOutput::default();
        self.state.started = true;

        if is_proposer(ctx.me, self.state.height, Round::first(), ctx.committee) {
            let data = ProposalData {
                value: self.state.start_value.clone(),
                round_change_justification: Vec::new(),
                prepare_justification: Vec::new(),
            };
            self.propose(ctx, Round::first(), data, &mut output);
        }

        output
    }

    /// Process a signed message of any type for this instance's height.
    ///
    /// # Precondition
    ///
    /// `msg` passed [`SignedMessage::validate`] and carries the identifier of the instance's owner.
    pub(crate) fn process_msg<V: ValueCheck, S: SignatureScheme>(
        &mut self,
        ctx: &InstanceContext<V, S>,
        msg: &SignedMessage,
    ) -> Result<InstanceOutput, QbftError> {
        if self.state.is_decided() {
            return Err(StateError::PostDecided {
                height: self.state.height,
            }
            .into());
        }

        if msg.message.height != self.state.height {
            return Err(ValidationError::BadHeight {
                expected: self.state.height,
                actual: msg.message.height,
            }
            .into());
        }

        let data = msg.message.payload()?;
        data.validate()?;

        let mut output = InstanceOutput::default();
        match data {
            MessageData::Proposal(data) => self.on_receive_proposal(ctx, msg, data, &mut output)?,
            MessageData::Prepare(data) => self.on_receive_prepare(ctx, msg, data, &mut output)?,
            MessageData::Commit(data) => self.on_receive_commit(ctx, msg, data, &mut output)?,
            MessageData::RoundChange(data) => {
                self.on_receive_round_change(ctx, msg, data, &mut output)?
            }
        }
        Ok(output)
    }

    /// Give up on the current round: move to the next one and broadcast a RoundChange for it.
    pub(crate) fn upon_round_timeout<V: ValueCheck, S: SignatureScheme>(
        &mut self,
        ctx: &InstanceContext<V, S>,
    ) -> Result<InstanceOutput, QbftError> {
        if self.state.is_decided() {
            return Err(StateError::PostDecided {
                height: self.state.height,
            }
            .into());
        }

        let mut output = InstanceOutput::default();
        let next_round = self.state.round + 1;
        self.change_round(ctx, next_round, ChangeRoundCause::Timeout);
        self.broadcast_round_change(ctx, next_round, &mut output);
        Ok(output)
    }

    /* ↓↓↓ Message handlers ↓↓↓ */

    /// Accept the proposal if it comes from the proposer of its round, is for the current round or a
    /// later one, proposes an admissible value, and is justified. Then prepare its value.
    fn on_receive_proposal<V: ValueCheck, S: SignatureScheme>(
        &mut self,
        ctx: &InstanceContext<V, S>,
        msg: &SignedMessage,
        data: ProposalData,
        output: &mut InstanceOutput,
    ) -> Result<(), QbftError> {
        let origin = msg.first_signer().ok_or(ValidationError::NoSigners)?;
        Event::ReceiveProposal(ReceiveProposalEvent {
            timestamp: SystemTime::now(),
            origin,
            proposal: msg.clone(),
        })
        .publish(ctx.event_handlers);

        verify_signature(msg, ctx.committee, ctx.signer)?;

        let height = self.state.height;
        let round = msg.message.round;
        let proposer = select_proposer(height, round, ctx.committee);
        if origin != proposer {
            return Err(ValidationError::WrongProposer {
                expected: proposer,
                actual: origin,
            }
            .into());
        }

        if round < self.state.round {
            return Err(ValidationError::PastRound {
                current: self.state.round,
                round,
            }
            .into());
        }

        if self.state.proposals.contains_key(&round) {
            return Err(ValidationError::DuplicateProposal { round }.into());
        }

        ctx.value_check.check_value(&data.value)?;
        is_proposal_justified(&data, height, round, ctx.committee, ctx.signer)?;

        let value_root = data.value.root();
        self.state.proposals.insert(
            round,
            AcceptedProposal {
                value: data.value.clone(),
                value_root,
                message: msg.clone(),
            },
        );

        Event::AcceptProposal(AcceptProposalEvent {
            timestamp: SystemTime::now(),
            height,
            round,
            value_root,
        })
        .publish(ctx.event_handlers);

        if round > self.state.round {
            self.change_round(ctx, round, ChangeRoundCause::Proposal);
        }

        let prepare = self.sign(ctx, round, MessageData::Prepare(PrepareData { value: data.value }));
        Event::Prepare(PrepareEvent {
            timestamp: SystemTime::now(),
            prepare: prepare.clone(),
        })
        .publish(ctx.event_handlers);
        output.broadcasts.push(prepare);

        Ok(())
    }

    /// Collect the prepare. On the first Prepare quorum of a round, record the round as prepared and, if
    /// it is the current round, commit its value.
    fn on_receive_prepare<V: ValueCheck, S: SignatureScheme>(
        &mut self,
        ctx: &InstanceContext<V, S>,
        msg: &SignedMessage,
        data: PrepareData,
        output: &mut InstanceOutput,
    ) -> Result<(), QbftError> {
        let origin = msg.first_signer().ok_or(ValidationError::NoSigners)?;
        Event::ReceivePrepare(ReceivePrepareEvent {
            timestamp: SystemTime::now(),
            origin,
            prepare: msg.clone(),
        })
        .publish(ctx.event_handlers);

        verify_signature(msg, ctx.committee, ctx.signer)?;

        let round = msg.message.round;
        let proposal = self
            .state
            .proposals
            .get(&round)
            .ok_or(ValidationError::NoPreviousProposal { round })?;
        if proposal.value_root != data.value.root() {
            return Err(ValidationError::WrongData { round }.into());
        }
        let value_root = proposal.value_root;

        self.state
            .quorum_set
            .add(msg, value_root, ctx.committee)?;

        if !self
            .state
            .quorum_set
            .has_quorum(MessageType::Prepare, round, &value_root, ctx.committee)
        {
            return Ok(());
        }

        if self
            .state
            .last_prepared
            .as_ref()
            .map_or(true, |(prepared_round, _)| *prepared_round < round)
        {
            self.state.last_prepared = Some((round, data.value.clone()));
            Event::UpdatePrepared(UpdatePreparedEvent {
                timestamp: SystemTime::now(),
                height: self.state.height,
                round,
                value_root,
            })
            .publish(ctx.event_handlers);
        }

        if round == self.state.round && self.state.sent_commits.insert(round) {
            let commit = self.sign(ctx, round, MessageData::Commit(CommitData { value: data.value }));
            Event::Commit(CommitEvent {
                timestamp: SystemTime::now(),
                commit: commit.clone(),
            })
            .publish(ctx.event_handlers);
            output.broadcasts.push(commit);
        }

        Ok(())
    }

    /// Collect the commit. Once the Commits of its round for its value can be aggregated into a
    /// message signed by a quorum, decide on that value.
    ///
    /// The decided message is built before the commit is collected, so a failure to aggregate leaves
    /// the state as it was and the same commit can be processed again.
    fn on_receive_commit<V: ValueCheck, S: SignatureScheme>(
        &mut self,
        ctx: &InstanceContext<V, S>,
        msg: &SignedMessage,
        data: CommitData,
        output: &mut InstanceOutput,
    ) -> Result<(), QbftError> {
        Event::ReceiveCommit(ReceiveCommitEvent {
            timestamp: SystemTime::now(),
            signers: msg.signers.clone(),
            commit: msg.clone(),
        })
        .publish(ctx.event_handlers);

        verify_signature(msg, ctx.committee, ctx.signer)?;

        let round = msg.message.round;
        let value_root = data.value.root();
        if let Some(proposal) = self.state.proposals.get(&round) {
            if proposal.value_root != value_root {
                return Err(ValidationError::WrongData { round }.into());
            }
        }
        if !self
            .state
            .proposals
            .values()
            .any(|proposal| proposal.value_root == value_root)
        {
            return Err(ValidationError::NoPrevAcceptedProposal.into());
        }

        self.state.quorum_set.check(msg, ctx.committee)?;
        let decided = self.aggregate_commits(ctx, msg, &value_root)?;
        self.state
            .quorum_set
            .add(msg, value_root, ctx.committee)?;

        let decided = match decided {
            Some(decided) => decided,
            None => return Ok(()),
        };
        self.state.decided = Some(Decided {
            value: data.value.clone(),
            round,
            message: decided.clone(),
        });

        Event::Decide(DecideEvent {
            timestamp: SystemTime::now(),
            height: self.state.height,
            round,
            value: data.value,
            signers: decided.signers.clone(),
        })
        .publish(ctx.event_handlers);
        output.decided = Some(decided);

        Ok(())
    }

    /// Collect the round change, then apply the two rules that move an instance to a later round.
    fn on_receive_round_change<V: ValueCheck, S: SignatureScheme>(
        &mut self,
        ctx: &InstanceContext<V, S>,
        msg: &SignedMessage,
        data: RoundChangeData,
        output: &mut InstanceOutput,
    ) -> Result<(), QbftError> {
        let origin = msg.first_signer().ok_or(ValidationError::NoSigners)?;
        Event::ReceiveRoundChange(ReceiveRoundChangeEvent {
            timestamp: SystemTime::now(),
            origin,
            round_change: msg.clone(),
        })
        .publish(ctx.event_handlers);

        let round = msg.message.round;
        if round < self.state.round {
            return Err(ValidationError::PastRound {
                current: self.state.round,
                round,
            }
            .into());
        }

        valid_round_change(
            msg,
            &data,
            self.state.height,
            round,
            ctx.committee,
            ctx.signer,
        )?;

        let root = CryptoHash::digest(&msg.message.data);
        self.state.quorum_set.add(msg, root, ctx.committee)?;

        self.upon_round_change_quorum(ctx, round, output)?;
        self.upon_round_change_speedup(ctx, output);

        Ok(())
    }

    /* ↓↓↓ Round changes ↓↓↓ */

    /// If a quorum of operators asked to change to `round`, move to it, and propose in it if this
    /// replica is its proposer.
    ///
    /// A quorum for a later round contains a partial quorum, and the speedup rule moves the instance
    /// into that round as soon as the partial quorum is collected. So by the time a quorum forms, the
    /// instance is normally in `round` already, and the move here only happens when one message
    /// completes both, as in committees where the two thresholds coincide.
    fn upon_round_change_quorum<V: ValueCheck, S: SignatureScheme>(
        &mut self,
        ctx: &InstanceContext<V, S>,
        round: Round,
        output: &mut InstanceOutput,
    ) -> Result<(), QbftError> {
        if round < self.state.round
            || self
                .state
                .quorum_set
                .round_signer_count(MessageType::RoundChange, round)
                < ctx.committee.quorum()
        {
            return Ok(());
        }

        if round > self.state.round {
            self.change_round(ctx, round, ChangeRoundCause::Quorum);
        }

        if !is_proposer(ctx.me, self.state.height, round, ctx.committee)
            || self.state.sent_proposals.contains(&round)
            || self.state.proposals.contains_key(&round)
        {
            return Ok(());
        }

        let round_changes: Vec<SignedMessage> = self
            .state
            .quorum_set
            .messages_for_round(MessageType::RoundChange, round)
            .into_iter()
            .cloned()
            .collect();
        let round_change_data = round_changes
            .iter()
            .map(|round_change| RoundChangeData::decode(&round_change.message.data))
            .collect::<Result<Vec<RoundChangeData>, _>>()?;

        let (value, prepare_justification) = match highest_prepared(&round_change_data) {
            Some(highest) => (
                highest.prepared_value.clone(),
                highest.prepare_justification.clone(),
            ),
            None => (self.state.start_value.clone(), Vec::new()),
        };
        if let Err(err) = ctx.value_check.check_value(&value) {
            log::warn!(
                "Not proposing in round {} at height {}: {}",
                round,
                self.state.height,
                err
            );
            return Ok(());
        }

        let data = ProposalData {
            value,
            round_change_justification: round_changes,
            prepare_justification,
        };
        self.propose(ctx, round, data, output);

        Ok(())
    }

    /// If a partial quorum of operators asked to change to rounds after the current one, move to the
    /// lowest of those rounds and ask to change to it too.
    fn upon_round_change_speedup<V: ValueCheck, S: SignatureScheme>(
        &mut self,
        ctx: &InstanceContext<V, S>,
        output: &mut InstanceOutput,
    ) {
        let (signers, lowest_round) = self
            .state
            .quorum_set
            .signers_after_round(MessageType::RoundChange, self.state.round);
        let lowest_round = match lowest_round {
            Some(lowest_round) if signers.len() >= ctx.committee.partial_quorum() => lowest_round,
            _ => return,
        };

        self.change_round(ctx, lowest_round, ChangeRoundCause::Speedup);
        self.broadcast_round_change(ctx, lowest_round, output);
    }

    fn change_round<V: ValueCheck, S: SignatureScheme>(
        &mut self,
        ctx: &InstanceContext<V, S>,
        round: Round,
        cause: ChangeRoundCause,
    ) {
        self.state.round = round;
        Event::ChangeRound(ChangeRoundEvent {
            timestamp: SystemTime::now(),
            height: self.state.height,
            round,
            cause,
        })
        .publish(ctx.event_handlers);
    }

    /* ↓↓↓ Emissions ↓↓↓ */

    fn propose<V: ValueCheck, S: SignatureScheme>(
        &mut self,
        ctx: &InstanceContext<V, S>,
        round: Round,
        data: ProposalData,
        output: &mut InstanceOutput,
    ) {
        self.state.sent_proposals.insert(round);
        let proposal = self.sign(ctx, round, MessageData::Proposal(data));
        Event::Propose(ProposeEvent {
            timestamp: SystemTime::now(),
            proposal: proposal.clone(),
        })
        .publish(ctx.event_handlers);
        output.broadcasts.push(proposal);
    }

    /// Broadcast this replica's RoundChange for `round`, at most once per round. The RoundChange
    /// reports the highest prepared round, with the Prepares that prepared it.
    fn broadcast_round_change<V: ValueCheck, S: SignatureScheme>(
        &mut self,
        ctx: &InstanceContext<V, S>,
        round: Round,
        output: &mut InstanceOutput,
    ) {
        if !self.state.sent_round_changes.insert(round) {
            return;
        }

        let data = match &self.state.last_prepared {
            Some((prepared_round, prepared_value)) => RoundChangeData {
                prepared_value: prepared_value.clone(),
                prepared_round: *prepared_round,
                prepare_justification: self
                    .state
                    .quorum_set
                    .messages(MessageType::Prepare, *prepared_round, &prepared_value.root())
                    .to_vec(),
            },
            None => RoundChangeData::unprepared(),
        };

        let round_change = self.sign(ctx, round, MessageData::RoundChange(data));
        Event::RoundChange(RoundChangeEvent {
            timestamp: SystemTime::now(),
            round_change: round_change.clone(),
        })
        .publish(ctx.event_handlers);
        output.broadcasts.push(round_change);
    }

    fn sign<V: ValueCheck, S: SignatureScheme>(
        &self,
        ctx: &InstanceContext<V, S>,
        round: Round,
        data: MessageData,
    ) -> SignedMessage {
        let message = Message::new(self.state.height, round, ctx.identifier, &data);
        SignedMessage::sign(message, ctx.me, ctx.signer)
    }

    /// Aggregate `completing` and the Commits already collected for its round and `value_root` into
    /// the decided message, if their distinct signers form a quorum.
    ///
    /// Only Commits of one round sign the same message, so only they can be aggregated. Among them,
    /// the signers of the chosen Commits must not overlap, since an aggregate counts each signer once.
    fn aggregate_commits<V: ValueCheck, S: SignatureScheme>(
        &self,
        ctx: &InstanceContext<V, S>,
        completing: &SignedMessage,
        value_root: &CryptoHash,
    ) -> Result<Option<SignedMessage>, SignatureError> {
        let quorum = ctx.committee.quorum();

        // No round can reach a quorum the merged signers have not.
        if !self
            .state
            .quorum_set
            .has_decided_quorum(value_root, &completing.signers, ctx.committee)
        {
            return Ok(None);
        }

        let mut commits: Vec<&SignedMessage> = self
            .state
            .quorum_set
            .messages(MessageType::Commit, completing.message.round, value_root)
            .iter()
            .collect();
        commits.push(completing);
        let (signers, selected) = longest_unique_signers(&commits);
        if signers.len() < quorum {
            log::debug!(
                "commits for round {} cover {} distinct signers, short of {}",
                completing.message.round.int(),
                signers.len(),
                quorum
            );
            return Ok(None);
        }

        let signatures: Vec<&SignatureBytes> = selected.iter().map(|commit| &commit.signature).collect();
        let signature = ctx.signer.aggregate(&signatures)?;
        Ok(Some(SignedMessage {
            signature,
            signers: signers.into_iter().collect(),
            message: completing.message.clone(),
        }))
    }
}
