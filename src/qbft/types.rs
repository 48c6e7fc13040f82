/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types specific to the QBFT instance state machine: the [`QuorumSet`] that collects signed
//! messages, and the [`InstanceState`] it lives in.

use std::collections::{BTreeMap, BTreeSet};

use borsh::BorshSerialize;

use crate::{
    messages::{validation::ValidationError, MessageType, SignedMessage},
    types::{
        committee::Committee,
        data_types::{CryptoHash, Height, OperatorId, Round, Value},
    },
};

/// Collects signed messages of one instance and answers quorum questions about them.
///
/// ## Buckets
///
/// Messages are stored in buckets keyed by `(message type, round, root)`, each with the set of
/// distinct operators that signed the messages in it. For Prepares and Commits the root is the root of
/// the value; for RoundChanges it is the root of the payload.
///
/// ## Deduplication
///
/// An operator contributes at most once per `(message type, round)`, whatever the content of its
/// messages. A message none of whose signers is new for its type and round is rejected with
/// [`DuplicateMessage`](ValidationError::DuplicateMessage) and leaves the set unchanged. An aggregate
/// Commit that overlaps with earlier Commits only contributes its new signers.
///
/// ## Merged commits
///
/// Commit signers are additionally merged across rounds, per value root, as they arrive. The merged
/// set bounds what any single round can aggregate: a round cannot hold a quorum of Commit signers for
/// a root unless the merged set does.
#[derive(Clone, Debug, Default, BorshSerialize)]
pub struct QuorumSet {
    seen: BTreeMap<(MessageType, Round), BTreeSet<OperatorId>>,
    buckets: BTreeMap<(MessageType, Round, CryptoHash), Bucket>,
    merged_commits: BTreeMap<CryptoHash, BTreeSet<OperatorId>>,
}

#[derive(Clone, Debug, Default, BorshSerialize)]
struct Bucket {
    signers: BTreeSet<OperatorId>,
    // In order of arrival.
    messages: Vec<SignedMessage>,
}

impl QuorumSet {
    pub fn new() -> QuorumSet {
        QuorumSet::default()
    }

    /// Add `msg` to the bucket for its type, its round and `root`, and return the number of distinct
    /// signers in that bucket afterwards.
    ///
    /// Fails without changing the set if any signer is outside `committee`, or if no signer of `msg` is
    /// new for the message's type and round.
    pub fn add(
        &mut self,
        msg: &SignedMessage,
        root: CryptoHash,
        committee: &Committee,
    ) -> Result<usize, ValidationError> {
        self.check(msg, committee)?;

        let msg_type = msg.message.msg_type;
        let round = msg.message.round;
        self.seen
            .entry((msg_type, round))
            .or_default()
            .extend(msg.signers.iter().copied());

        if msg_type == MessageType::Commit {
            self.merged_commits
                .entry(root)
                .or_default()
                .extend(msg.signers.iter().copied());
        }

        let bucket = self.buckets.entry((msg_type, round, root)).or_default();
        bucket.signers.extend(msg.signers.iter().copied());
        bucket.messages.push(msg.clone());
        Ok(bucket.signers.len())
    }

    /// Check that [`add`](Self::add) would accept `msg`, without adding it.
    pub fn check(&self, msg: &SignedMessage, committee: &Committee) -> Result<(), ValidationError> {
        let msg_type = msg.message.msg_type;
        let round = msg.message.round;

        if let Some(unknown) = msg.signers.iter().find(|signer| !committee.contains(signer)) {
            return Err(ValidationError::UnknownSigner { signer: *unknown });
        }

        let is_duplicate = self
            .seen
            .get(&(msg_type, round))
            .map_or(msg.signers.is_empty(), |seen| {
                msg.signers.iter().all(|signer| seen.contains(signer))
            });
        if is_duplicate {
            return Err(ValidationError::DuplicateMessage { msg_type, round });
        }

        Ok(())
    }

    /// Get the number of distinct signers in the bucket for `(msg_type, round, root)`.
    pub fn signer_count(&self, msg_type: MessageType, round: Round, root: &CryptoHash) -> usize {
        self.buckets
            .get(&(msg_type, round, *root))
            .map_or(0, |bucket| bucket.signers.len())
    }

    /// Check whether the bucket for `(msg_type, round, root)` holds a quorum of distinct signers.
    pub fn has_quorum(
        &self,
        msg_type: MessageType,
        round: Round,
        root: &CryptoHash,
        committee: &Committee,
    ) -> bool {
        self.signer_count(msg_type, round, root) >= committee.quorum()
    }

    /// Get the messages in the bucket for `(msg_type, round, root)`, in order of arrival.
    pub fn messages(&self, msg_type: MessageType, round: Round, root: &CryptoHash) -> &[SignedMessage] {
        self.buckets
            .get(&(msg_type, round, *root))
            .map(|bucket| bucket.messages.as_slice())
            .unwrap_or(&[])
    }

    /// Get every message of `msg_type` in `round`, whatever its root.
    pub fn messages_for_round(&self, msg_type: MessageType, round: Round) -> Vec<&SignedMessage> {
        let lowest = (msg_type, round, CryptoHash::new([u8::MIN; 32]));
        let highest = (msg_type, round, CryptoHash::new([u8::MAX; 32]));
        self.buckets
            .range(lowest..=highest)
            .flat_map(|(_, bucket)| bucket.messages.iter())
            .collect()
    }

    /// Get the number of distinct operators that sent a message of `msg_type` in `round`.
    pub fn round_signer_count(&self, msg_type: MessageType, round: Round) -> usize {
        self.seen
            .get(&(msg_type, round))
            .map_or(0, |signers| signers.len())
    }

    /// Get the distinct operators that sent a message of `msg_type` in any round after `round`,
    /// together with the lowest such round.
    pub fn signers_after_round(
        &self,
        msg_type: MessageType,
        round: Round,
    ) -> (BTreeSet<OperatorId>, Option<Round>) {
        let mut signers = BTreeSet::new();
        let mut lowest_round = None;
        for ((seen_type, seen_round), seen_signers) in &self.seen {
            if *seen_type == msg_type && *seen_round > round {
                signers.extend(seen_signers.iter().copied());
                lowest_round = Some(lowest_round.map_or(*seen_round, |r: Round| r.min(*seen_round)));
            }
        }
        (signers, lowest_round)
    }

    /// Get the Commit signers for `root`, merged across all rounds.
    pub fn merged_commit_signers(&self, root: &CryptoHash) -> BTreeSet<OperatorId> {
        self.merged_commits.get(root).cloned().unwrap_or_default()
    }

    /// Check whether the merged Commit signers for `root`, with `extra` signers added, form a quorum.
    ///
    /// This is necessary for a decision on `root`, but not enough: a decision also needs a quorum of
    /// aggregatable Commits within one round.
    pub fn has_decided_quorum(
        &self,
        root: &CryptoHash,
        extra: &[OperatorId],
        committee: &Committee,
    ) -> bool {
        let merged = self.merged_commits.get(root);
        let new_signers = extra
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|signer| merged.map_or(true, |merged| !merged.contains(*signer)))
            .count();
        merged.map_or(0, BTreeSet::len) + new_signers >= committee.quorum()
    }
}

/// Select messages from `msgs` whose signer sets are pairwise disjoint, covering as many signers as
/// the search finds, and return the covered signers with the selected messages.
///
/// Aggregate signatures cannot count a signer twice, so overlapping aggregates cannot all be combined.
/// The search starts once from every message, then adds every later message (wrapping around) that
/// does not overlap what is already selected. The first start with the most signers wins.
pub fn longest_unique_signers<'a>(
    msgs: &[&'a SignedMessage],
) -> (BTreeSet<OperatorId>, Vec<&'a SignedMessage>) {
    let mut best: (BTreeSet<OperatorId>, Vec<&'a SignedMessage>) = (BTreeSet::new(), Vec::new());
    for start in 0..msgs.len() {
        let mut signers = BTreeSet::new();
        let mut selected = Vec::new();
        for msg in msgs[start..].iter().chain(msgs[..start].iter()) {
            if msg.signers.iter().any(|signer| signers.contains(signer)) {
                continue;
            }
            signers.extend(msg.signers.iter().copied());
            selected.push(*msg);
        }
        if signers.len() > best.0.len() {
            best = (signers, selected);
        }
    }
    best
}

/// A Proposal the instance accepted for some round.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize)]
pub struct AcceptedProposal {
    pub value: Value,
    pub value_root: CryptoHash,
    pub message: SignedMessage,
}

/// The outcome of an instance that reached a Commit quorum.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize)]
pub struct Decided {
    pub value: Value,
    /// Round of the Commit that completed the quorum.
    pub round: Round,
    /// Commit-typed message signed by the decided signers with their aggregate signature.
    pub message: SignedMessage,
}

/// Where an instance is in the Propose, Prepare, Commit sequence of its current round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    AwaitingProposal(Round),
    Proposed(Round),
    Prepared(Round),
    Decided,
}

/// Everything an [`Instance`](super::Instance) knows. Only changed by accepted messages, the start of
/// the instance, and round timeouts.
#[derive(Clone, Debug, BorshSerialize)]
pub struct InstanceState {
    pub(crate) height: Height,
    pub(crate) round: Round,
    pub(crate) started: bool,
    pub(crate) start_value: Value,
    pub(crate) proposals: BTreeMap<Round, AcceptedProposal>,
    /// Highest round with a Prepare quorum, and the value prepared in it.
    pub(crate) last_prepared: Option<(Round, Value)>,
    pub(crate) quorum_set: QuorumSet,
    pub(crate) sent_proposals: BTreeSet<Round>,
    pub(crate) sent_commits: BTreeSet<Round>,
    pub(crate) sent_round_changes: BTreeSet<Round>,
    pub(crate) decided: Option<Decided>,
}

impl InstanceState {
    pub(crate) fn new(height: Height, start_value: Value) -> InstanceState {
        InstanceState {
            height,
            round: Round::first(),
            started: false,
            start_value,
            proposals: BTreeMap::new(),
            last_prepared: None,
            quorum_set: QuorumSet::new(),
            sent_proposals: BTreeSet::new(),
            sent_commits: BTreeSet::new(),
            sent_round_changes: BTreeSet::new(),
            decided: None,
        }
    }

    pub fn height(&self) -> Height {
        self.height
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn start_value(&self) -> &Value {
        &self.start_value
    }

    /// Get the proposal accepted in `round`, if any.
    pub fn accepted_proposal(&self, round: Round) -> Option<&AcceptedProposal> {
        self.proposals.get(&round)
    }

    /// Get the highest prepared round and the value prepared in it, if any.
    pub fn last_prepared(&self) -> Option<(Round, &Value)> {
        self.last_prepared
            .as_ref()
            .map(|(round, value)| (*round, value))
    }

    pub fn quorum_set(&self) -> &QuorumSet {
        &self.quorum_set
    }

    pub fn decided(&self) -> Option<&Decided> {
        self.decided.as_ref()
    }

    pub fn is_decided(&self) -> bool {
        self.decided.is_some()
    }

    pub fn phase(&self) -> Phase {
        if self.decided.is_some() {
            Phase::Decided
        } else if !self.started {
            Phase::NotStarted
        } else if matches!(self.last_prepared, Some((round, _)) if round == self.round) {
            Phase::Prepared(self.round)
        } else if self.proposals.contains_key(&self.round) {
            Phase::Proposed(self.round)
        } else {
            Phase::AwaitingProposal(self.round)
        }
    }

    /// Get the SHA256 hash of the borsh encoding of this state.
    pub fn root(&self) -> CryptoHash {
        CryptoHash::digest(&self.try_to_vec().unwrap())
    }
}
