/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol for agreeing on the value of one height.
//!
//! ## Rounds
//!
//! An [`Instance`] proceeds in rounds, starting from [`Round::first`](crate::types::data_types::Round::first).
//! A round generally proceeds as follows:
//! 1. The proposer of the round (see [`roles`]) broadcasts a Proposal.
//! 2. Replicas accept the Proposal if it is justified and its value passes the
//!    [`ValueCheck`](crate::app::ValueCheck), then broadcast a Prepare for its value.
//! 3. On a quorum of Prepares for the value, replicas record the round as prepared and broadcast a
//!    Commit.
//! 4. On a quorum of Commits for the value in one round, replicas decide.
//!
//! ## Round changes
//!
//! If a round does not decide in time, the caller reports a round timeout, and the replica broadcasts
//! a RoundChange for the next round that reports its highest prepared round and value. The instance
//! moves to a later round when either:
//! - A quorum of RoundChanges for that round was received. The proposer of the round then proposes
//!   the highest prepared value reported among them, or its own start value if none reports one.
//! - RoundChanges for rounds after the current one were received from a partial quorum of operators.
//!   The instance moves to the lowest of those rounds.
//!
//! The justification rules that make a round change safe are in [`justification`].

pub(crate) mod implementation;
pub use implementation::Instance;

pub(crate) mod justification;

pub mod roles;

pub mod types;
