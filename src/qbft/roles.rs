/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that determine what roles a replica should play at any given height and round.

use crate::types::{
    committee::Committee,
    data_types::{Height, OperatorId, Round},
};

/// Select the operator that proposes in `round` of the instance at `height`.
///
/// ## Round-robin
///
/// The proposer of the first round of each height rotates through the committee (ordered by operator
/// id), and every later round of the same height moves on to the next operator:
///
/// `index = ((height mod n) + (round - 1)) mod n`
///
/// All replicas configured with the same committee agree on the result. `round` is assumed to be at
/// least [`Round::first`]; [`Round::none`] is treated like the first round.
pub fn select_proposer(height: Height, round: Round, committee: &Committee) -> OperatorId {
    let n = committee.len() as u64;
    let first_round_index = height.int() % n;
    let round_offset = round.int().saturating_sub(Round::first().int()) % n;
    let index = (first_round_index + round_offset) % n;

    // Safety: `Committee::new` guarantees that the committee is not empty, and `index < n`.
    committee.get(index as usize).unwrap().id
}

/// Determine whether `operator` should propose in `round` of the instance at `height`.
pub fn is_proposer(operator: OperatorId, height: Height, round: Round, committee: &Committee) -> bool {
    operator == select_proposer(height, round, committee)
}
