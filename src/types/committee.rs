/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that store information about the committee of operators that runs consensus.

use std::{
    fmt::{self, Display, Formatter},
    slice,
};

use super::data_types::{OperatorId, PublicKeyBytes};

/// A committee member: a stable numeric id and the public key its signatures verify against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operator {
    pub id: OperatorId,
    pub public_key: PublicKeyBytes,
}

impl Operator {
    pub fn new(id: OperatorId, public_key: PublicKeyBytes) -> Self {
        Self { id, public_key }
    }
}

/// Fixed set of operators that runs every instance of a [`Controller`](crate::controller::Controller).
///
/// ## Ordering of operators
///
/// `Committee` internally maintains its operators in ascending order of their [`OperatorId`]s. Proposer
/// selection indexes into this order, so every replica must be configured with the same operators, but
/// not necessarily listed in the same order.
///
/// ## Thresholds
///
/// With `n` operators, a committee tolerates `f = (n - 1) / 3` faulty operators. The [`quorum`](Self::quorum)
/// is `floor(2n/3) + 1` signers, which is `2f + 1` when `n = 3f + 1`, and the
/// [`partial_quorum`](Self::partial_quorum) is `f + 1`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Committee {
    // Operators are included here in ascending order of id.
    operators: Vec<Operator>,
}

impl Committee {
    /// Create a committee out of `operators`, which may be given in any order.
    ///
    /// Fails if `operators` is empty, contains the reserved id 0, or contains an id twice.
    pub fn new(operators: impl IntoIterator<Item = Operator>) -> Result<Committee, CommitteeError> {
        let mut committee = Committee {
            operators: Vec::new(),
        };
        for operator in operators {
            committee.put(operator)?;
        }

        if committee.operators.is_empty() {
            return Err(CommitteeError::Empty);
        }

        Ok(committee)
    }

    /// Put `operator` into the committee in a position that preserves the
    /// [ordering of operators](Self#ordering-of-operators).
    fn put(&mut self, operator: Operator) -> Result<(), CommitteeError> {
        if operator.id.int() == 0 {
            return Err(CommitteeError::ReservedId);
        }

        match self.operators.binary_search_by(|o| o.id.cmp(&operator.id)) {
            Ok(_) => Err(CommitteeError::DuplicateOperator { id: operator.id }),
            Err(insert_pos) => {
                self.operators.insert(insert_pos, operator);
                Ok(())
            }
        }
    }

    /// Get the operator with the given `id`, if it is in the committee.
    pub fn operator(&self, id: &OperatorId) -> Option<&Operator> {
        self.operators
            .binary_search_by(|o| o.id.cmp(id))
            .ok()
            .map(|pos| &self.operators[pos])
    }

    /// Check whether the committee contains an operator with the given `id`.
    pub fn contains(&self, id: &OperatorId) -> bool {
        self.operator(id).is_some()
    }

    /// Get the operator at `position` in the [ordering of operators](Self#ordering-of-operators).
    pub fn get(&self, position: usize) -> Option<&Operator> {
        self.operators.get(position)
    }

    /// Get an iterator through the operators which walks through them in ascending order of id.
    pub fn operators(&self) -> slice::Iter<Operator> {
        self.operators.iter()
    }

    /// Get the number of operators in the committee.
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Check whether the committee is empty. Committees built with [`new`](Self::new) never are.
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Maximum number of faulty operators the committee tolerates.
    pub fn faulty(&self) -> usize {
        (self.len().saturating_sub(1)) / 3
    }

    /// Minimum number of distinct signers that forms a quorum.
    pub fn quorum(&self) -> usize {
        self.len() * 2 / 3 + 1
    }

    /// Minimum number of distinct signers that guarantees at least one honest signer.
    pub fn partial_quorum(&self) -> usize {
        self.faulty() + 1
    }
}

/// Error when building a [`Committee`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitteeError {
    Empty,
    ReservedId,
    DuplicateOperator { id: OperatorId },
}

impl Display for CommitteeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CommitteeError::Empty => write!(f, "committee has no operators"),
            CommitteeError::ReservedId => write!(f, "operator id 0 is reserved"),
            CommitteeError::DuplicateOperator { id } => {
                write!(f, "operator {} appears more than once", id)
            }
        }
    }
}

impl std::error::Error for CommitteeError {}
