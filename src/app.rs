/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! [Trait definition](ValueCheck) for the application-level check that decides which values may be
//! agreed on.
//!
//! The check is invoked on the value a replica starts an instance with, on every proposed value before
//! it is accepted, and on every value the replica would propose after a round change. Implementations
//! must be deterministic: every honest replica must reach the same verdict for the same value.

use std::fmt::{self, Display, Formatter};

use crate::types::data_types::Value;

pub trait ValueCheck {
    /// Check whether `value` may be decided.
    fn check_value(&self, value: &Value) -> Result<(), InvalidValue>;
}

impl<F> ValueCheck for F
where
    F: Fn(&Value) -> Result<(), InvalidValue>,
{
    fn check_value(&self, value: &Value) -> Result<(), InvalidValue> {
        self(value)
    }
}

/// Verdict of a [`ValueCheck`] that rejects a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidValue {
    pub reason: String,
}

impl InvalidValue {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Display for InvalidValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value: {}", self.reason)
    }
}

impl std::error::Error for InvalidValue {}
