/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The error type returned by every fallible operation of the [`Controller`](crate::controller::Controller)
//! and the [`Instance`](crate::qbft::Instance).
//!
//! Errors are returned to the caller and never abort the process. An error leaves the state of the
//! instance that returned it as it was before the call, except where noted on [`QbftError::Network`].

use std::fmt::{self, Display, Formatter};

use crate::{
    app::InvalidValue,
    messages::{validation::ValidationError, DecodeError},
    networking::NetworkError,
    storage::StorageError,
    types::{crypto_primitives::SignatureError, data_types::Height},
};

#[derive(Debug)]
pub enum QbftError {
    /// Bytes did not decode into the expected wire structure.
    Decode(DecodeError),

    /// A message is inadmissible.
    Validation(ValidationError),

    /// The request does not fit the current state of the controller or instance.
    State(StateError),

    /// The network did not accept an emitted message. State changes caused by the message being
    /// processed have already been applied.
    Network(NetworkError),

    Storage(StorageError),

    /// The signature scheme failed to aggregate Commit signatures. The Commit that completed the
    /// quorum is not collected, so processing it again retries the aggregation.
    Signature(SignatureError),
}

/// Requests that do not fit the current state of a controller or an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The instance already decided.
    PostDecided { height: Height },

    /// No instance for `height` is running or retained.
    NoInstanceRunning { height: Height },

    /// The message is for another duty than the controller's.
    InvalidIdentifier,

    /// A new instance was requested while the instance at `height` is still undecided.
    PreviousInstanceNotDecided { height: Height },
}

impl Display for QbftError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            QbftError::Decode(err) => Display::fmt(err, f),
            QbftError::Validation(err) => Display::fmt(err, f),
            QbftError::State(err) => Display::fmt(err, f),
            QbftError::Network(err) => Display::fmt(err, f),
            QbftError::Storage(err) => Display::fmt(err, f),
            QbftError::Signature(err) => Display::fmt(err, f),
        }
    }
}

impl std::error::Error for QbftError {}

impl Display for StateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StateError::PostDecided { height } => {
                write!(f, "instance at height {} already decided", height)
            }
            StateError::NoInstanceRunning { height } => {
                write!(f, "no instance at height {}", height)
            }
            StateError::InvalidIdentifier => write!(f, "message identifier does not match"),
            StateError::PreviousInstanceNotDecided { height } => {
                write!(f, "instance at height {} has not decided", height)
            }
        }
    }
}

impl std::error::Error for StateError {}

impl From<DecodeError> for QbftError {
    fn from(value: DecodeError) -> Self {
        QbftError::Decode(value)
    }
}

impl From<ValidationError> for QbftError {
    fn from(value: ValidationError) -> Self {
        QbftError::Validation(value)
    }
}

impl From<StateError> for QbftError {
    fn from(value: StateError) -> Self {
        QbftError::State(value)
    }
}

impl From<NetworkError> for QbftError {
    fn from(value: NetworkError) -> Self {
        QbftError::Network(value)
    }
}

impl From<StorageError> for QbftError {
    fn from(value: StorageError) -> Self {
        QbftError::Storage(value)
    }
}

impl From<SignatureError> for QbftError {
    fn from(value: SignatureError) -> Self {
        QbftError::Signature(value)
    }
}

impl From<InvalidValue> for QbftError {
    fn from(value: InvalidValue) -> Self {
        QbftError::Validation(ValidationError::BadValue {
            reason: value.reason,
        })
    }
}
