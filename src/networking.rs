/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! [Trait definition](Network) for pluggable peer-to-peer networking.
//!
//! qbft_rs does not open connections or retry sends. A [`Controller`](crate::controller::Controller)
//! hands every message it emits to its `Network` exactly once, already encoded, and expects the
//! network to deliver messages from peers (and the replica's own broadcasts) back into
//! [`process_msg`](crate::controller::Controller::process_msg) or
//! [`process_encoded_msg`](crate::controller::Controller::process_encoded_msg).

use std::fmt::{self, Display, Formatter};

use crate::types::message_id::MessageId;

pub trait Network {
    /// Send `encoded_message`, the borsh encoding of a
    /// [`SignedMessage`](crate::messages::SignedMessage) for the duty identified by `msg_id`, to all
    /// peers in the committee, including the local replica. Should not block.
    fn broadcast(&mut self, msg_id: &MessageId, encoded_message: Vec<u8>) -> Result<(), NetworkError>;
}

/// Error reported by a [`Network`] that could not accept a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkError {
    pub reason: String,
}

impl NetworkError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Display for NetworkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "network error: {}", self.reason)
    }
}

impl std::error::Error for NetworkError {}
