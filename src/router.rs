/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Dispatch of incoming messages to the controller of the duty role they belong to.
//!
//! A validator runs one [`Controller`] per duty role. The [`RoleRouter`] owns them, and routes each
//! message by the [`Role`] encoded in the last bytes of its identifier.

use std::collections::BTreeMap;

use crate::{
    app::ValueCheck,
    controller::Controller,
    errors::{QbftError, StateError},
    messages::SignedMessage,
    networking::Network,
    storage::Storage,
    types::{crypto_primitives::SignatureScheme, message_id::MessageId, message_id::Role},
};

/// Owns one controller per duty role.
pub struct RoleRouter<N: Network, S: Storage, V: ValueCheck, K: SignatureScheme> {
    controllers: BTreeMap<Role, Controller<N, S, V, K>>,
}

impl<N: Network, S: Storage, V: ValueCheck, K: SignatureScheme> RoleRouter<N, S, V, K> {
    /// Create a router from a list of `(role, controller)` pairs. A later controller for the same role
    /// replaces an earlier one.
    pub fn new(controllers: impl IntoIterator<Item = (Role, Controller<N, S, V, K>)>) -> Self {
        Self {
            controllers: controllers.into_iter().collect(),
        }
    }

    /// Process `msg` with the controller of the role in its identifier.
    ///
    /// Fails with [`InvalidIdentifier`](StateError::InvalidIdentifier) if the identifier is malformed,
    /// encodes no known role, or encodes a role the router has no controller for.
    pub fn process_msg(&mut self, msg: &SignedMessage) -> Result<Option<SignedMessage>, QbftError> {
        self.controller_for_msg(msg)?.process_msg(msg)
    }

    /// Decode `bytes` as a [`SignedMessage`] and [process](Self::process_msg) it.
    pub fn process_encoded_msg(&mut self, bytes: &[u8]) -> Result<Option<SignedMessage>, QbftError> {
        let msg = SignedMessage::decode(bytes)?;
        self.process_msg(&msg)
    }

    pub fn controller(&self, role: Role) -> Option<&Controller<N, S, V, K>> {
        self.controllers.get(&role)
    }

    pub fn controller_mut(&mut self, role: Role) -> Option<&mut Controller<N, S, V, K>> {
        self.controllers.get_mut(&role)
    }

    /// Get the roles this router has a controller for, in the order of their codes.
    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.controllers.keys().copied()
    }

    fn controller_for_msg(
        &mut self,
        msg: &SignedMessage,
    ) -> Result<&mut Controller<N, S, V, K>, QbftError> {
        let role = MessageId::from_bytes(&msg.message.identifier)
            .and_then(|msg_id| msg_id.role())
            .ok_or(StateError::InvalidIdentifier)?;
        self.controllers
            .get_mut(&role)
            .ok_or_else(|| StateError::InvalidIdentifier.into())
    }
}
