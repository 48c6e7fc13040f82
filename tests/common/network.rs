use std::sync::{Arc, Mutex};

use qbft_rs::{
    messages::SignedMessage,
    networking::{Network, NetworkError},
    types::{data_types::OperatorId, message_id::MessageId},
};

/// A mock network stub that appends every broadcast to an outbox shared by all the stubs of one mock
/// network. Tests deliver the contents of the outbox themselves.
#[derive(Clone)]
pub(crate) struct NetworkStub {
    me: OperatorId,
    outbox: Arc<Mutex<Vec<(OperatorId, MessageId, Vec<u8>)>>>,
}

impl NetworkStub {
    /// Create a stub with its own outbox.
    pub(crate) fn new(me: OperatorId) -> NetworkStub {
        NetworkStub {
            me,
            outbox: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get every message broadcast so far through any stub sharing this stub's outbox, without
    /// removing them.
    pub(crate) fn sent(&self) -> Vec<SignedMessage> {
        self.outbox
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, bytes)| SignedMessage::decode(bytes).unwrap())
            .collect()
    }

    /// Remove and return every message in the outbox, together with the operator that broadcast it.
    pub(crate) fn drain(&self) -> Vec<(OperatorId, SignedMessage)> {
        self.outbox
            .lock()
            .unwrap()
            .drain(..)
            .map(|(origin, _, bytes)| (origin, SignedMessage::decode(&bytes).unwrap()))
            .collect()
    }

    /// Get the identifiers the broadcasts were made for.
    pub(crate) fn sent_identifiers(&self) -> Vec<MessageId> {
        self.outbox
            .lock()
            .unwrap()
            .iter()
            .map(|(_, msg_id, _)| *msg_id)
            .collect()
    }
}

impl Network for NetworkStub {
    fn broadcast(&mut self, msg_id: &MessageId, encoded_message: Vec<u8>) -> Result<(), NetworkError> {
        self.outbox
            .lock()
            .unwrap()
            .push((self.me, *msg_id, encoded_message));
        Ok(())
    }
}

/// Create one stub per operator in `operators`, all sharing the same outbox.
pub(crate) fn mock_network(operators: impl Iterator<Item = OperatorId>) -> Vec<NetworkStub> {
    let outbox = Arc::new(Mutex::new(Vec::new()));
    operators
        .map(|me| NetworkStub {
            me,
            outbox: outbox.clone(),
        })
        .collect()
}

/// A network that rejects every broadcast.
pub(crate) struct DownNetwork;

impl Network for DownNetwork {
    fn broadcast(&mut self, _: &MessageId, _: Vec<u8>) -> Result<(), NetworkError> {
        Err(NetworkError::new("network is down"))
    }
}
