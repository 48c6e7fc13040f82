/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the controller's
//! [config](crate::controller::Configuration).
//!
//! qbft_rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReceivePrepare](crate::events::ReceivePrepareEvent) is printed:
//!
//! ```text
//! ReceivePrepare, 1701329264, 3, 12, 1, fNGCJyk
//! ```
//!
//! In the snippet:
//! - The third value is the id of the operator that sent the Prepare.
//! - The fourth and fifth values are the height and round of the Prepare.
//! - The sixth value is the first seven characters of the Base64 encoding of the root of the prepared
//!   value.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use log;
use std::time::SystemTime;

use crate::{
    events::*,
    messages::{MessageData, SignedMessage},
    types::data_types::{CryptoHash, OperatorId},
};

// Names of each event in PascalCase for printing:
pub const START_INSTANCE: &str = "StartInstance";

pub const PROPOSE: &str = "Propose";
pub const PREPARE: &str = "Prepare";
pub const COMMIT: &str = "Commit";
pub const ROUND_CHANGE: &str = "RoundChange";

pub const RECEIVE_PROPOSAL: &str = "ReceiveProposal";
pub const RECEIVE_PREPARE: &str = "ReceivePrepare";
pub const RECEIVE_COMMIT: &str = "ReceiveCommit";
pub const RECEIVE_ROUND_CHANGE: &str = "ReceiveRoundChange";

pub const ACCEPT_PROPOSAL: &str = "AcceptProposal";
pub const UPDATE_PREPARED: &str = "UpdatePrepared";
pub const CHANGE_ROUND: &str = "ChangeRound";
pub const DECIDE: &str = "Decide";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for StartInstanceEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_instance_event: &StartInstanceEvent| {
            log::info!(
                "{}, {}, {}, {}",
                START_INSTANCE,
                secs_since_unix_epoch(start_instance_event.timestamp),
                start_instance_event.height,
                first_seven_base64_chars(&start_instance_event.value.root().bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ProposeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |propose_event: &ProposeEvent| {
            log::info!(
                "{}, {}, {}",
                PROPOSE,
                secs_since_unix_epoch(propose_event.timestamp),
                message_info(&propose_event.proposal)
            )
        };
        Box::new(logger)
    }
}

impl Logger for PrepareEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |prepare_event: &PrepareEvent| {
            log::info!(
                "{}, {}, {}",
                PREPARE,
                secs_since_unix_epoch(prepare_event.timestamp),
                message_info(&prepare_event.prepare)
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_event: &CommitEvent| {
            log::info!(
                "{}, {}, {}",
                COMMIT,
                secs_since_unix_epoch(commit_event.timestamp),
                message_info(&commit_event.commit)
            )
        };
        Box::new(logger)
    }
}

impl Logger for RoundChangeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |round_change_event: &RoundChangeEvent| {
            log::info!(
                "{}, {}, {}",
                ROUND_CHANGE,
                secs_since_unix_epoch(round_change_event.timestamp),
                message_info(&round_change_event.round_change)
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_proposal_event: &ReceiveProposalEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_PROPOSAL,
                secs_since_unix_epoch(receive_proposal_event.timestamp),
                receive_proposal_event.origin,
                message_info(&receive_proposal_event.proposal)
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceivePrepareEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_prepare_event: &ReceivePrepareEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_PREPARE,
                secs_since_unix_epoch(receive_prepare_event.timestamp),
                receive_prepare_event.origin,
                message_info(&receive_prepare_event.prepare)
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveCommitEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_commit_event: &ReceiveCommitEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_COMMIT,
                secs_since_unix_epoch(receive_commit_event.timestamp),
                signers_info(&receive_commit_event.signers),
                message_info(&receive_commit_event.commit)
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveRoundChangeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_round_change_event: &ReceiveRoundChangeEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_ROUND_CHANGE,
                secs_since_unix_epoch(receive_round_change_event.timestamp),
                receive_round_change_event.origin,
                message_info(&receive_round_change_event.round_change)
            )
        };
        Box::new(logger)
    }
}

impl Logger for AcceptProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |accept_proposal_event: &AcceptProposalEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                ACCEPT_PROPOSAL,
                secs_since_unix_epoch(accept_proposal_event.timestamp),
                accept_proposal_event.height,
                accept_proposal_event.round,
                first_seven_base64_chars(&accept_proposal_event.value_root.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdatePreparedEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_prepared_event: &UpdatePreparedEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                UPDATE_PREPARED,
                secs_since_unix_epoch(update_prepared_event.timestamp),
                update_prepared_event.height,
                update_prepared_event.round,
                first_seven_base64_chars(&update_prepared_event.value_root.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ChangeRoundEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |change_round_event: &ChangeRoundEvent| {
            log::info!(
                "{}, {}, {}, {}, {:?}",
                CHANGE_ROUND,
                secs_since_unix_epoch(change_round_event.timestamp),
                change_round_event.height,
                change_round_event.round,
                change_round_event.cause
            )
        };
        Box::new(logger)
    }
}

impl Logger for DecideEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |decide_event: &DecideEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                DECIDE,
                secs_since_unix_epoch(decide_event.timestamp),
                decide_event.height,
                decide_event.round,
                first_seven_base64_chars(&decide_event.value.root().bytes()),
                signers_info(&decide_event.signers)
            )
        };
        Box::new(logger)
    }
}

fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

/// Height, round, and the root of the value a message carries (or of the message, for RoundChanges
/// without a prepared value).
fn message_info(msg: &SignedMessage) -> String {
    let root = match msg.message.payload() {
        Ok(MessageData::Proposal(data)) => data.value.root(),
        Ok(MessageData::Prepare(data)) => data.value.root(),
        Ok(MessageData::Commit(data)) => data.value.root(),
        Ok(MessageData::RoundChange(data)) if data.prepared() => data.prepared_value.root(),
        Ok(MessageData::RoundChange(_)) | Err(_) => msg.root(),
    };
    format!(
        "{}, {}, {}",
        msg.message.height,
        msg.message.round,
        root_info(&root)
    )
}

fn root_info(root: &CryptoHash) -> String {
    first_seven_base64_chars(&root.bytes())
}

fn signers_info(signers: &[OperatorId]) -> String {
    let ids: Vec<String> = signers.iter().map(|signer| signer.to_string()).collect();
    ids.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_prefix() {
        assert_eq!(first_seven_base64_chars(&[0u8; 32]), "AAAAAAA");
        assert_eq!(first_seven_base64_chars(&[255u8]), "/w");
    }

    #[test]
    fn signers_are_space_separated() {
        let signers = [OperatorId::new(1), OperatorId::new(3), OperatorId::new(4)];
        assert_eq!(signers_info(&signers), "1 3 4");
    }
}
