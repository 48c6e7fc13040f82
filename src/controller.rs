/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and drive the controller of one duty.
//!
//! A [`Controller`] runs the sequence of QBFT [instances](crate::qbft::Instance) of one duty, one
//! instance per height. It is the only entry point into the protocol: callers start instances, feed
//! it the signed messages they receive, and report round timeouts. The controller broadcasts what
//! its instances emit, and persists and broadcasts decided messages.
//!
//! ## Building a controller
//!
//! Here is an example that demonstrates how to build a controller using the builder pattern:
//!
//! ```ignore
//! let mut controller =
//!     ControllerSpec::builder()
//!     .network(network)
//!     .storage(storage)
//!     .value_check(value_check)
//!     .signer(signer)
//!     .configuration(configuration)
//!     .on_decide(decide_handler)
//!     .build()
//!     .start();
//! ```
//!
//! ### Required setters
//!
//! The required setters are for providing the trait implementations required to run a controller:
//! - `.network(...)`
//! - `.storage(...)`
//! - `.value_check(...)`
//! - `.signer(...)`
//! - `.configuration(...)`
//!
//! ### Optional setters
//!
//! The optional setters are for registering user-defined event handlers for events from
//! [crate::events]:
//! - `.on_start_instance(...)`
//! - `.on_propose(...)`
//! - `.on_prepare(...)`
//! - `.on_commit(...)`
//! - `.on_round_change(...)`
//! - `.on_receive_proposal(...)`
//! - `.on_receive_prepare(...)`
//! - `.on_receive_commit(...)`
//! - `.on_receive_round_change(...)`
//! - `.on_accept_proposal(...)`
//! - `.on_update_prepared(...)`
//! - `.on_change_round(...)`
//! - `.on_decide(...)`
//!
//! The controller's [configuration](Configuration) can also be defined using the builder pattern, for
//! example:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .me(OperatorId::new(1))
//!     .identifier(MessageId::new(&validator_public_key, Role::Attester))
//!     .committee(committee)
//!     .historical_instance_capacity(5)
//!     .log_events(true)
//!     .build();
//! ```
//!
//! ## Concurrency
//!
//! The controller has no internal locking and never blocks. Callers must serialize calls into it, for
//! example by feeding it from a single dispatch loop.

use std::collections::VecDeque;
use std::time::SystemTime;

use borsh::BorshSerialize;
use typed_builder::TypedBuilder;

use crate::{
    app::ValueCheck,
    errors::{QbftError, StateError},
    event_bus::*,
    events::*,
    messages::SignedMessage,
    networking::{Network, NetworkError},
    qbft::{
        implementation::{InstanceContext, InstanceOutput},
        Instance,
    },
    storage::{Storage, StorageError},
    types::{
        committee::Committee,
        crypto_primitives::SignatureScheme,
        data_types::{CryptoHash, Height, OperatorId, Value},
        message_id::MessageId,
    },
};

/// Number of instances a controller keeps when no capacity is configured.
pub const DEFAULT_HISTORICAL_INSTANCE_CAPACITY: usize = 5;

/// Stores the user-defined parameters required to run a controller, that is:
/// 1. The id of the operator running the controller.
/// 2. The identifier of the duty, included in every message.
/// 3. The committee of operators that run the duty.
/// 4. The historical instance capacity, which bounds the number of instances the controller keeps.
///    When a new instance would exceed it, the oldest instance is dropped, and messages for its height
///    are rejected from then on.
/// 5. The "Log Events" flag, if set to "true" then logs should be printed.
///
/// ## Log Events
///
/// qbft_rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`
    - `.identifier(...)`
    - `.committee(...)`
    - `.log_events(...)`

    Optional:
    - `.historical_instance_capacity(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the id of the operator running the controller. Required."))]
    pub me: OperatorId,
    #[builder(setter(doc = "Set the identifier of the duty run by the controller. Required."))]
    pub identifier: MessageId,
    #[builder(setter(doc = "Set the committee of operators that run the duty. Required."))]
    pub committee: Committee,
    #[builder(
        default = DEFAULT_HISTORICAL_INSTANCE_CAPACITY,
        setter(doc = "Set the maximum number of instances the controller keeps. Values below 1 are treated as 1. Optional.")
    )]
    pub historical_instance_capacity: usize,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

/// Stores all necessary parameters and trait implementations required to run a [Controller].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ControllerSpec]. On the builder call the following methods to construct a valid [ControllerSpec].

    Required:
    - `.network(...)`
    - `.storage(...)`
    - `.value_check(...)`
    - `.signer(...)`
    - `.configuration(...)`

    Optional:
    - `.on_start_instance(...)`
    - `.on_propose(...)`
    - `.on_prepare(...)`
    - `.on_commit(...)`
    - `.on_round_change(...)`
    - `.on_receive_proposal(...)`
    - `.on_receive_prepare(...)`
    - `.on_receive_commit(...)`
    - `.on_receive_round_change(...)`
    - `.on_accept_proposal(...)`
    - `.on_update_prepared(...)`
    - `.on_change_round(...)`
    - `.on_decide(...)`
"))]
pub struct ControllerSpec<N: Network, S: Storage, V: ValueCheck, K: SignatureScheme> {
    // Required parameters
    #[builder(setter(doc = "Set the implementation of broadcasting. The argument must implement the [Network](crate::networking::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the implementation of the storage of decided messages. The argument must implement the [Storage](crate::storage::Storage) trait. Required."))]
    storage: S,
    #[builder(setter(doc = "Set the check that decides which values may be agreed on. The argument must implement the [ValueCheck](crate::app::ValueCheck) trait. Required."))]
    value_check: V,
    #[builder(setter(doc = "Set the signature scheme used to sign, verify, and aggregate signatures. The argument must implement the [SignatureScheme](crate::types::crypto_primitives::SignatureScheme) trait. Required."))]
    signer: K,
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a controller. Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&StartInstanceEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartInstanceEvent>),
    doc = "Register a handler closure to be invoked after the controller starts a new instance. Optional."))]
    on_start_instance: Option<HandlerPtr<StartInstanceEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ProposeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ProposeEvent>),
    doc = "Register a handler closure to be invoked after the replica signs a proposal. Optional."))]
    on_propose: Option<HandlerPtr<ProposeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PrepareEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PrepareEvent>),
    doc = "Register a handler closure to be invoked after the replica signs a prepare. Optional."))]
    on_prepare: Option<HandlerPtr<PrepareEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitEvent>),
    doc = "Register a handler closure to be invoked after the replica signs a commit. Optional."))]
    on_commit: Option<HandlerPtr<CommitEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RoundChangeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RoundChangeEvent>),
    doc = "Register a handler closure to be invoked after the replica signs a round change. Optional."))]
    on_round_change: Option<HandlerPtr<RoundChangeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveProposalEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a proposal. Optional."))]
    on_receive_proposal: Option<HandlerPtr<ReceiveProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceivePrepareEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceivePrepareEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a prepare. Optional."))]
    on_receive_prepare: Option<HandlerPtr<ReceivePrepareEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveCommitEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveCommitEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a commit. Optional."))]
    on_receive_commit: Option<HandlerPtr<ReceiveCommitEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveRoundChangeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveRoundChangeEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a round change. Optional."))]
    on_receive_round_change: Option<HandlerPtr<ReceiveRoundChangeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AcceptProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AcceptProposalEvent>),
    doc = "Register a handler closure to be invoked after the replica accepts a proposal. Optional."))]
    on_accept_proposal: Option<HandlerPtr<AcceptProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdatePreparedEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdatePreparedEvent>),
    doc = "Register a handler closure to be invoked after the replica updates its highest prepared round. Optional."))]
    on_update_prepared: Option<HandlerPtr<UpdatePreparedEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ChangeRoundEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ChangeRoundEvent>),
    doc = "Register a handler closure to be invoked after the running instance moves to a later round. Optional."))]
    on_change_round: Option<HandlerPtr<ChangeRoundEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&DecideEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<DecideEvent>),
    doc = "Register a handler closure to be invoked after an instance decides. Optional."))]
    on_decide: Option<HandlerPtr<DecideEvent>>,
}

impl<N: Network, S: Storage, V: ValueCheck, K: SignatureScheme> ControllerSpec<N, S, V, K> {
    /// Create the [Controller] described by these parameters. The controller has no instances until
    /// [start_new_instance](Controller::start_new_instance) is called.
    pub fn start(self) -> Controller<N, S, V, K> {
        let event_handlers = EventHandlers::new(
            self.configuration.log_events,
            self.on_start_instance,
            self.on_propose,
            self.on_prepare,
            self.on_commit,
            self.on_round_change,
            self.on_receive_proposal,
            self.on_receive_prepare,
            self.on_receive_commit,
            self.on_receive_round_change,
            self.on_accept_proposal,
            self.on_update_prepared,
            self.on_change_round,
            self.on_decide,
        );

        Controller {
            config: self.configuration,
            network: self.network,
            storage: self.storage,
            value_check: self.value_check,
            signer: self.signer,
            instances: VecDeque::new(),
            event_handlers,
        }
    }
}

/// Runs the instances of one duty, one height after another.
pub struct Controller<N: Network, S: Storage, V: ValueCheck, K: SignatureScheme> {
    config: Configuration,
    network: N,
    storage: S,
    value_check: V,
    signer: K,
    // Ordered by height. Only the last one may be undecided.
    instances: VecDeque<Instance>,
    event_handlers: EventHandlers,
}

/// Result of [processing a batch](Controller::process_msg_batch) of messages.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// The decided message produced by a message of the batch, if any.
    pub decided: Option<SignedMessage>,
    /// The error of the last message of the batch that was rejected, if any.
    pub last_error: Option<QbftError>,
}

#[derive(BorshSerialize)]
struct ControllerSnapshot {
    identifier: Vec<u8>,
    height: Option<Height>,
    instance_roots: Vec<CryptoHash>,
}

impl<N: Network, S: Storage, V: ValueCheck, K: SignatureScheme> Controller<N, S, V, K> {
    /// Start an instance at the next height with `value` as the value to propose if this replica
    /// leads, and broadcast its first-round Proposal if it does.
    ///
    /// The first instance runs at [`Height::first`]. Fails if the latest instance has not decided, or
    /// if `value` does not pass the [`ValueCheck`].
    pub fn start_new_instance(&mut self, value: Value) -> Result<(), QbftError> {
        if let Some(latest) = self.instances.back() {
            if !latest.is_decided() {
                return Err(StateError::PreviousInstanceNotDecided {
                    height: latest.height(),
                }
                .into());
            }
        }

        self.value_check.check_value(&value)?;

        let height = self
            .instances
            .back()
            .map_or(Height::first(), |latest| latest.height() + 1);

        Event::StartInstance(StartInstanceEvent {
            timestamp: SystemTime::now(),
            height,
            value: value.clone(),
        })
        .publish(&self.event_handlers);

        let mut instance = Instance::new(height, value);
        let ctx = InstanceContext {
            me: self.config.me,
            identifier: &self.config.identifier,
            committee: &self.config.committee,
            value_check: &self.value_check,
            signer: &self.signer,
            event_handlers: &self.event_handlers,
        };
        let output = instance.start(&ctx);

        self.instances.push_back(instance);
        while self.instances.len() > self.config.historical_instance_capacity.max(1) {
            self.instances.pop_front();
        }

        self.broadcast_all(&output.broadcasts)
    }

    /// Process a signed message for one of the instances this controller keeps.
    ///
    /// Returns the decided message on the call that completes the Commit quorum of its instance, and
    /// `None` on every other successful call. By the time a decided message is returned, it has been
    /// saved to storage and broadcast.
    ///
    /// ## Errors
    ///
    /// The message is rejected, leaving every instance as it was, if it is malformed, carries another
    /// duty's identifier, is for a height the controller does not keep, or is inadmissible for its
    /// instance. If the network rejects a message the instance emitted, the effects of processing are
    /// kept and [`QbftError::Network`] is returned.
    pub fn process_msg(&mut self, msg: &SignedMessage) -> Result<Option<SignedMessage>, QbftError> {
        let result = self.try_process_msg(msg);
        if let Err(err) = &result {
            log::debug!(
                "Rejected {} message, height {}, round {}: {}",
                msg.message.msg_type,
                msg.message.height,
                msg.message.round,
                err
            );
        }
        result
    }

    /// Decode `bytes` as a [`SignedMessage`] and [process](Self::process_msg) it.
    pub fn process_encoded_msg(&mut self, bytes: &[u8]) -> Result<Option<SignedMessage>, QbftError> {
        let msg = SignedMessage::decode(bytes)?;
        self.process_msg(&msg)
    }

    /// Process `msgs` in order. A rejected message does not stop the batch, nor undo the effects of the
    /// messages before it.
    pub fn process_msg_batch<'a>(
        &mut self,
        msgs: impl IntoIterator<Item = &'a SignedMessage>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for msg in msgs {
            match self.process_msg(msg) {
                Ok(Some(decided)) => outcome.decided = Some(decided),
                Ok(None) => (),
                Err(err) => outcome.last_error = Some(err),
            }
        }
        outcome
    }

    /// Report that the current round of the latest instance timed out. The instance moves to the next
    /// round, and this replica broadcasts a RoundChange for it.
    pub fn upon_round_timeout(&mut self) -> Result<(), QbftError> {
        let ctx = InstanceContext {
            me: self.config.me,
            identifier: &self.config.identifier,
            committee: &self.config.committee,
            value_check: &self.value_check,
            signer: &self.signer,
            event_handlers: &self.event_handlers,
        };
        let instance = self
            .instances
            .back_mut()
            .ok_or(StateError::NoInstanceRunning {
                height: Height::first(),
            })?;
        let output = instance.upon_round_timeout(&ctx)?;

        self.broadcast_all(&output.broadcasts)
    }

    /// Get a digest of the state of this controller: its identifier, the latest height, and the root
    /// of every instance it keeps. Two controllers that processed the same inputs have the same root.
    pub fn root(&self) -> CryptoHash {
        let snapshot = ControllerSnapshot {
            identifier: self.config.identifier.to_vec(),
            height: self.height(),
            instance_roots: self.instances.iter().map(|instance| instance.root()).collect(),
        };
        CryptoHash::digest(&snapshot.try_to_vec().unwrap())
    }

    /// Get the height of the latest instance, if any was started.
    pub fn height(&self) -> Option<Height> {
        self.instances.back().map(|instance| instance.height())
    }

    /// Get the instance at `height`, if the controller keeps it.
    pub fn instance(&self, height: Height) -> Option<&Instance> {
        self.instances
            .iter()
            .find(|instance| instance.height() == height)
    }

    /// Get the latest instance, if any was started.
    pub fn current_instance(&self) -> Option<&Instance> {
        self.instances.back()
    }

    /// Get the decided message with the highest height in storage for this controller's duty.
    pub fn highest_decided(&self) -> Result<Option<SignedMessage>, StorageError> {
        self.storage.highest_decided(&self.config.identifier)
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn try_process_msg(&mut self, msg: &SignedMessage) -> Result<Option<SignedMessage>, QbftError> {
        msg.validate()?;

        if msg.message.identifier.as_slice() != self.config.identifier.bytes().as_slice() {
            return Err(StateError::InvalidIdentifier.into());
        }

        let height = msg.message.height;
        let ctx = InstanceContext {
            me: self.config.me,
            identifier: &self.config.identifier,
            committee: &self.config.committee,
            value_check: &self.value_check,
            signer: &self.signer,
            event_handlers: &self.event_handlers,
        };
        let instance = self
            .instances
            .iter_mut()
            .find(|instance| instance.height() == height)
            .ok_or(StateError::NoInstanceRunning { height })?;
        let InstanceOutput {
            broadcasts,
            decided,
        } = instance.process_msg(&ctx, msg)?;

        let broadcast_result = self.broadcast_all(&broadcasts);

        match decided {
            Some(decided) => {
                if let Err(err) = broadcast_result {
                    log::warn!("Failed to broadcast at height {}: {}", height, err);
                }
                self.on_decided(&decided);
                Ok(Some(decided))
            }
            None => broadcast_result.map(|()| None),
        }
    }

    /// Persist and broadcast a decided message. Failures are logged, since the decision itself stands.
    fn on_decided(&mut self, decided: &SignedMessage) {
        if let Err(err) = self
            .storage
            .save_highest_decided(&self.config.identifier, decided)
        {
            log::warn!(
                "Failed to save decided message at height {}: {}",
                decided.message.height,
                err
            );
        }

        if let Err(err) = self.broadcast(decided) {
            log::warn!(
                "Failed to broadcast decided message at height {}: {}",
                decided.message.height,
                err
            );
        }
    }

    /// Broadcast every message in `msgs`, and return the first error the network reported.
    fn broadcast_all(&mut self, msgs: &[SignedMessage]) -> Result<(), QbftError> {
        let mut result = Ok(());
        for msg in msgs {
            if let Err(err) = self.broadcast(msg) {
                if result.is_ok() {
                    result = Err(err.into());
                }
            }
        }
        result
    }

    fn broadcast(&mut self, msg: &SignedMessage) -> Result<(), NetworkError> {
        self.network.broadcast(&self.config.identifier, msg.encode())
    }
}
