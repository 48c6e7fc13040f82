use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// Handlers registered for each kind of [`Event`]. When logging is enabled, the default
/// [logger](crate::logging) of each event kind comes first in its list.
#[derive(Default)]
pub(crate) struct EventHandlers {
    pub(crate) start_instance_handlers: Vec<HandlerPtr<StartInstanceEvent>>,
    pub(crate) propose_handlers: Vec<HandlerPtr<ProposeEvent>>,
    pub(crate) prepare_handlers: Vec<HandlerPtr<PrepareEvent>>,
    pub(crate) commit_handlers: Vec<HandlerPtr<CommitEvent>>,
    pub(crate) round_change_handlers: Vec<HandlerPtr<RoundChangeEvent>>,
    pub(crate) receive_proposal_handlers: Vec<HandlerPtr<ReceiveProposalEvent>>,
    pub(crate) receive_prepare_handlers: Vec<HandlerPtr<ReceivePrepareEvent>>,
    pub(crate) receive_commit_handlers: Vec<HandlerPtr<ReceiveCommitEvent>>,
    pub(crate) receive_round_change_handlers: Vec<HandlerPtr<ReceiveRoundChangeEvent>>,
    pub(crate) accept_proposal_handlers: Vec<HandlerPtr<AcceptProposalEvent>>,
    pub(crate) update_prepared_handlers: Vec<HandlerPtr<UpdatePreparedEvent>>,
    pub(crate) change_round_handlers: Vec<HandlerPtr<ChangeRoundEvent>>,
    pub(crate) decide_handlers: Vec<HandlerPtr<DecideEvent>>,
}

impl EventHandlers {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        start_instance_handler: Option<HandlerPtr<StartInstanceEvent>>,
        propose_handler: Option<HandlerPtr<ProposeEvent>>,
        prepare_handler: Option<HandlerPtr<PrepareEvent>>,
        commit_handler: Option<HandlerPtr<CommitEvent>>,
        round_change_handler: Option<HandlerPtr<RoundChangeEvent>>,
        receive_proposal_handler: Option<HandlerPtr<ReceiveProposalEvent>>,
        receive_prepare_handler: Option<HandlerPtr<ReceivePrepareEvent>>,
        receive_commit_handler: Option<HandlerPtr<ReceiveCommitEvent>>,
        receive_round_change_handler: Option<HandlerPtr<ReceiveRoundChangeEvent>>,
        accept_proposal_handler: Option<HandlerPtr<AcceptProposalEvent>>,
        update_prepared_handler: Option<HandlerPtr<UpdatePreparedEvent>>,
        change_round_handler: Option<HandlerPtr<ChangeRoundEvent>>,
        decide_handler: Option<HandlerPtr<DecideEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            start_instance_handlers: handlers(log_events, start_instance_handler),
            propose_handlers: handlers(log_events, propose_handler),
            prepare_handlers: handlers(log_events, prepare_handler),
            commit_handlers: handlers(log_events, commit_handler),
            round_change_handlers: handlers(log_events, round_change_handler),
            receive_proposal_handlers: handlers(log_events, receive_proposal_handler),
            receive_prepare_handlers: handlers(log_events, receive_prepare_handler),
            receive_commit_handlers: handlers(log_events, receive_commit_handler),
            receive_round_change_handlers: handlers(log_events, receive_round_change_handler),
            accept_proposal_handlers: handlers(log_events, accept_proposal_handler),
            update_prepared_handlers: handlers(log_events, update_prepared_handler),
            change_round_handlers: handlers(log_events, change_round_handler),
            decide_handlers: handlers(log_events, decide_handler),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.start_instance_handlers.is_empty()
            && self.propose_handlers.is_empty()
            && self.prepare_handlers.is_empty()
            && self.commit_handlers.is_empty()
            && self.round_change_handlers.is_empty()
            && self.receive_proposal_handlers.is_empty()
            && self.receive_prepare_handlers.is_empty()
            && self.receive_commit_handlers.is_empty()
            && self.receive_round_change_handlers.is_empty()
            && self.accept_proposal_handlers.is_empty()
            && self.update_prepared_handlers.is_empty()
            && self.change_round_handlers.is_empty()
            && self.decide_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::StartInstance(start_instance_event) => self
                .start_instance_handlers
                .iter()
                .for_each(|handler| handler(&start_instance_event)),

            Event::Propose(propose_event) => self
                .propose_handlers
                .iter()
                .for_each(|handler| handler(&propose_event)),

            Event::Prepare(prepare_event) => self
                .prepare_handlers
                .iter()
                .for_each(|handler| handler(&prepare_event)),

            Event::Commit(commit_event) => self
                .commit_handlers
                .iter()
                .for_each(|handler| handler(&commit_event)),

            Event::RoundChange(round_change_event) => self
                .round_change_handlers
                .iter()
                .for_each(|handler| handler(&round_change_event)),

            Event::ReceiveProposal(receive_proposal_event) => self
                .receive_proposal_handlers
                .iter()
                .for_each(|handler| handler(&receive_proposal_event)),

            Event::ReceivePrepare(receive_prepare_event) => self
                .receive_prepare_handlers
                .iter()
                .for_each(|handler| handler(&receive_prepare_event)),

            Event::ReceiveCommit(receive_commit_event) => self
                .receive_commit_handlers
                .iter()
                .for_each(|handler| handler(&receive_commit_event)),

            Event::ReceiveRoundChange(receive_round_change_event) => self
                .receive_round_change_handlers
                .iter()
                .for_each(|handler| handler(&receive_round_change_event)),

            Event::AcceptProposal(accept_proposal_event) => self
                .accept_proposal_handlers
                .iter()
                .for_each(|handler| handler(&accept_proposal_event)),

            Event::UpdatePrepared(update_prepared_event) => self
                .update_prepared_handlers
                .iter()
                .for_each(|handler| handler(&update_prepared_event)),

            Event::ChangeRound(change_round_event) => self
                .change_round_handlers
                .iter()
                .for_each(|handler| handler(&change_round_event)),

            Event::Decide(decide_event) => self
                .decide_handlers
                .iter()
                .for_each(|handler| handler(&decide_event)),
        }
    }
}

fn handlers<E: Logger>(log_events: bool, user_handler: Option<HandlerPtr<E>>) -> Vec<HandlerPtr<E>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(E::get_logger());
    }
    if let Some(handler) = user_handler {
        handlers.push(handler);
    }
    handlers
}
