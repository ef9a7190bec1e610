//! Tokio driver for the simulated typing delay.
use std::cell::RefCell;
use std::rc::Rc;

use crate::controller::{DialogueController, PendingReply, Submission, UserInput};
use crate::session::{Clock, Message};

/// Wait out `reply.delay()` and then deliver it.
///
/// The controller is only borrowed after the sleep, so other tasks on the
/// same thread may switch or cancel the session meanwhile. In that case the
/// reply is stale and `None` is returned.
pub async fn deliver_after_delay<C: Clock>(
    controller: &Rc<RefCell<DialogueController<C>>>,
    reply: PendingReply,
) -> Option<Message> {
    tokio::time::sleep(reply.delay()).await;
    controller.borrow_mut().deliver(&reply).cloned()
}

/// Submit `input` and, if a reply was scheduled, wait for it.
pub async fn exchange<C: Clock>(
    controller: &Rc<RefCell<DialogueController<C>>>,
    input: UserInput,
) -> (Submission, Option<Message>) {
    let submission = controller.borrow_mut().submit_input(input);
    let delivered = match &submission {
        Submission::Reply(reply) => deliver_after_delay(controller, reply.clone()).await,
        Submission::Ignored | Submission::SwitchStory => None,
    };
    (submission, delivered)
}
