//! The task interface: a negotiated, application-defined protocol layered
//! on top of a completed peer handshake. The signaling core stays
//! entirely ignorant of what a task's messages mean; it only routes them.

use std::collections::HashMap;

use crate::close_code::CloseCode;
use crate::error::SaltyError;
use crate::messages::TaskMessage;

/// One application-level task a peer can offer during handshake
/// negotiation. Implementations are matched by [`Task::name`] against the
/// ordered list the responder proposes and the initiator picks from.
pub trait Task {
    /// The task's name, as it appears in `auth.tasks`/`auth.task`.
    fn name(&self) -> &str;

    /// Message `type` values this task will accept once the peer
    /// handshake is done. Anything outside this set (and outside the
    /// core's own `send-error`/`disconnected`/`new-initiator`/
    /// `new-responder` vocabulary) is a protocol error.
    fn supported_message_types(&self) -> &[&str];

    /// Called once, right before the `auth` message carrying this task's
    /// negotiation data is sent or processed. `data` is the task-specific
    /// sub-map the peer included under its own task name in `auth.data`.
    fn init(&mut self, data: &HashMap<String, rmpv::Value>) -> Result<(), SaltyError>;

    /// Data this side wants to include under its own task name in the
    /// `auth` message it sends.
    fn data_for_auth(&self) -> HashMap<String, rmpv::Value>;

    /// Called once the peer handshake has fully completed and this task
    /// has taken over message traffic.
    fn on_peer_handshake_done(&mut self);

    /// Called for every decoded message whose type is in
    /// [`Task::supported_message_types`].
    fn on_task_message(&mut self, message: TaskMessage);

    /// Called when the session is closing, whether initiated locally or
    /// by the peer.
    fn close(&mut self, reason: CloseCode);
}
