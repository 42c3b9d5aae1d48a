//! Shared protocol vocabulary: roles, state machine phases, and the
//! `HandleAction` values a state transition produces for its caller to act
//! on. Modeled on the reference client's `next_state`/`handle_message`
//! split, which keeps protocol logic free of I/O.

use crate::boxes::ByteBox;
use crate::close_code::CloseCode;
use crate::events::Event;
use crate::messages::TaskMessage;

/// Which side of the peer handshake this session plays.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Role {
    Initiator,
    Responder,
}

/// Top-level signaling session phase.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalingState {
    /// Nothing sent or received yet.
    New,
    /// Transport is connecting.
    WsConnecting,
    /// Exchanging `server-hello`/`client-hello`/`client-auth`/`server-auth`.
    ServerHandshake,
    /// Exchanging `token`/`key`/`auth` with the peer.
    PeerHandshake,
    /// Peer handshake complete; the negotiated task owns message traffic.
    Task,
    /// `close` sent or being processed, winding down.
    Closing,
    /// Connection fully torn down.
    Closed,
    /// A fatal error occurred; no further progress is possible.
    Error,
}

/// Sub-phases of the server handshake, common to both roles.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServerHandshakeState {
    New,
    HelloSent,
    AuthSent,
    Done,
}

/// Sub-phases of the peer handshake as seen by an initiator tracking one
/// candidate responder.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InitiatorHandshakeState {
    New,
    KeyReceived,
    AuthReceived,
}

/// Sub-phases of the peer handshake as seen by a responder tracking the
/// single initiator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResponderHandshakeState {
    New,
    TokenSent,
    KeySent,
    KeyReceived,
    AuthSent,
    AuthReceived,
}

/// The effect of processing one incoming frame or one outgoing task send.
/// The signaling core never performs I/O itself; it returns these and
/// leaves sending bytes, closing sockets, and surfacing events to the
/// caller.
#[derive(Debug)]
pub enum HandleAction {
    /// Send this frame to the transport, unmodified.
    Reply(ByteBox),
    /// Hand a decoded, in-task-phase message to the running task.
    ToTask(TaskMessage),
    /// Surface an application-visible event.
    Notify(Event),
    /// Close the transport with this close code and move to `Closed`.
    Close(CloseCode),
}
