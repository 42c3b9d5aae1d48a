//! The signaling state machine, split the way the reference client splits
//! it: shared vocabulary and peer records first, then one module per role
//! for the parts of the peer handshake that are genuinely asymmetric.

pub mod initiator;
pub mod peer;
pub mod responder;
pub mod signaling;
pub mod types;

pub use signaling::Signaling;
pub use types::{HandleAction, InitiatorHandshakeState, Role, ResponderHandshakeState, ServerHandshakeState, SignalingState};
