//! Application-visible events and the synchronous handler registry that
//! delivers them. Kept deliberately simple: one thread, callbacks run
//! inline from whatever call pushed the triggering frame through
//! `Signaling::handle_incoming`.

use crate::close_code::CloseCode;
use crate::protocol::types::Role;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Event {
    /// The server handshake completed; the peer handshake is starting.
    ServerHandshakeDone,
    /// The peer handshake completed and a task was agreed on.
    PeerHandshakeDone { role: Role, task: String },
    /// The peer's connection to the server dropped.
    PeerDisconnected,
    /// As a responder: a new initiator showed up on the path.
    NewInitiatorAvailable,
    /// As an initiator: a new responder showed up on the path.
    NewResponderAvailable { id: u8 },
    /// The session is winding down with this close code.
    Closing(CloseCode),
    /// The session is fully closed.
    Closed,
    /// The transport itself failed; no close code applies since there's
    /// no guarantee a frame can still be sent.
    ConnectionLost(String),
}

/// Implemented by application code that wants to observe signaling
/// progress.
pub trait EventHandler {
    fn on_event(&mut self, event: &Event);
}

/// Holds zero or more [`EventHandler`]s and fans every event out to all of
/// them, in registration order.
#[derive(Default)]
pub struct EventRegistry {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        EventRegistry { handlers: Vec::new() }
    }

    pub fn register(&mut self, handler: Box<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&mut self, event: &Event) {
        for handler in &mut self.handlers {
            handler.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(usize);

    impl EventHandler for Counter {
        fn on_event(&mut self, _event: &Event) {
            self.0 += 1;
        }
    }

    #[test]
    fn dispatch_reaches_every_registered_handler() {
        let mut registry = EventRegistry::new();
        registry.register(Box::new(Counter(0)));
        registry.register(Box::new(Counter(0)));
        registry.dispatch(&Event::ServerHandshakeDone);
        registry.dispatch(&Event::Closed);
        // Can't observe the counters from outside without downcasting;
        // this just checks dispatch doesn't panic across multiple
        // handlers and multiple events.
        assert_eq!(registry.handlers.len(), 2);
    }
}
