//! Peer records: the per-counterparty state the signaling core tracks
//! across the server, the initiator (as seen by a responder), and each
//! responder (as seen by the initiator).

use crate::cookie::{Cookie, CookiePair};
use crate::csn::{IncomingCsnTracker, OutgoingCsn};
use crate::error::SaltyError;
use crate::keystore::{PublicKey, SessionPublicKey, SessionSecretKey, SharedKeyStore};
use crate::nonce::Address;
use crate::protocol::types::{InitiatorHandshakeState, ResponderHandshakeState, ServerHandshakeState};

/// Everything tracked about the relay server connection itself. The
/// server's cookie is learned from its first frame, before we draw ours,
/// so a [`CookiePair`] can be built eagerly here.
pub struct ServerContext {
    pub cookie_pair: Option<CookiePair>,
    pub outgoing_csn: OutgoingCsn,
    pub incoming_csn: IncomingCsnTracker,
    pub handshake_state: ServerHandshakeState,
    pub permanent_shared_key: Option<SharedKeyStore>,
}

impl ServerContext {
    pub fn new() -> Self {
        ServerContext {
            cookie_pair: None,
            outgoing_csn: OutgoingCsn::new(),
            incoming_csn: IncomingCsnTracker::new(),
            handshake_state: ServerHandshakeState::New,
            permanent_shared_key: None,
        }
    }
}

impl Default for ServerContext {
    fn default() -> Self {
        ServerContext::new()
    }
}

/// The two cookies of a direct peer-to-peer relationship. Unlike the
/// server leg, either side may have to speak first, so `ours` is drawn
/// immediately and `theirs` is filled in once their first frame arrives.
pub struct PeerCookies {
    pub ours: Cookie,
    pub theirs: Option<Cookie>,
}

impl PeerCookies {
    pub fn new() -> Self {
        PeerCookies { ours: Cookie::random(), theirs: None }
    }

    /// Record the peer's cookie from their first frame, or check it
    /// against what we already recorded.
    pub fn observe(&mut self, cookie: Cookie) -> Result<(), SaltyError> {
        match self.theirs {
            None => {
                if cookie == self.ours {
                    return Err(SaltyError::protocol("peer cookie collides with ours"));
                }
                self.theirs = Some(cookie);
                Ok(())
            }
            Some(known) if known == cookie => Ok(()),
            Some(_) => Err(SaltyError::protocol("peer cookie changed mid-connection")),
        }
    }
}

impl Default for PeerCookies {
    fn default() -> Self {
        PeerCookies::new()
    }
}

/// As seen by a responder: the record for the single initiator on the
/// path.
pub struct InitiatorContext {
    pub address: Address,
    pub cookies: PeerCookies,
    pub outgoing_csn: OutgoingCsn,
    pub incoming_csn: IncomingCsnTracker,
    pub handshake_state: ResponderHandshakeState,
    pub permanent_key: Option<PublicKey>,
    pub permanent_shared_key: Option<SharedKeyStore>,
    pub session_key: Option<SessionPublicKey>,
    pub our_session_key: Option<(SessionPublicKey, SessionSecretKey)>,
    pub session_shared_key: Option<SharedKeyStore>,
}

impl InitiatorContext {
    pub fn new() -> Self {
        InitiatorContext {
            address: Address::INITIATOR,
            cookies: PeerCookies::new(),
            outgoing_csn: OutgoingCsn::new(),
            incoming_csn: IncomingCsnTracker::new(),
            handshake_state: ResponderHandshakeState::New,
            permanent_key: None,
            permanent_shared_key: None,
            session_key: None,
            our_session_key: None,
            session_shared_key: None,
        }
    }
}

impl Default for InitiatorContext {
    fn default() -> Self {
        InitiatorContext::new()
    }
}

/// As seen by the initiator: the record for one candidate responder.
/// The initiator may track several of these simultaneously before one
/// completes its handshake.
pub struct ResponderContext {
    pub address: Address,
    pub cookies: PeerCookies,
    pub outgoing_csn: OutgoingCsn,
    pub incoming_csn: IncomingCsnTracker,
    pub handshake_state: InitiatorHandshakeState,
    pub permanent_key: Option<PublicKey>,
    pub permanent_shared_key: Option<SharedKeyStore>,
    pub session_key: Option<SessionPublicKey>,
    pub our_session_key: Option<(SessionPublicKey, SessionSecretKey)>,
    pub session_shared_key: Option<SharedKeyStore>,
}

impl ResponderContext {
    pub fn new(address: Address) -> Self {
        ResponderContext {
            address,
            cookies: PeerCookies::new(),
            outgoing_csn: OutgoingCsn::new(),
            incoming_csn: IncomingCsnTracker::new(),
            handshake_state: InitiatorHandshakeState::New,
            permanent_key: None,
            permanent_shared_key: None,
            session_key: None,
            our_session_key: None,
            session_shared_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_contexts_start_in_new_state() {
        let server = ServerContext::new();
        assert_eq!(server.handshake_state, ServerHandshakeState::New);

        let initiator = InitiatorContext::new();
        assert_eq!(initiator.handshake_state, ResponderHandshakeState::New);
        assert_eq!(initiator.address, Address::INITIATOR);

        let responder = ResponderContext::new(Address(3));
        assert_eq!(responder.handshake_state, InitiatorHandshakeState::New);
        assert_eq!(responder.address, Address(3));
    }

    #[test]
    fn peer_cookies_capture_first_observation_and_reject_drift() {
        let mut cookies = PeerCookies::new();
        let theirs = Cookie::random();
        cookies.observe(theirs).unwrap();
        cookies.observe(theirs).unwrap();
        assert!(cookies.observe(Cookie::random()).is_err());
    }

    #[test]
    fn peer_cookies_reject_collision_with_ours() {
        let mut cookies = PeerCookies::new();
        let ours = cookies.ours;
        assert!(cookies.observe(ours).is_err());
    }
}
