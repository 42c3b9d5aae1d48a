//! Responder-side peer handshake (the counterpart to [`super::initiator`]):
//! establishing a session key with the single initiator on this path and
//! completing the `token`/`key`/`auth` dance from the responder's end.

use std::collections::HashMap;

use log::{debug, info, trace};

use crate::boxes::{ByteBox, Envelope, OpenBox};
use crate::close_code::CloseCode;
use crate::config::PeerConfig;
use crate::error::SaltyError;
use crate::events::Event;
use crate::keystore::{AuthToken, PublicKey, SharedKeyStore};
use crate::messages::{self, Auth, Key, Message, Token};
use crate::nonce::Nonce;
use crate::protocol::peer::InitiatorContext;
use crate::protocol::signaling::Signaling;
use crate::protocol::types::{HandleAction, ResponderHandshakeState, Role, SignalingState};

/// Resolve the initiator's permanent key from config, send `token` if this
/// is a first-time (untrusted) connection, then send our own `key`
/// unconditionally.
pub(crate) fn init_peer_handshake(sig: &mut Signaling) -> Result<Vec<HandleAction>, SaltyError> {
    let (permanent_key, token) = match &sig.config.peer {
        PeerConfig::Responder { initiator_trusted_key: Some(key), .. } => (*key, None),
        PeerConfig::Responder { initiator_pubkey_and_token: Some((key, token)), .. } => (*key, Some(token.clone())),
        _ => return Err(SaltyError::internal("responder peer config must resolve to exactly one initiator key")),
    };

    let shared = SharedKeyStore::new(sig.keystore.secret_key().clone(), permanent_key);
    {
        let ctx = sig.initiator.as_mut().expect("the initiator record exists once the peer handshake starts");
        ctx.permanent_key = Some(permanent_key);
        ctx.permanent_shared_key = Some(shared);
    }

    let mut actions = Vec::new();
    if let Some(token) = token {
        debug!("sending token to the initiator (untrusted first contact)");
        actions.push(send_token(sig, &token)?);
        sig.initiator.as_mut().unwrap().handshake_state = ResponderHandshakeState::TokenSent;
    } else {
        debug!("initiator key is pre-trusted, skipping token");
    }
    actions.push(send_key(sig)?);
    sig.initiator.as_mut().unwrap().handshake_state = ResponderHandshakeState::KeySent;
    Ok(actions)
}

fn send_token(sig: &mut Signaling, token: &AuthToken) -> Result<HandleAction, SaltyError> {
    let our_address = sig.our_address;
    let our_public_key = *sig.keystore.public_key();
    let ctx = sig.initiator.as_mut().unwrap();
    let csn = ctx.outgoing_csn.next()?;
    let nonce = Nonce::new(ctx.cookies.ours, our_address, ctx.address, csn);
    let msg = Message::Token(Token { key: our_public_key.as_bytes().to_vec() });
    Ok(HandleAction::Reply(OpenBox::new(msg, nonce).seal(sig.provider.as_ref(), &Envelope::AuthToken(token))))
}

fn send_key(sig: &mut Signaling) -> Result<HandleAction, SaltyError> {
    if sig.initiator.as_ref().unwrap().our_session_key.is_none() {
        let pair = sig.provider.keypair();
        sig.initiator.as_mut().unwrap().our_session_key = Some(pair);
    }
    let our_address = sig.our_address;
    let ctx = sig.initiator.as_mut().unwrap();
    let csn = ctx.outgoing_csn.next()?;
    let nonce = Nonce::new(ctx.cookies.ours, our_address, ctx.address, csn);
    let our_session_pk = ctx.our_session_key.as_ref().unwrap().0;
    let shared = ctx.permanent_shared_key.clone().expect("permanent key resolved earlier in init_peer_handshake");
    let msg = Message::Key(Key { key: our_session_pk.as_bytes().to_vec() });
    Ok(HandleAction::Reply(OpenBox::new(msg, nonce).seal(sig.provider.as_ref(), &Envelope::PeerPermanent(&shared))))
}

/// Route one inbound peer-handshake frame from the initiator.
pub(crate) fn handle_frame(sig: &mut Signaling, bbox: ByteBox) -> Result<Vec<HandleAction>, SaltyError> {
    let nonce = bbox.nonce;
    {
        let ctx = sig.initiator.as_ref().ok_or_else(|| SaltyError::internal("no initiator record"))?;
        if nonce.source != ctx.address {
            return Err(SaltyError::protocol("peer handshake frame source does not match the initiator's address"));
        }
    }
    {
        let ctx = sig.initiator.as_mut().unwrap();
        ctx.incoming_csn.validate(nonce.csn)?;
        ctx.cookies.observe(nonce.cookie)?;
    }

    let state = sig.initiator.as_ref().unwrap().handshake_state;
    match state {
        ResponderHandshakeState::New | ResponderHandshakeState::TokenSent | ResponderHandshakeState::KeySent => {
            handle_key(sig, bbox)
        }
        ResponderHandshakeState::KeyReceived | ResponderHandshakeState::AuthSent => handle_auth(sig, bbox),
        ResponderHandshakeState::AuthReceived => Err(SaltyError::protocol("peer handshake with the initiator already completed")),
    }
}

fn handle_key(sig: &mut Signaling, bbox: ByteBox) -> Result<Vec<HandleAction>, SaltyError> {
    let shared = sig.initiator.as_ref().unwrap().permanent_shared_key.clone().expect("resolved in init_peer_handshake");
    let obox = bbox
        .unseal(sig.provider.as_ref(), &Envelope::PeerPermanent(&shared))
        .map_err(|_| SaltyError::crypto_first_key("could not decrypt the initiator's key message"))?;
    let key = match obox.message {
        Message::Key(k) => k,
        _ => return Err(SaltyError::protocol("expected key from the initiator")),
    };
    let peer_session_pk = PublicKey::from_slice(&key.key)?;

    let ctx = sig.initiator.as_mut().unwrap();
    let (_, our_session_sk) = ctx
        .our_session_key
        .clone()
        .expect("our session keypair is generated before our own key message is sent");
    ctx.session_key = Some(peer_session_pk);
    ctx.session_shared_key = Some(SharedKeyStore::new(our_session_sk, peer_session_pk));
    ctx.handshake_state = ResponderHandshakeState::KeyReceived;
    trace!("initiator key received, session key established");

    send_auth(sig)
}

fn send_auth(sig: &mut Signaling) -> Result<Vec<HandleAction>, SaltyError> {
    if sig.tasks.is_empty() {
        return Err(SaltyError::internal("no tasks configured to offer"));
    }
    let task_names: Vec<String> = sig.tasks.iter().map(|t| t.name().to_string()).collect();
    let mut data = HashMap::new();
    for task in &sig.tasks {
        data.insert(task.name().to_string(), messages::map_to_value(&task.data_for_auth()));
    }

    let our_address = sig.our_address;
    let ctx = sig.initiator.as_mut().unwrap();
    let csn = ctx.outgoing_csn.next()?;
    let nonce = Nonce::new(ctx.cookies.ours, our_address, ctx.address, csn);
    let their_cookie = ctx.cookies.theirs.expect("the initiator's key message observed its cookie before send_auth runs");
    let shared = ctx.session_shared_key.clone().expect("session key established in handle_key");
    ctx.handshake_state = ResponderHandshakeState::AuthSent;

    let msg = Message::Auth(Auth {
        your_cookie: their_cookie.as_bytes().to_vec(),
        task: None,
        tasks: Some(task_names),
        data,
    });
    Ok(vec![HandleAction::Reply(OpenBox::new(msg, nonce).seal(sig.provider.as_ref(), &Envelope::PeerSession(&shared)))])
}

fn handle_auth(sig: &mut Signaling, bbox: ByteBox) -> Result<Vec<HandleAction>, SaltyError> {
    let shared = sig.initiator.as_ref().unwrap().session_shared_key.clone().expect("established in handle_key");
    let obox = bbox.unseal(sig.provider.as_ref(), &Envelope::PeerSession(&shared))?;
    let auth = match obox.message {
        Message::Auth(a) => a,
        _ => return Err(SaltyError::protocol("expected auth from the initiator")),
    };

    let our_cookie = sig.initiator.as_ref().unwrap().cookies.ours;
    if auth.your_cookie != our_cookie.as_bytes().to_vec() {
        return Err(SaltyError::protocol("auth.your_cookie does not match"));
    }
    let chosen = auth
        .task
        .ok_or_else(|| SaltyError::protocol("the initiator's auth must carry a single chosen task"))?;

    let index = match sig.tasks.iter().position(|t| t.name() == chosen) {
        Some(i) => i,
        None => return Ok(sig.reset_connection(CloseCode::NoSharedTask)),
    };
    let mut task = sig.tasks.remove(index);
    let task_data = messages::value_to_map(auth.data.get(&chosen));
    task.init(&task_data)?;
    sig.tasks.clear();

    sig.initiator.as_mut().unwrap().handshake_state = ResponderHandshakeState::AuthReceived;
    sig.state = SignalingState::Task;
    info!("peer handshake done with the initiator, task {}", chosen);
    task.on_peer_handshake_done();
    sig.task = Some(task);
    sig.events.dispatch(&Event::PeerHandshakeDone { role: Role::Responder, task: chosen.clone() });
    Ok(vec![HandleAction::Notify(Event::PeerHandshakeDone { role: Role::Responder, task: chosen })])
}

/// A previous initiator disappeared and a new one took its place; restart
/// the peer handshake from scratch against the new one.
pub(crate) fn handle_new_initiator(sig: &mut Signaling) -> Result<Vec<HandleAction>, SaltyError> {
    info!("new-initiator: rebuilding the initiator record and restarting the peer handshake");
    sig.initiator = Some(InitiatorContext::new());
    sig.state = SignalingState::PeerHandshake;
    sig.task = None;
    sig.events.dispatch(&Event::NewInitiatorAvailable);
    let mut actions = vec![HandleAction::Notify(Event::NewInitiatorAvailable)];
    actions.extend(init_peer_handshake(sig)?);
    Ok(actions)
}
