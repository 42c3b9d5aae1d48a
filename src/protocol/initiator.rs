//! Initiator-side peer handshake: tracking every candidate responder the
//! server has announced, picking the first one whose `token`/`key` message
//! decrypts, and completing `auth` task negotiation with it. Once one
//! responder completes, every other candidate is dropped.

use std::collections::HashMap;

use log::{debug, info, trace};

use crate::boxes::{ByteBox, Envelope, OpenBox};
use crate::close_code::CloseCode;
use crate::config::PeerConfig;
use crate::error::SaltyError;
use crate::events::Event;
use crate::keystore::{AuthToken, PublicKey, SharedKeyStore};
use crate::messages::{self, Auth, DropResponder, Key, Message};
use crate::nonce::{Address, Nonce};
use crate::protocol::peer::ResponderContext;
use crate::protocol::signaling::Signaling;
use crate::protocol::types::{HandleAction, InitiatorHandshakeState, Role, SignalingState};

/// Nothing to send right away: the initiator waits for a responder to
/// speak first.
pub(crate) fn bootstrap(_sig: &mut Signaling) -> Vec<HandleAction> {
    Vec::new()
}

pub(crate) fn handle_new_responder(sig: &mut Signaling, id: u8) -> Result<Vec<HandleAction>, SaltyError> {
    if !(0x02..=0xff).contains(&id) {
        return Err(SaltyError::protocol("new-responder.id is out of the responder range"));
    }
    debug!("new candidate responder at 0x{:02x}", id);
    sig.responders.entry(id).or_insert_with(|| ResponderContext::new(Address(id)));
    sig.events.dispatch(&Event::NewResponderAvailable { id });
    Ok(vec![HandleAction::Notify(Event::NewResponderAvailable { id })])
}

pub(crate) fn handle_frame(sig: &mut Signaling, bbox: ByteBox) -> Result<Vec<HandleAction>, SaltyError> {
    let nonce = bbox.nonce;
    let id = nonce.source.0;
    if !sig.responders.contains_key(&id) {
        return Err(SaltyError::protocol("frame from an address with no known responder record"));
    }
    {
        let ctx = sig.responders.get_mut(&id).unwrap();
        ctx.incoming_csn.validate(nonce.csn)?;
        ctx.cookies.observe(nonce.cookie)?;
    }

    let state = sig.responders.get(&id).unwrap().handshake_state;
    match state {
        InitiatorHandshakeState::New => handle_key_or_token(sig, id, bbox),
        InitiatorHandshakeState::KeyReceived => handle_responder_auth(sig, id, bbox),
        _ => Err(SaltyError::protocol("unexpected frame for this responder's handshake phase")),
    }
}

fn configured_auth_token(sig: &Signaling) -> Option<AuthToken> {
    match &sig.config.peer {
        PeerConfig::Initiator { auth_token, .. } => auth_token.clone(),
        _ => None,
    }
}

fn configured_trusted_keys(sig: &Signaling) -> Vec<PublicKey> {
    match &sig.config.peer {
        PeerConfig::Initiator { responder_trusted_keys, .. } => responder_trusted_keys.clone(),
        _ => Vec::new(),
    }
}

fn handle_key_or_token(sig: &mut Signaling, id: u8, bbox: ByteBox) -> Result<Vec<HandleAction>, SaltyError> {
    let already_known = sig.responders.get(&id).unwrap().permanent_key.is_some();
    if already_known {
        return handle_key(sig, id, bbox);
    }

    if let Some(token) = configured_auth_token(sig) {
        if let Ok(obox) = bbox.clone().unseal(sig.provider.as_ref(), &Envelope::AuthToken(&token)) {
            let received = match obox.message {
                Message::Token(t) => t,
                _ => return Err(SaltyError::protocol("expected token from the responder")),
            };
            let permanent_key = PublicKey::from_slice(&received.key)?;
            let shared = SharedKeyStore::new(sig.keystore.secret_key().clone(), permanent_key);
            let ctx = sig.responders.get_mut(&id).unwrap();
            ctx.permanent_key = Some(permanent_key);
            ctx.permanent_shared_key = Some(shared);
            return Ok(Vec::new());
        }
    }

    try_trusted_keys(sig, id, bbox)
}

fn try_trusted_keys(sig: &mut Signaling, id: u8, bbox: ByteBox) -> Result<Vec<HandleAction>, SaltyError> {
    for candidate in configured_trusted_keys(sig) {
        let shared = SharedKeyStore::new(sig.keystore.secret_key().clone(), candidate);
        if let Ok(obox) = bbox.clone().unseal(sig.provider.as_ref(), &Envelope::PeerPermanent(&shared)) {
            let ctx = sig.responders.get_mut(&id).unwrap();
            ctx.permanent_key = Some(candidate);
            ctx.permanent_shared_key = Some(shared);
            return handle_key_message(sig, id, obox);
        }
    }
    Err(SaltyError::crypto_first_key("could not decrypt the responder's key message against any trusted key"))
}

fn handle_key(sig: &mut Signaling, id: u8, bbox: ByteBox) -> Result<Vec<HandleAction>, SaltyError> {
    let shared = sig.responders.get(&id).unwrap().permanent_shared_key.clone().expect("resolved before handle_key runs");
    let obox = bbox
        .unseal(sig.provider.as_ref(), &Envelope::PeerPermanent(&shared))
        .map_err(|_| SaltyError::crypto_first_key("could not decrypt the responder's key message"))?;
    handle_key_message(sig, id, obox)
}

fn handle_key_message(sig: &mut Signaling, id: u8, obox: OpenBox) -> Result<Vec<HandleAction>, SaltyError> {
    let key = match obox.message {
        Message::Key(k) => k,
        _ => return Err(SaltyError::protocol("expected key from the responder")),
    };
    let peer_session_pk = PublicKey::from_slice(&key.key)?;
    trace!("responder 0x{:02x}: key received", id);

    if sig.responders.get(&id).unwrap().our_session_key.is_none() {
        let pair = sig.provider.keypair();
        sig.responders.get_mut(&id).unwrap().our_session_key = Some(pair);
    }
    let ctx = sig.responders.get_mut(&id).unwrap();
    let (_, our_session_sk) = ctx.our_session_key.clone().unwrap();
    ctx.session_key = Some(peer_session_pk);
    ctx.session_shared_key = Some(SharedKeyStore::new(our_session_sk, peer_session_pk));
    ctx.handshake_state = InitiatorHandshakeState::KeyReceived;

    Ok(vec![send_key_reply(sig, id)?])
}

fn send_key_reply(sig: &mut Signaling, id: u8) -> Result<HandleAction, SaltyError> {
    let our_address = sig.our_address;
    let ctx = sig.responders.get_mut(&id).unwrap();
    let csn = ctx.outgoing_csn.next()?;
    let nonce = Nonce::new(ctx.cookies.ours, our_address, ctx.address, csn);
    let our_session_pk = ctx.our_session_key.as_ref().unwrap().0;
    let shared = ctx.permanent_shared_key.clone().expect("resolved earlier in the handshake");
    let msg = Message::Key(Key { key: our_session_pk.as_bytes().to_vec() });
    Ok(HandleAction::Reply(OpenBox::new(msg, nonce).seal(sig.provider.as_ref(), &Envelope::PeerPermanent(&shared))))
}

fn handle_responder_auth(sig: &mut Signaling, id: u8, bbox: ByteBox) -> Result<Vec<HandleAction>, SaltyError> {
    let shared = sig.responders.get(&id).unwrap().session_shared_key.clone().expect("established in handle_key_message");
    let obox = bbox.unseal(sig.provider.as_ref(), &Envelope::PeerSession(&shared))?;
    let auth = match obox.message {
        Message::Auth(a) => a,
        _ => return Err(SaltyError::protocol("expected auth from the responder")),
    };

    let our_cookie = sig.responders.get(&id).unwrap().cookies.ours;
    if auth.your_cookie != our_cookie.as_bytes().to_vec() {
        return Err(SaltyError::protocol("auth.your_cookie does not match"));
    }
    let offered = auth
        .tasks
        .ok_or_else(|| SaltyError::protocol("the responder's auth must carry a tasks list"))?;

    let chosen_name = match offered.iter().find(|name| sig.tasks.iter().any(|t| t.name() == name.as_str())) {
        Some(name) => name.clone(),
        None => return Ok(sig.reset_connection(CloseCode::NoSharedTask)),
    };

    let index = sig.tasks.iter().position(|t| t.name() == chosen_name).expect("just matched above");
    let mut task = sig.tasks.remove(index);
    let task_data = messages::value_to_map(auth.data.get(&chosen_name));
    task.init(&task_data)?;
    let reply_data = messages::map_to_value(&task.data_for_auth());
    sig.tasks.clear();

    sig.active_responder = Some(id);
    let dropped: Vec<u8> = sig.responders.keys().copied().filter(|&rid| rid != id).collect();
    if !dropped.is_empty() {
        debug!("responder 0x{:02x} won the peer handshake, dropping {:?}", id, dropped);
    }
    let mut actions: Vec<HandleAction> = dropped
        .iter()
        .map(|&rid| send_drop_responder(sig, rid))
        .collect::<Result<Vec<_>, _>>()?;
    sig.responders.retain(|&rid, _| rid == id);
    sig.responders.get_mut(&id).unwrap().handshake_state = InitiatorHandshakeState::AuthReceived;

    actions.push(send_chosen_task_auth(sig, id, &chosen_name, reply_data)?);

    sig.state = SignalingState::Task;
    info!("peer handshake done with responder 0x{:02x}, task {}", id, chosen_name);
    task.on_peer_handshake_done();
    sig.task = Some(task);
    sig.events.dispatch(&Event::PeerHandshakeDone { role: Role::Initiator, task: chosen_name.clone() });
    actions.push(HandleAction::Notify(Event::PeerHandshakeDone { role: Role::Initiator, task: chosen_name }));
    Ok(actions)
}

/// Tell the server to drop a candidate responder that lost the race to
/// complete the peer handshake first.
fn send_drop_responder(sig: &mut Signaling, id: u8) -> Result<HandleAction, SaltyError> {
    let csn = sig.server.outgoing_csn.next()?;
    let cookie = sig.server.cookie_pair.as_ref().expect("set during the server handshake").ours;
    let nonce = Nonce::new(cookie, sig.our_address, Address::SERVER, csn);
    let msg = Message::DropResponder(DropResponder { id, reason: Some(CloseCode::DroppedByInitiator.code()) });
    let shared = sig.server.permanent_shared_key.as_ref().expect("set once the server handshake completes");
    Ok(HandleAction::Reply(OpenBox::new(msg, nonce).seal(sig.provider.as_ref(), &Envelope::Server(shared))))
}

fn send_chosen_task_auth(sig: &mut Signaling, id: u8, task_name: &str, data_value: rmpv::Value) -> Result<HandleAction, SaltyError> {
    let our_address = sig.our_address;
    let ctx = sig.responders.get_mut(&id).unwrap();
    let csn = ctx.outgoing_csn.next()?;
    let nonce = Nonce::new(ctx.cookies.ours, our_address, ctx.address, csn);
    let their_cookie = ctx.cookies.theirs.expect("the responder's cookie was observed before this point");
    let shared = ctx.session_shared_key.clone().expect("established earlier in the handshake");

    let mut data = HashMap::new();
    data.insert(task_name.to_string(), data_value);

    let msg = Message::Auth(Auth {
        your_cookie: their_cookie.as_bytes().to_vec(),
        task: Some(task_name.to_string()),
        tasks: None,
        data,
    });
    Ok(HandleAction::Reply(OpenBox::new(msg, nonce).seal(sig.provider.as_ref(), &Envelope::PeerSession(&shared))))
}
